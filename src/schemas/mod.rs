use std::collections::HashMap;

use serde::Serialize;

pub(crate) mod ai_context;
pub(crate) mod review;
pub(crate) mod submission;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) api_prefix: String,
}
