use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::AiContext;

#[derive(Debug, Serialize)]
pub(crate) struct AiContextResponse {
    pub(crate) unit_id: String,
    pub(crate) context_id: String,
    pub(crate) expires_at: String,
}

impl From<AiContext> for AiContextResponse {
    fn from(context: AiContext) -> Self {
        Self {
            unit_id: context.unit_id,
            context_id: context.context_id,
            expires_at: format_primitive(context.expires_at),
        }
    }
}
