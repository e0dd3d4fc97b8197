use std::collections::HashMap;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::core::metrics;
use crate::core::redis::RedisHealth;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

/// Ordered by severity; the service reports its worst component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Healthy => "healthy",
            Level::Degraded => "degraded",
            Level::Unhealthy => "unhealthy",
        }
    }
}

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Quiz grader API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_prefix: state.settings().api().api_v1_str.clone(),
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    // Redis only guards double submits, so losing it degrades rather than fails.
    let redis = match state.redis().health().await {
        RedisHealth::Healthy => (Level::Healthy, "healthy".to_string()),
        RedisHealth::Disconnected => (Level::Healthy, "disconnected".to_string()),
        RedisHealth::Unhealthy(err) => (Level::Degraded, format!("unhealthy: {err}")),
    };
    let database = match sqlx::query("SELECT 1").execute(state.db()).await {
        Ok(_) => (Level::Healthy, "healthy".to_string()),
        Err(err) => (Level::Unhealthy, format!("unhealthy: {err}")),
    };
    let storage = match state.storage() {
        Some(storage) => (Level::Healthy, format!("configured ({})", storage.bucket())),
        None => (Level::Healthy, "disabled".to_string()),
    };

    let checks = [("redis", redis), ("database", database), ("object_storage", storage)];
    let status = checks.iter().map(|(_, (level, _))| *level).max().unwrap_or(Level::Healthy);
    let components: HashMap<String, String> =
        checks.into_iter().map(|(name, (_, detail))| (name.to_string(), detail)).collect();

    Json(HealthResponse {
        service: "quiz-grader".to_string(),
        status: status.as_str().to_string(),
        components,
    })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(body) = metrics::render() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}
