pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::state::{AppState, Stores};
use crate::core::{config::Settings, redis::RedisHandle, telemetry};
use crate::services::ai_service::HttpAiService;
use crate::services::notifications::notifier_from_settings;
use crate::services::storage::StorageService;

async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let db_pool = db::connect(&settings).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    match redis.connect().await {
        Ok(()) => tracing::info!("Redis connected"),
        Err(err) => {
            tracing::error!(error = %err, "Redis unavailable; duplicate-submit guard disabled")
        }
    }

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::info!("Object storage not configured; AI contexts use inline unit content");
    }
    let ai = Arc::new(HttpAiService::from_settings(&settings)?);
    let notifier = notifier_from_settings(&settings)?;
    let stores = Stores::postgres(&db_pool);

    Ok(AppState::new(settings, db_pool, redis, storage, stores, ai, notifier))
}

/// Shared start-up for both binaries: env, settings, tracing, metrics, state.
async fn bootstrap() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    build_state(settings).await
}

async fn teardown(state: &AppState) {
    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");
}

pub async fn run() -> anyhow::Result<()> {
    let state = bootstrap().await?;
    let settings = state.settings();
    let listener = tokio::net::TcpListener::bind(settings.server_addr()).await?;

    tracing::info!(
        host = %settings.server_host(),
        port = settings.server_port(),
        environment = %settings.runtime().environment.as_str(),
        "Quiz grader API listening"
    );

    let app = api::router::router(state.clone());
    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    teardown(&state).await;
    Ok(result?)
}

/// Background loops only: retry queue, stale reclaim and reviewer reminders.
pub async fn run_worker() -> anyhow::Result<()> {
    let state = bootstrap().await?;
    let result = tasks::scheduler::run(state.clone()).await;

    teardown(&state).await;
    result
}
