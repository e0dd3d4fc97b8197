pub(crate) mod models;
pub(crate) mod types;

use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::core::config::Settings;

/// Open the pool and bring the grading schema up to date.
pub(crate) async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    let options = settings
        .database()
        .database_url()
        .parse::<PgConnectOptions>()
        .context("Invalid database URL")?
        .application_name("quiz-grader")
        .log_statements(tracing::log::LevelFilter::Off);

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations").run(&pool).await.context("Failed to run migrations")?;
    tracing::info!("Database ready");
    Ok(pool)
}
