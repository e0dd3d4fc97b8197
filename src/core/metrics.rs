use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!("submissions_total", "Quiz submissions by outcome");
    describe_counter!("answers_corrected_total", "Per-question corrections by kind and mode");
    describe_counter!("ai_corrections_total", "Calls to the AI correction service by status");
    describe_histogram!(
        "ai_correction_duration_seconds",
        Unit::Seconds,
        "Latency of AI-assisted corrections"
    );
    describe_counter!("review_decisions_total", "Reviewer decisions on pending answers");
    describe_counter!("retry_queue_items_total", "AI retry queue transitions");
    describe_counter!("notifications_total", "Notices handed to the delivery channel");
}
