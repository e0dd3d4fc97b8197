use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::shutdown::broadcast_on_signal;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;

const REMINDER_INTERVAL_SECONDS: u64 = 3600;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let retry_every = Duration::from_secs(state.settings().grading().retry_interval_seconds.max(1));
    let handles = vec![
        tokio::spawn(retry_queue_loop(state.clone(), retry_every, shutdown_rx.clone())),
        tokio::spawn(overdue_reminder_loop(
            state.clone(),
            Duration::from_secs(REMINDER_INTERVAL_SECONDS),
            shutdown_rx.clone(),
        )),
    ];
    tracing::info!(
        retry_interval_seconds = retry_every.as_secs(),
        reminder_interval_seconds = REMINDER_INTERVAL_SECONDS,
        "Worker loops started"
    );

    broadcast_on_signal(shutdown_tx).await;

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn retry_queue_loop(state: AppState, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let handler = state.retry_handler();
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = handler.process_queue(primitive_now_utc()).await {
                    tracing::error!(error = %err, "AI retry sweep failed");
                }
            }
        }
    }
}

async fn overdue_reminder_loop(
    state: AppState,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let reviews = state.review_service();
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = reviews.remind_overdue(primitive_now_utc()).await {
                    tracing::error!(error = %err, "Overdue reminder dispatch failed");
                }
            }
        }
    }
}
