use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::notifier::NotificationDispatcher;
use crate::db::EventStore;
use crate::models::WhaleEvent;

/// Re-drive the dispatcher for un-notified events inside `window`.
///
/// Processes at most `batch` events, newest first. Returns how many were
/// picked up. A failure on one event does not stop the others.
pub async fn sweep_pending_notifications(
    store: &dyn EventStore,
    dispatcher: &NotificationDispatcher,
    window: Duration,
    batch: i64,
) -> anyhow::Result<usize> {
    let since = Utc::now() - chrono::Duration::from_std(window)?;
    let pending = store.find_unnotified_since(since, batch).await?;

    if pending.is_empty() {
        tracing::debug!("Notification sweep: nothing pending");
        return Ok(0);
    }
    tracing::info!(pending = pending.len(), "Notification sweep: re-dispatching events");

    for event in &pending {
        counter!("notification_sweep_events_total").increment(1);
        if let Err(e) = dispatcher.process_event_notifications(event).await {
            tracing::warn!(error = %e, event_id = %event.id, "Sweep dispatch failed");
        }
    }

    Ok(pending.len())
}

/// Run the sweep every `every` until cancelled.
pub async fn run_notification_sweep(
    store: Arc<dyn EventStore>,
    dispatcher: Arc<NotificationDispatcher>,
    every: Duration,
    window: Duration,
    batch: i64,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; give live dispatch a head start
    ticker.tick().await;

    tracing::info!(interval_secs = every.as_secs(), window_secs = window.as_secs(), "Notification sweep started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = sweep_pending_notifications(store.as_ref(), &dispatcher, window, batch).await {
            tracing::error!(error = %e, "Notification sweep failed");
        }
    }

    tracing::info!("Notification sweep stopped");
}

/// Dispatch events forwarded by listeners as they are stored.
pub async fn run_live_dispatch(
    mut rx: mpsc::Receiver<WhaleEvent>,
    dispatcher: Arc<NotificationDispatcher>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let Err(e) = dispatcher.process_event_notifications(&event).await {
            tracing::warn!(error = %e, event_id = %event.id, "Live dispatch failed, left for sweep");
        }
    }

    tracing::info!("Live notification dispatch stopped");
}
