//! Retention service for finished sessions.
//!
//! Runs as a background task removing sessions that have been terminal
//! for at least the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session_store::SessionStore;

/// Spawn the purge background task.
///
/// The first sweep runs immediately, then every `interval` until `cancel`
/// fires.
#[must_use]
pub fn spawn_purge_task(
    store: Arc<SessionStore>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("purge task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    purge(&store, retention);
                }
            }
        }
    })
}

/// Run one sweep against the wall clock, returning the removed ids.
pub fn purge(store: &SessionStore, retention: Duration) -> Vec<String> {
    let removed = store.purge_expired(Utc::now(), retention);
    if removed.is_empty() {
        debug!("purge sweep found nothing to remove");
    } else {
        info!(count = removed.len(), ids = ?removed, "purged finished sessions");
    }
    removed
}
