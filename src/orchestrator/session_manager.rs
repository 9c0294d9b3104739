//! Operator actions on tracked sessions.
//!
//! A kill is fire-and-forget: the store records `KILLED` before any signal
//! is sent, and the resource monitor's next pass confirms the process is
//! gone. Nothing here waits for the process to exit.

use std::sync::Arc;

use tracing::{info, info_span, warn};

use super::lifecycle::LifecycleEvent;
use super::process::{terminate_process_tree, ProcessProbe, SysinfoProbe, Termination};
use crate::models::session::Session;
use crate::store::SessionStore;
use crate::Result;

/// Kill a session on behalf of the operator.
///
/// Terminal sessions are returned unchanged. Otherwise the session is
/// marked `KILLED` and its process tree is signalled on the blocking pool.
/// A process that no longer exists counts as already killed. Must be
/// called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the session does not exist.
pub fn kill_session(store: &Arc<SessionStore>, session_id: &str) -> Result<Session> {
    let span = info_span!("kill_session", session_id);
    let _guard = span.enter();

    let applied = store.update_status(session_id, LifecycleEvent::Killed)?;
    if !applied.transition.is_change() {
        info!(status = %applied.session.status, "session already finished, kill ignored");
        return Ok(applied.session);
    }

    match applied.session.monitored_pid() {
        Some(pid) => {
            let id = session_id.to_owned();
            // Detached: the operator never waits on signal delivery.
            drop(tokio::task::spawn_blocking(move || signal_session_tree(&id, pid)));
        }
        None => info!("session has no known process, marked killed"),
    }

    Ok(applied.session)
}

/// Signal `pid` and every descendant visible in a fresh process snapshot.
///
/// Runs synchronously; call it from a blocking context.
pub fn signal_session_tree(session_id: &str, pid: u32) -> Termination {
    let mut probe = SysinfoProbe::new();
    probe.refresh();
    let descendants = probe.descendants(pid);

    match terminate_process_tree(pid, &descendants) {
        Ok(outcome) => {
            info!(session_id, pid, descendants = descendants.len(), ?outcome, "kill signal sent");
            outcome
        }
        Err(err) => {
            warn!(session_id, pid, %err, "failed to signal session process");
            Termination::AlreadyGone
        }
    }
}
