//! Session lifecycle policy.
//!
//! Every writer (control API, resource monitor, operator kill) expresses
//! its intent as a [`LifecycleEvent`]; [`apply`] is the single place that
//! decides whether the event changes the session.
//!
//! ```text
//! PENDING ─► RUNNING ⇄ WAITING ─► DONE | FAILED | KILLED
//!    └──────────────────┘
//! ```
//!
//! Terminal states absorb every later event, so racing writers (wrapper
//! patch vs. monitor vanish vs. operator kill) record exactly one terminal
//! transition: whichever reaches the store first.

use chrono::{DateTime, Utc};

use crate::models::session::{Session, SessionStatus, StatusPatch};
use crate::{AppError, Result};

/// Exit code recorded for operator kills (negated `SIGTERM`).
pub const KILL_EXIT_CODE: i32 = -15;

/// Exit code assumed when the monitor sees a process disappear.
pub const VANISHED_EXIT_CODE: i32 = 0;

/// Exit code assumed for a `FAILED` patch without one.
pub const DEFAULT_FAILURE_EXIT_CODE: i32 = 1;

/// A request to move a session through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LifecycleEvent {
    /// Wrapper is about to exec the command; not gated by CPU.
    MarkRunning,
    /// Wrapper reports the session idle.
    MarkWaiting,
    /// Monitor CPU sample across the session's process tree.
    CpuSample {
        /// Sampled CPU usage in percent.
        pct: f64,
        /// Percentage at or above which the session is running.
        threshold: f64,
    },
    /// Monitor found the tracked process gone (or unsampleable).
    ProcessVanished,
    /// Wrapper reports the command finished.
    Finished {
        /// Terminal status to record.
        status: SessionStatus,
        /// Exit code to record.
        exit_code: i32,
    },
    /// Operator kill command.
    Killed,
}

/// Result of applying a [`LifecycleEvent`] to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status changed.
    Changed {
        /// Status before the event.
        from: SessionStatus,
        /// Status after the event.
        to: SessionStatus,
    },
    /// Session was already in the requested state.
    Unchanged,
    /// Session is terminal; the event was dropped.
    Rejected,
}

impl Transition {
    /// Whether the event changed the session status.
    #[must_use]
    pub fn is_change(self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Apply `event` to `session` at time `now`.
///
/// Only non-terminal sessions are mutated. A CPU sample always records
/// `cpu_pct`, then flips `RUNNING`/`WAITING` on that single sample.
pub fn apply(session: &mut Session, event: LifecycleEvent, now: DateTime<Utc>) -> Transition {
    if session.is_terminal() {
        return Transition::Rejected;
    }

    let (next, exit_code) = match event {
        LifecycleEvent::MarkRunning => (SessionStatus::Running, None),
        LifecycleEvent::MarkWaiting => (SessionStatus::Waiting, None),
        LifecycleEvent::CpuSample { pct, threshold } => {
            session.cpu_pct = Some(pct);
            if pct >= threshold {
                (SessionStatus::Running, None)
            } else {
                (SessionStatus::Waiting, None)
            }
        }
        LifecycleEvent::ProcessVanished => (SessionStatus::Done, Some(VANISHED_EXIT_CODE)),
        LifecycleEvent::Finished { status, exit_code } => (status, Some(exit_code)),
        LifecycleEvent::Killed => (SessionStatus::Killed, Some(KILL_EXIT_CODE)),
    };

    if next == session.status || !session.can_transition_to(next) {
        return Transition::Unchanged;
    }

    let from = session.status;
    session.status = next;
    session.exit_code = exit_code.filter(|_| next.is_terminal());
    session.last_transition_at = now;
    if next == SessionStatus::Running {
        session.running_since = Some(now);
    }

    Transition::Changed { from, to: next }
}

/// Translate a wrapper patch into a lifecycle event.
///
/// Returns `Ok(None)` for an empty patch. A bare `exit_code` finishes the
/// session (`DONE` for zero, `FAILED` otherwise); terminal statuses without
/// an exit code get a conventional default.
///
/// # Errors
///
/// Returns `AppError::InvalidTransition` when the patch asks for `PENDING`,
/// which no session may re-enter.
pub fn event_for_patch(patch: &StatusPatch) -> Result<Option<LifecycleEvent>> {
    let event = match (patch.status, patch.exit_code) {
        (None, None) => return Ok(None),
        (None, Some(0)) => LifecycleEvent::Finished {
            status: SessionStatus::Done,
            exit_code: 0,
        },
        (None, Some(code)) => LifecycleEvent::Finished {
            status: SessionStatus::Failed,
            exit_code: code,
        },
        (Some(SessionStatus::Pending), _) => {
            return Err(AppError::InvalidTransition(
                "sessions cannot return to PENDING".into(),
            ));
        }
        (Some(SessionStatus::Running), _) => LifecycleEvent::MarkRunning,
        (Some(SessionStatus::Waiting), _) => LifecycleEvent::MarkWaiting,
        (Some(SessionStatus::Done), code) => LifecycleEvent::Finished {
            status: SessionStatus::Done,
            exit_code: code.unwrap_or(0),
        },
        (Some(SessionStatus::Failed), code) => LifecycleEvent::Finished {
            status: SessionStatus::Failed,
            exit_code: code.unwrap_or(DEFAULT_FAILURE_EXIT_CODE),
        },
        (Some(SessionStatus::Killed), code) => LifecycleEvent::Finished {
            status: SessionStatus::Killed,
            exit_code: code.unwrap_or(KILL_EXIT_CODE),
        },
    };
    Ok(Some(event))
}
