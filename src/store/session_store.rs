//! In-memory session store.
//!
//! The store is the only shared mutable state in the process. Every
//! operation takes the lock for a bounded field-assignment critical
//! section; callers do their process-table queries, signalling and
//! logging after the guard is released.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::session::{NewSession, Session, SessionStatus, StatusPatch};
use crate::orchestrator::lifecycle::{self, LifecycleEvent, Transition};
use crate::{AppError, Result};

/// Session snapshot paired with the outcome of a lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Record after the event.
    pub session: Session,
    /// What the event did.
    pub transition: Transition,
}

/// A live session the resource monitor must sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    /// Session identifier.
    pub id: String,
    /// Root pid of the sampled process tree.
    pub pid: u32,
}

/// Counts reported by `GET /stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    /// Distinct sessions registered since startup (purged ones included).
    pub total_registered: u64,
    /// Records currently held.
    pub tracked: usize,
    /// Sessions in `PENDING`.
    pub pending: usize,
    /// Sessions in `RUNNING`.
    pub running: usize,
    /// Sessions in `WAITING`.
    pub waiting: usize,
    /// Sessions in `DONE`.
    pub done: usize,
    /// Sessions in `FAILED`.
    pub failed: usize,
    /// Sessions in `KILLED`.
    pub killed: usize,
}

/// Process-wide registry of tracked sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    registrations: AtomicU64,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session, or refresh an existing registration.
    ///
    /// A duplicate `id` updates `name`/`cwd` in place and never touches
    /// `status` or `exit_code`.
    pub fn register(&self, registration: NewSession) -> Session {
        self.register_at(registration, Utc::now())
    }

    /// [`register`](Self::register) with an explicit clock reading.
    pub fn register_at(&self, registration: NewSession, now: DateTime<Utc>) -> Session {
        let (session, created) = {
            let mut sessions = self.lock();
            if let Some(existing) = sessions.get_mut(&registration.id) {
                existing.refresh_registration(registration);
                (existing.clone(), false)
            } else {
                let session = Session::new(registration, now);
                sessions.insert(session.id.clone(), session.clone());
                self.registrations.fetch_add(1, Ordering::Relaxed);
                (session, true)
            }
        };

        if created {
            info!(session_id = %session.id, name = %session.name, shell_pid = ?session.shell_pid, "session registered");
        } else {
            debug!(session_id = %session.id, status = %session.status, "session re-registered");
        }
        session
    }

    /// Insert an auto-discovered session unless its id or pid is already tracked.
    ///
    /// Returns `true` when the record was added.
    pub fn insert_discovered(&self, session: Session) -> bool {
        let inserted = {
            let mut sessions = self.lock();
            let pid = session.monitored_pid();
            let pid_tracked = pid.is_some()
                && sessions
                    .values()
                    .any(|existing| existing.monitored_pid() == pid);
            if pid_tracked || sessions.contains_key(&session.id) {
                false
            } else {
                sessions.insert(session.id.clone(), session.clone());
                self.registrations.fetch_add(1, Ordering::Relaxed);
                true
            }
        };

        if inserted {
            info!(session_id = %session.id, pid = ?session.discovered_pid, "session auto-discovered");
        }
        inserted
    }

    /// Fetch a copy of one session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.lock().get(id).cloned()
    }

    /// Point-in-time copy of every session, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        let mut snapshot: Vec<Session> = self.lock().values().cloned().collect();
        snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshot
    }

    /// Apply a lifecycle event to a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub fn update_status(&self, id: &str, event: LifecycleEvent) -> Result<Applied> {
        self.update_status_at(id, event, Utc::now())
    }

    /// [`update_status`](Self::update_status) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub fn update_status_at(
        &self,
        id: &str,
        event: LifecycleEvent,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let applied = {
            let mut sessions = self.lock();
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
            let transition = lifecycle::apply(session, event, now);
            Applied {
                session: session.clone(),
                transition,
            }
        };

        log_transition(&applied);
        Ok(applied)
    }

    /// Apply a wrapper patch.
    ///
    /// Patches on terminal sessions are accepted as no-ops, whatever they
    /// ask for.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown sessions and
    /// `AppError::InvalidTransition` for a `PENDING` patch on a live session.
    pub fn apply_patch(&self, id: &str, patch: &StatusPatch) -> Result<Applied> {
        let now = Utc::now();
        let applied = {
            let mut sessions = self.lock();
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
            let transition = if session.is_terminal() {
                Transition::Rejected
            } else {
                match lifecycle::event_for_patch(patch)? {
                    Some(event) => lifecycle::apply(session, event, now),
                    None => Transition::Unchanged,
                }
            };
            Applied {
                session: session.clone(),
                transition,
            }
        };

        if applied.transition == Transition::Rejected {
            debug!(session_id = id, ?patch, "patch on terminal session ignored");
        }
        log_transition(&applied);
        Ok(applied)
    }

    /// Record a CPU sample and flip `RUNNING`/`WAITING` accordingly.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub fn update_cpu(&self, id: &str, pct: f64, threshold: f64) -> Result<Applied> {
        self.update_status(id, LifecycleEvent::CpuSample { pct, threshold })
    }

    /// Remove a session, returning it when present.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.lock().remove(id)
    }

    /// Remove every terminal session whose last transition is at least
    /// `retention` before `now`. Returns the removed ids.
    pub fn purge_expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<String> {
        let mut sessions = self.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|session| session.is_terminal())
            .filter(|session| {
                now.signed_duration_since(session.last_transition_at)
                    .to_std()
                    .is_ok_and(|age| age >= retention)
            })
            .map(|session| session.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }

    /// Non-terminal sessions with a pid the monitor can sample.
    #[must_use]
    pub fn monitor_targets(&self) -> Vec<MonitorTarget> {
        self.lock()
            .values()
            .filter(|session| session.status.is_active())
            .filter_map(|session| {
                session.monitored_pid().map(|pid| MonitorTarget {
                    id: session.id.clone(),
                    pid,
                })
            })
            .collect()
    }

    /// Pids of every tracked session, terminal ones included.
    #[must_use]
    pub fn tracked_pids(&self) -> HashSet<u32> {
        self.lock()
            .values()
            .filter_map(Session::monitored_pid)
            .collect()
    }

    /// Counts by status plus the registration total.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let sessions = self.lock();
        let mut stats = StoreStats {
            total_registered: self.registrations.load(Ordering::Relaxed),
            tracked: sessions.len(),
            ..StoreStats::default()
        };
        for session in sessions.values() {
            let slot = match session.status {
                SessionStatus::Pending => &mut stats.pending,
                SessionStatus::Running => &mut stats.running,
                SessionStatus::Waiting => &mut stats.waiting,
                SessionStatus::Done => &mut stats.done,
                SessionStatus::Failed => &mut stats.failed,
                SessionStatus::Killed => &mut stats.killed,
            };
            *slot += 1;
        }
        stats
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn log_transition(applied: &Applied) {
    if let Transition::Changed { from, to } = applied.transition {
        info!(
            session_id = %applied.session.id,
            %from,
            %to,
            exit_code = ?applied.session.exit_code,
            "session status changed"
        );
    }
}
