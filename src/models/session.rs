//! Session model and lifecycle helpers.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group label used when a session has no usable working directory.
pub const DEFAULT_GROUP: &str = "General";

/// Lifecycle status for a tracked session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Registered but not yet started or sampled.
    Pending,
    /// Actively consuming CPU.
    Running,
    /// Alive but idle, typically waiting on the operator.
    Waiting,
    /// Finished; exit code reported or assumed zero.
    Done,
    /// Finished with a non-zero exit code.
    Failed,
    /// Terminated by an operator kill command.
    Killed,
}

impl SessionStatus {
    /// All statuses in board display order.
    pub const ALL: [Self; 6] = [
        Self::Running,
        Self::Waiting,
        Self::Pending,
        Self::Done,
        Self::Killed,
        Self::Failed,
    ];

    /// Whether the status is absorbing (`DONE`, `FAILED`, `KILLED`).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Killed)
    }

    /// Whether the session is still alive from the board's point of view.
    #[must_use]
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Wire name, as used in JSON bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration payload sent by a wrapper process (`POST /task`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSession {
    /// Client-assigned session identifier.
    pub id: String,
    /// Display label.
    pub name: String,
    /// Process whose descendants are sampled.
    #[serde(default)]
    pub shell_pid: Option<u32>,
    /// Working directory of the session.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Host the session runs on.
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Partial status update sent by a wrapper process (`PATCH /task/{id}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusPatch {
    /// Requested status.
    #[serde(default)]
    pub status: Option<SessionStatus>,
    /// Exit code of the wrapped command.
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// Tracked session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Unique identifier; immutable.
    pub id: String,
    /// Display label.
    pub name: String,
    /// Root of the sampled process tree, when registered by a wrapper.
    pub shell_pid: Option<u32>,
    /// Pid of an auto-discovered process; absent for registered sessions.
    pub discovered_pid: Option<u32>,
    /// Working directory.
    pub cwd: Option<String>,
    /// Host name; immutable after creation.
    pub hostname: Option<String>,
    /// Board group, derived from `cwd`.
    pub group: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Exit code; present exactly when `status` is terminal.
    pub exit_code: Option<i32>,
    /// Most recent CPU sample in percent.
    pub cpu_pct: Option<f64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last status change.
    pub last_transition_at: DateTime<Utc>,
    /// Timestamp of the last entry into `RUNNING`.
    pub running_since: Option<DateTime<Utc>>,
}

impl Session {
    /// Build a `PENDING` session from a wrapper registration.
    #[must_use]
    pub fn new(registration: NewSession, now: DateTime<Utc>) -> Self {
        let group = group_for_cwd(registration.cwd.as_deref());
        Self {
            id: registration.id,
            name: registration.name,
            shell_pid: registration.shell_pid,
            discovered_pid: None,
            cwd: registration.cwd,
            hostname: registration.hostname,
            group,
            status: SessionStatus::Pending,
            exit_code: None,
            cpu_pct: None,
            created_at: now,
            last_transition_at: now,
            running_since: None,
        }
    }

    /// Build a synthetic `RUNNING` session for a process found in the
    /// process table without a registration.
    #[must_use]
    pub fn discovered(
        pid: u32,
        name: String,
        cwd: Option<String>,
        hostname: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let group = group_for_cwd(cwd.as_deref());
        Self {
            id: discovered_id(pid),
            name,
            shell_pid: None,
            discovered_pid: Some(pid),
            cwd,
            hostname,
            group,
            status: SessionStatus::Running,
            exit_code: None,
            cpu_pct: None,
            created_at: now,
            last_transition_at: now,
            running_since: Some(now),
        }
    }

    /// Pid the resource monitor samples: the shell, else the discovered process.
    #[must_use]
    pub fn monitored_pid(&self) -> Option<u32> {
        self.shell_pid.or(self.discovered_pid)
    }

    /// Whether the session has reached an absorbing state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::{Done, Failed, Killed, Pending, Running, Waiting};
        matches!(
            (self.status, next),
            (Pending | Waiting, Running)
                | (Pending | Running, Waiting)
                | (Pending | Running | Waiting, Done | Failed | Killed)
        )
    }

    /// Update the fields a repeated registration is allowed to change.
    ///
    /// `status`, `exit_code`, `hostname` and timestamps are left alone so a
    /// late registration can never resurrect or regress a session.
    pub fn refresh_registration(&mut self, registration: NewSession) {
        self.name = registration.name;
        if registration.cwd.is_some() {
            self.cwd = registration.cwd;
            self.group = group_for_cwd(self.cwd.as_deref());
        }
        if self.shell_pid.is_none() {
            self.shell_pid = registration.shell_pid;
        }
    }
}

/// Identifier assigned to an auto-discovered process.
#[must_use]
pub fn discovered_id(pid: u32) -> String {
    format!("discovered-{pid}")
}

/// Derive the board group from a working directory.
///
/// Uses the last path component; blank or root directories fall back to
/// [`DEFAULT_GROUP`].
#[must_use]
pub fn group_for_cwd(cwd: Option<&str>) -> String {
    let Some(cwd) = cwd.map(str::trim).filter(|c| !c.is_empty() && *c != "/") else {
        return DEFAULT_GROUP.to_owned();
    };
    Path::new(cwd.trim_end_matches('/'))
        .file_name()
        .map_or_else(
            || DEFAULT_GROUP.to_owned(),
            |name| name.to_string_lossy().into_owned(),
        )
}
