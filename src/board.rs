//! Board view model for display adapters.
//!
//! Turns a store snapshot into grouped, ordered rows with display labels
//! and elapsed times, plus a plain-text rendering used by
//! `session-board-ctl list`. Pure functions of the snapshot and a clock
//! reading; no access to the store itself.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::models::session::{Session, SessionStatus};

/// Seconds after a status change during which a row is highlighted.
pub const FLASH_SECONDS: i64 = 2;

/// Maximum characters of a session name shown in a row.
pub const NAME_WIDTH: usize = 26;

/// One session row.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BoardRow {
    /// Session identifier.
    pub id: String,
    /// Display name, truncated to [`NAME_WIDTH`] characters.
    pub name: String,
    /// Current status.
    pub status: SessionStatus,
    /// Human label such as `Running` or `Failed (2)`.
    pub label: String,
    /// Elapsed time, formatted by [`format_elapsed`].
    pub elapsed: String,
    /// Whether the status changed within [`FLASH_SECONDS`].
    pub flashing: bool,
}

/// Rows sharing a working directory.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BoardGroup {
    /// Group label (directory basename).
    pub name: String,
    /// Rows in status order.
    pub rows: Vec<BoardRow>,
}

/// Most recently finished session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LastFinished {
    /// Session display name.
    pub name: String,
    /// Seconds since it finished.
    pub seconds_ago: i64,
}

/// Everything a display needs for one frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BoardView {
    /// Groups in display order.
    pub groups: Vec<BoardGroup>,
    /// Visible `RUNNING` sessions.
    pub running: usize,
    /// Visible `WAITING` sessions.
    pub waiting: usize,
    /// Visible `PENDING` sessions.
    pub pending: usize,
    /// Most recently finished visible session.
    pub last_finished: Option<LastFinished>,
    /// Clock reading the view was built for.
    pub generated_at: DateTime<Utc>,
}

impl BoardView {
    /// Total number of rows across all groups.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|group| group.rows.len()).sum()
    }

    /// Rows in display order, flattened (the order used for row selection).
    pub fn rows(&self) -> impl Iterator<Item = &BoardRow> {
        self.groups.iter().flat_map(|group| group.rows.iter())
    }

    /// Summary line: `"2 running  1 waiting"`, or `"All quiet"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.running > 0 {
            parts.push(format!("{} running", self.running));
        }
        if self.waiting > 0 {
            parts.push(format!("{} waiting", self.waiting));
        }
        if self.pending > 0 {
            parts.push(format!("{} pending", self.pending));
        }
        if parts.is_empty() {
            "All quiet".to_owned()
        } else {
            parts.join("  ")
        }
    }
}

/// Display rank of a status; lower sorts first.
#[must_use]
pub fn status_rank(status: SessionStatus) -> usize {
    SessionStatus::ALL
        .iter()
        .position(|candidate| *candidate == status)
        .unwrap_or(SessionStatus::ALL.len())
}

/// Human label for a session's status.
#[must_use]
pub fn status_label(session: &Session) -> String {
    match session.status {
        SessionStatus::Running => "Running".to_owned(),
        SessionStatus::Waiting => "Waiting".to_owned(),
        SessionStatus::Pending => "Pending".to_owned(),
        SessionStatus::Done => "Complete".to_owned(),
        SessionStatus::Killed => "Killed".to_owned(),
        SessionStatus::Failed => session
            .exit_code
            .map_or_else(|| "Failed".to_owned(), |code| format!("Failed ({code})")),
    }
}

/// Format a duration in seconds as `42s`, `3m07s` or `2h05m`.
#[must_use]
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (minutes, secs) = (seconds / 60, seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m{secs:02}s")
    } else {
        format!("{secs}s")
    }
}

/// Seconds shown in the TIME column.
///
/// Running sessions count from their last start of work, other live
/// sessions from registration, finished ones show their total run time.
#[must_use]
pub fn elapsed_seconds(session: &Session, now: DateTime<Utc>) -> i64 {
    let span = match session.status {
        SessionStatus::Running => now - session.running_since.unwrap_or(session.created_at),
        SessionStatus::Waiting | SessionStatus::Pending => now - session.created_at,
        SessionStatus::Done | SessionStatus::Failed | SessionStatus::Killed => {
            session.last_transition_at - session.created_at
        }
    };
    span.num_seconds()
}

fn is_visible(session: &Session, now: DateTime<Utc>, retention: Duration) -> bool {
    if session.status.is_active() {
        return true;
    }
    now.signed_duration_since(session.last_transition_at)
        .to_std()
        .map_or(true, |age| age < retention)
}

fn truncate_chars(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Build the board for `snapshot` as of `now`.
///
/// Finished sessions stay visible until `retention` has passed, matching
/// the purge sweep.
#[must_use]
pub fn build(snapshot: &[Session], now: DateTime<Utc>, retention: Duration) -> BoardView {
    let visible: Vec<&Session> = snapshot
        .iter()
        .filter(|session| is_visible(session, now, retention))
        .collect();

    let mut grouped: BTreeMap<&str, Vec<&Session>> = BTreeMap::new();
    for &session in &visible {
        grouped.entry(session.group.as_str()).or_default().push(session);
    }

    let mut groups: Vec<(usize, BoardGroup)> = grouped
        .into_iter()
        .map(|(name, mut sessions)| {
            sessions.sort_by(|a, b| {
                status_rank(a.status)
                    .cmp(&status_rank(b.status))
                    .then_with(|| a.created_at.cmp(&b.created_at))
            });
            let best = sessions
                .iter()
                .map(|session| status_rank(session.status))
                .min()
                .unwrap_or(usize::MAX);
            let rows = sessions
                .into_iter()
                .map(|session| BoardRow {
                    id: session.id.clone(),
                    name: truncate_chars(&session.name, NAME_WIDTH),
                    status: session.status,
                    label: status_label(session),
                    elapsed: format_elapsed(elapsed_seconds(session, now)),
                    flashing: (now - session.last_transition_at).num_seconds() < FLASH_SECONDS,
                })
                .collect();
            (
                best,
                BoardGroup {
                    name: name.to_owned(),
                    rows,
                },
            )
        })
        .collect();

    groups.sort_by(|(rank_a, a), (rank_b, b)| match rank_a.cmp(rank_b) {
        Ordering::Equal => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        other => other,
    });

    let count = |status: SessionStatus| visible.iter().filter(|s| s.status == status).count();
    let last_finished = visible
        .iter()
        .filter(|session| session.is_terminal())
        .max_by_key(|session| session.last_transition_at)
        .map(|session| LastFinished {
            name: truncate_chars(&session.name, 16),
            seconds_ago: (now - session.last_transition_at).num_seconds().max(0),
        });

    BoardView {
        running: count(SessionStatus::Running),
        waiting: count(SessionStatus::Waiting),
        pending: count(SessionStatus::Pending),
        groups: groups.into_iter().map(|(_, group)| group).collect(),
        last_finished,
        generated_at: now,
    }
}

/// Row indicator glyph for a status.
#[must_use]
pub fn indicator(status: SessionStatus, ascii: bool) -> &'static str {
    match (status, ascii) {
        (SessionStatus::Running, false) => "\u{25cf}",
        (SessionStatus::Running, true) => "*",
        (SessionStatus::Waiting | SessionStatus::Pending, false) => "\u{25cb}",
        (SessionStatus::Waiting | SessionStatus::Pending, true) => "o",
        (SessionStatus::Done, false) => "\u{2713}",
        (SessionStatus::Done, true) => "V",
        (SessionStatus::Failed, false) => "\u{2717}",
        (SessionStatus::Failed, true) => "X",
        (SessionStatus::Killed, false) => "\u{2620}",
        (SessionStatus::Killed, true) => "#",
    }
}

/// Render the board as plain text.
#[must_use]
pub fn render_text(view: &BoardView, ascii: bool) -> String {
    let rule = if ascii { "-" } else { "\u{2500}" };
    let clock = view.generated_at.with_timezone(&Local).format("%H:%M:%S");
    let mut lines = vec![
        format!(" SESSION BOARD{:>56}", clock.to_string()),
        format!("   {:<28}{:<22}{}", "DESTINATION", "STATUS", "TIME"),
        format!("  {}", rule.repeat(64)),
    ];

    if view.row_count() == 0 {
        lines.push("   Waiting for sessions...".to_owned());
    }

    for group in &view.groups {
        let label = format!(" {} ({}) ", group.name, group.rows.len());
        let tail = 64_usize.saturating_sub(2 + label.chars().count()).max(1);
        lines.push(format!("  {}{label}{}", rule.repeat(2), rule.repeat(tail)));
        for row in &group.rows {
            let marker = if row.flashing { ">" } else { " " };
            lines.push(format!(
                " {marker}{} {:<27}{:<22}{}",
                indicator(row.status, ascii),
                row.name,
                row.label,
                row.elapsed
            ));
        }
    }

    lines.push(format!("  {}", rule.repeat(64)));
    let arrow = if ascii { ">" } else { "\u{25b6}" };
    lines.push(format!("  {arrow} {}", view.summary()));
    if let Some(last) = &view.last_finished {
        lines.push(format!(
            "  last done: {} {} ago",
            last.name,
            format_elapsed(last.seconds_ago)
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
