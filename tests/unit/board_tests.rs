use std::time::Duration;

use chrono::{DateTime, Utc};

use session_board::board::{self, format_elapsed, status_label, status_rank};
use session_board::models::session::{NewSession, Session, SessionStatus};

const RETENTION: Duration = Duration::from_secs(30);

fn session(id: &str, cwd: &str, status: SessionStatus, created: DateTime<Utc>) -> Session {
    let mut session = Session::new(
        NewSession {
            id: id.into(),
            name: id.into(),
            shell_pid: None,
            cwd: Some(cwd.into()),
            hostname: None,
        },
        created,
    );
    session.status = status;
    if status.is_terminal() {
        session.exit_code = Some(if status == SessionStatus::Failed { 2 } else { 0 });
    }
    if status == SessionStatus::Running {
        session.running_since = Some(created);
    }
    session
}

#[test]
fn elapsed_formatting() {
    assert_eq!(format_elapsed(0), "0s");
    assert_eq!(format_elapsed(42), "42s");
    assert_eq!(format_elapsed(187), "3m07s");
    assert_eq!(format_elapsed(7500), "2h05m");
    assert_eq!(format_elapsed(-5), "0s");
}

#[test]
fn labels_and_ranks() {
    let now = Utc::now();
    let failed = session("f", "/p", SessionStatus::Failed, now);
    assert_eq!(status_label(&failed), "Failed (2)");
    let done = session("d", "/p", SessionStatus::Done, now);
    assert_eq!(status_label(&done), "Complete");

    assert!(status_rank(SessionStatus::Running) < status_rank(SessionStatus::Waiting));
    assert!(status_rank(SessionStatus::Waiting) < status_rank(SessionStatus::Pending));
    assert!(status_rank(SessionStatus::Pending) < status_rank(SessionStatus::Done));
}

#[test]
fn groups_order_by_most_active_then_name() {
    let now = Utc::now();
    let snapshot = vec![
        session("w", "/src/beta", SessionStatus::Waiting, now),
        session("r", "/src/alpha", SessionStatus::Running, now),
        session("p", "/src/Gamma", SessionStatus::Pending, now),
        session("q", "/src/delta", SessionStatus::Pending, now),
    ];
    let view = board::build(&snapshot, now, RETENTION);

    let names: Vec<&str> = view.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "delta", "Gamma"]);
    assert_eq!(view.running, 1);
    assert_eq!(view.waiting, 1);
    assert_eq!(view.pending, 2);
    assert_eq!(view.summary(), "1 running  1 waiting  2 pending");
}

#[test]
fn rows_within_group_follow_status_order() {
    let now = Utc::now();
    let snapshot = vec![
        session("done", "/x/app", SessionStatus::Done, now),
        session("wait", "/x/app", SessionStatus::Waiting, now),
        session("run", "/x/app", SessionStatus::Running, now),
    ];
    let view = board::build(&snapshot, now, RETENTION);
    let ids: Vec<&str> = view.rows().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, vec!["run", "wait", "done"]);
}

#[test]
fn finished_rows_hide_after_retention() {
    let t0 = Utc::now();
    let snapshot = vec![session("old", "/x/app", SessionStatus::Done, t0)];

    let view = board::build(&snapshot, t0 + chrono::Duration::seconds(29), RETENTION);
    assert_eq!(view.row_count(), 1);
    let last = view.last_finished.expect("last finished");
    assert_eq!(last.name, "old");
    assert_eq!(last.seconds_ago, 29);

    let view = board::build(&snapshot, t0 + chrono::Duration::seconds(30), RETENTION);
    assert_eq!(view.row_count(), 0);
    assert_eq!(view.summary(), "All quiet");
}

#[test]
fn recent_transitions_flash() {
    let t0 = Utc::now();
    let snapshot = vec![session("r", "/x/app", SessionStatus::Running, t0)];
    let view = board::build(&snapshot, t0 + chrono::Duration::seconds(1), RETENTION);
    assert!(view.rows().all(|row| row.flashing));
    let view = board::build(&snapshot, t0 + chrono::Duration::seconds(5), RETENTION);
    assert!(view.rows().all(|row| !row.flashing));
}

#[test]
fn long_names_are_truncated() {
    let now = Utc::now();
    let mut long = session("l", "/x/app", SessionStatus::Running, now);
    long.name = "x".repeat(60);
    let view = board::build(&[long], now, RETENTION);
    let row = view.rows().next().expect("row");
    assert_eq!(row.name.chars().count(), board::NAME_WIDTH);
}

#[test]
fn text_render_lists_groups_and_summary() {
    let now = Utc::now();
    let snapshot = vec![
        session("api", "/src/api", SessionStatus::Running, now),
        session("web", "/src/web", SessionStatus::Failed, now),
    ];
    let view = board::build(&snapshot, now, RETENTION);
    let text = board::render_text(&view, true);

    assert!(text.contains("api (1)"));
    assert!(text.contains("web (1)"));
    assert!(text.contains("Failed (2)"));
    assert!(text.contains("> 1 running"));
    assert!(text.is_ascii());
}

#[test]
fn empty_board_renders_placeholder() {
    let view = board::build(&[], Utc::now(), RETENTION);
    let text = board::render_text(&view, false);
    assert!(text.contains("Waiting for sessions..."));
    assert!(text.contains("All quiet"));
}

#[test]
fn text_render_has_one_line_per_row() {
    let now = Utc::now();
    let snapshot = vec![
        session("a", "/src/api", SessionStatus::Running, now),
        session("b", "/src/api", SessionStatus::Waiting, now),
    ];
    let view = board::build(&snapshot, now, RETENTION);
    let text = board::render_text(&view, true);

    assert!(text.ends_with('\n'));
    // Header, column titles, rule, group bar, two rows, rule, summary.
    assert_eq!(text.lines().count(), 8);
    assert!(text.lines().next().is_some_and(|line| line.starts_with(" SESSION BOARD")));
}
