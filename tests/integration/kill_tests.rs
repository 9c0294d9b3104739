//! Operator kill against real child processes.

use std::sync::Arc;
use std::time::Duration;

use session_board::models::session::{NewSession, SessionStatus};
use session_board::orchestrator::lifecycle::KILL_EXIT_CODE;
use session_board::orchestrator::session_manager::kill_session;
use session_board::store::SessionStore;
use session_board::AppError;

use super::test_helpers::wait_until;

fn register(store: &SessionStore, id: &str, pid: Option<u32>) {
    store.register(NewSession {
        id: id.into(),
        name: id.into(),
        shell_pid: pid,
        cwd: None,
        hostname: None,
    });
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn kill_terminates_process_tree() {
    use std::os::unix::process::CommandExt;

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .process_group(0)
        .spawn()
        .expect("spawn sleep");

    let store = Arc::new(SessionStore::new());
    register(&store, "victim", Some(child.id()));

    let session = kill_session(&store, "victim").expect("kill");
    assert_eq!(session.status, SessionStatus::Killed);
    assert_eq!(session.exit_code, Some(KILL_EXIT_CODE));

    let exited = wait_until(Duration::from_secs(5), || {
        matches!(child.try_wait(), Ok(Some(_)))
    })
    .await;
    if !exited {
        let _ = child.kill();
    }
    assert!(exited, "sleep should exit after SIGTERM");
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_of_missing_process_still_marks_killed() {
    let store = Arc::new(SessionStore::new());
    // Far above any real pid_max.
    register(&store, "ghost", Some(2_000_000_000));

    let session = kill_session(&store, "ghost").expect("kill");
    assert_eq!(session.status, SessionStatus::Killed);
    assert_eq!(store.get("ghost").expect("stored").status, SessionStatus::Killed);
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_is_ignored_for_finished_sessions() {
    let store = Arc::new(SessionStore::new());
    register(&store, "done", None);
    store
        .apply_patch(
            "done",
            &session_board::models::session::StatusPatch {
                status: None,
                exit_code: Some(0),
            },
        )
        .expect("finish");

    let session = kill_session(&store, "done").expect("kill");
    assert_eq!(session.status, SessionStatus::Done);
    assert_eq!(session.exit_code, Some(0));
}

#[tokio::test]
async fn kill_of_unknown_session_is_not_found() {
    let store = Arc::new(SessionStore::new());
    assert!(matches!(
        kill_session(&store, "nobody"),
        Err(AppError::NotFound(_))
    ));
}
