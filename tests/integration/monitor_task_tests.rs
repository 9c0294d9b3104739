//! Tests for the spawned resource monitor loop against real processes.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use session_board::models::session::{NewSession, SessionStatus};
use session_board::orchestrator::lifecycle::LifecycleEvent;
use session_board::orchestrator::monitor::{spawn_resource_monitor, MonitorConfig, ResourceMonitor};
use session_board::orchestrator::process::{ProcessInfo, ProcessProbe, SysinfoProbe};
use session_board::store::SessionStore;

use super::test_helpers::wait_until;

fn config() -> MonitorConfig {
    MonitorConfig {
        cpu_threshold: 5.0,
        tracked_cli: "session-board-test-no-such-cli".into(),
        auto_discover: true,
        rediscover: false,
        hostname: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn exited_process_is_marked_done() {
    let mut child = Command::new("sleep").arg("0.3").spawn().expect("spawn sleep");
    let pid = child.id();

    let store = Arc::new(SessionStore::new());
    store.register(NewSession {
        id: "short".into(),
        name: "short".into(),
        shell_pid: Some(pid),
        cwd: None,
        hostname: None,
    });

    let ct = CancellationToken::new();
    let handle = spawn_resource_monitor(
        ResourceMonitor::new(Arc::clone(&store), SysinfoProbe::new(), config()),
        Duration::from_millis(100),
        ct.clone(),
    );

    // First passes see the process idle.
    let sampled = wait_until(Duration::from_secs(2), || {
        store
            .get("short")
            .is_some_and(|s| s.status != SessionStatus::Pending)
    })
    .await;
    assert!(sampled, "monitor should sample the live process");

    child.wait().expect("reap sleep");
    let finished = wait_until(Duration::from_secs(3), || {
        store
            .get("short")
            .is_some_and(|s| s.status == SessionStatus::Done)
    })
    .await;
    assert!(finished, "exited process should finish its session");
    assert_eq!(store.get("short").expect("session").exit_code, Some(0));

    ct.cancel();
    handle.await.expect("monitor join");
}

#[tokio::test(flavor = "multi_thread")]
async fn monitor_stops_on_cancel() {
    let store = Arc::new(SessionStore::new());
    let ct = CancellationToken::new();
    let handle = spawn_resource_monitor(
        ResourceMonitor::new(store, SysinfoProbe::new(), config()),
        Duration::from_millis(50),
        ct.clone(),
    );
    tokio::time::sleep(Duration::from_millis(120)).await;
    ct.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("monitor should stop")
        .expect("monitor join");
}

#[cfg(unix)]
#[test]
fn busy_child_stays_running_across_ticks() {
    let store = Arc::new(SessionStore::new());
    let mut monitor = ResourceMonitor::new(Arc::clone(&store), SysinfoProbe::new(), config());
    // Baseline snapshot taken before the child exists.
    monitor.tick();

    let mut child = Command::new("sh")
        .args(["-c", "while :; do :; done"])
        .spawn()
        .expect("spawn busy loop");
    store.register(NewSession {
        id: "busy".into(),
        name: "busy".into(),
        shell_pid: Some(child.id()),
        cwd: None,
        hostname: None,
    });
    store
        .update_status("busy", LifecycleEvent::MarkRunning)
        .expect("mark running");

    let mut statuses = Vec::new();
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(500));
        monitor.tick();
        let session = store.get("busy").expect("session");
        statuses.push((session.status, session.cpu_pct));
    }
    let _ = child.kill();
    let _ = child.wait();

    for (status, cpu) in &statuses {
        assert_eq!(*status, SessionStatus::Running, "samples: {statuses:?}");
        assert!(cpu.map_or(true, |pct| pct >= 5.0), "samples: {statuses:?}");
    }
    assert!(
        statuses.iter().any(|(_, cpu)| cpu.is_some()),
        "busy child was never sampled: {statuses:?}"
    );
}

/// Probe whose snapshot always fails.
struct BrokenProbe;

impl ProcessProbe for BrokenProbe {
    fn refresh(&mut self) {
        panic!("process table unavailable");
    }

    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    fn is_sampled(&self, _pid: u32) -> bool {
        false
    }

    fn tree_cpu(&self, _pid: u32) -> Option<f64> {
        None
    }

    fn parent(&self, _pid: u32) -> Option<u32> {
        None
    }

    fn descendants(&self, _pid: u32) -> Vec<u32> {
        Vec::new()
    }

    fn find_by_name(&self, _name: &str) -> Vec<ProcessInfo> {
        Vec::new()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_pass_cancels_shutdown_token() {
    let store = Arc::new(SessionStore::new());
    let ct = CancellationToken::new();
    let handle = spawn_resource_monitor(
        ResourceMonitor::new(store, BrokenProbe, config()),
        Duration::from_millis(20),
        ct.clone(),
    );

    tokio::time::timeout(Duration::from_secs(2), ct.cancelled())
        .await
        .expect("monitor failure should cancel the token");
    handle.await.expect("monitor join");
}
