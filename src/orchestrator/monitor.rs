//! Resource monitor: liveness, CPU sampling and auto-discovery.
//!
//! Every pass snapshots the live sessions from the store, releases the
//! lock, queries the process table, then writes one lifecycle event per
//! session back. A vanished or unsampleable process finishes its session
//! as `DONE`; otherwise the latest CPU sample decides `RUNNING` vs
//! `WAITING`. A process the probe saw for the first time gets no event
//! until the next pass gives it a full interval of CPU time.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::lifecycle::LifecycleEvent;
use super::process::{ProcessInfo, ProcessProbe};
use crate::models::session::Session;
use crate::store::SessionStore;
use crate::GlobalConfig;

/// Monitor tuning, usually derived from [`GlobalConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// CPU percentage at or above which a session is running.
    pub cpu_threshold: f64,
    /// Executable name matched during auto-discovery.
    pub tracked_cli: String,
    /// Run discovery once, after the first pass.
    pub auto_discover: bool,
    /// Run discovery on every pass.
    pub rediscover: bool,
    /// Host name recorded on discovered sessions.
    pub hostname: Option<String>,
}

impl MonitorConfig {
    /// Build monitor settings from the global configuration.
    #[must_use]
    pub fn from_global(config: &GlobalConfig) -> Self {
        Self {
            cpu_threshold: config.cpu_threshold_percent,
            tracked_cli: config.tracked_cli.clone(),
            auto_discover: config.auto_discover,
            rediscover: config.rediscover,
            hostname: local_hostname(),
        }
    }
}

/// Counters for one monitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions whose CPU was sampled.
    pub sampled: usize,
    /// Sessions whose process was gone or unsampleable.
    pub vanished: usize,
    /// Live sessions skipped because their process has no CPU baseline yet.
    pub warming_up: usize,
    /// Status changes written to the store.
    pub transitions: usize,
}

/// Periodic sampler for every live session in the store.
pub struct ResourceMonitor<P: ProcessProbe> {
    store: Arc<SessionStore>,
    probe: P,
    config: MonitorConfig,
}

impl<P: ProcessProbe> ResourceMonitor<P> {
    /// Create a monitor over `store` using `probe` for process queries.
    #[must_use]
    pub fn new(store: Arc<SessionStore>, probe: P, config: MonitorConfig) -> Self {
        Self {
            store,
            probe,
            config,
        }
    }

    /// Access the underlying probe.
    #[must_use]
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Mutable access to the underlying probe.
    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Run one sampling pass.
    pub fn tick(&mut self) -> TickReport {
        let targets = self.store.monitor_targets();
        let mut report = TickReport::default();

        // Refresh even with no targets so the next CPU delta spans one interval.
        self.probe.refresh();

        for target in targets {
            let event = if !self.probe.is_alive(target.pid) {
                report.vanished += 1;
                LifecycleEvent::ProcessVanished
            } else if !self.probe.is_sampled(target.pid) {
                // First seen by this refresh; its reading would be a false 0%.
                report.warming_up += 1;
                continue;
            } else if let Some(pct) = self.probe.tree_cpu(target.pid) {
                report.sampled += 1;
                LifecycleEvent::CpuSample {
                    pct,
                    threshold: self.config.cpu_threshold,
                }
            } else {
                warn!(session_id = %target.id, pid = target.pid, "cannot sample process, treating as exited");
                report.vanished += 1;
                LifecycleEvent::ProcessVanished
            };

            match self.store.update_status(&target.id, event) {
                Ok(applied) if applied.transition.is_change() => report.transitions += 1,
                Ok(_) => {}
                // Purged or removed between snapshot and write.
                Err(err) => debug!(session_id = %target.id, %err, "monitor target disappeared"),
            }
        }

        report
    }

    /// Register live `tracked_cli` processes the store does not know yet.
    ///
    /// Works on the snapshot taken by the last [`tick`](Self::tick), so
    /// discovered sessions get their first CPU sample one full interval
    /// later. A process is skipped when it, or any of its ancestors, is already
    /// tracked, and when another match is its ancestor (nested invocations
    /// and worker threads belong to the outer session). Returns the number
    /// of sessions added.
    pub fn discover(&mut self) -> usize {
        let matches = self.probe.find_by_name(&self.config.tracked_cli);
        if matches.is_empty() {
            return 0;
        }

        let tracked = self.store.tracked_pids();
        let matched: HashSet<u32> = matches.iter().map(|info| info.pid).collect();
        let now = Utc::now();
        let mut added = 0;

        for info in matches {
            let ancestors = self.ancestors(info.pid);
            if tracked.contains(&info.pid)
                || ancestors.iter().any(|pid| tracked.contains(pid) || matched.contains(pid))
            {
                continue;
            }
            let session = discovered_session(info, self.config.hostname.clone(), now);
            if self.store.insert_discovered(session) {
                added += 1;
            }
        }

        added
    }

    fn ancestors(&self, pid: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut current = pid;
        while let Some(parent) = self.probe.parent(current) {
            if parent == 0 || parent == current || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }
}

fn discovered_session(
    info: ProcessInfo,
    hostname: Option<String>,
    now: chrono::DateTime<Utc>,
) -> Session {
    let name = info
        .cwd
        .as_deref()
        .and_then(|cwd| Path::new(cwd).file_name())
        .map_or_else(
            || info.name.clone(),
            |dir| dir.to_string_lossy().into_owned(),
        );
    Session::discovered(info.pid, name, info.cwd, hostname, now)
}

/// Spawn the resource monitor loop.
///
/// Discovery (when enabled) runs once, right after the first pass; passes
/// repeat every `interval` until `cancel` fires. A panicking pass cancels
/// `cancel` so the whole server stops rather than run unmonitored. Process-table work runs
/// on the blocking pool so the API stays responsive.
#[must_use]
pub fn spawn_resource_monitor<P: ProcessProbe>(
    monitor: ResourceMonitor<P>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut monitor = Some(monitor);
            let mut first_pass = true;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("resource monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let Some(mut current) = monitor.take() else {
                    break;
                };
                let discover = current.config.rediscover || (first_pass && current.config.auto_discover);
                first_pass = false;

                let pass = tokio::task::spawn_blocking(move || {
                    let report = current.tick();
                    let discovered = if discover { current.discover() } else { 0 };
                    (current, discovered, report)
                })
                .await;

                match pass {
                    Ok((current, discovered, report)) => {
                        if discovered > 0 {
                            info!(discovered, "auto-discovered untracked sessions");
                        }
                        debug!(?report, "monitor pass complete");
                        monitor = Some(current);
                    }
                    Err(err) => {
                        error!(%err, "monitor pass panicked, shutting down");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
        .instrument(info_span!("resource_monitor")),
    )
}

/// Best-effort local host name for discovered sessions.
#[must_use]
pub fn local_hostname() -> Option<String> {
    sysinfo::System::host_name().filter(|name| !name.trim().is_empty())
}
