//! OS process table access.
//!
//! [`ProcessProbe`] is the seam between the resource monitor and the
//! operating system: [`SysinfoProbe`] reads the real process table, tests
//! substitute a scripted table. Signal delivery lives here too.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, System, UpdateKind};
use tracing::{debug, warn};

use crate::{AppError, Result};

/// A process found by name in the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process id.
    pub pid: u32,
    /// Executable name as reported by the OS.
    pub name: String,
    /// Working directory, when readable.
    pub cwd: Option<String>,
}

/// Read access to the OS process table.
///
/// All queries answer from the snapshot taken by the last
/// [`refresh`](Self::refresh); CPU percentages cover the time between the
/// two most recent refreshes, so a process first seen by the latest
/// refresh has no usable reading yet.
pub trait ProcessProbe: Send + 'static {
    /// Take a new process table snapshot.
    fn refresh(&mut self);

    /// Whether `pid` exists and is not a zombie.
    fn is_alive(&self, pid: u32) -> bool;

    /// Whether `pid` was present in the previous snapshot too, so its CPU
    /// usage covers a full interval.
    fn is_sampled(&self, pid: u32) -> bool;

    /// Aggregate CPU percentage of `pid` and all of its descendants.
    ///
    /// Descendants first seen by the latest refresh are left out. `None`
    /// when `pid` cannot be sampled.
    fn tree_cpu(&self, pid: u32) -> Option<f64>;

    /// Parent pid of `pid`.
    fn parent(&self, pid: u32) -> Option<u32>;

    /// Every descendant of `pid`, children before grandchildren.
    fn descendants(&self, pid: u32) -> Vec<u32>;

    /// Live processes whose executable name equals `name`, ignoring case.
    fn find_by_name(&self, name: &str) -> Vec<ProcessInfo>;
}

/// [`ProcessProbe`] backed by the `sysinfo` crate.
pub struct SysinfoProbe {
    system: System,
    // Pids present before the latest refresh.
    previous: HashSet<u32>,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProbe {
    /// Create a probe with an empty snapshot; call `refresh` before use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new(),
            previous: HashSet::new(),
        }
    }

    fn process(&self, pid: u32) -> Option<&Process> {
        self.system
            .process(Pid::from_u32(pid))
            .filter(|process| process.status() != ProcessStatus::Zombie)
    }

    fn children_index(&self) -> HashMap<u32, Vec<u32>> {
        let mut index: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            if let Some(parent) = process.parent() {
                index.entry(parent.as_u32()).or_default().push(pid.as_u32());
            }
        }
        index
    }
}

impl ProcessProbe for SysinfoProbe {
    fn refresh(&mut self) {
        self.previous = self.system.processes().keys().map(|pid| pid.as_u32()).collect();
        self.system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_cpu()
                .with_cwd(UpdateKind::OnlyIfNotSet)
                .with_exe(UpdateKind::OnlyIfNotSet),
        );
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.process(pid).is_some()
    }

    fn is_sampled(&self, pid: u32) -> bool {
        self.previous.contains(&pid) && self.is_alive(pid)
    }

    fn tree_cpu(&self, pid: u32) -> Option<f64> {
        let root = self.process(pid)?;
        let mut total = f64::from(root.cpu_usage());
        for child in self.descendants(pid) {
            if !self.previous.contains(&child) {
                continue;
            }
            if let Some(process) = self.process(child) {
                total += f64::from(process.cpu_usage());
            }
        }
        Some(total)
    }

    fn parent(&self, pid: u32) -> Option<u32> {
        self.process(pid)?.parent().map(Pid::as_u32)
    }

    fn descendants(&self, pid: u32) -> Vec<u32> {
        collect_descendants(pid, &self.children_index())
    }

    fn find_by_name(&self, name: &str) -> Vec<ProcessInfo> {
        let mut found: Vec<ProcessInfo> = self
            .system
            .processes()
            .values()
            .filter(|process| process.status() != ProcessStatus::Zombie)
            .filter(|process| executable_matches(process, name))
            .map(|process| ProcessInfo {
                pid: process.pid().as_u32(),
                name: process.name().to_owned(),
                cwd: process
                    .cwd()
                    .map(|cwd| cwd.to_string_lossy().into_owned()),
            })
            .collect();
        found.sort_by_key(|info| info.pid);
        found
    }
}

fn executable_matches(process: &Process, name: &str) -> bool {
    if process.name().eq_ignore_ascii_case(name) {
        return true;
    }
    process
        .exe()
        .and_then(Path::file_name)
        .is_some_and(|exe| exe.to_string_lossy().eq_ignore_ascii_case(name))
}

/// Breadth-first walk of a parent → children index.
///
/// Guards against cycles, which a racy process table snapshot can contain
/// after pid reuse.
#[must_use]
pub fn collect_descendants(root: u32, children: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    let mut seen = HashSet::from([root]);
    let mut queue = vec![root];
    let mut out = Vec::new();
    let mut cursor = 0;
    while cursor < queue.len() {
        let pid = queue[cursor];
        cursor += 1;
        for &child in children.get(&pid).map_or(&[][..], Vec::as_slice) {
            if seen.insert(child) {
                out.push(child);
                queue.push(child);
            }
        }
    }
    out
}

/// Outcome of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// At least one signal was delivered.
    Signalled,
    /// Nothing was left to signal.
    AlreadyGone,
}

/// Send `SIGTERM` to `pid`, its process group and the given descendants.
///
/// The process group is skipped when it is our own, so a session started
/// from the board's terminal cannot take the board down with it. Missing
/// processes are not an error.
///
/// # Errors
///
/// Returns `AppError::Process` if `pid` is out of range or a signal is
/// refused for a reason other than the process being gone.
#[cfg(unix)]
pub fn terminate_process_tree(pid: u32, descendants: &[u32]) -> Result<Termination> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::{getpgid, getpgrp};

    let target = to_nix_pid(pid)?;
    let mut delivered = false;

    if let Ok(pgid) = getpgid(Some(target)) {
        if pgid != getpgrp() && pgid.as_raw() > 1 {
            match killpg(pgid, Signal::SIGTERM) {
                Ok(()) => delivered = true,
                Err(Errno::ESRCH) => {}
                Err(err) => warn!(pid, pgid = pgid.as_raw(), %err, "failed to signal process group"),
            }
        }
    }

    for &child in descendants {
        let Ok(child_pid) = to_nix_pid(child) else {
            continue;
        };
        match kill(child_pid, Signal::SIGTERM) {
            Ok(()) => delivered = true,
            Err(Errno::ESRCH) => {}
            Err(err) => warn!(pid = child, %err, "failed to signal descendant"),
        }
    }

    match kill(target, Signal::SIGTERM) {
        Ok(()) => delivered = true,
        Err(Errno::ESRCH) => debug!(pid, "process already gone"),
        Err(err) => {
            return Err(AppError::Process(format!(
                "failed to signal pid {pid}: {err}"
            )));
        }
    }

    Ok(if delivered {
        Termination::Signalled
    } else {
        Termination::AlreadyGone
    })
}

/// Signal delivery is only implemented for Unix targets.
///
/// # Errors
///
/// Always returns `AppError::Process`.
#[cfg(not(unix))]
pub fn terminate_process_tree(pid: u32, _descendants: &[u32]) -> Result<Termination> {
    Err(AppError::Process(format!(
        "cannot signal pid {pid}: unsupported platform"
    )))
}

#[cfg(unix)]
fn to_nix_pid(pid: u32) -> Result<nix::unistd::Pid> {
    i32::try_from(pid)
        .map(nix::unistd::Pid::from_raw)
        .map_err(|_| AppError::Process(format!("pid {pid} out of range")))
}
