//! OS process-tree helpers used by the shutdown sequence.
//!
//! Descendants come from one read of the process table, walked depth-first
//! from the root through each process's parent link. Kills go deepest-first so children are signalled before their parent
//! can exit and hand them to init mid-traversal. Every kill is preceded by
//! a liveness check, which makes the helpers idempotent.

use std::collections::HashMap;
use std::time::Duration;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::tmux::Multiplexer;

/// Interval between liveness probes in [`wait_for_exit`].
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// OS process identifier.
pub type Pid = i32;

/// Root pane PID of `session` followed by its descendants, depth-first.
///
/// Empty when the root cannot be resolved (session or server gone).
pub async fn snapshot(mux: &dyn Multiplexer, socket: &str, session: &str) -> Vec<Pid> {
    let root = match mux.pane_pid(socket, session).await {
        Ok(Some(pid)) => pid,
        Ok(None) => return Vec::new(),
        Err(err) => {
            debug!(socket, session, %err, "pane pid unavailable for snapshot");
            return Vec::new();
        }
    };
    let mut pids = vec![root];
    pids.extend(descendants(root).await);
    pids
}

/// Descendants of `pid` in depth-first pre-order (parents before children).
pub async fn descendants(pid: Pid) -> Vec<Pid> {
    if pid <= 0 {
        return Vec::new();
    }
    ProcessTable::read().await.descendants(pid)
}

/// Direct children of `pid`, lowest PID first.
pub async fn children(pid: Pid) -> Vec<Pid> {
    if pid <= 0 {
        return Vec::new();
    }
    ProcessTable::read().await.children(pid).to_vec()
}

/// Parent to children index built from one process-table snapshot.
#[derive(Debug, Default)]
struct ProcessTable {
    children: HashMap<Pid, Vec<Pid>>,
}

impl ProcessTable {
    async fn read() -> Self {
        match tokio::task::spawn_blocking(Self::read_blocking).await {
            Ok(table) => table,
            Err(err) => {
                warn!(%err, "process table read failed");
                Self::default()
            }
        }
    }

    fn read_blocking() -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in system.processes() {
            // Threads show up as processes on Linux.
            if process.thread_kind().is_some() {
                continue;
            }
            let Some(parent) = process.parent() else {
                continue;
            };
            let (Ok(child), Ok(parent)) = (
                Pid::try_from(pid.as_u32()),
                Pid::try_from(parent.as_u32()),
            ) else {
                continue;
            };
            children.entry(parent).or_default().push(child);
        }
        for kids in children.values_mut() {
            kids.sort_unstable();
        }
        Self { children }
    }

    fn children(&self, pid: Pid) -> &[Pid] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or_default()
    }

    fn descendants(&self, pid: Pid) -> Vec<Pid> {
        let mut out = Vec::new();
        let mut stack: Vec<Pid> = self.children(pid).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            // A reused PID cannot loop the walk back onto itself.
            if next == pid || out.contains(&next) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }
}

/// Kill `pid` and all its descendants, deepest first.
///
/// Returns the PIDs actually signalled, in kill order.
pub async fn kill_tree(pid: Pid) -> Vec<Pid> {
    if pid <= 0 {
        return Vec::new();
    }
    let mut order = descendants(pid).await;
    order.insert(0, pid);

    // Reverse pre-order: every child precedes its parent.
    let mut killed = Vec::with_capacity(order.len());
    for target in order.into_iter().rev() {
        if force_kill(target) {
            killed.push(target);
        }
    }
    debug!(pid, killed = ?killed, "process tree killed");
    killed
}

/// Poll until `pid` exits or `timeout` elapses.
///
/// Returns `true` if the process is gone (including `pid <= 0`).
pub async fn wait_for_exit(pid: Pid, timeout: Duration) -> bool {
    if pid <= 0 {
        return true;
    }
    let deadline = Instant::now() + timeout;
    loop {
        if !is_alive(pid) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Force-kill every PID in `pids` that is still alive.
///
/// Returns the PIDs that were signalled.
pub fn ensure_killed(pids: &[Pid]) -> Vec<Pid> {
    let killed: Vec<Pid> = pids.iter().copied().filter(|pid| force_kill(*pid)).collect();
    if !killed.is_empty() {
        debug!(killed = ?killed, "force-killed surviving processes");
    }
    killed
}

/// Whether `pid` refers to a live (non-zombie) process.
#[must_use]
pub fn is_alive(pid: Pid) -> bool {
    pid > 0 && sys::signal_exists(pid) && !sys::is_zombie(pid)
}

/// Send SIGKILL to `pid` if it is alive. Returns whether a signal was sent.
fn force_kill(pid: Pid) -> bool {
    if !is_alive(pid) {
        return false;
    }
    match sys::kill(pid) {
        Ok(()) => true,
        Err(err) => {
            debug!(pid, %err, "kill failed");
            false
        }
    }
}

#[cfg(unix)]
mod sys {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;

    use super::Pid;

    pub(super) fn signal_exists(pid: Pid) -> bool {
        // EPERM still means the process exists.
        match signal::kill(NixPid::from_raw(pid), None) {
            Ok(()) => true,
            Err(errno) => errno == nix::errno::Errno::EPERM,
        }
    }

    pub(super) fn kill(pid: Pid) -> Result<(), nix::errno::Errno> {
        signal::kill(NixPid::from_raw(pid), Signal::SIGKILL)
    }

    #[cfg(target_os = "linux")]
    pub(super) fn is_zombie(pid: Pid) -> bool {
        // Field 3 of /proc/<pid>/stat, after the parenthesised command name.
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let rest = stat.rsplit_once(')')?.1;
                rest.split_whitespace().next().map(|state| state == "Z")
            })
            .unwrap_or(false)
    }

    #[cfg(not(target_os = "linux"))]
    pub(super) fn is_zombie(_pid: Pid) -> bool {
        false
    }
}

#[cfg(not(unix))]
mod sys {
    use super::Pid;

    pub(super) fn signal_exists(_pid: Pid) -> bool {
        false
    }

    pub(super) fn kill(_pid: Pid) -> Result<(), std::io::Error> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process signals are unix-only",
        ))
    }

    pub(super) fn is_zombie(_pid: Pid) -> bool {
        false
    }
}
