//! Host platform detection and process termination strategies
//!
//! The host is detected once at startup. It decides the shell used for
//! commands, the python/pip executables, and which of the three termination
//! strategies the supervisor uses:
//!
//! - **Tree kill** (Windows): `taskkill /t /f` on the process tree, falling back
//!   to killing the child directly
//! - **Signal group, then force** (Linux): SIGTERM to the process group, SIGKILL
//!   after the grace window
//! - **Descendants, then force** (macOS and other unix): SIGTERM to every
//!   discovered descendant and the root, SIGKILL after the grace window
//!
//! All of them are best effort: terminate, escalate if still alive.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::table::ProcessControl;

const LINUX_GRACE: Duration = Duration::from_secs(3);
const MACOS_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for exit after a forced kill before giving up
const FORCE_WAIT: Duration = Duration::from_secs(2);

/// How long to wait for `taskkill` to take effect
const TREE_KILL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Unix
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
            Platform::Unix => "Unix-like",
        }
    }

    /// Shell program and the flag that makes it run one command line
    pub fn shell(&self) -> (&'static str, &'static str) {
        match self {
            Platform::Windows => ("cmd", "/C"),
            _ => ("sh", "-c"),
        }
    }

    pub fn python(&self) -> &'static str {
        match self {
            Platform::Windows => "python",
            _ => "python3",
        }
    }

    pub fn pip(&self) -> &'static str {
        match self {
            Platform::Windows => "pip",
            _ => "pip3",
        }
    }

    pub fn is_windows(&self) -> bool {
        *self == Platform::Windows
    }

    pub fn termination_strategy(&self) -> TerminationStrategy {
        match self {
            Platform::Windows => TerminationStrategy::TreeKill,
            Platform::Linux => TerminationStrategy::SignalGroupThenForce { grace: LINUX_GRACE },
            Platform::MacOs | Platform::Unix => {
                TerminationStrategy::DescendantsThenForce { grace: MACOS_GRACE }
            }
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a termination attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The process was already gone
    AlreadyExited,
    /// Exited within the grace window
    Graceful,
    /// Exited after a forced kill
    Forced,
    /// Still not observed as exited
    Unconfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationStrategy {
    TreeKill,
    SignalGroupThenForce { grace: Duration },
    DescendantsThenForce { grace: Duration },
}

impl TerminationStrategy {
    pub async fn terminate(&self, target: &ProcessControl) -> TerminationOutcome {
        if target.has_exited() {
            return TerminationOutcome::AlreadyExited;
        }

        let Some(pid) = target.pid else {
            // No pid to signal; only the watcher can still reach the child
            target.force_kill();
            return wait_forced(target, FORCE_WAIT).await;
        };

        let outcome = match *self {
            TerminationStrategy::TreeKill => tree_kill(pid, target).await,
            TerminationStrategy::SignalGroupThenForce { grace } => {
                signal_group_then_force(pid, grace, target).await
            }
            TerminationStrategy::DescendantsThenForce { grace } => {
                descendants_then_force(pid, grace, target).await
            }
        };
        info!("Termination of pid {} finished: {:?}", pid, outcome);
        outcome
    }
}

async fn wait_forced(target: &ProcessControl, timeout: Duration) -> TerminationOutcome {
    if target.wait_exit(timeout).await {
        TerminationOutcome::Forced
    } else {
        TerminationOutcome::Unconfirmed
    }
}

async fn tree_kill(pid: u32, target: &ProcessControl) -> TerminationOutcome {
    debug!("Running taskkill on process tree {}", pid);
    let result = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/t", "/f"])
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            warn!(
                "taskkill failed for {}: {}",
                pid,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            target.force_kill();
        }
        Err(e) => {
            warn!("Failed to run taskkill for {}: {}", pid, e);
            target.force_kill();
        }
    }

    wait_forced(target, TREE_KILL_WAIT).await
}

async fn signal_group_then_force(
    pid: u32,
    grace: Duration,
    target: &ProcessControl,
) -> TerminationOutcome {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid as NixPid;

        // Children are spawned as group leaders, so the pgid equals the pid
        let group = NixPid::from_raw(pid as i32);

        debug!("Sending SIGTERM to process group {}", pid);
        match killpg(group, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                return if target.wait_exit(FORCE_WAIT).await {
                    TerminationOutcome::AlreadyExited
                } else {
                    TerminationOutcome::Unconfirmed
                };
            }
            Err(e) => {
                warn!("Failed to signal process group {}: {}", pid, e);
                let _ = kill(group, Signal::SIGTERM);
            }
        }

        let graceful = target.wait_exit(grace).await;

        // Reap anything left in the group, even after a graceful root exit
        if killpg(group, Signal::SIGKILL).is_ok() && !graceful {
            warn!("Process group {} outlived {:?}, killed", pid, grace);
        }

        if graceful {
            return TerminationOutcome::Graceful;
        }
        target.force_kill();
        wait_forced(target, FORCE_WAIT).await
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, grace);
        target.force_kill();
        wait_forced(target, FORCE_WAIT).await
    }
}

async fn descendants_then_force(
    pid: u32,
    grace: Duration,
    target: &ProcessControl,
) -> TerminationOutcome {
    // Collected up front: once the root dies its children are reparented
    let descendants = tokio::task::spawn_blocking(move || collect_descendants(pid))
        .await
        .unwrap_or_default();
    debug!("Process {} has {} descendants", pid, descendants.len());

    signal_pids(&descendants, sysinfo::Signal::Term).await;
    terminate_root(pid, target);

    let graceful = target.wait_exit(grace).await;
    signal_pids(&descendants, sysinfo::Signal::Kill).await;

    if graceful {
        return TerminationOutcome::Graceful;
    }

    warn!("Process {} outlived {:?}, forcing", pid, grace);
    target.force_kill();
    wait_forced(target, FORCE_WAIT).await
}

fn terminate_root(pid: u32, target: &ProcessControl) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid as NixPid;

        if let Err(e) = kill(NixPid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!("SIGTERM to {} failed: {}", pid, e);
            target.force_kill();
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        target.force_kill();
    }
}

/// Every transitive child of `root` currently known to the OS
pub fn collect_descendants(root: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut frontier = vec![Pid::from_u32(root)];

    while let Some(parent) = frontier.pop() {
        for (child_pid, process) in system.processes() {
            if process.parent() == Some(parent) && seen.insert(*child_pid) {
                found.push(child_pid.as_u32());
                frontier.push(*child_pid);
            }
        }
    }
    found
}

async fn signal_pids(pids: &[u32], signal: sysinfo::Signal) {
    if pids.is_empty() {
        return;
    }
    let pids = pids.to_vec();
    let _ = tokio::task::spawn_blocking(move || {
        let mut system = System::new();
        let targets: Vec<Pid> = pids.iter().map(|p| Pid::from_u32(*p)).collect();
        system.refresh_processes(ProcessesToUpdate::Some(&targets), true);
        for pid in targets {
            if let Some(process) = system.process(pid) {
                process.kill_with(signal);
            }
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_per_platform() {
        assert_eq!(
            Platform::Windows.termination_strategy(),
            TerminationStrategy::TreeKill
        );
        assert_eq!(
            Platform::Linux.termination_strategy(),
            TerminationStrategy::SignalGroupThenForce { grace: LINUX_GRACE }
        );
        assert_eq!(
            Platform::MacOs.termination_strategy(),
            TerminationStrategy::DescendantsThenForce { grace: MACOS_GRACE }
        );
    }

    #[test]
    fn test_python_executables() {
        assert_eq!(Platform::Windows.python(), "python");
        assert_eq!(Platform::Linux.pip(), "pip3");
        assert_eq!(Platform::Linux.shell(), ("sh", "-c"));
    }

    #[test]
    fn test_no_descendants_for_unknown_pid() {
        assert!(collect_descendants(u32::MAX - 1).is_empty());
    }
}
