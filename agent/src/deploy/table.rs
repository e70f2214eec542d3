//! Running-process table
//!
//! The only authority on whether a project has a live OS process. Entries are
//! reached through accessors; the map itself never leaves this module.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::models::port::PortPair;
use crate::models::project::ProjectId;

/// How a supervised process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Set when waiting on the process itself failed
    pub error: Option<String>,
}

impl ExitInfo {
    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit code: {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Handles needed to terminate a process and observe its exit.
///
/// The child itself is owned by its exit watcher task; `force_kill` asks that
/// task to kill it.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    pub pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    kill_tx: mpsc::Sender<()>,
}

impl ProcessControl {
    pub fn new(
        pid: Option<u32>,
        exit_rx: watch::Receiver<Option<ExitInfo>>,
        kill_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            pid,
            exit_rx,
            kill_tx,
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Waits up to `timeout` for the process to exit
    pub async fn wait_exit(&self, timeout: Duration) -> bool {
        let mut rx = self.exit_rx.clone();
        let exited = match tokio::time::timeout(timeout, rx.wait_for(|exit| exit.is_some())).await {
            Ok(Ok(_)) => true,
            // Watcher dropped the sender, which only happens after exit
            Ok(Err(_)) => true,
            Err(_) => false,
        };
        exited
    }

    /// Asks the exit watcher to kill the child directly
    pub fn force_kill(&self) {
        let _ = self.kill_tx.try_send(());
    }
}

/// One live process
#[derive(Debug, Clone)]
pub struct RunningProcess {
    /// Distinguishes successive processes of the same project
    pub instance: u64,
    pub started_at: DateTime<Utc>,
    pub ports: PortPair,
    pub control: ProcessControl,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.control.pid
    }
}

/// Read-only view of a table entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningInfo {
    pub project_id: ProjectId,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub ports: PortPair,
}

#[derive(Default)]
pub struct ProcessTable {
    entries: Mutex<HashMap<ProjectId, RunningProcess>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<ProjectId, RunningProcess>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut entries)
    }

    /// Registers a process. Returns the entry it displaced, if any.
    pub fn insert(&self, project_id: ProjectId, process: RunningProcess) -> Option<RunningProcess> {
        self.with_entries(|entries| entries.insert(project_id, process))
    }

    pub fn contains(&self, project_id: ProjectId) -> bool {
        self.with_entries(|entries| entries.contains_key(&project_id))
    }

    pub fn remove(&self, project_id: ProjectId) -> Option<RunningProcess> {
        self.with_entries(|entries| entries.remove(&project_id))
    }

    /// Removes the entry only if it still belongs to `instance`
    pub fn remove_if_instance(&self, project_id: ProjectId, instance: u64) -> Option<RunningProcess> {
        self.with_entries(|entries| match entries.get(&project_id) {
            Some(process) if process.instance == instance => entries.remove(&project_id),
            _ => None,
        })
    }

    pub fn drain(&self) -> Vec<(ProjectId, RunningProcess)> {
        self.with_entries(|entries| entries.drain().collect())
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted by project id
    pub fn snapshot(&self) -> Vec<RunningInfo> {
        let mut infos: Vec<RunningInfo> = self.with_entries(|entries| {
            entries
                .iter()
                .map(|(project_id, process)| RunningInfo {
                    project_id: *project_id,
                    pid: process.pid(),
                    started_at: process.started_at,
                    ports: process.ports,
                })
                .collect()
        });
        infos.sort_by_key(|info| info.project_id);
        infos
    }
}
