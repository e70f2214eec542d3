//! Per-project log fan-out
//!
//! Every project gets its own broadcast channel. Lagging subscribers lose the
//! oldest lines instead of stalling the publisher, so output draining never
//! waits on a listener. Each published line is also forwarded to the
//! persistence channel drained by the log writer worker.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::models::log::{LogEvent, LogType};
use crate::models::project::ProjectId;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct LogHub {
    channels: Mutex<HashMap<ProjectId, broadcast::Sender<LogEvent>>>,
    capacity: usize,
    persist_tx: mpsc::UnboundedSender<LogEvent>,
}

impl LogHub {
    /// Creates the hub together with the receiving end of its persistence channel
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<LogEvent>) {
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let hub = Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            persist_tx,
        };
        (hub, persist_rx)
    }

    fn sender(&self, project_id: ProjectId) -> broadcast::Sender<LogEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(project_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribes to the log stream of one project
    pub fn subscribe(&self, project_id: ProjectId) -> broadcast::Receiver<LogEvent> {
        self.sender(project_id).subscribe()
    }

    pub fn subscriber_count(&self, project_id: ProjectId) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(&project_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Publishes one line. Never blocks.
    pub fn publish(&self, project_id: ProjectId, log_type: LogType, message: impl Into<String>) {
        let event = LogEvent {
            project_id,
            log_type,
            message: message.into(),
            timestamp: Utc::now(),
        };

        if self.persist_tx.send(event.clone()).is_err() {
            trace!("Log writer gone, line for project {} not persisted", project_id);
        }

        // No subscribers is not an error
        let _ = self.sender(project_id).send(event);
    }

    /// Drops the channel of a deleted project. Current subscribers see the
    /// stream close.
    pub fn remove(&self, project_id: ProjectId) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.remove(&project_id);
    }
}
