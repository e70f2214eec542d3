//! Log persistence worker
//!
//! Drains the hub's persistence channel into the store so that publishing a
//! line never waits on a database write.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::log::LogEvent;
use crate::store::Store;

/// Run the log writer worker. On shutdown, lines already queued are still
/// written before returning.
pub async fn run(
    store: Arc<dyn Store>,
    mut events: mpsc::UnboundedReceiver<LogEvent>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Log writer worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => break,
            event = events.recv() => match event {
                Some(event) => persist(store.as_ref(), event).await,
                None => {
                    info!("Log channel closed, log writer worker exiting...");
                    return;
                }
            },
        }
    }

    let mut flushed = 0usize;
    while let Ok(event) = events.try_recv() {
        persist(store.as_ref(), event).await;
        flushed += 1;
    }
    info!("Log writer worker shutting down ({} queued lines flushed)...", flushed);
}

async fn persist(store: &dyn Store, event: LogEvent) {
    if let Err(e) = store
        .append_log(event.project_id, event.log_type, &event.message)
        .await
    {
        // Lines of a project deleted meanwhile have no row to reference
        warn!(
            "Failed to persist {} line of project {}: {}",
            event.log_type, event.project_id, e
        );
    }
}
