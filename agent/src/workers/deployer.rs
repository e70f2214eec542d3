//! Deployment worker
//!
//! The single consumer of the supervisor's deployment queue, so at most one
//! deployment executes at any time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::deploy::supervisor::{DeployQueue, Supervisor};

/// Run the deployer worker
pub async fn run(
    supervisor: Arc<Supervisor>,
    mut queue: DeployQueue,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deployer worker starting...");

    loop {
        let request = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                return;
            }
            request = queue.recv() => match request {
                Some(request) => request,
                None => {
                    info!("Deployment queue closed, deployer worker exiting...");
                    return;
                }
            },
        };

        let deployment_id = request.deployment_id;
        debug!(
            "Dequeued deployment #{} of project {}",
            deployment_id, request.project_id
        );

        // Dropping an in-flight deployment kills its build; the row is
        // marked failed by the next startup recovery
        tokio::select! {
            _ = &mut shutdown_signal => {
                warn!("Deployer worker shutting down, abandoning deployment #{}...", deployment_id);
                return;
            }
            _ = supervisor.execute_deployment(request) => {}
        }
    }
}
