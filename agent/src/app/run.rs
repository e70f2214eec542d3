//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::{AppState, WorkerChannels};
use crate::deploy::supervisor::{DeployQueue, Supervisor};
use crate::errors::BerthError;
use crate::models::deployment::DeployOptions;
use crate::models::log::LogEvent;
use crate::store::Store;
use crate::workers::{deployer, log_writer, poller};

/// Run the berth daemon
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BerthError> {
    info!("Initializing berth...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = match init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start berth: {}", e);
            shutdown_manager.shutdown().await?;
            return Err(e);
        }
    };

    if options.sync_only {
        info!("Sync-only run complete, exiting...");
    } else {
        request_deploys(&app_state, &options.deploy_on_start).await;

        shutdown_signal.await;
        info!("Shutdown signal received, shutting down...");
    }

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, BerthError> {
    let (app_state, channels) = AppState::init(options).await?;
    let app_state = Arc::new(app_state);
    let WorkerChannels {
        deploy_queue,
        log_events,
    } = channels;

    init_log_writer_worker(app_state.store.clone(), log_events, shutdown_manager)?;

    // Registers projects before recovery looks for running ones
    match app_state.syncer.trigger_sync().await {
        Ok(Some(report)) => info!("Initial sync: {}", report),
        Ok(None) => {}
        Err(e) => error!("Initial sync failed: {}", e),
    }

    if options.sync_only {
        return Ok(app_state);
    }

    shutdown_manager.with_supervisor(app_state.supervisor.clone())?;
    match app_state.supervisor.recover().await {
        Ok(started) => info!("Startup recovery restarted {} projects", started),
        Err(e) => error!("Startup recovery failed: {}", e),
    }

    init_deployer_worker(
        app_state.supervisor.clone(),
        deploy_queue,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if options.enable_poller {
        init_poller_worker(
            options.poller.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(app_state)
}

fn init_log_writer_worker(
    store: Arc<dyn Store>,
    log_events: tokio::sync::mpsc::UnboundedReceiver<LogEvent>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), BerthError> {
    info!("Initializing log writer worker...");

    // Stopped last, on its own signal, so exit lines of terminated
    // processes are still persisted
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let log_writer_handle = tokio::spawn(async move {
        log_writer::run(
            store,
            log_events,
            Box::pin(async move {
                let _ = stop_rx.await;
            }),
        )
        .await;
    });

    shutdown_manager.with_log_writer_handle(log_writer_handle, stop_tx)
}

fn init_deployer_worker(
    supervisor: Arc<Supervisor>,
    deploy_queue: DeployQueue,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BerthError> {
    info!("Initializing deployer worker...");

    let deployer_handle = tokio::spawn(async move {
        deployer::run(
            supervisor,
            deploy_queue,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_deployer_worker_handle(deployer_handle)
}

fn init_poller_worker(
    options: poller::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BerthError> {
    info!("Initializing poller worker...");

    let syncer = app_state.syncer.clone();

    let poller_handle = tokio::spawn(async move {
        poller::run(
            &options,
            syncer.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)
}

/// Queues a deployment for every named project
async fn request_deploys(app_state: &AppState, names: &[String]) {
    for name in names {
        let project = match app_state.store.get_project_by_name(name).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                warn!("Cannot deploy {}: no such project", name);
                continue;
            }
            Err(e) => {
                error!("Cannot deploy {}: {}", name, e);
                continue;
            }
        };

        match app_state
            .supervisor
            .deploy(project.id, DeployOptions::default())
            .await
        {
            Ok(deployment_id) => info!("Requested deployment #{} of {}", deployment_id, name),
            Err(e) => error!("Failed to request deployment of {}: {}", name, e),
        }
    }
}

// ================================= SHUTDOWN ===================================== //

struct LogWriterShutdownParams {
    handle: JoinHandle<()>,
    stop_tx: oneshot::Sender<()>,
}

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    supervisor: Option<Arc<Supervisor>>,
    deployer_worker_handle: Option<JoinHandle<()>>,
    poller_worker_handle: Option<JoinHandle<()>>,
    log_writer: Option<LogWriterShutdownParams>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            supervisor: None,
            deployer_worker_handle: None,
            poller_worker_handle: None,
            log_writer: None,
        }
    }

    pub fn with_supervisor(&mut self, supervisor: Arc<Supervisor>) -> Result<(), BerthError> {
        if self.supervisor.is_some() {
            return Err(BerthError::ShutdownError("supervisor already set".to_string()));
        }
        self.supervisor = Some(supervisor);
        Ok(())
    }

    pub fn with_deployer_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), BerthError> {
        if self.deployer_worker_handle.is_some() {
            return Err(BerthError::ShutdownError("deployer_handle already set".to_string()));
        }
        self.deployer_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), BerthError> {
        if self.poller_worker_handle.is_some() {
            return Err(BerthError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_log_writer_handle(
        &mut self,
        handle: JoinHandle<()>,
        stop_tx: oneshot::Sender<()>,
    ) -> Result<(), BerthError> {
        if self.log_writer.is_some() {
            return Err(BerthError::ShutdownError("log_writer_handle already set".to_string()));
        }
        self.log_writer = Some(LogWriterShutdownParams { handle, stop_tx });
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), BerthError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), BerthError> {
        info!("Shutting down berth...");

        // 1. Supervised processes
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.shutdown().await;
        }

        // 2. Deployer worker
        if let Some(handle) = self.deployer_worker_handle.take() {
            handle.await.map_err(|e| BerthError::ShutdownError(e.to_string()))?;
        }

        // 3. Poller worker
        if let Some(handle) = self.poller_worker_handle.take() {
            handle.await.map_err(|e| BerthError::ShutdownError(e.to_string()))?;
        }

        // 4. Log writer
        if let Some(log_writer) = self.log_writer.take() {
            let _ = log_writer.stop_tx.send(());
            log_writer
                .handle
                .await
                .map_err(|e| BerthError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
