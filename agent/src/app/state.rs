//! Application state management

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::hub::LogHub;
use crate::deploy::supervisor::{DeployQueue, Supervisor};
use crate::errors::BerthError;
use crate::filesys::dir::Dir;
use crate::models::log::LogEvent;
use crate::ports::PortAllocator;
use crate::store::{SqliteStore, Store};
use crate::sync::syncer::Syncer;

/// Main application state
pub struct AppState {
    pub store: Arc<dyn Store>,

    /// Per-project log fan-out
    pub hub: Arc<LogHub>,

    pub ports: Arc<PortAllocator>,

    pub supervisor: Arc<Supervisor>,

    /// Projects directory syncer
    pub syncer: Arc<Syncer>,
}

/// Receiving ends handed to the workers that drain them
pub struct WorkerChannels {
    pub deploy_queue: DeployQueue,
    pub log_events: mpsc::UnboundedReceiver<LogEvent>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<(Self, WorkerChannels), BerthError> {
        info!("Initializing application state...");

        options.storage.layout.setup().await?;
        Dir::new(&options.storage.projects_dir).create().await?;
        Dir::new(&options.storage.logs_dir).create().await?;

        let database = options.storage.database.clone();
        let store = tokio::task::spawn_blocking(move || SqliteStore::open(&database)).await??;
        info!("Store opened at {}", options.storage.database.display());
        let store: Arc<dyn Store> = Arc::new(store);

        let (hub, log_events) = LogHub::new(options.log_channel_capacity);
        let hub = Arc::new(hub);

        let ports = Arc::new(PortAllocator::new(store.clone(), options.ports));

        let (supervisor, deploy_queue) = Supervisor::new(
            store.clone(),
            ports.clone(),
            hub.clone(),
            options.supervisor.clone(),
        );

        let syncer = Arc::new(Syncer::new(
            store.clone(),
            Dir::new(&options.storage.projects_dir),
        ));

        let state = Self {
            store,
            hub,
            ports,
            supervisor,
            syncer,
        };
        let channels = WorkerChannels {
            deploy_queue,
            log_events,
        };
        Ok((state, channels))
    }
}
