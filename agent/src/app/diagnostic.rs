//! Host diagnostics printed by `--diagnostic`

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::app::options::AppOptions;
use crate::deploy::platform::{Platform, TerminationStrategy};
use crate::errors::BerthError;
use crate::models::port::PortStats;
use crate::ports::PortAllocator;
use crate::store::{SqliteStore, Store};
use crate::utils::{version_info, VersionInfo};

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub version: VersionInfo,
    pub platform: String,
    pub termination_strategy: TerminationStrategy,
    pub ports: PortStats,
    pub projects: usize,
    pub paths: DiagnosticPaths,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticPaths {
    pub base_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database: PathBuf,
}

/// Collects the diagnostic report. Opens the store read-write, creating it
/// if this is the first run.
pub async fn collect(options: &AppOptions) -> Result<Diagnostic, BerthError> {
    let database = options.storage.database.clone();
    let store: Arc<dyn Store> =
        Arc::new(tokio::task::spawn_blocking(move || SqliteStore::open(&database)).await??);
    let ports = PortAllocator::new(store.clone(), options.ports);
    let platform = Platform::current();

    Ok(Diagnostic {
        version: version_info(),
        platform: platform.name().to_string(),
        termination_strategy: platform.termination_strategy(),
        ports: ports.stats().await?,
        projects: store.list_projects(Default::default()).await?.len(),
        paths: DiagnosticPaths {
            base_dir: options.storage.layout.base_dir.clone(),
            projects_dir: options.storage.projects_dir.clone(),
            logs_dir: options.storage.logs_dir.clone(),
            database: options.storage.database.clone(),
        },
    })
}
