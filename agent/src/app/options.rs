//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::hub::DEFAULT_CHANNEL_CAPACITY;
use crate::deploy::supervisor::SupervisorOptions;
use crate::errors::BerthError;
use crate::ports::PortRange;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::poller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Ports handed out to projects
    pub ports: PortRange,

    pub supervisor: SupervisorOptions,

    /// Enable polling worker
    pub enable_poller: bool,

    /// Poller worker options
    pub poller: poller::Options,

    /// Buffered lines per project log channel
    pub log_channel_capacity: usize,

    /// Sync the projects directory once and exit
    pub sync_only: bool,

    /// Project names to deploy once the daemon is up
    pub deploy_on_start: Vec<String>,
}

impl AppOptions {
    /// Builds the option tree from loaded settings, resolving unset paths
    /// against `layout`.
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Result<Self, BerthError> {
        let ports = PortRange::new(settings.ports.base_port, settings.ports.max_port)?;

        let storage = StorageOptions {
            projects_dir: settings
                .paths
                .projects_dir
                .clone()
                .unwrap_or_else(|| layout.projects_dir().path().to_path_buf()),
            logs_dir: settings
                .paths
                .logs_dir
                .clone()
                .unwrap_or_else(|| layout.project_logs_dir().path().to_path_buf()),
            database: settings
                .paths
                .database
                .clone()
                .unwrap_or_else(|| layout.database_file()),
            layout,
        };

        Ok(Self {
            lifecycle: LifecycleOptions::default(),
            supervisor: SupervisorOptions {
                logs_dir: storage.logs_dir.clone(),
                restart_delay: Duration::from_millis(settings.supervisor.restart_delay_ms),
                public_host: settings.supervisor.public_host.clone(),
                commands: settings.commands.clone(),
            },
            storage,
            ports,
            enable_poller: settings.poller.enabled,
            poller: poller::Options {
                interval: Duration::from_secs(settings.poller.interval_secs.max(1)),
                ..Default::default()
            },
            log_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            sync_only: false,
            deploy_on_start: Vec::new(),
        })
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Directory scanned for projects
    pub projects_dir: PathBuf,

    /// Per-project log files
    pub logs_dir: PathBuf,

    /// SQLite database file
    pub database: PathBuf,
}
