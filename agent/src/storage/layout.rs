//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::BerthError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the daemon
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("berth.db")
    }

    /// Where project applications are scanned from
    pub fn projects_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("projects"))
    }

    /// Per-project build and runtime logs
    pub fn project_logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs").join("projects"))
    }

    /// The daemon's own tracing output
    pub fn daemon_logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs").join("daemon"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), BerthError> {
        Dir::new(&self.base_dir).create().await?;
        self.projects_dir().create().await?;
        self.project_logs_dir().create().await?;
        self.daemon_logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/berth");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".berth");

        Self::new(base_dir)
    }
}
