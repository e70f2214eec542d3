//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deploy::command::CommandOverrides;
use crate::errors::BerthError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::ports::{DEFAULT_BASE_PORT, DEFAULT_MAX_PORT};

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit daemon logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Also write daemon logs to daily files
    #[serde(default = "default_true")]
    pub log_to_file: bool,

    #[serde(default)]
    pub ports: PortSettings,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub supervisor: SupervisorSettings,

    #[serde(default)]
    pub poller: PollerSettings,

    /// Per project type start/build command replacements
    #[serde(default)]
    pub commands: CommandOverrides,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            log_to_file: true,
            ports: PortSettings::default(),
            paths: PathSettings::default(),
            supervisor: SupervisorSettings::default(),
            poller: PollerSettings::default(),
            commands: CommandOverrides::new(),
        }
    }
}

/// Port range handed to projects
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortSettings {
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    #[serde(default = "default_max_port")]
    pub max_port: u16,
}

fn default_base_port() -> u16 {
    DEFAULT_BASE_PORT
}

fn default_max_port() -> u16 {
    DEFAULT_MAX_PORT
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            max_port: DEFAULT_MAX_PORT,
        }
    }
}

/// Path overrides. Unset paths fall back to the storage layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Host announced in the address printed after a deploy
    #[serde(default = "default_public_host")]
    pub public_host: String,
}

fn default_restart_delay_ms() -> u64 {
    2000
}

fn default_public_host() -> String {
    "localhost".to_string()
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            restart_delay_ms: default_restart_delay_ms(),
            public_host: default_public_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_polling_interval")]
    pub interval_secs: u64,
}

fn default_polling_interval() -> u64 {
    30
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_polling_interval(),
        }
    }
}

impl Settings {
    /// Loads `file`, falling back to defaults when it does not exist
    pub async fn load(file: &File) -> Result<Self, BerthError> {
        if !file.exists().await {
            debug!("No settings at {}, using defaults", file.path().display());
            return Ok(Self::default());
        }
        file.read_json().await.map_err(|e| {
            BerthError::ConfigError(format!("{}: {}", file.path().display(), e))
        })
    }

    /// Applies the environment overrides
    pub fn apply_env(&mut self) -> Result<(), BerthError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), BerthError> {
        if let Some(value) = lookup("BASE_PROJECT_PORT") {
            self.ports.base_port = parse_port("BASE_PROJECT_PORT", &value)?;
        }
        if let Some(value) = lookup("MAX_PROJECT_PORT") {
            self.ports.max_port = parse_port("MAX_PROJECT_PORT", &value)?;
        }
        if let Some(value) = lookup("PROJECTS_PATH") {
            self.paths.projects_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("LOGS_PATH") {
            self.paths.logs_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("DB_PATH") {
            self.paths.database = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub async fn save(&self, file: &File) -> Result<(), BerthError> {
        file.write_json(self).await?;
        info!("Settings written to {}", file.path().display());
        Ok(())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, BerthError> {
    value
        .trim()
        .parse()
        .map_err(|_| BerthError::ConfigError(format!("{} is not a port: {}", key, value)))
}
