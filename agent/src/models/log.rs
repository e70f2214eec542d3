//! Project log models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::project::ProjectId;

/// Origin of a project log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogType {
    Stdout,
    Stderr,
    Build,
    BuildError,
    System,
    Error,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Stdout => "stdout",
            LogType::Stderr => "stderr",
            LogType::Build => "build",
            LogType::BuildError => "build-error",
            LogType::System => "system",
            LogType::Error => "error",
        }
    }

    pub fn all() -> &'static [LogType] {
        &[
            LogType::Stdout,
            LogType::Stderr,
            LogType::Build,
            LogType::BuildError,
            LogType::System,
            LogType::Error,
        ]
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid log type: {}", s))
    }
}

/// A log line as published to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub project_id: ProjectId,
    pub log_type: LogType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A log line read back from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub project_id: ProjectId,
    pub log_type: LogType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Category of a per-project log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFileKind {
    Build,
    Runtime,
}

impl LogFileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFileKind::Build => "build",
            LogFileKind::Runtime => "runtime",
        }
    }

    /// Deterministic file name for a project's log of this kind
    pub fn file_name(&self, project_name: &str) -> String {
        format!("{}_{}.log", project_name, self.as_str())
    }
}
