//! Project models

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detect::ProjectType;
use crate::models::port::PortPair;

/// Row identifier of a project in the store
pub type ProjectId = i64;

/// Persisted lifecycle status of a project.
///
/// `Running` is a claim made by the supervisor; the running-process table is
/// the authority on whether a process is actually alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Stopped,
    Building,
    Running,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Stopped => "stopped",
            ProjectStatus::Building => "building",
            ProjectStatus::Running => "running",
            ProjectStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(ProjectStatus::Stopped),
            "building" => Ok(ProjectStatus::Building),
            "running" => Ok(ProjectStatus::Running),
            "error" => Ok(ProjectStatus::Error),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

/// A user application managed by berth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,

    /// Unique name, also used to name the project's log files
    pub name: String,

    /// Directory holding the application sources
    pub path: PathBuf,

    pub project_type: ProjectType,

    pub description: Option<String>,

    pub status: ProjectStatus,

    pub internal_port: Option<u16>,

    pub external_port: Option<u16>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Currently assigned port pair, if both halves are set
    pub fn ports(&self) -> Option<PortPair> {
        match (self.internal_port, self.external_port) {
            (Some(internal), Some(external)) => Some(PortPair { internal, external }),
            _ => None,
        }
    }
}

/// Fields accepted when creating or refreshing a project row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub path: PathBuf,
    pub project_type: ProjectType,
    #[serde(default)]
    pub description: Option<String>,
}

/// Filter for listing projects
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
}

impl ProjectFilter {
    pub fn with_status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
        }
    }
}
