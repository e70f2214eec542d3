//! Persistent store
//!
//! The store is the single source of truth for durable state. Every method is
//! an independent statement; callers never hold a transaction across steps.

pub mod sqlite;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::BerthError;
use crate::models::deployment::{Deployment, DeploymentId, DeploymentStatus};
use crate::models::log::{LogRecord, LogType};
use crate::models::port::{PortAssignment, PortPair};
use crate::models::project::{NewProject, Project, ProjectFilter, ProjectId, ProjectStatus};

pub use sqlite::SqliteStore;

#[async_trait]
pub trait Store: Send + Sync {
    // projects

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, BerthError>;

    async fn get_project_by_name(&self, name: &str) -> Result<Option<Project>, BerthError>;

    async fn list_projects(&self, filter: ProjectFilter) -> Result<Vec<Project>, BerthError>;

    /// Inserts a project, or refreshes path, type and description of the
    /// project with the same name. Status and ports are left untouched.
    async fn upsert_project(&self, project: NewProject) -> Result<Project, BerthError>;

    /// Deletes the project together with its deployments, port assignment and
    /// log rows. Returns false if no such project existed.
    async fn delete_project(&self, id: ProjectId) -> Result<bool, BerthError>;

    async fn update_project_status(
        &self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> Result<(), BerthError>;

    // deployments

    async fn create_deployment(
        &self,
        project_id: ProjectId,
        log_path: Option<PathBuf>,
    ) -> Result<DeploymentId, BerthError>;

    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>, BerthError>;

    /// Newest first
    async fn list_deployments(
        &self,
        project_id: Option<ProjectId>,
        limit: usize,
    ) -> Result<Vec<Deployment>, BerthError>;

    /// Moves a deployment to `status`. Terminal rows are never rewritten; the
    /// returned flag tells whether the write applied.
    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        error_message: Option<String>,
    ) -> Result<bool, BerthError>;

    // ports

    async fn insert_port_assignment(
        &self,
        project_id: ProjectId,
        ports: PortPair,
    ) -> Result<(), BerthError>;

    async fn get_port_assignment(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<PortAssignment>, BerthError>;

    async fn delete_port_assignment(&self, project_id: ProjectId) -> Result<bool, BerthError>;

    async fn update_port_fields(
        &self,
        project_id: ProjectId,
        ports: PortPair,
    ) -> Result<(), BerthError>;

    async fn clear_port_fields(&self, project_id: ProjectId) -> Result<(), BerthError>;

    /// Every port currently held by an assignment row or recorded on a
    /// project, sorted and deduplicated
    async fn used_ports(&self) -> Result<Vec<u16>, BerthError>;

    // logs

    async fn append_log(
        &self,
        project_id: ProjectId,
        log_type: LogType,
        message: &str,
    ) -> Result<(), BerthError>;

    /// Most recent `limit` lines, oldest first
    async fn list_logs(
        &self,
        project_id: ProjectId,
        limit: usize,
    ) -> Result<Vec<LogRecord>, BerthError>;

    async fn clear_logs(&self, project_id: ProjectId) -> Result<(), BerthError>;
}
