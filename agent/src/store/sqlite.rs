//! SQLite-backed store.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::detect::ProjectType;
use crate::errors::BerthError;
use crate::models::deployment::{Deployment, DeploymentId, DeploymentStatus};
use crate::models::log::{LogRecord, LogType};
use crate::models::port::{PortAssignment, PortPair, DEFAULT_PROTOCOL};
use crate::models::project::{NewProject, Project, ProjectFilter, ProjectId, ProjectStatus};
use crate::store::Store;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    path TEXT NOT NULL,
    type TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'stopped',
    internal_port INTEGER,
    external_port INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deployments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending',
    started_at TEXT NOT NULL,
    finished_at TEXT,
    log_path TEXT,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_deployments_project
    ON deployments(project_id, id);

CREATE TABLE IF NOT EXISTS port_assignments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    internal_port INTEGER NOT NULL,
    external_port INTEGER NOT NULL,
    protocol TEXT NOT NULL DEFAULT 'http',
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_port_assignments_project
    ON port_assignments(project_id);

CREATE UNIQUE INDEX IF NOT EXISTS idx_port_assignments_port
    ON port_assignments(internal_port);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_logs_project
    ON logs(project_id, id);
"#;

const PROJECT_COLUMNS: &str =
    "id, name, path, type, description, status, internal_port, external_port, created_at, updated_at";

const DEPLOYMENT_COLUMNS: &str =
    "id, project_id, status, started_at, finished_at, error_message, log_path";

/// Store backed by a single SQLite connection.
///
/// Statements run on the blocking pool so the async runtime never waits on disk.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self, BerthError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        info!("Opened project database at {}", path.display());
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, BerthError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, BerthError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<F, T>(&self, f: F) -> Result<T, BerthError>
    where
        F: FnOnce(&mut Connection) -> Result<T, BerthError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| BerthError::StoreError(format!("Failed to lock database: {}", e)))?;
            f(&mut guard)
        })
        .await?
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let value: String = row.get(idx)?;
    value.parse().map_err(|e: String| conversion_error(idx, e))
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let path: String = row.get(2)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: PathBuf::from(path),
        project_type: parse_column::<ProjectType>(row, 3)?,
        description: row.get(4)?,
        status: parse_column::<ProjectStatus>(row, 5)?,
        internal_port: row.get(6)?,
        external_port: row.get(7)?,
        created_at: parse_time(8, row.get(8)?)?,
        updated_at: parse_time(9, row.get(9)?)?,
    })
}

fn deployment_from_row(row: &Row<'_>) -> rusqlite::Result<Deployment> {
    let finished_at: Option<String> = row.get(4)?;
    let log_path: Option<String> = row.get(6)?;
    Ok(Deployment {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status: parse_column::<DeploymentStatus>(row, 2)?,
        started_at: parse_time(3, row.get(3)?)?,
        finished_at: finished_at.map(|t| parse_time(4, t)).transpose()?,
        error_message: row.get(5)?,
        log_path: log_path.map(PathBuf::from),
    })
}

fn select_project(conn: &Connection, name: &str) -> Result<Option<Project>, BerthError> {
    let sql = format!("SELECT {} FROM projects WHERE name = ?1", PROJECT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![name], project_from_row)
        .optional()?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, BerthError> {
        self.call(move |conn| {
            let sql = format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS);
            Ok(conn.query_row(&sql, params![id], project_from_row).optional()?)
        })
        .await
    }

    async fn get_project_by_name(&self, name: &str) -> Result<Option<Project>, BerthError> {
        let name = name.to_string();
        self.call(move |conn| select_project(conn, &name)).await
    }

    async fn list_projects(&self, filter: ProjectFilter) -> Result<Vec<Project>, BerthError> {
        self.call(move |conn| {
            let projects = match filter.status {
                Some(status) => {
                    let sql = format!(
                        "SELECT {} FROM projects WHERE status = ?1 ORDER BY id",
                        PROJECT_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params![status.as_str()], project_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let sql = format!("SELECT {} FROM projects ORDER BY id", PROJECT_COLUMNS);
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map([], project_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(projects)
        })
        .await
    }

    async fn upsert_project(&self, project: NewProject) -> Result<Project, BerthError> {
        self.call(move |conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO projects (name, path, type, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'stopped', ?5, ?5)
                 ON CONFLICT(name) DO UPDATE SET
                     path = excluded.path,
                     type = excluded.type,
                     description = excluded.description,
                     updated_at = excluded.updated_at",
                params![
                    project.name,
                    project.path.to_string_lossy().into_owned(),
                    project.project_type.as_str(),
                    project.description,
                    ts
                ],
            )?;
            select_project(conn, &project.name)?.ok_or_else(|| {
                BerthError::StoreError(format!("Project {} vanished after upsert", project.name))
            })
        })
        .await
    }

    async fn delete_project(&self, id: ProjectId) -> Result<bool, BerthError> {
        self.call(move |conn| {
            let removed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
            if removed > 0 {
                debug!("Deleted project {} and its dependent rows", id);
            }
            Ok(removed > 0)
        })
        .await
    }

    async fn update_project_status(
        &self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> Result<(), BerthError> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now(), id],
            )?;
            if changed == 0 {
                return Err(BerthError::NotFound(format!("project {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn create_deployment(
        &self,
        project_id: ProjectId,
        log_path: Option<PathBuf>,
    ) -> Result<DeploymentId, BerthError> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO deployments (project_id, status, started_at, log_path)
                 VALUES (?1, 'pending', ?2, ?3)",
                params![
                    project_id,
                    now(),
                    log_path.map(|p| p.to_string_lossy().into_owned())
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>, BerthError> {
        self.call(move |conn| {
            let sql = format!("SELECT {} FROM deployments WHERE id = ?1", DEPLOYMENT_COLUMNS);
            Ok(conn
                .query_row(&sql, params![id], deployment_from_row)
                .optional()?)
        })
        .await
    }

    async fn list_deployments(
        &self,
        project_id: Option<ProjectId>,
        limit: usize,
    ) -> Result<Vec<Deployment>, BerthError> {
        let limit = limit as i64;
        self.call(move |conn| {
            let deployments = match project_id {
                Some(project_id) => {
                    let sql = format!(
                        "SELECT {} FROM deployments WHERE project_id = ?1 ORDER BY id DESC LIMIT ?2",
                        DEPLOYMENT_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params![project_id, limit], deployment_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let sql = format!(
                        "SELECT {} FROM deployments ORDER BY id DESC LIMIT ?1",
                        DEPLOYMENT_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params![limit], deployment_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(deployments)
        })
        .await
    }

    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        error_message: Option<String>,
    ) -> Result<bool, BerthError> {
        self.call(move |conn| {
            let finished_at = status.is_terminal().then(now);
            let changed = conn.execute(
                "UPDATE deployments
                 SET status = ?1,
                     error_message = COALESCE(?2, error_message),
                     finished_at = COALESCE(?3, finished_at)
                 WHERE id = ?4 AND status NOT IN ('success', 'failed', 'cancelled')",
                params![status.as_str(), error_message, finished_at, id],
            )?;
            if changed == 0 {
                debug!("Deployment {} is terminal or missing, {} not applied", id, status);
            }
            Ok(changed > 0)
        })
        .await
    }

    async fn insert_port_assignment(
        &self,
        project_id: ProjectId,
        ports: PortPair,
    ) -> Result<(), BerthError> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO port_assignments (project_id, internal_port, external_port, protocol, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![project_id, ports.internal, ports.external, DEFAULT_PROTOCOL, now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_port_assignment(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<PortAssignment>, BerthError> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT project_id, internal_port, external_port, protocol, created_at
                     FROM port_assignments WHERE project_id = ?1",
                    params![project_id],
                    |row| {
                        Ok(PortAssignment {
                            project_id: row.get(0)?,
                            internal_port: row.get(1)?,
                            external_port: row.get(2)?,
                            protocol: row.get(3)?,
                            created_at: parse_time(4, row.get(4)?)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    async fn delete_port_assignment(&self, project_id: ProjectId) -> Result<bool, BerthError> {
        self.call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM port_assignments WHERE project_id = ?1",
                params![project_id],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn update_port_fields(
        &self,
        project_id: ProjectId,
        ports: PortPair,
    ) -> Result<(), BerthError> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE projects SET internal_port = ?1, external_port = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![ports.internal, ports.external, now(), project_id],
            )?;
            if changed == 0 {
                return Err(BerthError::NotFound(format!("project {}", project_id)));
            }
            Ok(())
        })
        .await
    }

    async fn clear_port_fields(&self, project_id: ProjectId) -> Result<(), BerthError> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE projects SET internal_port = NULL, external_port = NULL, updated_at = ?1
                 WHERE id = ?2",
                params![now(), project_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn used_ports(&self) -> Result<Vec<u16>, BerthError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT internal_port FROM port_assignments
                 UNION SELECT external_port FROM port_assignments
                 UNION SELECT internal_port FROM projects WHERE internal_port IS NOT NULL
                 UNION SELECT external_port FROM projects WHERE external_port IS NOT NULL
                 ORDER BY 1",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, u16>(0))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn append_log(
        &self,
        project_id: ProjectId,
        log_type: LogType,
        message: &str,
    ) -> Result<(), BerthError> {
        let message = message.to_string();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO logs (project_id, type, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![project_id, log_type.as_str(), message, now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_logs(
        &self,
        project_id: ProjectId,
        limit: usize,
    ) -> Result<Vec<LogRecord>, BerthError> {
        let limit = limit as i64;
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, type, message, timestamp FROM logs
                 WHERE project_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![project_id, limit], |row| {
                Ok(LogRecord {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    log_type: parse_column::<LogType>(row, 2)?,
                    message: row.get(3)?,
                    timestamp: parse_time(4, row.get(4)?)?,
                })
            })?;
            let mut records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            records.reverse();
            Ok(records)
        })
        .await
    }

    async fn clear_logs(&self, project_id: ProjectId) -> Result<(), BerthError> {
        self.call(move |conn| {
            conn.execute("DELETE FROM logs WHERE project_id = ?1", params![project_id])?;
            Ok(())
        })
        .await
    }
}
