//! Project synchronization
//!
//! Mirrors the projects directory into the store. Rows are matched by name;
//! the persisted status is never touched by a sync.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::errors::BerthError;
use crate::filesys::dir::Dir;
use crate::scanner::scan_projects;
use crate::store::Store;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Sync state
#[derive(Debug, Clone)]
pub struct SyncState {
    pub last_attempted_sync_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
    pub cooldown_ends_at: DateTime<Utc>,
    pub err_streak: u32,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_attempted_sync_at: DateTime::<Utc>::MIN_UTC,
            last_synced_at: DateTime::<Utc>::MIN_UTC,
            cooldown_ends_at: DateTime::<Utc>::MIN_UTC,
            err_streak: 0,
        }
    }
}

impl SyncState {
    pub fn is_in_cooldown(&self) -> bool {
        Utc::now() < self.cooldown_ends_at
    }
}

/// Outcome of one sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} projects found, {} new, {} refreshed",
            self.scanned, self.created, self.updated
        )
    }
}

/// Project syncer
pub struct Syncer {
    store: Arc<dyn Store>,
    projects_dir: Dir,
    state: RwLock<SyncState>,
    cooldown_options: CooldownOptions,
}

impl Syncer {
    pub fn new(store: Arc<dyn Store>, projects_dir: Dir) -> Self {
        Self::with_cooldown(store, projects_dir, CooldownOptions::default())
    }

    pub fn with_cooldown(
        store: Arc<dyn Store>,
        projects_dir: Dir,
        cooldown_options: CooldownOptions,
    ) -> Self {
        Self {
            store,
            projects_dir,
            state: RwLock::new(SyncState::default()),
            cooldown_options,
        }
    }

    pub fn projects_dir(&self) -> &Dir {
        &self.projects_dir
    }

    /// Syncs unless a previous failure put the syncer in cooldown, in which
    /// case `Ok(None)` is returned without scanning.
    pub async fn trigger_sync(&self) -> Result<Option<SyncReport>, BerthError> {
        {
            let state = self.state.read().await;
            if state.is_in_cooldown() {
                debug!("Sync in cooldown until {}, skipping...", state.cooldown_ends_at);
                return Ok(None);
            }
        }

        {
            let mut state = self.state.write().await;
            state.last_attempted_sync_at = Utc::now();
        }

        match self.sync().await {
            Ok(report) => {
                let mut state = self.state.write().await;
                state.last_synced_at = Utc::now();
                state.err_streak = 0;
                Ok(Some(report))
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.err_streak += 1;

                let cooldown = calc_exp_backoff(&self.cooldown_options, state.err_streak);
                let cooldown = chrono::Duration::from_std(cooldown)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5));
                state.cooldown_ends_at = Utc::now() + cooldown;

                error!(
                    "Sync failed (attempt {}), cooldown until {}: {}",
                    state.err_streak, state.cooldown_ends_at, e
                );
                Err(e)
            }
        }
    }

    /// Scans the projects directory and upserts every project found
    pub async fn sync(&self) -> Result<SyncReport, BerthError> {
        info!("Syncing projects from {}...", self.projects_dir.path().display());
        let scanned = scan_projects(&self.projects_dir).await?;

        let mut report = SyncReport {
            scanned: scanned.len(),
            ..Default::default()
        };
        for project in scanned {
            let existed = self.store.get_project_by_name(&project.name).await?.is_some();
            let row = self.store.upsert_project(project.into()).await?;
            if existed {
                report.updated += 1;
            } else {
                info!("Registered new project {} ({})", row.name, row.project_type);
                report.created += 1;
            }
        }

        info!("Sync completed: {}", report);
        Ok(report)
    }

    pub async fn get_state(&self) -> SyncState {
        self.state.read().await.clone()
    }
}
