//! Port allocator backed by the persistent store.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::BerthError;
use crate::models::port::{PortPair, PortStats};
use crate::models::project::ProjectId;
use crate::ports::PortRange;
use crate::store::Store;

/// Hands out exclusive ports to projects.
///
/// Reservations within one process are serialized by an internal lock, and the
/// unique index on assigned ports rejects any concurrent writer that slips past
/// it. Internal and external ports are always equal.
pub struct PortAllocator {
    store: Arc<dyn Store>,
    range: PortRange,
    reserve_lock: Mutex<()>,
}

impl PortAllocator {
    pub fn new(store: Arc<dyn Store>, range: PortRange) -> Self {
        Self {
            store,
            range,
            reserve_lock: Mutex::new(()),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    async fn used_ports(&self) -> Result<BTreeSet<u16>, BerthError> {
        Ok(self.store.used_ports().await?.into_iter().collect())
    }

    /// Reserves a port for `project_id`.
    ///
    /// A project that already holds an assignment gets it back unchanged, so
    /// repeated reservations are idempotent. Otherwise `preferred` is used when
    /// free and in range, else the lowest free port from the range base.
    pub async fn reserve(
        &self,
        project_id: ProjectId,
        preferred: Option<u16>,
    ) -> Result<PortPair, BerthError> {
        let _guard = self.reserve_lock.lock().await;

        if let Some(existing) = self.store.get_port_assignment(project_id).await? {
            let ports = existing.ports();
            debug!(
                "Project {} already holds port {}",
                project_id, ports.internal
            );
            self.store.update_port_fields(project_id, ports).await?;
            return Ok(ports);
        }

        let used = self.used_ports().await?;
        let port = self
            .range
            .pick(preferred, &used)
            .ok_or(BerthError::PortExhausted {
                base: self.range.base,
                max: self.range.max,
            })?;
        let ports = PortPair::same(port);

        self.store.insert_port_assignment(project_id, ports).await?;
        if let Err(e) = self.store.update_port_fields(project_id, ports).await {
            // Undo the assignment so the reservation fails as a whole
            if let Err(undo) = self.store.delete_port_assignment(project_id).await {
                warn!(
                    "Failed to roll back port {} for project {}: {}",
                    port, project_id, undo
                );
            }
            return Err(e);
        }

        info!("Reserved port {} for project {}", port, project_id);
        Ok(ports)
    }

    /// Frees the project's port. Releasing a project without a port is a no-op.
    pub async fn release(&self, project_id: ProjectId) -> Result<(), BerthError> {
        let _guard = self.reserve_lock.lock().await;

        let removed = self.store.delete_port_assignment(project_id).await?;
        self.store.clear_port_fields(project_id).await?;
        if removed {
            info!("Released port of project {}", project_id);
        }
        Ok(())
    }

    /// Current assignment of a project, if any
    pub async fn project_ports(&self, project_id: ProjectId) -> Result<Option<PortPair>, BerthError> {
        Ok(self
            .store
            .get_port_assignment(project_id)
            .await?
            .map(|a| a.ports()))
    }

    pub async fn is_in_use(&self, port: u16) -> Result<bool, BerthError> {
        Ok(self.used_ports().await?.contains(&port))
    }

    /// Lowest free port in `[start, end]`, limited to the managed range
    pub async fn find_free_in(&self, start: u16, end: u16) -> Result<u16, BerthError> {
        let used = self.used_ports().await?;
        self.range
            .first_free(start, end, &used)
            .ok_or(BerthError::PortExhausted {
                base: start,
                max: end,
            })
    }

    pub async fn stats(&self) -> Result<PortStats, BerthError> {
        let used_ports: Vec<u16> = self
            .used_ports()
            .await?
            .into_iter()
            .filter(|p| self.range.contains(*p))
            .collect();
        let total = self.range.size();
        let used = used_ports.len() as u32;

        Ok(PortStats {
            total,
            used,
            available: total.saturating_sub(used),
            base_port: self.range.base,
            max_port: self.range.max,
            used_ports,
        })
    }
}
