//! Port assignment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::project::ProjectId;

/// The only protocol projects are exposed on
pub const DEFAULT_PROTOCOL: &str = "http";

/// Internal/external port pair. Both halves are always equal since berth does
/// no address translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    pub internal: u16,
    pub external: u16,
}

impl PortPair {
    pub fn same(port: u16) -> Self {
        Self {
            internal: port,
            external: port,
        }
    }
}

/// A live port reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortAssignment {
    pub project_id: ProjectId,
    pub internal_port: u16,
    pub external_port: u16,
    pub protocol: String,
    pub created_at: DateTime<Utc>,
}

impl PortAssignment {
    pub fn ports(&self) -> PortPair {
        PortPair {
            internal: self.internal_port,
            external: self.external_port,
        }
    }
}

/// Read-only view of the managed port range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStats {
    pub total: u32,
    pub used: u32,
    pub available: u32,
    pub base_port: u16,
    pub max_port: u16,
    pub used_ports: Vec<u16>,
}
