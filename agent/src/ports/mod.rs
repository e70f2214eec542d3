//! Port allocation
//!
//! Projects get an exclusive port from a configured `[base, max]` window. The
//! store is re-read on every decision, so ports assigned or freed by another
//! writer are never shadowed by a stale cache.

mod allocator;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::BerthError;

pub use allocator::PortAllocator;

pub const DEFAULT_BASE_PORT: u16 = 4000;
pub const DEFAULT_MAX_PORT: u16 = 5000;

/// Inclusive range of ports handed out to projects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub base: u16,
    pub max: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_PORT,
            max: DEFAULT_MAX_PORT,
        }
    }
}

impl PortRange {
    pub fn new(base: u16, max: u16) -> Result<Self, BerthError> {
        if base == 0 || base > max {
            return Err(BerthError::ConfigError(format!(
                "Invalid port range {}-{}",
                base, max
            )));
        }
        Ok(Self { base, max })
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.base && port <= self.max
    }

    /// Number of ports in the range
    pub fn size(&self) -> u32 {
        u32::from(self.max) - u32::from(self.base) + 1
    }

    /// Picks `preferred` if it is free and in range, otherwise the lowest free
    /// port scanning upward from `base`
    pub fn pick(&self, preferred: Option<u16>, used: &BTreeSet<u16>) -> Option<u16> {
        if let Some(port) = preferred {
            if self.contains(port) && !used.contains(&port) {
                return Some(port);
            }
        }
        self.first_free(self.base, self.max, used)
    }

    /// Lowest free port in `[start, end]` clamped to this range
    pub fn first_free(&self, start: u16, end: u16, used: &BTreeSet<u16>) -> Option<u16> {
        let start = start.max(self.base);
        let end = end.min(self.max);
        if start > end {
            return None;
        }
        (start..=end).find(|port| !used.contains(port))
    }
}
