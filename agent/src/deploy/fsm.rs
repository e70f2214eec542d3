//! Finite state machine for deployment records

use crate::errors::BerthError;
use crate::models::deployment::DeploymentStatus;

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Worker picked the deployment up
    Build,

    /// Build and start both succeeded
    Succeed,

    /// Any step failed
    Fail(String),

    /// Cancelled by request
    Cancel,
}

/// Deployment FSM.
///
/// `pending -> building -> {success | failed | cancelled}`, with cancellation
/// also allowed straight from `pending`. Terminal states accept no events.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Pending)
    }

    /// Resume from a persisted status
    pub fn from_status(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, BerthError> {
        let new_state = match (&self.state, &event) {
            // From Pending
            (DeploymentStatus::Pending, DeploymentEvent::Build) => DeploymentStatus::Building,
            (DeploymentStatus::Pending, DeploymentEvent::Cancel) => DeploymentStatus::Cancelled,

            // From Building
            (DeploymentStatus::Building, DeploymentEvent::Succeed) => DeploymentStatus::Success,
            (DeploymentStatus::Building, DeploymentEvent::Fail(err)) => {
                self.error = Some(err.clone());
                DeploymentStatus::Failed
            }
            (DeploymentStatus::Building, DeploymentEvent::Cancel) => DeploymentStatus::Cancelled,

            // Invalid transitions
            (state, event) => {
                return Err(BerthError::InvalidTransition(format!(
                    "{} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
