//! Build and run supervision for deployed projects

pub mod command;
pub mod fsm;
pub mod hub;
pub mod output;
pub mod platform;
pub mod supervisor;
pub mod table;

pub use command::{CommandOverride, CommandOverrides, CommandTemplates, LaunchCommand};
pub use fsm::{DeploymentEvent, DeploymentFsm};
pub use hub::LogHub;
pub use platform::{Platform, TerminationOutcome, TerminationStrategy};
pub use supervisor::{DeployQueue, DeployRequest, Supervisor, SupervisorOptions};
pub use table::{ExitInfo, RunningInfo};
