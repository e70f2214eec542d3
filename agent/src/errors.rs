//! Error types for berth

use thiserror::Error;

/// Main error type for berth
#[derive(Error, Debug)]
pub enum BerthError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// The detector could not classify the project directory
    #[error("Unsupported project: {0}")]
    Unsupported(String),

    #[error("No free port in range {base}-{max}")]
    PortExhausted { base: u16, max: u16 },

    #[error("{}", build_failure_message(.exit_code))]
    BuildFailed { exit_code: Option<i32> },

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Process crashed: {0}")]
    ProcessCrashed(String),

    #[error("Project is not running: {0}")]
    NotRunning(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn build_failure_message(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("Build failed (exit code: {})", code),
        None => "Build failed (terminated by signal)".to_string(),
    }
}

impl From<tokio::task::JoinError> for BerthError {
    fn from(err: tokio::task::JoinError) -> Self {
        BerthError::Internal(err.to_string())
    }
}
