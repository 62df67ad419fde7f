//! Error types for tool process supervision

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Supervisor errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// `start` was called while a process is already running
    #[error("Tool process is already running")]
    AlreadyRunning,

    /// Invalid configuration
    #[error("Invalid tool configuration: {0}")]
    InvalidConfig(String),

    /// The executable could not be located
    #[error("Failed to locate executable '{name}': {reason}")]
    ExecutableNotFound { name: String, reason: String },

    /// Failed to spawn process
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[from] io::Error),

    /// The interrupt strategy could not deliver its request
    #[error("Failed to interrupt process: {0}")]
    InterruptFailed(String),

    /// A configuration file could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),
}

/// Why a process lifetime ended abnormally.
///
/// Only reported through [`crate::TerminationInfo`], never returned from a
/// supervisor call.
#[derive(Debug, Error)]
pub enum ExitError {
    /// The process exited with a non-success status
    #[error("Process exited unsuccessfully ({0})")]
    Status(ExitStatus),

    /// Waiting on the process failed
    #[error("Failed to wait on process: {0}")]
    Wait(#[source] io::Error),
}

impl ExitError {
    /// Exit code, if the process exited normally with one
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitError::Status(status) => status.code(),
            ExitError::Wait(_) => None,
        }
    }
}

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, ProcessError>;
