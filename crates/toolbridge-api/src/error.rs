//! Adapter error types

use thiserror::Error;
use toolbridge_process::{ProcessError, ProcessState};

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Adapter errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Supervisor call failed
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Command issued while the tool is not running
    #[error("Tool is not running (state: {state})")]
    NotRunning { state: ProcessState },

    /// The adapter has no connection to the tool yet
    #[error("Adapter has not been started")]
    NotStarted,

    /// Command cannot be framed for the tool
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Pipe I/O failed
    #[error("Pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Tool output ended before the response sentinel
    #[error("Tool output ended before the response was complete")]
    UnexpectedEof,

    /// The tool's HTTP server answered with an error status
    #[error("HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Network request failed
    #[error("Network request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response was not the expected JSON
    #[error("Failed to decode JSON response: {0}")]
    Json(#[from] serde_json::Error),

    /// Client build error
    #[error("Failed to build HTTP client: {0}")]
    BuildError(String),
}

impl ApiError {
    /// Whether the tool itself is gone or never came up
    pub fn is_not_running(&self) -> bool {
        matches!(self, ApiError::NotRunning { .. } | ApiError::NotStarted)
    }
}
