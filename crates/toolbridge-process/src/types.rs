//! Core lifecycle types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// No process, or the last one was stopped on request
    #[default]
    Stopped,
    /// Process spawned and watched
    Running,
    /// Process exited on its own
    Dead,
}

impl ProcessState {
    /// Whether commands may be issued
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Dead => write!(f, "dead"),
        }
    }
}
