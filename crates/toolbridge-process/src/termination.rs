//! Termination notification

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::ExitError;
use crate::types::ProcessState;

/// Record of how one process lifetime ended
#[derive(Debug)]
pub struct TerminationInfo {
    pub(crate) state: ProcessState,
    pub(crate) error: Option<ExitError>,
    pub(crate) output: String,
}

impl TerminationInfo {
    /// State committed before this record was offered (`Stopped` or `Dead`)
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Abnormal-exit error, if any. Always `None` after an explicit kill.
    pub fn error(&self) -> Option<&ExitError> {
        self.error.as_ref()
    }

    /// Captured stdout and stderr; empty when capture was disabled
    pub fn combined_output(&self) -> &str {
        &self.output
    }

    pub fn into_parts(self) -> (ProcessState, Option<ExitError>, String) {
        (self.state, self.error, self.output)
    }
}

/// The single source of termination records for a supervisor.
///
/// Every clone reads from the same one-slot queue: one record per process
/// lifetime in total, not one per listener.
#[derive(Debug, Clone)]
pub struct TerminationListener {
    rx: Arc<Mutex<mpsc::Receiver<TerminationInfo>>>,
}

impl TerminationListener {
    pub(crate) fn channel() -> (mpsc::Sender<TerminationInfo>, Self) {
        let (tx, rx) = mpsc::channel(1);
        (
            tx,
            Self {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Wait for the next termination record.
    ///
    /// Waits for as long as the process keeps running. Returns `None` once
    /// the supervisor and its watchers are gone.
    pub async fn recv(&self) -> Option<TerminationInfo> {
        self.rx.lock().await.recv().await
    }

    /// Take a pending record without waiting
    pub fn try_recv(&self) -> Option<TerminationInfo> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}
