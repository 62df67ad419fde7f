//! Graceful interrupt strategies
//!
//! The supervisor never hard-codes how a polite interrupt reaches the tool.
//! It is handed an [`InterruptStrategy`] at construction and calls it against
//! the live [`ProcessHandle`] while holding its lock.

use std::sync::Arc;

use crate::error::{ProcessError, Result};

/// Identity of the live child, as seen by interrupt strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
    process_group: bool,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32, process_group: bool) -> Self {
        Self { pid, process_group }
    }

    /// Process ID of the child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the child leads its own process group
    pub fn is_group_leader(&self) -> bool {
        self.process_group
    }
}

/// Delivers a graceful interrupt request to a running process.
///
/// Implementations must return an error instead of panicking, and should
/// not block longer than the platform mechanism needs.
pub trait InterruptStrategy: Send + Sync {
    fn interrupt(&self, process: &ProcessHandle) -> Result<()>;
}

impl<F> InterruptStrategy for F
where
    F: Fn(&ProcessHandle) -> Result<()> + Send + Sync,
{
    fn interrupt(&self, process: &ProcessHandle) -> Result<()> {
        self(process)
    }
}

/// Sends `SIGINT` to the child
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalInterrupt;

#[cfg(unix)]
impl InterruptStrategy for SignalInterrupt {
    fn interrupt(&self, process: &ProcessHandle) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(process.pid()).map_err(|_| {
            ProcessError::InterruptFailed(format!("pid {} out of range", process.pid()))
        })?;

        kill(Pid::from_raw(pid), Signal::SIGINT)
            .map_err(|e| ProcessError::InterruptFailed(e.to_string()))
    }
}

/// Strategy for platforms that cannot signal a foreign console process
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedInterrupt;

impl InterruptStrategy for UnsupportedInterrupt {
    fn interrupt(&self, process: &ProcessHandle) -> Result<()> {
        Err(ProcessError::InterruptFailed(format!(
            "graceful interrupt of pid {} is not supported on this platform",
            process.pid()
        )))
    }
}

/// Default strategy for the host platform
pub fn platform_strategy() -> Arc<dyn InterruptStrategy> {
    #[cfg(unix)]
    {
        Arc::new(SignalInterrupt)
    }

    #[cfg(not(unix))]
    {
        Arc::new(UnsupportedInterrupt)
    }
}
