//! Common adapter surface

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use toolbridge_process::{ProcessState, TerminationListener};
use tracing::debug;

use crate::error::{ApiError, Result};

/// A running tool that accepts text commands.
///
/// Implemented by the pipe and HTTP adapters; callers that don't care how
/// commands travel hold an `Arc<dyn ToolApi>`.
#[async_trait]
pub trait ToolApi: Send + Sync {
    /// Launch the tool and connect to it
    async fn start(&self) -> Result<()>;

    /// Politely ask the tool to stop
    async fn interrupt(&self) -> Result<()>;

    /// Forcibly stop the tool
    async fn kill(&self);

    /// Stop the tool if it is running, then start it again
    async fn restart(&self) -> Result<()> {
        self.kill().await;
        self.start().await
    }

    /// Current lifecycle state
    async fn status(&self) -> ProcessState;

    /// Source of termination records
    fn subscribe(&self) -> TerminationListener;

    /// Run one command and return the raw response
    async fn execute_bytes(&self, command: &str) -> Result<Vec<u8>>;

    /// Run one command and return the response as text
    async fn execute(&self, command: &str) -> Result<String> {
        let bytes = self.execute_bytes(command).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Run a command whose response is JSON (radare2's `j`-suffixed commands)
pub async fn execute_json<T, A>(api: &A, command: &str) -> Result<T>
where
    T: DeserializeOwned,
    A: ToolApi + ?Sized,
{
    let bytes = api.execute_bytes(command).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// radare2 command that detaches the debugger from its target
pub(crate) const DETACH_COMMAND: &str = "dp-";

const DETACH_TIMEOUT: Duration = Duration::from_secs(2);

/// Detach the debugger so the debuggee outlives the kill that follows.
///
/// Best effort: failures are logged and the kill goes ahead regardless.
pub(crate) async fn detach_debugger<A>(api: &A)
where
    A: ToolApi + ?Sized,
{
    if !api.status().await.is_running() {
        return;
    }

    match timeout(DETACH_TIMEOUT, api.execute_bytes(DETACH_COMMAND)).await {
        Ok(Ok(_)) => debug!("Debugger detached before stop"),
        Ok(Err(e)) => debug!(error = %e, "Failed to detach debugger before stop"),
        Err(_) => debug!("Timed out detaching debugger before stop"),
    }
}

/// Fail fast unless the tool is running
pub(crate) fn ensure_running(state: ProcessState) -> Result<()> {
    if state.is_running() {
        Ok(())
    } else {
        Err(ApiError::NotRunning { state })
    }
}

/// Strip surrounding ASCII whitespace and sentinel bytes
pub(crate) fn trim_response(mut bytes: Vec<u8>, sentinel: u8) -> Vec<u8> {
    let junk = |b: &u8| b.is_ascii_whitespace() || *b == sentinel;

    let end = bytes.iter().rposition(|b| !junk(b)).map_or(0, |i| i + 1);
    bytes.truncate(end);
    let start = bytes.iter().position(|b| !junk(b)).unwrap_or(bytes.len());
    bytes.drain(..start);
    bytes
}
