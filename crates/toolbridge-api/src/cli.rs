//! Pipe-mode adapter
//!
//! One command per line on stdin; each response on stdout ends with the
//! configured sentinel byte (NUL for `radare2 -q -0`).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use toolbridge_process::{
    LaunchMode, ProcessPipes, ProcessState, ProcessSupervisor, TerminationListener, ToolConfig,
};

use crate::api::{detach_debugger, ensure_running, trim_response, ToolApi};
use crate::error::{ApiError, Result};

/// Talks to the tool over its stdin/stdout
pub struct CliApi {
    supervisor: Arc<ProcessSupervisor>,
    /// Held for a whole command round-trip
    pipes: Mutex<Option<ProcessPipes>>,
}

impl CliApi {
    /// Create an adapter with its own supervisor
    pub fn new(config: ToolConfig) -> Self {
        Self::with_supervisor(Arc::new(ProcessSupervisor::new(config)))
    }

    /// Create an adapter around an existing supervisor
    pub fn with_supervisor(supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            supervisor,
            pipes: Mutex::new(None),
        }
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    fn sentinel(&self) -> u8 {
        self.supervisor.config().response_sentinel
    }
}

/// Read one sentinel-terminated frame, without the sentinel
async fn read_frame(pipes: &mut ProcessPipes, sentinel: u8) -> Result<Vec<u8>> {
    let mut frame = Vec::new();
    pipes.stdout.read_until(sentinel, &mut frame).await?;

    match frame.last() {
        Some(&last) if last == sentinel => {
            frame.pop();
            Ok(frame)
        }
        _ => Err(ApiError::UnexpectedEof),
    }
}

#[async_trait]
impl ToolApi for CliApi {
    async fn start(&self) -> Result<()> {
        let mut slot = self.pipes.lock().await;

        let mut pipes = self
            .supervisor
            .start(LaunchMode::Pipe)
            .await?
            .into_pipes()
            .ok_or(ApiError::NotStarted)?;

        if self.supervisor.config().await_ready_sentinel {
            if let Err(e) = read_frame(&mut pipes, self.sentinel()).await {
                debug!(error = %e, "Tool never signalled readiness, killing it");
                self.supervisor.kill().await;
                return Err(e);
            }
        }

        *slot = Some(pipes);
        Ok(())
    }

    async fn interrupt(&self) -> Result<()> {
        Ok(self.supervisor.interrupt().await?)
    }

    async fn kill(&self) {
        if self.supervisor.config().detach_on_stop {
            detach_debugger(self).await;
        }
        self.supervisor.kill().await;
        self.pipes.lock().await.take();
    }

    async fn status(&self) -> ProcessState {
        self.supervisor.status().await
    }

    fn subscribe(&self) -> TerminationListener {
        self.supervisor.subscribe()
    }

    async fn execute_bytes(&self, command: &str) -> Result<Vec<u8>> {
        if command.contains('\n') {
            return Err(ApiError::InvalidCommand(
                "command must not contain a newline".to_string(),
            ));
        }
        ensure_running(self.supervisor.status().await)?;

        let mut slot = self.pipes.lock().await;
        let pipes = slot.as_mut().ok_or(ApiError::NotStarted)?;

        debug!(command = %command, "Sending command over pipe");
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');
        pipes.stdin.write_all(&line).await?;
        pipes.stdin.flush().await?;

        let response = read_frame(pipes, self.sentinel()).await?;
        if self.supervisor.config().trim_output {
            Ok(trim_response(response, self.sentinel()))
        } else {
            Ok(response)
        }
    }
}
