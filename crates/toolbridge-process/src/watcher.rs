//! Background exit watcher
//!
//! One watcher runs per process lifetime and is the only code that waits on
//! or kills the child. It wakes for one of two reasons:
//!
//! - the child exited on its own, or
//! - `kill` handed it a [`StopRequest`] carrying the supervisor lock.
//!
//! A kill that takes the lock before the watcher records a spontaneous exit
//! always wins: the watcher keeps `Stopped` and completes the handshake.
//! Either way exactly one [`TerminationInfo`] is offered, without blocking.
//!
//! Descendants of the tool can keep its output pipes open after the tool
//! itself is gone. Draining the pumps is therefore bounded by
//! [`PUMP_DRAIN_TIMEOUT`]; whatever arrived by then is what gets captured.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::capture::OutputCapture;
use crate::error::ExitError;
use crate::interrupt::ProcessHandle;
use crate::supervisor::Inner;
use crate::termination::TerminationInfo;
use crate::types::ProcessState;

/// How long output pumps may keep running once the child has been reaped
pub(crate) const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Lock handoff from `kill` to the watcher
pub(crate) struct StopRequest {
    pub(crate) guard: OwnedMutexGuard<Inner>,
    pub(crate) ack: oneshot::Sender<()>,
}

/// Pauses the watcher between observing an exit and recording it
#[cfg(test)]
pub(crate) struct ExitGate {
    pub(crate) reached: oneshot::Sender<()>,
    pub(crate) release: oneshot::Receiver<()>,
}

enum Wake {
    Exited(io::Result<ExitStatus>),
    StopRequested(StopRequest),
}

enum Settle {
    Stop(StopRequest),
    Commit(OwnedMutexGuard<Inner>),
}

pub(crate) struct Watcher {
    pub(crate) inner: Arc<Mutex<Inner>>,
    pub(crate) stop_rx: mpsc::Receiver<StopRequest>,
    pub(crate) notify_tx: mpsc::Sender<TerminationInfo>,
    pub(crate) capture: Option<OutputCapture>,
    pub(crate) pumps: Vec<JoinHandle<()>>,
    pub(crate) handle: ProcessHandle,
    #[cfg(test)]
    pub(crate) exit_gate: Option<ExitGate>,
}

impl Watcher {
    pub(crate) async fn run(mut self, mut child: Child) {
        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            Some(request) = self.stop_rx.recv() => Wake::StopRequested(request),
        };

        match wake {
            Wake::StopRequested(request) => self.stop(child, request).await,
            Wake::Exited(status) => self.exited(status).await,
        }
    }

    async fn stop(mut self, mut child: Child, request: StopRequest) {
        let pid = self.handle.pid();
        debug!(pid = %pid, "Stop requested, terminating tool process");

        terminate(&mut child, &self.handle);
        if let Err(e) = child.wait().await {
            debug!(pid = %pid, error = %e, "Error reaping killed tool process");
        }

        self.finish_stop(request).await;
    }

    async fn exited(mut self, status: io::Result<ExitStatus>) {
        let pid = self.handle.pid();
        let error = match status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(ExitError::Status(status)),
            Err(e) => Some(ExitError::Wait(e)),
        };
        debug!(pid = %pid, error = ?error, "Tool process exit observed");

        #[cfg(test)]
        if let Some(gate) = self.exit_gate.take() {
            let _ = gate.reached.send(());
            let _ = gate.release.await;
        }

        let inner = Arc::clone(&self.inner);
        let settle = tokio::select! {
            biased;
            Some(request) = self.stop_rx.recv() => Settle::Stop(request),
            guard = inner.lock_owned() => Settle::Commit(guard),
        };

        match settle {
            Settle::Stop(request) => {
                debug!(pid = %pid, "Kill won the race against exit");
                // The child is reaped; only leftover descendants can hold the pipes.
                terminate_group(&self.handle);
                self.finish_stop(request).await;
            }
            Settle::Commit(mut guard) => {
                if guard.state == ProcessState::Running {
                    guard.state = ProcessState::Dead;
                }
                guard.handle = None;
                guard.stop_tx = None;
                let state = guard.state;
                drop(guard);

                self.join_pumps().await;
                self.notify(state, error);
            }
        }
    }

    /// Complete the kill handshake while holding the handed-over lock
    async fn finish_stop(&mut self, request: StopRequest) {
        let StopRequest { mut guard, ack } = request;
        guard.handle = None;
        self.join_pumps().await;
        self.notify(guard.state, None);
        drop(guard);
        let _ = ack.send(());
    }

    async fn join_pumps(&mut self) {
        let deadline = Instant::now() + PUMP_DRAIN_TIMEOUT;
        for mut pump in self.pumps.drain(..) {
            match timeout_at(deadline, &mut pump).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Output pump task failed"),
                Err(_) => {
                    pump.abort();
                    debug!(pid = %self.handle.pid(), "Output still held open by a descendant, abandoning pump");
                }
            }
        }
    }

    fn notify(&self, state: ProcessState, error: Option<ExitError>) {
        let info = TerminationInfo {
            state,
            error,
            output: self
                .capture
                .as_ref()
                .map(OutputCapture::snapshot)
                .unwrap_or_default(),
        };

        match self.notify_tx.try_send(info) {
            Ok(()) => debug!(pid = %self.handle.pid(), state = %state, "Termination record offered"),
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                debug!(pid = %self.handle.pid(), "No listener slot free, dropping termination record")
            }
        }
    }
}

/// SIGKILL the child's process group. Returns false when there is none.
fn terminate_group(handle: &ProcessHandle) -> bool {
    #[cfg(unix)]
    if handle.is_group_leader() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Ok(pgid) = i32::try_from(handle.pid()) {
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) => return true,
                Err(e) => {
                    debug!(pid = %handle.pid(), error = %e, "Failed to kill process group")
                }
            }
        }
    }

    #[cfg(not(unix))]
    let _ = handle;

    false
}

fn terminate(child: &mut Child, handle: &ProcessHandle) {
    if terminate_group(handle) {
        return;
    }

    if let Err(e) = child.start_kill() {
        debug!(pid = %handle.pid(), error = %e, "Failed to kill tool process");
    }
}
