//! Tool process supervisor

use std::io;
use std::net::TcpListener;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::capture::OutputCapture;
use crate::config::{LaunchMode, ToolConfig};
use crate::error::{ProcessError, Result};
use crate::interrupt::{platform_strategy, InterruptStrategy, ProcessHandle};
use crate::pipes::{pump, OutputReader, ProcessPipes};
use crate::resolve::resolve_executable;
use crate::termination::{TerminationInfo, TerminationListener};
use crate::types::ProcessState;
use crate::watcher::{StopRequest, Watcher};

/// State guarded by the supervisor lock
pub(crate) struct Inner {
    pub(crate) state: ProcessState,
    /// Present iff `state` is `Running`
    pub(crate) handle: Option<ProcessHandle>,
    pub(crate) stop_tx: Option<mpsc::Sender<StopRequest>>,
    /// Watcher of the latest lifetime; may outlive `Running` by a bounded drain
    pub(crate) watcher: Option<JoinHandle<()>>,
}

/// What the adapter gets back from a successful start
#[derive(Debug)]
pub enum Connection {
    /// Pipe mode: the live stdin/stdout handles
    Pipes(ProcessPipes),
    /// HTTP mode: the port the tool was told to listen on
    Http { port: u16 },
}

impl Connection {
    pub fn into_pipes(self) -> Option<ProcessPipes> {
        match self {
            Connection::Pipes(pipes) => Some(pipes),
            Connection::Http { .. } => None,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Connection::Pipes(_) => None,
            Connection::Http { port } => Some(*port),
        }
    }
}

/// Owns the tool process and its lifecycle.
///
/// All transitions go through one lock:
///
/// ```text
/// Stopped --start--> Running --kill--> Stopped
///                       |
///                       +--exits on its own--> Dead
/// ```
///
/// `Stopped` and `Dead` are both terminal until the next `start`.
pub struct ProcessSupervisor {
    config: ToolConfig,
    inner: Arc<Mutex<Inner>>,
    interrupter: Arc<dyn InterruptStrategy>,
    notify_tx: mpsc::Sender<TerminationInfo>,
    listener: TerminationListener,
    #[cfg(test)]
    exit_gate: parking_lot::Mutex<Option<crate::watcher::ExitGate>>,
}

impl ProcessSupervisor {
    /// Create a supervisor using the platform interrupt strategy
    pub fn new(config: ToolConfig) -> Self {
        Self::with_interrupt_strategy(config, platform_strategy())
    }

    /// Create a supervisor with an injected interrupt strategy
    pub fn with_interrupt_strategy(
        config: ToolConfig,
        interrupter: Arc<dyn InterruptStrategy>,
    ) -> Self {
        let (notify_tx, listener) = TerminationListener::channel();
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: ProcessState::Stopped,
                handle: None,
                stop_tx: None,
                watcher: None,
            })),
            interrupter,
            notify_tx,
            listener,
            #[cfg(test)]
            exit_gate: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Launch the tool in `mode`.
    ///
    /// Fails with [`ProcessError::AlreadyRunning`] while a process is live.
    /// Configuration and spawn failures leave the state untouched.
    pub async fn start(&self, mode: LaunchMode) -> Result<Connection> {
        let mut inner = self.inner.lock().await;

        if inner.state == ProcessState::Running {
            return Err(ProcessError::AlreadyRunning);
        }

        // The previous lifetime's record must be offered before it can be discarded.
        if let Some(previous) = inner.watcher.take() {
            if let Err(e) = previous.await {
                debug!(error = %e, "Previous watcher task failed");
            }
        }

        self.config.validate()?;
        let executable = resolve_executable(&self.config.executable)?;

        let port = match mode {
            LaunchMode::Pipe => None,
            LaunchMode::Http => Some(match self.config.http_port {
                Some(port) => port,
                None => ephemeral_port()?,
            }),
        };
        let args = self.config.args(mode, port);
        let save_output = self.config.save_output;

        let mut cmd = Command::new(&executable);
        cmd.args(&args).kill_on_drop(true);

        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        match mode {
            LaunchMode::Pipe => {
                cmd.stdin(Stdio::piped());
                cmd.stdout(Stdio::piped());
            }
            LaunchMode::Http => {
                cmd.stdin(Stdio::null());
                cmd.stdout(if save_output {
                    Stdio::piped()
                } else {
                    Stdio::null()
                });
            }
        }
        cmd.stderr(if save_output {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        #[cfg(unix)]
        if self.config.new_process_group {
            cmd.process_group(0);
        }

        debug!(
            executable = %executable.display(),
            args = ?args,
            mode = %mode,
            "Spawning tool process"
        );

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or_else(|| {
            ProcessError::SpawnFailed(io::Error::new(
                io::ErrorKind::Other,
                "Failed to get process ID",
            ))
        })?;
        let handle = ProcessHandle::new(pid, cfg!(unix) && self.config.new_process_group);

        let capture = save_output.then(OutputCapture::new);
        let mut pumps = Vec::new();

        let connection = match (mode, port) {
            (LaunchMode::Http, Some(port)) => {
                if let Some(stdout) = child.stdout.take() {
                    pumps.push(tokio::spawn(pump(stdout, capture.clone(), None)));
                }
                Connection::Http { port }
            }
            _ => {
                let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
                let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
                let (forward, reader) = OutputReader::channel();
                pumps.push(tokio::spawn(pump(stdout, capture.clone(), Some(forward))));
                Connection::Pipes(ProcessPipes {
                    stdin,
                    stdout: reader,
                })
            }
        };

        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, capture.clone(), None)));
        }

        while let Some(stale) = self.listener.try_recv() {
            debug!(state = %stale.state(), "Discarding unobserved termination record");
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        inner.state = ProcessState::Running;
        inner.handle = Some(handle);
        inner.stop_tx = Some(stop_tx);

        let watcher = Watcher {
            inner: Arc::clone(&self.inner),
            stop_rx,
            notify_tx: self.notify_tx.clone(),
            capture,
            pumps,
            handle,
            #[cfg(test)]
            exit_gate: self.exit_gate.lock().take(),
        };
        inner.watcher = Some(tokio::spawn(watcher.run(child)));

        info!(
            pid = %pid,
            executable = %executable.display(),
            mode = %mode,
            "Tool process started"
        );

        Ok(connection)
    }

    /// Ask the tool to end itself gracefully.
    ///
    /// Succeeds without doing anything unless running. Strategy errors are
    /// returned; the lifecycle state never changes here.
    pub async fn interrupt(&self) -> Result<()> {
        let inner = self.inner.lock().await;

        if inner.state != ProcessState::Running {
            return Ok(());
        }

        match inner.handle {
            Some(ref handle) => {
                debug!(pid = %handle.pid(), "Interrupting tool process");
                self.interrupter.interrupt(handle)
            }
            None => Ok(()),
        }
    }

    /// Forcibly stop the tool.
    ///
    /// No-op unless running. Otherwise commits `Stopped`, hands the lock to
    /// the watcher and returns once the watcher has reaped the child and
    /// offered the termination record.
    pub async fn kill(&self) {
        let mut guard = Arc::clone(&self.inner).lock_owned().await;

        if guard.state != ProcessState::Running {
            return;
        }

        guard.state = ProcessState::Stopped;
        let Some(stop_tx) = guard.stop_tx.take() else {
            guard.handle = None;
            return;
        };

        let pid = guard.handle.map(|h| h.pid());
        debug!(pid = ?pid, "Handing kill request to watcher");

        let (ack, rejoin) = oneshot::channel();
        if let Err(mpsc::error::SendError(request)) =
            stop_tx.send(StopRequest { guard, ack }).await
        {
            // The watcher is gone; nothing is left to reap.
            let mut guard = request.guard;
            guard.handle = None;
            return;
        }

        let _ = rejoin.await;
        info!(pid = ?pid, "Tool process killed");
    }

    /// Current lifecycle state
    pub async fn status(&self) -> ProcessState {
        self.inner.lock().await.state
    }

    /// Handle of the live child, if running
    pub async fn process_handle(&self) -> Option<ProcessHandle> {
        self.inner.lock().await.handle
    }

    /// Source of termination records.
    ///
    /// Every call returns the same source.
    pub fn subscribe(&self) -> TerminationListener {
        self.listener.clone()
    }

    #[cfg(test)]
    fn set_exit_gate(&self, gate: crate::watcher::ExitGate) {
        *self.exit_gate.lock() = Some(gate);
    }
}

/// Ask the OS for a free loopback port.
///
/// The reserving listener is closed before the tool starts, so another process
/// can still take the port in between; the tool then fails to bind and exits.
fn ephemeral_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn missing_pipe(name: &str) -> ProcessError {
    ProcessError::SpawnFailed(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("child {name} was not captured"),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::watcher::ExitGate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(10);

    fn shell(script: &str) -> ToolConfig {
        ToolConfig::new("sh").custom_args(["-c", script])
    }

    fn counting_strategy(
        calls: Arc<AtomicUsize>,
        result: fn() -> Result<()>,
    ) -> Arc<dyn InterruptStrategy> {
        Arc::new(move |_: &ProcessHandle| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            result()
        })
    }

    async fn next_record(listener: &TerminationListener) -> TerminationInfo {
        timeout(WAIT, listener.recv())
            .await
            .expect("termination record in time")
            .expect("listener open")
    }

    #[tokio::test]
    async fn test_start_then_kill_is_stopped_and_clean() {
        let supervisor = ProcessSupervisor::new(shell("exec sleep 30"));
        let listener = supervisor.subscribe();

        supervisor.start(LaunchMode::Pipe).await.unwrap();
        assert_eq!(supervisor.status().await, ProcessState::Running);
        assert!(supervisor.process_handle().await.is_some());

        tokio::time::sleep(Duration::from_millis(10)).await;
        timeout(WAIT, supervisor.kill()).await.unwrap();

        assert_eq!(supervisor.status().await, ProcessState::Stopped);
        assert!(supervisor.process_handle().await.is_none());

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Stopped);
        assert!(record.error().is_none());
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_clean_spontaneous_exit_is_dead_without_error() {
        let config = shell("sleep 0.05; printf hello").save_output(true);
        let supervisor = ProcessSupervisor::new(config);
        let listener = supervisor.subscribe();

        let _pipes = supervisor.start(LaunchMode::Pipe).await.unwrap();

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Dead);
        assert!(record.error().is_none());
        assert_eq!(record.combined_output(), "hello");
        assert_eq!(supervisor.status().await, ProcessState::Dead);
        assert!(supervisor.process_handle().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_spontaneous_exit_reports_error_and_output() {
        let config = shell("echo out; echo oops >&2; exit 3").save_output(true);
        let supervisor = ProcessSupervisor::new(config);
        let listener = supervisor.subscribe();

        supervisor.start(LaunchMode::Http).await.unwrap();

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Dead);
        assert_eq!(record.error().and_then(|e| e.code()), Some(3));
        assert!(record.combined_output().contains("out\n"));
        assert!(record.combined_output().contains("oops\n"));
    }

    #[tokio::test]
    async fn test_output_not_captured_unless_requested() {
        let supervisor = ProcessSupervisor::new(shell("echo quiet"));
        let listener = supervisor.subscribe();

        supervisor.start(LaunchMode::Http).await.unwrap();

        let record = next_record(&listener).await;
        assert_eq!(record.combined_output(), "");
    }

    #[tokio::test]
    async fn test_double_kill_is_noop() {
        let supervisor = ProcessSupervisor::new(shell("exec sleep 30"));
        let listener = supervisor.subscribe();
        supervisor.start(LaunchMode::Pipe).await.unwrap();

        supervisor.kill().await;
        supervisor.kill().await;

        assert_eq!(supervisor.status().await, ProcessState::Stopped);
        next_record(&listener).await;
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_kill_when_never_started_is_noop() {
        let supervisor = ProcessSupervisor::new(shell("true"));
        supervisor.kill().await;
        assert_eq!(supervisor.status().await, ProcessState::Stopped);
        assert!(supervisor.subscribe().try_recv().is_none());
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let supervisor = ProcessSupervisor::new(shell("exec sleep 30"));
        supervisor.start(LaunchMode::Pipe).await.unwrap();
        let before = supervisor.process_handle().await;

        let second = supervisor.start(LaunchMode::Pipe).await;
        assert!(matches!(second, Err(ProcessError::AlreadyRunning)));
        assert_eq!(supervisor.process_handle().await, before);
        assert_eq!(supervisor.status().await, ProcessState::Running);

        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_restart_after_dead() {
        let supervisor = ProcessSupervisor::new(shell("exit 0"));
        let listener = supervisor.subscribe();

        supervisor.start(LaunchMode::Pipe).await.unwrap();
        next_record(&listener).await;
        assert_eq!(supervisor.status().await, ProcessState::Dead);

        supervisor.start(LaunchMode::Pipe).await.unwrap();
        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Dead);
    }

    #[tokio::test]
    async fn test_stale_record_discarded_on_restart() {
        let supervisor = ProcessSupervisor::new(shell("exit 4"));
        let listener = supervisor.subscribe();

        supervisor.start(LaunchMode::Pipe).await.unwrap();
        // Let the first lifetime end without taking its record.
        timeout(WAIT, async {
            while supervisor.status().await == ProcessState::Running {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let supervisor = ProcessSupervisor {
            config: shell("exit 0"),
            ..supervisor
        };
        supervisor.start(LaunchMode::Pipe).await.unwrap();

        let record = next_record(&listener).await;
        assert!(record.error().is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let not_executable = dir.path().join("tool");
        std::fs::write(&not_executable, b"not a program").unwrap();

        let supervisor =
            ProcessSupervisor::new(ToolConfig::new(not_executable.to_str().unwrap()));
        let result = supervisor.start(LaunchMode::Pipe).await;

        assert!(matches!(result, Err(ProcessError::SpawnFailed(_))));
        assert_eq!(supervisor.status().await, ProcessState::Stopped);
        assert!(supervisor.process_handle().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_is_config_error() {
        let supervisor = ProcessSupervisor::new(ToolConfig::new("/no/such/tool"));
        let result = supervisor.start(LaunchMode::Pipe).await;
        assert!(matches!(
            result,
            Err(ProcessError::ExecutableNotFound { .. })
        ));
        assert_eq!(supervisor.status().await, ProcessState::Stopped);

        let supervisor = ProcessSupervisor::new(ToolConfig::new(""));
        let result = supervisor.start(LaunchMode::Pipe).await;
        assert!(matches!(result, Err(ProcessError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_interrupt_when_stopped_skips_strategy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let supervisor = ProcessSupervisor::with_interrupt_strategy(
            shell("exec sleep 30"),
            counting_strategy(Arc::clone(&calls), || Ok(())),
        );

        supervisor.interrupt().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interrupt_error_is_returned_and_state_kept() {
        let calls = Arc::new(AtomicUsize::new(0));
        let supervisor = ProcessSupervisor::with_interrupt_strategy(
            shell("exec sleep 30"),
            counting_strategy(Arc::clone(&calls), || {
                Err(ProcessError::InterruptFailed("refused".to_string()))
            }),
        );
        supervisor.start(LaunchMode::Pipe).await.unwrap();

        let result = supervisor.interrupt().await;
        assert!(matches!(result, Err(ProcessError::InterruptFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.status().await, ProcessState::Running);

        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_signal_interrupt_ends_tool() {
        let supervisor = ProcessSupervisor::new(shell("exec sleep 30"));
        let listener = supervisor.subscribe();
        supervisor.start(LaunchMode::Pipe).await.unwrap();

        supervisor.interrupt().await.unwrap();

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Dead);
        assert!(record.error().is_some());
    }

    #[tokio::test]
    async fn test_http_mode_reports_port_and_no_pipes() {
        let supervisor = ProcessSupervisor::new(shell("exec sleep 30"));
        let connection = supervisor.start(LaunchMode::Http).await.unwrap();

        let port = connection.port().expect("http port");
        assert!(port > 0);
        assert!(connection.into_pipes().is_none());

        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_fixed_http_port_substituted() {
        let config = ToolConfig::new("sh")
            .http_args(["-c", "test \"$0\" = 4567 && exec sleep 30", "{port}"])
            .http_port(4567);
        let supervisor = ProcessSupervisor::new(config);

        let connection = supervisor.start(LaunchMode::Http).await.unwrap();
        assert_eq!(connection.port(), Some(4567));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(supervisor.status().await, ProcessState::Running);
        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_kill_reaps_process_group() {
        let supervisor = ProcessSupervisor::new(shell("sleep 30 & wait"));
        let listener = supervisor.subscribe();
        supervisor.start(LaunchMode::Pipe).await.unwrap();

        timeout(WAIT, supervisor.kill()).await.unwrap();
        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Stopped);
    }

    async fn wait_until_not_running(supervisor: &ProcessSupervisor) {
        timeout(Duration::from_secs(2), async {
            while supervisor.status().await.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("status left Running promptly");
    }

    #[tokio::test]
    async fn test_exit_with_lingering_descendant_turns_dead_promptly() {
        let config = shell("sleep 5 & echo parent; exit 0").save_output(true);
        let supervisor = ProcessSupervisor::new(config);
        let listener = supervisor.subscribe();

        let _pipes = supervisor.start(LaunchMode::Pipe).await.unwrap();
        wait_until_not_running(&supervisor).await;
        assert_eq!(supervisor.status().await, ProcessState::Dead);
        assert!(supervisor.process_handle().await.is_none());

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Dead);
        assert!(record.error().is_none());
        assert!(record.combined_output().contains("parent"));

        timeout(Duration::from_secs(1), supervisor.kill()).await.unwrap();
        timeout(Duration::from_secs(1), supervisor.status())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restart_while_descendant_holds_old_output() {
        let supervisor = ProcessSupervisor::new(shell("sleep 5 & exit 0"));
        let listener = supervisor.subscribe();

        let _old = supervisor.start(LaunchMode::Pipe).await.unwrap();
        wait_until_not_running(&supervisor).await;

        let started = timeout(Duration::from_secs(2), supervisor.start(LaunchMode::Pipe))
            .await
            .expect("restart not blocked by the old pipes");
        let _new = started.unwrap();

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Dead);
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_kill_without_process_group_is_bounded() {
        let config = shell("sleep 5 & wait").new_process_group(false);
        let supervisor = ProcessSupervisor::new(config);
        let listener = supervisor.subscribe();

        supervisor.start(LaunchMode::Pipe).await.unwrap();
        assert!(!supervisor.process_handle().await.unwrap().is_group_leader());
        tokio::time::sleep(Duration::from_millis(50)).await;

        timeout(Duration::from_secs(3), supervisor.kill())
            .await
            .expect("kill returned while a descendant holds stdout");
        timeout(Duration::from_secs(1), supervisor.status())
            .await
            .unwrap();
        assert_eq!(supervisor.status().await, ProcessState::Stopped);

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Stopped);
        assert!(record.error().is_none());
    }

    #[tokio::test]
    async fn test_kill_after_exit_observed_takes_down_descendants() {
        let supervisor = Arc::new(ProcessSupervisor::new(shell("sleep 5 & exit 3")));
        let listener = supervisor.subscribe();

        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        supervisor.set_exit_gate(ExitGate {
            reached: reached_tx,
            release: release_rx,
        });

        let _pipes = supervisor.start(LaunchMode::Pipe).await.unwrap();
        timeout(WAIT, reached_rx).await.unwrap().unwrap();

        let killer = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.kill().await })
        };
        timeout(WAIT, async {
            while supervisor.inner.try_lock().is_ok() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        release_tx.send(()).unwrap();
        timeout(Duration::from_secs(3), killer)
            .await
            .expect("kill bounded once the exit was observed")
            .unwrap();

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Stopped);
        assert!(record.error().is_none());
    }

    #[test]
    fn test_ephemeral_port_is_bindable() {
        let port = ephemeral_port().unwrap();
        assert!(port > 0);
        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }

    #[tokio::test]
    async fn test_kill_wins_when_it_takes_lock_before_exit_is_recorded() {
        let supervisor = Arc::new(ProcessSupervisor::new(shell("exit 3")));
        let listener = supervisor.subscribe();

        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        supervisor.set_exit_gate(ExitGate {
            reached: reached_tx,
            release: release_rx,
        });

        supervisor.start(LaunchMode::Pipe).await.unwrap();
        timeout(WAIT, reached_rx).await.unwrap().unwrap();

        let killer = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.kill().await })
        };

        // kill holds the lock until the watcher acknowledges
        timeout(WAIT, async {
            while supervisor.inner.try_lock().is_ok() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        release_tx.send(()).unwrap();
        timeout(WAIT, killer).await.unwrap().unwrap();

        assert_eq!(supervisor.status().await, ProcessState::Stopped);
        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Stopped);
        assert!(record.error().is_none());
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_exit_recorded_before_kill_makes_kill_noop() {
        let supervisor = Arc::new(ProcessSupervisor::new(shell("exit 3")));
        let listener = supervisor.subscribe();

        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        supervisor.set_exit_gate(ExitGate {
            reached: reached_tx,
            release: release_rx,
        });

        supervisor.start(LaunchMode::Pipe).await.unwrap();
        timeout(WAIT, reached_rx).await.unwrap().unwrap();
        release_tx.send(()).unwrap();

        let record = next_record(&listener).await;
        assert_eq!(record.state(), ProcessState::Dead);
        assert_eq!(record.error().and_then(|e| e.code()), Some(3));

        supervisor.kill().await;
        assert_eq!(supervisor.status().await, ProcessState::Dead);
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_subscribe_returns_shared_source() {
        let supervisor = ProcessSupervisor::new(shell("exit 0"));
        let first = supervisor.subscribe();
        let second = supervisor.subscribe();

        supervisor.start(LaunchMode::Pipe).await.unwrap();

        next_record(&first).await;
        assert!(second.try_recv().is_none());
    }
}
