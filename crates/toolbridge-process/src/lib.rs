//! # toolbridge-process
//!
//! **Purpose**: Lifecycle supervision for one long-lived external analysis
//! tool (radare2 and friends)
//!
//! Launches the tool in pipe or HTTP mode, tracks it through
//! `Stopped -> Running -> Stopped | Dead`, and reports every end of a process
//! lifetime exactly once.
//!
//! ## Features
//!
//! - **Launch Modes**: stdin/stdout pipes or a local HTTP port
//! - **Serialized Lifecycle**: start, interrupt, kill and exit observation
//!   never interleave; an explicit kill always beats a racing exit
//! - **Graceful Interrupt**: pluggable [`InterruptStrategy`]
//! - **Process Group Kill**: the whole tool tree goes down on unix
//! - **Output Capture**: combined stdout/stderr attached to the termination
//!   record
//!
//! ## Usage
//!
//! ```rust,no_run
//! use toolbridge_process::{LaunchMode, ProcessSupervisor, ToolConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = ProcessSupervisor::new(ToolConfig::radare2("radare2").save_output(true));
//! let listener = supervisor.subscribe();
//!
//! let pipes = supervisor.start(LaunchMode::Pipe).await?.into_pipes();
//!
//! supervisor.kill().await;
//! if let Some(record) = listener.recv().await {
//!     println!("tool ended as {}", record.state());
//! }
//! # drop(pipes);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod pipes;
pub mod resolve;
pub mod supervisor;
pub mod termination;
pub mod types;
mod watcher;

pub use capture::OutputCapture;
pub use config::{LaunchMode, ToolConfig, PORT_PLACEHOLDER};
pub use error::{ExitError, ProcessError, Result};
#[cfg(unix)]
pub use interrupt::SignalInterrupt;
pub use interrupt::{platform_strategy, InterruptStrategy, ProcessHandle, UnsupportedInterrupt};
pub use pipes::{OutputReader, ProcessPipes};
pub use resolve::resolve_executable;
pub use supervisor::{Connection, ProcessSupervisor};
pub use termination::{TerminationInfo, TerminationListener};
pub use types::ProcessState;
