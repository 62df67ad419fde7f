//! # toolbridge-api
//!
//! Command adapters for a supervised analysis tool:
//!
//! - **Pipe mode** ([`CliApi`]): line-framed commands over stdin, sentinel
//!   framed responses over stdout
//! - **HTTP mode** ([`HttpServerApi`]): the tool's own web server, driven
//!   through [`HttpCommandClient`]
//!
//! Both adapters refuse commands unless the tool is running and leave the
//! lifecycle to [`toolbridge_process::ProcessSupervisor`].
//!
//! ```rust,no_run
//! use toolbridge_api::{CliApi, ToolApi};
//! use toolbridge_process::ToolConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let r2 = CliApi::new(ToolConfig::radare2("radare2").additional_args(["/bin/ls"]));
//! r2.start().await?;
//! println!("{}", r2.execute("pd 5").await?);
//! r2.kill().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod error;
pub mod http;

pub use api::{execute_json, ToolApi};
pub use cli::CliApi;
pub use error::{ApiError, Result};
pub use http::{HttpCommandClient, HttpServerApi};

/// Re-export commonly used types
pub use reqwest::StatusCode;
