//! HTTP-mode adapter
//!
//! The tool serves `GET <base>/cmd/<url-encoded command>` (radare2's `=h`
//! web server) and answers with the command output as the body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use url::Url;

use toolbridge_process::{
    LaunchMode, ProcessState, ProcessSupervisor, TerminationListener, ToolConfig,
};

use crate::api::{detach_debugger, ensure_running, trim_response, ToolApi};
use crate::error::{ApiError, Result};

/// Sends commands to an already-listening tool web server
#[derive(Debug, Clone)]
pub struct HttpCommandClient {
    client: reqwest::Client,
    base: Url,
    trim_output: bool,
}

impl HttpCommandClient {
    /// Create a client for `base` with its own connection pool
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::BuildError(e.to_string()))?;
        Self::with_client(client, base)
    }

    /// Create a client for `base` sharing an existing reqwest client
    pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self> {
        let base = base
            .parse::<Url>()
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!("{base} cannot be a base URL")));
        }

        Ok(Self {
            client,
            base,
            trim_output: true,
        })
    }

    /// Enable/disable response trimming
    pub fn trim_output(mut self, trim: bool) -> Self {
        self.trim_output = trim;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL that runs `command`
    pub fn command_url(&self, command: &str) -> Result<Url> {
        let url = format!(
            "{}/cmd/{}",
            self.base.as_str().trim_end_matches('/'),
            urlencoding::encode(command)
        );
        url.parse::<Url>()
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    /// Run one command and return the raw body
    pub async fn execute_bytes(&self, command: &str) -> Result<Vec<u8>> {
        let url = self.command_url(command)?;
        debug!("HTTP GET: {}", url);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status,
                body: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string()),
            });
        }

        let body = response.bytes().await?.to_vec();
        if self.trim_output {
            Ok(trim_response(body, 0))
        } else {
            Ok(body)
        }
    }

    /// Run one command and return the body as text
    pub async fn execute(&self, command: &str) -> Result<String> {
        let bytes = self.execute_bytes(command).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Launches the tool in HTTP mode and talks to its web server
pub struct HttpServerApi {
    supervisor: Arc<ProcessSupervisor>,
    address: Option<String>,
    client: Option<reqwest::Client>,
    commands: RwLock<Option<HttpCommandClient>>,
}

impl HttpServerApi {
    /// Create an adapter with its own supervisor
    pub fn new(config: ToolConfig) -> Self {
        Self::with_supervisor(Arc::new(ProcessSupervisor::new(config)))
    }

    /// Create an adapter around an existing supervisor
    pub fn with_supervisor(supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            supervisor,
            address: None,
            client: None,
            commands: RwLock::new(None),
        }
    }

    /// Target this base URL instead of `http://127.0.0.1:<port>`
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Use this reqwest client instead of building one
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    fn connect(&self, port: u16) -> Result<HttpCommandClient> {
        let config = self.supervisor.config();
        let base = self
            .address
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}"));

        let commands = match &self.client {
            Some(client) => HttpCommandClient::with_client(client.clone(), &base)?,
            None => HttpCommandClient::new(&base, Duration::from_millis(config.http_timeout_ms))?,
        };
        Ok(commands.trim_output(config.trim_output))
    }
}

#[async_trait]
impl ToolApi for HttpServerApi {
    async fn start(&self) -> Result<()> {
        let connection = self.supervisor.start(LaunchMode::Http).await?;
        let port = connection.port().ok_or(ApiError::NotStarted)?;

        let commands = match self.connect(port) {
            Ok(commands) => commands,
            Err(e) => {
                self.supervisor.kill().await;
                return Err(e);
            }
        };

        debug!(port = %port, base = %commands.base_url(), "HTTP adapter connected");
        *self.commands.write() = Some(commands);
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
        self.commands.write().take();
    }

    async fn status(&self) -> ProcessState {
        self.supervisor.status().await
    }

    fn subscribe(&self) -> TerminationListener {
        self.supervisor.subscribe()
    }

    async fn execute_bytes(&self, command: &str) -> Result<Vec<u8>> {
        ensure_running(self.supervisor.status().await)?;

        let commands = self.commands.read().clone().ok_or(ApiError::NotStarted)?;
        commands.execute_bytes(command).await
    }
}
