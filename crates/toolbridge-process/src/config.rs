//! Tool launch configuration

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};

/// Placeholder in HTTP-mode arguments replaced by the listening port
pub const PORT_PLACEHOLDER: &str = "{port}";

/// How the tool talks to its adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Commands over stdin, responses over stdout
    Pipe,
    /// The tool serves commands over HTTP on a local port
    Http,
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchMode::Pipe => write!(f, "pipe"),
            LaunchMode::Http => write!(f, "http"),
        }
    }
}

/// Configuration for launching and talking to the tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable path or bare name resolved through `PATH`
    pub executable: String,
    /// Arguments used in pipe mode
    #[serde(default)]
    pub pipe_args: Vec<String>,
    /// Arguments used in HTTP mode (`{port}` is substituted)
    #[serde(default)]
    pub http_args: Vec<String>,
    /// Replaces the mode arguments entirely when set
    #[serde(default)]
    pub custom_args: Option<Vec<String>>,
    /// Appended after the mode arguments
    #[serde(default)]
    pub additional_args: Vec<String>,
    /// Fixed HTTP port (None = pick an ephemeral port)
    #[serde(default)]
    pub http_port: Option<u16>,
    /// Working directory (None = current dir)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment variables (added to parent env)
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Keep the combined output for the termination record
    #[serde(default)]
    pub save_output: bool,
    /// Launch the tool in its own process group (unix only)
    #[serde(default = "default_true")]
    pub new_process_group: bool,
    /// Byte that terminates a pipe-mode response
    #[serde(default)]
    pub response_sentinel: u8,
    /// Consume one sentinel-terminated banner right after start
    #[serde(default)]
    pub await_ready_sentinel: bool,
    /// Trim whitespace and sentinels from responses
    #[serde(default = "default_true")]
    pub trim_output: bool,
    /// HTTP adapter request timeout in milliseconds
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Adapters send `dp-` before killing so an attached debuggee survives
    #[serde(default)]
    pub detach_on_stop: bool,
}

impl ToolConfig {
    /// Create a configuration for an arbitrary tool
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            pipe_args: vec![],
            http_args: vec![],
            custom_args: None,
            additional_args: vec![],
            http_port: None,
            working_dir: None,
            env: HashMap::new(),
            save_output: false,
            new_process_group: true,
            response_sentinel: 0,
            await_ready_sentinel: false,
            trim_output: true,
            http_timeout_ms: default_http_timeout_ms(),
            detach_on_stop: false,
        }
    }

    /// Preset for radare2: quiet NUL-terminated pipe mode, `=h` web server
    pub fn radare2(executable: impl Into<String>) -> Self {
        Self {
            pipe_args: vec!["-q".to_string(), "-0".to_string()],
            http_args: vec![format!("-c=h{PORT_PLACEHOLDER}")],
            await_ready_sentinel: true,
            ..Self::new(executable)
        }
    }

    /// Parse a YAML configuration document
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).map_err(|e| ProcessError::ConfigLoad(e.to_string()))
    }

    /// Load a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ProcessError::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&source)
    }

    /// Set pipe-mode arguments
    pub fn pipe_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipe_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set HTTP-mode arguments
    pub fn http_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.http_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Use these arguments in every mode instead of the mode arguments
    pub fn custom_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Append arguments after the mode arguments
    pub fn additional_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    /// Attach radare2's debugger to a running process
    pub fn radare2_debug_pid(self, pid: u32) -> Self {
        self.additional_args(["-d".to_string(), pid.to_string()])
    }

    /// Attach radare2's debugger and detach again on stop, leaving the process alive
    pub fn radare2_debug_pid_detached(self, pid: u32) -> Self {
        self.radare2_debug_pid(pid).detach_on_stop(true)
    }

    /// Turn off the radare2 web server sandbox
    pub fn radare2_disable_http_sandbox(mut self) -> Self {
        self.http_args
            .extend(["-e".to_string(), "http.sandbox=false".to_string()]);
        self
    }

    /// Set a fixed HTTP port
    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    /// Set working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Enable/disable combined output capture
    pub fn save_output(mut self, save: bool) -> Self {
        self.save_output = save;
        self
    }

    /// Enable/disable launching into a new process group
    pub fn new_process_group(mut self, enabled: bool) -> Self {
        self.new_process_group = enabled;
        self
    }

    /// Set the response sentinel byte
    pub fn response_sentinel(mut self, sentinel: u8) -> Self {
        self.response_sentinel = sentinel;
        self
    }

    /// Enable/disable consuming the startup sentinel
    pub fn await_ready_sentinel(mut self, enabled: bool) -> Self {
        self.await_ready_sentinel = enabled;
        self
    }

    /// Enable/disable response trimming
    pub fn trim_output(mut self, trim: bool) -> Self {
        self.trim_output = trim;
        self
    }

    /// Set the HTTP request timeout
    pub fn http_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.http_timeout_ms = timeout_ms;
        self
    }

    /// Enable/disable detaching the debugger before a kill
    pub fn detach_on_stop(mut self, detach: bool) -> Self {
        self.detach_on_stop = detach;
        self
    }

    /// Check the configuration before launching
    pub fn validate(&self) -> Result<()> {
        if self.executable.trim().is_empty() {
            return Err(ProcessError::InvalidConfig(
                "executable path is empty".to_string(),
            ));
        }
        if self.http_timeout_ms == 0 {
            return Err(ProcessError::InvalidConfig(
                "http_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Final argument vector for a launch in `mode`
    ///
    /// `port` replaces [`PORT_PLACEHOLDER`] in the mode arguments; with no
    /// port the placeholder is removed.
    pub fn args(&self, mode: LaunchMode, port: Option<u16>) -> Vec<String> {
        if let Some(custom) = &self.custom_args {
            return custom.clone();
        }

        let port_text = port.map(|p| p.to_string()).unwrap_or_default();
        let mode_args = match mode {
            LaunchMode::Pipe => &self.pipe_args,
            LaunchMode::Http => &self.http_args,
        };

        mode_args
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port_text))
            .chain(self.additional_args.iter().cloned())
            .collect()
    }
}

fn default_true() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    5000
}
