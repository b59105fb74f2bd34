//! Per-server configuration entries

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::RpcError;

pub const DEFAULT_STARTUP_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: f64 = 5.0;

/// Which protocol a server speaks on top of the shared stdio JSON-RPC
/// transport. Decides the handshake payload, shutdown sequence and how
/// capabilities are listed and invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    #[default]
    Mcp,
    Lsp,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Mcp => "mcp",
            ServerKind::Lsp => "lsp",
        }
    }
}

/// A named helper server. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Unique key; filled from the entry's key in the config file.
    #[serde(default)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Merged over the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Seconds allowed for spawn + initialize.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: ServerKind,
    /// Extensions (without the dot) routed to this server.
    #[serde(default)]
    pub file_extensions: Vec<String>,
    #[serde(default)]
    pub language_id: Option<String>,
    #[serde(default)]
    pub initialization_options: Option<Value>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: f64,
}

fn default_true() -> bool {
    true
}

fn default_startup_timeout() -> f64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

fn default_request_timeout() -> f64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_shutdown_timeout() -> f64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

impl ServerConfig {
    /// Minimal config with defaults for everything but the command.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            auto_start: true,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT_SECS,
            enabled: true,
            kind: ServerKind::default(),
            file_extensions: Vec::new(),
            language_id: None,
            initialization_options: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kind(mut self, kind: ServerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn startup_duration(&self) -> Duration {
        seconds(self.startup_timeout)
    }

    pub fn request_duration(&self) -> Duration {
        seconds(self.request_timeout)
    }

    pub fn shutdown_duration(&self) -> Duration {
        seconds(self.shutdown_timeout)
    }

    /// Reject entries that cannot be spawned or would overflow timers.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.name.trim().is_empty() {
            return Err(RpcError::Config("server name must not be empty".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(RpcError::Config(format!(
                "server '{}' has an empty command",
                self.name
            )));
        }
        for (field, value) in [
            ("startupTimeout", self.startup_timeout),
            ("requestTimeout", self.request_timeout),
            ("shutdownTimeout", self.shutdown_timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RpcError::Config(format!(
                    "server '{}': {} must be a non-negative number, got {}",
                    self.name, field, value
                )));
            }
        }
        Ok(())
    }
}

/// Shape of one configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "mcpServers", alias = "servers", default)]
    pub servers: BTreeMap<String, ServerConfig>,
}
