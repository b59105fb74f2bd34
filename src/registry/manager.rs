//! Registry of named server connections
//!
//! Owns every [`RpcClient`]. Callers get shared handles, but connections are
//! only created by `start` and only torn down by `stop`.

use crate::capability::{RemoteCapabilityDescriptor, ToolOutput};
use crate::config::{ConfigLoader, ServerConfig, ServerKind};
use crate::registry::routing::{running_in_priority_order, ExtensionMap};
use crate::rpc::RpcClient;
use crate::types::{Result, RpcError, ServerStatus};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use path_clean::PathClean;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome of auto-starting the configured servers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StartupReport {
    pub started: Vec<String>,
    /// Server name and the error that stopped it.
    pub failed: Vec<(String, String)>,
    /// Disabled, or not marked for auto-start.
    pub skipped: Vec<String>,
}

impl StartupReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Snapshot of one configured server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerReport {
    pub name: String,
    pub kind: ServerKind,
    pub command: String,
    pub enabled: bool,
    pub auto_start: bool,
    pub status: ServerStatus,
    pub pid: Option<u32>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Result of a routed tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub server: String,
    pub tool: String,
    pub kind: ServerKind,
    pub payload: Value,
}

impl ToolCallResult {
    /// Normalized text form of the payload.
    pub fn output(&self) -> ToolOutput {
        ToolOutput::from_payload(self.kind, &self.tool, &self.payload)
    }
}

/// Named servers, their configuration and their live connections.
pub struct Registry {
    workspace_root: PathBuf,
    /// Priority order: first appearance across config sources.
    configs: RwLock<Vec<ServerConfig>>,
    extensions: RwLock<ExtensionMap>,
    connections: RwLock<HashMap<String, Arc<RpcClient>>>,
}

impl Registry {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = workspace_root.into();
        let workspace_root = if root.is_absolute() {
            root.clean()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root).clean())
                .unwrap_or_else(|_| root.clean())
        };
        info!("Creating server registry for workspace: {}", workspace_root.display());

        Self {
            workspace_root,
            configs: RwLock::new(Vec::new()),
            extensions: RwLock::new(ExtensionMap::default()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Add a server, replacing any entry with the same name in place.
    ///
    /// A live connection keeps its old configuration until restarted.
    pub async fn register(&self, config: ServerConfig) -> Result<()> {
        config.validate()?;

        let mut configs = self.configs.write().await;
        match configs.iter_mut().find(|c| c.name == config.name) {
            Some(existing) => {
                debug!("Overriding configuration for server '{}'", config.name);
                *existing = config;
            }
            None => {
                debug!("Registered server '{}'", config.name);
                configs.push(config);
            }
        }
        *self.extensions.write().await = ExtensionMap::build(&configs);
        Ok(())
    }

    /// Merge config files (lowest precedence first) into the registry.
    pub async fn load_configs(&self, paths: &[PathBuf]) -> Result<usize> {
        let mut loader = ConfigLoader::new();
        let loaded = loader.load_paths(paths)?;
        for config in loader.into_servers() {
            self.register(config).await?;
        }
        Ok(loaded)
    }

    /// Discover config files for the workspace, load them and optionally
    /// auto-start servers.
    pub async fn initialize(&self, auto_start: bool) -> Result<StartupReport> {
        let mut loader = ConfigLoader::new();
        loader.load_paths(&ConfigLoader::discover(&self.workspace_root))?;
        self.initialize_with(loader, auto_start).await
    }

    pub async fn initialize_with(
        &self,
        loader: ConfigLoader,
        auto_start: bool,
    ) -> Result<StartupReport> {
        for source in loader.sources() {
            info!("Loaded server configuration from {}", source.display());
        }
        for config in loader.into_servers() {
            self.register(config).await?;
        }

        if !auto_start {
            return Ok(StartupReport {
                skipped: self.server_names().await,
                ..Default::default()
            });
        }
        Ok(self.start_auto().await)
    }

    /// Start every enabled auto-start server concurrently. One failure does
    /// not prevent the others from starting.
    pub async fn start_auto(&self) -> StartupReport {
        let configs = self.configs.read().await.clone();
        let mut report = StartupReport::default();

        let (eligible, skipped): (Vec<_>, Vec<_>) = configs
            .into_iter()
            .partition(|c| c.enabled && c.auto_start);
        report.skipped = skipped.into_iter().map(|c| c.name).collect();

        let outcomes = join_all(eligible.iter().map(|config| async move {
            (config.name.clone(), self.start(&config.name).await)
        }))
        .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(_) => report.started.push(name),
                Err(e) => {
                    warn!("Failed to auto-start server '{}': {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        info!(
            "Auto-start finished: {} started, {} failed, {} skipped",
            report.started.len(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }

    pub async fn config(&self, name: &str) -> Option<ServerConfig> {
        self.configs
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub async fn configs(&self) -> Vec<ServerConfig> {
        self.configs.read().await.clone()
    }

    pub async fn server_names(&self) -> Vec<String> {
        self.configs
            .read()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Start `name`, or return the existing connection if it is running.
    ///
    /// The registry lock is only held to insert the connection; the spawn
    /// and handshake happen outside it.
    pub async fn start(&self, name: &str) -> Result<Arc<RpcClient>> {
        let config = self
            .config(name)
            .await
            .ok_or_else(|| RpcError::NotFound(format!("server '{}'", name)))?;
        if !config.enabled {
            return Err(RpcError::Config(format!("server '{}' is disabled", name)));
        }

        let (client, stale) = {
            let mut connections = self.connections.write().await;
            let reusable = connections
                .get(name)
                .filter(|existing| {
                    existing.config() == &config || existing.status() == ServerStatus::Running
                })
                .cloned();

            match reusable {
                Some(existing) => (existing, None),
                None => {
                    let client =
                        Arc::new(RpcClient::new(config).with_root(self.workspace_root.clone()));
                    let stale = connections.insert(name.to_string(), Arc::clone(&client));
                    (client, stale)
                }
            }
        };

        if let Some(stale) = stale {
            // Configuration changed while it was down
            stale.stop().await?;
        }
        client.start().await?;
        Ok(client)
    }

    /// Stop and forget the connection for `name`. Stopping a server that is
    /// not connected is a no-op.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let client = self.connections.write().await.remove(name);
        match client {
            Some(client) => client.stop().await,
            None if self.config(name).await.is_some() => Ok(()),
            None => Err(RpcError::NotFound(format!("server '{}'", name))),
        }
    }

    pub async fn restart(&self, name: &str) -> Result<Arc<RpcClient>> {
        info!("Restarting server '{}'", name);
        self.stop(name).await?;
        self.start(name).await
    }

    /// Stop every connection concurrently.
    pub async fn shutdown(&self) {
        let clients: Vec<Arc<RpcClient>> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, client)| client)
            .collect();
        if clients.is_empty() {
            return;
        }

        info!("Shutting down {} server(s)", clients.len());
        for outcome in join_all(clients.iter().map(|client| client.stop())).await {
            if let Err(e) = outcome {
                warn!("Error during shutdown: {}", e);
            }
        }
    }

    pub async fn client(&self, name: &str) -> Option<Arc<RpcClient>> {
        self.connections.read().await.get(name).cloned()
    }

    pub async fn running_clients(&self) -> Vec<Arc<RpcClient>> {
        let configs = self.configs.read().await;
        let connections = self.connections.read().await;
        running_in_priority_order(&configs, &connections)
    }

    /// Running connection for `name`, or why there is none.
    async fn running_client(&self, name: &str) -> Result<Arc<RpcClient>> {
        match self.client(name).await {
            Some(client) if client.status() == ServerStatus::Running => Ok(client),
            Some(client) => Err(RpcError::NotRunning {
                server: name.to_string(),
                status: client.status(),
            }),
            None if self.config(name).await.is_some() => Err(RpcError::NotRunning {
                server: name.to_string(),
                status: ServerStatus::Stopped,
            }),
            None => Err(RpcError::NotFound(format!("server '{}'", name))),
        }
    }

    /// Raw request to a named running server.
    pub async fn request(&self, server: &str, method: &str, params: Option<Value>) -> Result<Value> {
        self.running_client(server)
            .await?
            .request(method, params)
            .await
    }

    /// Invoke a tool by its remote name.
    ///
    /// With `server`, the call goes straight to that connection. Without
    /// it, running servers are scanned in priority order and the first one
    /// listing the tool gets the call; servers whose listing fails are
    /// skipped.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
        server: Option<&str>,
    ) -> Result<ToolCallResult> {
        let client = match server {
            Some(name) => self.running_client(name).await?,
            None => self.find_tool_owner(tool).await?,
        };

        debug!("Calling '{}' on server '{}'", tool, client.name());
        let payload = client.call_capability(tool, arguments).await?;
        Ok(ToolCallResult {
            server: client.name().to_string(),
            tool: tool.to_string(),
            kind: client.kind(),
            payload,
        })
    }

    async fn find_tool_owner(&self, tool: &str) -> Result<Arc<RpcClient>> {
        for client in self.running_clients().await {
            match client.list_tools().await {
                Ok(tools) if tools.iter().any(|t| t.name == tool) => return Ok(client),
                Ok(_) => {}
                Err(e) => warn!(
                    "Skipping server '{}' while looking for '{}': {}",
                    client.name(),
                    tool,
                    e
                ),
            }
        }
        Err(RpcError::NotFound(format!(
            "tool '{}' on any running server",
            tool
        )))
    }

    pub async fn list_all_tools(&self) -> Vec<RemoteCapabilityDescriptor> {
        let clients = self.running_clients().await;
        let listings = join_all(clients.iter().map(|c| c.list_tools())).await;
        concat_listings(&clients, listings, "tools")
    }

    pub async fn list_all_resources(&self) -> Vec<RemoteCapabilityDescriptor> {
        let clients = self.running_clients().await;
        let listings = join_all(clients.iter().map(|c| c.list_resources())).await;
        concat_listings(&clients, listings, "resources")
    }

    pub async fn list_all_prompts(&self) -> Vec<RemoteCapabilityDescriptor> {
        let clients = self.running_clients().await;
        let listings = join_all(clients.iter().map(|c| c.list_prompts())).await;
        concat_listings(&clients, listings, "prompts")
    }

    /// Tools, resources and prompts of every running server.
    pub async fn list_all_capabilities(&self) -> Vec<RemoteCapabilityDescriptor> {
        let (mut tools, resources, prompts) = tokio::join!(
            self.list_all_tools(),
            self.list_all_resources(),
            self.list_all_prompts()
        );
        tools.extend(resources);
        tools.extend(prompts);
        tools
    }

    /// Start the server mapped to `path`'s extension if needed and return its
    /// name.
    pub async fn ensure_server_for_file(&self, path: &Path) -> Result<String> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let name = self
            .extensions
            .read()
            .await
            .server_for_path(&path)?
            .to_string();

        if let Some(client) = self.client(&name).await {
            if client.status() == ServerStatus::Running {
                return Ok(name);
            }
        }

        info!("Starting '{}' on demand for {}", name, path.display());
        self.start(&name).await?;
        Ok(name)
    }

    pub async fn capabilities(&self, name: &str) -> Option<Value> {
        self.client(name).await.and_then(|c| c.capabilities())
    }

    /// One report per configured server, in priority order.
    pub async fn status(&self) -> Vec<ServerReport> {
        let configs = self.configs.read().await;
        let connections = self.connections.read().await;

        configs
            .iter()
            .map(|config| {
                let state = connections
                    .get(&config.name)
                    .map(|client| client.state())
                    .unwrap_or_default();
                ServerReport {
                    name: config.name.clone(),
                    kind: config.kind,
                    command: config.command.clone(),
                    enabled: config.enabled,
                    auto_start: config.auto_start,
                    status: state.status,
                    pid: state.pid,
                    error: state.error,
                    started_at: state.started_at,
                }
            })
            .collect()
    }
}

fn concat_listings(
    clients: &[Arc<RpcClient>],
    listings: Vec<Result<Vec<RemoteCapabilityDescriptor>>>,
    what: &str,
) -> Vec<RemoteCapabilityDescriptor> {
    let mut all = Vec::new();
    for (client, listing) in clients.iter().zip(listings) {
        match listing {
            Ok(items) => all.extend(items),
            Err(e) => warn!("Skipping {} from server '{}': {}", what, client.name(), e),
        }
    }
    all
}
