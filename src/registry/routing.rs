//! Which server handles a file or an unqualified tool name

use crate::config::ServerConfig;
use crate::rpc::RpcClient;
use crate::types::{Result, RpcError, ServerStatus};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Extension -> server name, derived from `fileExtensions`.
///
/// Built from configs in priority order; the first enabled server claiming
/// an extension keeps it.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    routes: HashMap<String, String>,
}

impl ExtensionMap {
    pub fn build(configs: &[ServerConfig]) -> Self {
        let mut routes = HashMap::new();
        for config in configs.iter().filter(|c| c.enabled) {
            for ext in &config.file_extensions {
                routes
                    .entry(normalize(ext))
                    .or_insert_with(|| config.name.clone());
            }
        }
        Self { routes }
    }

    pub fn server_for_extension(&self, ext: &str) -> Option<&str> {
        self.routes.get(&normalize(ext)).map(String::as_str)
    }

    pub fn server_for_path(&self, path: &Path) -> Result<&str> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| RpcError::InvalidPath(path.to_path_buf()))?;

        self.server_for_extension(ext).ok_or_else(|| {
            RpcError::NotFound(format!("no server configured for .{} files", ext))
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn normalize(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

/// Running connections in configuration priority order.
///
/// This is the scan order for unqualified tool calls, which makes the
/// tie-break for a name offered by several servers "first registered wins".
pub fn running_in_priority_order(
    configs: &[ServerConfig],
    connections: &HashMap<String, Arc<RpcClient>>,
) -> Vec<Arc<RpcClient>> {
    configs
        .iter()
        .filter_map(|config| connections.get(&config.name))
        .filter(|client| client.status() == ServerStatus::Running)
        .cloned()
        .collect()
}
