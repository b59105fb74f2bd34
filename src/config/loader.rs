//! Layered configuration loading
//!
//! Precedence, lowest to highest:
//! 1. Built-in LSP defaults (opt-in)
//! 2. System config (`/etc/toolbridge/config.toml`, unix only)
//! 3. User config (`<config_dir>/toolbridge/config.toml`, then `~/.mcp.json`)
//! 4. Project files from the filesystem root down to the workspace root
//!    (`.mcp.json`, then `.toolbridge.toml` in each directory)
//! 5. `$TOOLBRIDGE_CONFIG`
//!
//! A later entry with the same name replaces the earlier one entirely.

use crate::config::defaults::get_default_configs;
use crate::config::server::{ConfigFile, ServerConfig};
use crate::types::RpcError;
use path_clean::PathClean;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_ENV_VAR: &str = "TOOLBRIDGE_CONFIG";

/// Per-directory file names, lowest precedence first.
pub const PROJECT_FILES: [&str; 2] = [".mcp.json", ".toolbridge.toml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Accumulates server entries from any number of sources.
///
/// Entries keep the position of their first appearance, so the resulting
/// order is stable across runs and doubles as the routing priority.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    servers: Vec<ServerConfig>,
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_defaults() -> Self {
        let mut loader = Self::new();
        for config in get_default_configs() {
            loader.insert(config);
        }
        debug!("Loaded {} built-in server configurations", loader.servers.len());
        loader
    }

    /// Candidate files for `workspace_root`, lowest precedence first.
    /// Files that do not exist are included; loading skips them.
    pub fn discover(workspace_root: &Path) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/toolbridge/config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("toolbridge").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".mcp.json"));
        }

        let root = if workspace_root.is_absolute() {
            workspace_root.clean()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(workspace_root).clean())
                .unwrap_or_else(|_| workspace_root.clean())
        };
        let mut ancestors: Vec<&Path> = root.ancestors().collect();
        ancestors.reverse();
        for dir in ancestors {
            for file in PROJECT_FILES {
                candidates.push(dir.join(file));
            }
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            candidates.push(PathBuf::from(path));
        }

        let mut seen = std::collections::HashSet::new();
        candidates.retain(|path| seen.insert(path.clone()));
        candidates
    }

    /// Load every existing file in `paths`, in order.
    pub fn load_paths(&mut self, paths: &[PathBuf]) -> Result<usize, RpcError> {
        let mut loaded = 0;
        for path in paths {
            if self.load_file(path)? {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Returns `Ok(false)` when the file does not exist.
    pub fn load_file(&mut self, path: &Path) -> Result<bool, RpcError> {
        if !path.is_file() {
            debug!("No config file at {}", path.display());
            return Ok(false);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            RpcError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let base_dir = path.parent().map(Path::to_path_buf);
        let count = self
            .load_str(&content, ConfigFormat::for_path(path), base_dir.as_deref())
            .map_err(|e| match e {
                RpcError::Config(msg) => RpcError::Config(format!("{}: {}", path.display(), msg)),
                other => other,
            })?;

        info!("Loaded {} server(s) from {}", count, path.display());
        self.sources.push(path.to_path_buf());
        Ok(true)
    }

    /// Parse one document and merge its entries. Relative `cwd` values
    /// resolve against `base_dir`.
    pub fn load_str(
        &mut self,
        content: &str,
        format: ConfigFormat,
        base_dir: Option<&Path>,
    ) -> Result<usize, RpcError> {
        let file: ConfigFile = match format {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| RpcError::Config(format!("Failed to parse config: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| RpcError::Config(format!("Failed to parse config: {}", e)))?,
        };

        let mut parsed = Vec::with_capacity(file.servers.len());
        for (name, mut config) in file.servers {
            config.name = name;
            if let (Some(cwd), Some(base)) = (&config.cwd, base_dir) {
                if cwd.is_relative() {
                    config.cwd = Some(base.join(cwd).clean());
                }
            }
            config.validate()?;
            parsed.push(config);
        }

        let count = parsed.len();
        for config in parsed {
            self.insert(config);
        }
        Ok(count)
    }

    /// Add or replace an entry by name.
    pub fn insert(&mut self, config: ServerConfig) {
        match self.servers.iter_mut().find(|c| c.name == config.name) {
            Some(existing) => {
                debug!("Overriding server config '{}'", config.name);
                *existing = config;
            }
            None => self.servers.push(config),
        }
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn into_servers(self) -> Vec<ServerConfig> {
        self.servers
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|c| c.name == name)
    }
}
