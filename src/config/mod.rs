//! Configuration system
//!
//! Server entries come from layered JSON/TOML files merged by name; see
//! [`ConfigLoader`] for the precedence order.

mod defaults;
mod loader;
mod server;

pub use defaults::get_default_configs;
pub use loader::{ConfigFormat, ConfigLoader, CONFIG_ENV_VAR, PROJECT_FILES};
pub use server::{ConfigFile, ServerConfig, ServerKind};
