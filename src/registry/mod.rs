//! Multi-server registry: configuration, lifecycle and call routing

mod manager;
mod routing;

pub use manager::{Registry, ServerReport, StartupReport, ToolCallResult};
pub use routing::{running_in_priority_order, ExtensionMap};
