//! Toolbridge - stdio JSON-RPC client and multi-server registry
//!
//! Spawns MCP and LSP helper processes, speaks Content-Length framed
//! JSON-RPC 2.0 with them over their pipes and exposes what they offer as
//! uniform local tools.

pub mod capability;
pub mod config;
pub mod lsp;
pub mod mcp;
pub mod process;
pub mod registry;
pub mod rpc;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use capability::{collect_tools, CapabilityAdapter, LocalTool, RemoteCapabilityDescriptor, ToolOutput};
pub use config::{ConfigLoader, ServerConfig, ServerKind};
pub use registry::{Registry, ServerReport, StartupReport, ToolCallResult};
pub use rpc::{ConnectionState, RpcClient};
pub use types::{Result, RpcError, ServerStatus};
