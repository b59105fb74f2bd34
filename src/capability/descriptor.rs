//! Uniform description of something a remote server can do

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
    /// LSP request such as hover or go-to-definition.
    LanguageFeature,
}

/// A tool, resource, prompt or language feature advertised by a server.
///
/// `server_name` is a back-reference used for routing; the descriptor does
/// not own or keep the connection alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub server_name: String,
    pub kind: CapabilityKind,
    /// Resource location, for resources only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl RemoteCapabilityDescriptor {
    /// Collision-free local name: `<server>_<remote-name>`.
    pub fn qualified_name(&self) -> String {
        format!("{}_{}", self.server_name, self.name)
    }
}
