//! Remote capabilities as locally callable tools

use crate::capability::{CapabilityKind, RemoteCapabilityDescriptor, ToolOutput};
use crate::mcp::{self, PROMPTS_GET, RESOURCES_READ};
use crate::registry::Registry;
use crate::types::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A tool the agent loop can call without knowing where it runs.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments.
    fn parameters(&self) -> Value;

    /// Never fails; errors come back as an error output.
    async fn invoke(&self, args: Value) -> ToolOutput;
}

/// Wraps one remote descriptor and forwards calls through the registry to
/// the server that advertised it.
pub struct CapabilityAdapter {
    qualified_name: String,
    descriptor: RemoteCapabilityDescriptor,
    registry: Arc<Registry>,
}

impl CapabilityAdapter {
    pub fn new(descriptor: RemoteCapabilityDescriptor, registry: Arc<Registry>) -> Self {
        Self {
            qualified_name: descriptor.qualified_name(),
            descriptor,
            registry,
        }
    }

    pub fn descriptor(&self) -> &RemoteCapabilityDescriptor {
        &self.descriptor
    }

    pub fn server_name(&self) -> &str {
        &self.descriptor.server_name
    }

    async fn forward(&self, args: Value) -> Result<ToolOutput> {
        let server = self.descriptor.server_name.as_str();
        match self.descriptor.kind {
            CapabilityKind::Tool | CapabilityKind::LanguageFeature => Ok(self
                .registry
                .call_tool(&self.descriptor.name, args, Some(server))
                .await?
                .output()),
            CapabilityKind::Resource => {
                let uri = self
                    .descriptor
                    .uri
                    .clone()
                    .unwrap_or_else(|| self.descriptor.name.clone());
                let payload = self
                    .registry
                    .request(server, RESOURCES_READ, Some(json!({ "uri": uri })))
                    .await?;
                Ok(ToolOutput::success(mcp::render_resource_contents(&payload)))
            }
            CapabilityKind::Prompt => {
                let payload = self
                    .registry
                    .request(
                        server,
                        PROMPTS_GET,
                        Some(json!({ "name": self.descriptor.name, "arguments": args })),
                    )
                    .await?;
                Ok(ToolOutput::success(mcp::render_prompt_messages(&payload)))
            }
        }
    }
}

#[async_trait]
impl LocalTool for CapabilityAdapter {
    fn name(&self) -> &str {
        &self.qualified_name
    }

    fn description(&self) -> &str {
        if self.descriptor.description.is_empty() {
            "Remote tool"
        } else {
            &self.descriptor.description
        }
    }

    fn parameters(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    async fn invoke(&self, args: Value) -> ToolOutput {
        match self.forward(args).await {
            Ok(output) => output,
            Err(e) => ToolOutput::error(format!("{} failed: {}", self.qualified_name, e)),
        }
    }
}

/// Adapters for everything the running servers currently offer.
///
/// When two descriptors map to the same local name the first one wins.
pub async fn collect_tools(registry: Arc<Registry>) -> Vec<Arc<dyn LocalTool>> {
    let descriptors = registry.list_all_capabilities().await;
    wrap_descriptors(descriptors, registry)
}

pub fn wrap_descriptors(
    descriptors: Vec<RemoteCapabilityDescriptor>,
    registry: Arc<Registry>,
) -> Vec<Arc<dyn LocalTool>> {
    let mut seen = HashSet::new();
    descriptors
        .into_iter()
        .filter(|d| {
            let fresh = seen.insert(d.qualified_name());
            if !fresh {
                debug!("Dropping duplicate tool name {}", d.qualified_name());
            }
            fresh
        })
        .map(|d| Arc::new(CapabilityAdapter::new(d, Arc::clone(&registry))) as Arc<dyn LocalTool>)
        .collect()
}
