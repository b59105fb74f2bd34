//! Model Context Protocol flavour
//!
//! Handshake payload, listing helpers and tool-result content blocks.

mod content;

pub use content::{
    render_prompt_messages, render_resource_contents, CallToolResult, EmbeddedResource, ToolContent,
};

use crate::capability::{CapabilityKind, RemoteCapabilityDescriptor};
use crate::rpc::RpcClient;
use crate::types::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const INITIALIZED: &str = "notifications/initialized";
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";
pub const RESOURCES_LIST: &str = "resources/list";
pub const PROMPTS_LIST: &str = "prompts/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const PROMPTS_GET: &str = "prompts/get";
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const RESOURCE_UPDATED: &str = "notifications/resources/updated";
pub const LOG_MESSAGE: &str = "notifications/message";

/// Stop following cursors after this many pages.
const MAX_PAGES: usize = 100;

pub fn initialize_params(capabilities: Option<Value>) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": capabilities.unwrap_or_else(|| json!({})),
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Collect `key` items from every page of a cursor-paginated list method.
pub async fn paginate(client: &RpcClient, method: &str, key: &str) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
        let page = client.request(method, params).await?;

        if let Some(Value::Array(page_items)) = page.get(key) {
            items.extend(page_items.iter().cloned());
        }

        match page.get("nextCursor").and_then(Value::as_str) {
            Some(next) if cursor.as_deref() != Some(next) => cursor = Some(next.to_string()),
            _ => return Ok(items),
        }
    }

    warn!(
        "[{}] {} still paginating after {} pages; truncating",
        client.name(),
        method,
        MAX_PAGES
    );
    Ok(items)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceEntry {
    uri: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    arguments: Vec<PromptArgument>,
}

#[derive(Debug, Deserialize)]
struct PromptArgument {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: bool,
}

fn parse_entries<T: for<'de> Deserialize<'de>>(server: &str, what: &str, items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("[{}] Skipping malformed {} entry: {}", server, what, e);
                None
            }
        })
        .collect()
}

pub fn parse_tools(server: &str, items: &[Value]) -> Vec<RemoteCapabilityDescriptor> {
    parse_entries::<ToolEntry>(server, "tool", items)
        .into_iter()
        .map(|tool| RemoteCapabilityDescriptor {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool
                .input_schema
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            server_name: server.to_string(),
            kind: CapabilityKind::Tool,
            uri: None,
        })
        .collect()
}

pub fn parse_resources(server: &str, items: &[Value]) -> Vec<RemoteCapabilityDescriptor> {
    parse_entries::<ResourceEntry>(server, "resource", items)
        .into_iter()
        .map(|resource| RemoteCapabilityDescriptor {
            name: resource.name.unwrap_or_else(|| resource.uri.clone()),
            description: resource.description.unwrap_or_default(),
            input_schema: json!({"type": "object", "properties": {}}),
            server_name: server.to_string(),
            kind: CapabilityKind::Resource,
            uri: Some(resource.uri),
        })
        .collect()
}

/// Prompts become descriptors whose schema lists the prompt's arguments as
/// string properties.
pub fn parse_prompts(server: &str, items: &[Value]) -> Vec<RemoteCapabilityDescriptor> {
    parse_entries::<PromptEntry>(server, "prompt", items)
        .into_iter()
        .map(|prompt| {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for arg in &prompt.arguments {
                let mut property = Map::new();
                property.insert("type".into(), json!("string"));
                if let Some(description) = &arg.description {
                    property.insert("description".into(), json!(description));
                }
                properties.insert(arg.name.clone(), Value::Object(property));
                if arg.required {
                    required.push(json!(arg.name));
                }
            }

            RemoteCapabilityDescriptor {
                name: prompt.name,
                description: prompt.description.unwrap_or_default(),
                input_schema: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
                server_name: server.to_string(),
                kind: CapabilityKind::Prompt,
                uri: None,
            }
        })
        .collect()
}

/// Forward a `notifications/message` log entry to tracing.
pub fn log_message(server: &str, params: &Value) {
    let level = params.get("level").and_then(Value::as_str).unwrap_or("info");
    let logger = params.get("logger").and_then(Value::as_str).unwrap_or("");
    let data = match params.get("data") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    match level {
        "debug" => debug!(server, logger, "{}", data),
        "warning" => warn!(server, logger, "{}", data),
        "error" | "critical" | "alert" | "emergency" => error!(server, logger, "{}", data),
        _ => info!(server, logger, "{}", data),
    }
}
