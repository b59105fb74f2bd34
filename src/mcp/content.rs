//! `tools/call` result shapes

use serde::Deserialize;
use serde_json::Value;

/// Parsed `tools/call` result.
#[derive(Debug, Clone, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text { text: String },
    Image { data: String, mime_type: String },
    Resource { resource: EmbeddedResource },
    /// A block type we do not know; kept as raw JSON.
    Other(Value),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum KnownBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: EmbeddedResource,
    },
}

impl From<KnownBlock> for ToolContent {
    fn from(block: KnownBlock) -> Self {
        match block {
            KnownBlock::Text { text } => ToolContent::Text { text },
            KnownBlock::Image { data, mime_type } => ToolContent::Image { data, mime_type },
            KnownBlock::Resource { resource } => ToolContent::Resource { resource },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl CallToolResult {
    /// Lenient parse: unknown or malformed blocks survive as raw JSON and a
    /// payload without `content` becomes a single raw block.
    pub fn from_value(payload: &Value) -> Self {
        let is_error = payload
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let content = match payload.get("content") {
            Some(Value::Array(blocks)) => blocks
                .iter()
                .map(|block| {
                    serde_json::from_value::<KnownBlock>(block.clone())
                        .map(ToolContent::from)
                        .unwrap_or_else(|_| ToolContent::Other(block.clone()))
                })
                .collect(),
            _ if payload.is_null() => Vec::new(),
            _ => vec![ToolContent::Other(payload.clone())],
        };

        Self { content, is_error }
    }

    /// All blocks rendered as text, one per line.
    pub fn to_text(&self) -> String {
        self.content
            .iter()
            .map(ToolContent::to_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ToolContent {
    pub fn to_text(&self) -> String {
        match self {
            ToolContent::Text { text } => text.clone(),
            ToolContent::Image { data, mime_type } => {
                format!("[image: {}, {} bytes base64]", mime_type, data.len())
            }
            ToolContent::Resource { resource } => match &resource.text {
                Some(text) => text.clone(),
                None => format!(
                    "[resource: {}{}]",
                    resource.uri,
                    resource
                        .mime_type
                        .as_ref()
                        .map(|m| format!(" ({})", m))
                        .unwrap_or_default()
                ),
            },
            ToolContent::Other(raw) => raw.to_string(),
        }
    }
}

/// Text of a `resources/read` result, one entry per content item.
pub fn render_resource_contents(payload: &Value) -> String {
    let Some(Value::Array(contents)) = payload.get("contents") else {
        return payload.to_string();
    };

    contents
        .iter()
        .map(|item| match item.get("text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => format!(
                "[binary resource: {}]",
                item.get("uri").and_then(Value::as_str).unwrap_or("unknown")
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `role: text` lines for a `prompts/get` result.
pub fn render_prompt_messages(payload: &Value) -> String {
    let Some(Value::Array(messages)) = payload.get("messages") else {
        return payload.to_string();
    };

    messages
        .iter()
        .map(|message| {
            let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
            let block = message.get("content").cloned().unwrap_or(Value::Null);
            let text = serde_json::from_value::<KnownBlock>(block.clone())
                .map(ToolContent::from)
                .unwrap_or(ToolContent::Other(block))
                .to_text();
            format!("{}: {}", role, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
