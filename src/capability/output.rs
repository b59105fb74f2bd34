//! Uniform result representation handed to the agent loop

use crate::config::ServerKind;
use crate::lsp::{format, LspFeature};
use crate::mcp::CallToolResult;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Normalize a raw call result.
    ///
    /// MCP payloads are content-block lists with an `isError` flag; language
    /// server payloads are rendered according to the feature that produced
    /// them.
    pub fn from_payload(kind: ServerKind, tool: &str, payload: &Value) -> Self {
        match kind {
            ServerKind::Mcp => {
                let result = CallToolResult::from_value(payload);
                Self {
                    content: result.to_text(),
                    is_error: result.is_error,
                }
            }
            ServerKind::Lsp => match LspFeature::from_name(tool) {
                Some(feature) => Self::success(format::render(feature, payload)),
                None => Self::success(
                    serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string()),
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mcp_error_flag_carries_over() {
        let payload = json!({"content": [{"type": "text", "text": "no such repo"}], "isError": true});
        let output = ToolOutput::from_payload(ServerKind::Mcp, "create_issue", &payload);
        assert_eq!(output, ToolOutput::error("no such repo"));
    }

    #[test]
    fn test_lsp_payload_rendered_by_feature() {
        let payload = json!({"contents": {"kind": "plaintext", "value": "i32"}});
        let output = ToolOutput::from_payload(ServerKind::Lsp, "hover", &payload);
        assert_eq!(output, ToolOutput::success("i32"));
    }

    #[test]
    fn test_lsp_unknown_feature_is_pretty_json() {
        let output = ToolOutput::from_payload(ServerKind::Lsp, "rename", &json!({"a": 1}));
        assert_eq!(output.content, "{\n  \"a\": 1\n}");
    }
}
