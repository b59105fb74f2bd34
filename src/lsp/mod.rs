//! Language Server Protocol flavour
//!
//! Handshake payload, the table of language features exposed as tools and
//! plain-text rendering of their results.

mod features;
pub mod format;

pub use features::{call_feature, feature_descriptors, LspFeature};

use crate::config::ServerConfig;
use crate::types::{Result, RpcError};
use lsp_types::*;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error, info, warn};
use url::Url;

pub const INITIALIZED: &str = "initialized";
pub const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";
pub const DID_OPEN: &str = "textDocument/didOpen";
pub const LOG_MESSAGE: &str = "window/logMessage";
pub const SHOW_MESSAGE: &str = "window/showMessage";

/// `initialize` params for a language server rooted at `root`.
///
/// `capabilities` replaces the default client capability advertisement.
#[allow(deprecated)]
pub fn initialize_params(
    config: &ServerConfig,
    root: &Path,
    capabilities: Option<Value>,
) -> Result<Value> {
    let root_uri =
        Url::from_directory_path(root).map_err(|_| RpcError::InvalidPath(root.to_path_buf()))?;
    let folder_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());

    let params = InitializeParams {
        process_id: Some(std::process::id()),
        root_uri: Some(root_uri.clone()),
        initialization_options: config.initialization_options.clone(),
        capabilities: client_capabilities(),
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: root_uri,
            name: folder_name,
        }]),
        client_info: Some(ClientInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        ..Default::default()
    };

    let mut value = serde_json::to_value(params)?;
    if let Some(capabilities) = capabilities {
        value["capabilities"] = capabilities;
    }
    Ok(value)
}

fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                did_save: Some(false),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                ..Default::default()
            }),
            definition: Some(GotoCapability {
                link_support: Some(true),
                ..Default::default()
            }),
            references: Some(ReferenceClientCapabilities::default()),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        workspace: Some(WorkspaceClientCapabilities {
            symbol: Some(WorkspaceSymbolClientCapabilities::default()),
            workspace_folders: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Forward `window/logMessage` and `window/showMessage` to tracing.
pub fn log_message(server: &str, params: &Value) {
    let message = params.get("message").and_then(Value::as_str).unwrap_or("");
    match params.get("type").and_then(Value::as_i64) {
        Some(1) => error!(server, "{}", message),
        Some(2) => warn!(server, "{}", message),
        Some(3) => info!(server, "{}", message),
        _ => debug!(server, "{}", message),
    }
}

/// Language id sent in `didOpen`: the configured one, or a guess from the
/// file extension.
pub fn language_id_for(config: &ServerConfig, path: &Path) -> String {
    if let Some(id) = &config.language_id {
        return id.clone();
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "go" => "go",
        "" => "plaintext",
        other => return other.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerKind;
    use serde_json::json;
    use std::path::PathBuf;

    fn lsp_config() -> ServerConfig {
        ServerConfig::new("ra", "rust-analyzer").with_kind(ServerKind::Lsp)
    }

    #[cfg(unix)]
    #[test]
    fn test_initialize_params_shape() {
        let mut config = lsp_config();
        config.initialization_options = Some(json!({"checkOnSave": false}));

        let params = initialize_params(&config, Path::new("/work/project"), None).unwrap();
        assert_eq!(params["rootUri"], "file:///work/project/");
        assert_eq!(params["workspaceFolders"][0]["name"], "project");
        assert_eq!(params["initializationOptions"]["checkOnSave"], false);
        assert_eq!(params["clientInfo"]["name"], "toolbridge");
        assert_eq!(
            params["capabilities"]["textDocument"]["documentSymbol"]
                ["hierarchicalDocumentSymbolSupport"],
            true
        );
        assert!(params["processId"].is_u64());
    }

    #[cfg(unix)]
    #[test]
    fn test_initialize_params_capability_override() {
        let params =
            initialize_params(&lsp_config(), Path::new("/w"), Some(json!({"custom": 1}))).unwrap();
        assert_eq!(params["capabilities"], json!({"custom": 1}));
    }

    #[test]
    fn test_relative_root_is_invalid() {
        let err = initialize_params(&lsp_config(), Path::new("relative/dir"), None).unwrap_err();
        assert!(matches!(err, RpcError::InvalidPath(_)));
    }

    #[test]
    fn test_language_id_for() {
        let config = ServerConfig::new("x", "x");
        assert_eq!(language_id_for(&config, &PathBuf::from("a.rs")), "rust");
        assert_eq!(language_id_for(&config, &PathBuf::from("a.TSX")), "typescriptreact");
        assert_eq!(language_id_for(&config, &PathBuf::from("Makefile")), "plaintext");
        assert_eq!(language_id_for(&config, &PathBuf::from("a.zig")), "zig");

        let mut pinned = ServerConfig::new("y", "y");
        pinned.language_id = Some("rust".into());
        assert_eq!(language_id_for(&pinned, &PathBuf::from("a.py")), "rust");
    }
}
