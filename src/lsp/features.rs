//! Language features exposed as callable tools

use crate::capability::{CapabilityKind, RemoteCapabilityDescriptor};
use crate::lsp::{language_id_for, DID_OPEN, PUBLISH_DIAGNOSTICS};
use crate::rpc::RpcClient;
use crate::types::{Result, RpcError};
use lsp_types::*;
use path_clean::PathClean;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// How long to wait for a server to publish diagnostics for a newly opened
/// document.
const DIAGNOSTICS_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LspFeature {
    GotoDefinition,
    FindReferences,
    Hover,
    DocumentSymbols,
    WorkspaceSymbols,
    Diagnostics,
}

impl LspFeature {
    pub const ALL: [LspFeature; 6] = [
        LspFeature::GotoDefinition,
        LspFeature::FindReferences,
        LspFeature::Hover,
        LspFeature::DocumentSymbols,
        LspFeature::WorkspaceSymbols,
        LspFeature::Diagnostics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LspFeature::GotoDefinition => "goto_definition",
            LspFeature::FindReferences => "find_references",
            LspFeature::Hover => "hover",
            LspFeature::DocumentSymbols => "document_symbols",
            LspFeature::WorkspaceSymbols => "workspace_symbols",
            LspFeature::Diagnostics => "diagnostics",
        }
    }

    /// Accepts both `hover` and `lsp_hover`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("lsp_").unwrap_or(name);
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Request sent for this feature. Diagnostics are pushed by the server,
    /// so theirs is the notification method.
    pub fn method(self) -> &'static str {
        match self {
            LspFeature::GotoDefinition => "textDocument/definition",
            LspFeature::FindReferences => "textDocument/references",
            LspFeature::Hover => "textDocument/hover",
            LspFeature::DocumentSymbols => "textDocument/documentSymbol",
            LspFeature::WorkspaceSymbols => "workspace/symbol",
            LspFeature::Diagnostics => PUBLISH_DIAGNOSTICS,
        }
    }

    fn provider(self) -> Option<&'static str> {
        match self {
            LspFeature::GotoDefinition => Some("definitionProvider"),
            LspFeature::FindReferences => Some("referencesProvider"),
            LspFeature::Hover => Some("hoverProvider"),
            LspFeature::DocumentSymbols => Some("documentSymbolProvider"),
            LspFeature::WorkspaceSymbols => Some("workspaceSymbolProvider"),
            LspFeature::Diagnostics => None,
        }
    }

    /// Whether the server's `initialize` capabilities advertise the feature.
    pub fn is_supported(self, capabilities: &Value) -> bool {
        match self.provider() {
            None => true,
            Some(key) => !matches!(
                capabilities.get(key),
                None | Some(Value::Null) | Some(Value::Bool(false))
            ),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            LspFeature::GotoDefinition => "Navigate to the definition of a symbol at a given position in a file. Returns the location(s) where the symbol is defined.",
            LspFeature::FindReferences => "Find all references to a symbol at a given position. Returns all locations where the symbol is used.",
            LspFeature::Hover => "Get hover information (documentation, type info, signatures) for a symbol at a given position.",
            LspFeature::DocumentSymbols => "Get the symbol outline for a file (classes, functions, variables, etc.).",
            LspFeature::WorkspaceSymbols => "Search for symbols across the entire workspace by name or pattern.",
            LspFeature::Diagnostics => "Get diagnostics (errors, warnings, hints) the language server reports for a file.",
        }
    }

    pub fn input_schema(self) -> Value {
        let file = json!({"type": "string", "description": "Path to the file, absolute or relative to the workspace root"});
        let line = json!({"type": "integer", "description": "Line number (0-indexed)"});
        let character = json!({"type": "integer", "description": "Character offset in line (0-indexed)"});

        match self {
            LspFeature::GotoDefinition | LspFeature::Hover => json!({
                "type": "object",
                "properties": {"file": file, "line": line, "character": character},
                "required": ["file", "line", "character"]
            }),
            LspFeature::FindReferences => json!({
                "type": "object",
                "properties": {
                    "file": file,
                    "line": line,
                    "character": character,
                    "includeDeclaration": {
                        "type": "boolean",
                        "description": "Include the declaration in results",
                        "default": true
                    }
                },
                "required": ["file", "line", "character"]
            }),
            LspFeature::DocumentSymbols | LspFeature::Diagnostics => json!({
                "type": "object",
                "properties": {"file": file},
                "required": ["file"]
            }),
            LspFeature::WorkspaceSymbols => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Symbol name or pattern to search for"}
                },
                "required": ["query"]
            }),
        }
    }
}

/// Descriptors for the features `capabilities` advertises.
pub fn feature_descriptors(server: &str, capabilities: &Value) -> Vec<RemoteCapabilityDescriptor> {
    LspFeature::ALL
        .into_iter()
        .filter(|feature| feature.is_supported(capabilities))
        .map(|feature| RemoteCapabilityDescriptor {
            name: feature.name().to_string(),
            description: feature.description().to_string(),
            input_schema: feature.input_schema(),
            server_name: server.to_string(),
            kind: CapabilityKind::LanguageFeature,
            uri: None,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionArgs {
    file: PathBuf,
    line: u32,
    character: u32,
    #[serde(default = "default_true")]
    include_declaration: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
}

/// Run a language feature against `client` and return the raw result.
pub async fn call_feature(client: &RpcClient, name: &str, arguments: Value) -> Result<Value> {
    let feature = LspFeature::from_name(name)
        .ok_or_else(|| RpcError::NotFound(format!("'{}' is not a language feature", name)))?;

    let capabilities = client.capabilities().unwrap_or_else(|| json!({}));
    if !feature.is_supported(&capabilities) {
        return Err(RpcError::NotFound(format!(
            "server '{}' does not provide {}",
            client.name(),
            feature.name()
        )));
    }

    let params = match feature {
        LspFeature::WorkspaceSymbols => {
            let args: QueryArgs = serde_json::from_value(arguments)?;
            serde_json::to_value(WorkspaceSymbolParams {
                partial_result_params: PartialResultParams::default(),
                work_done_progress_params: WorkDoneProgressParams::default(),
                query: args.query,
            })?
        }
        LspFeature::DocumentSymbols => {
            let args: FileArgs = serde_json::from_value(arguments)?;
            let uri = open_document(client, &args.file).await?;
            serde_json::to_value(DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            })?
        }
        LspFeature::Diagnostics => {
            let args: FileArgs = serde_json::from_value(arguments)?;
            let uri = open_document(client, &args.file).await?;
            let published = client
                .wait_for_notification(PUBLISH_DIAGNOSTICS, uri.as_str(), DIAGNOSTICS_WAIT)
                .await;
            return Ok(published
                .map(|stored| stored.params)
                .unwrap_or_else(|| json!({"uri": uri.as_str(), "diagnostics": []})));
        }
        LspFeature::GotoDefinition | LspFeature::Hover | LspFeature::FindReferences => {
            let args: PositionArgs = serde_json::from_value(arguments)?;
            let uri = open_document(client, &args.file).await?;
            let position = TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position {
                    line: args.line,
                    character: args.character,
                },
            };

            match feature {
                LspFeature::GotoDefinition => serde_json::to_value(GotoDefinitionParams {
                    text_document_position_params: position,
                    work_done_progress_params: WorkDoneProgressParams::default(),
                    partial_result_params: PartialResultParams::default(),
                })?,
                LspFeature::Hover => serde_json::to_value(HoverParams {
                    text_document_position_params: position,
                    work_done_progress_params: WorkDoneProgressParams::default(),
                })?,
                _ => serde_json::to_value(ReferenceParams {
                    text_document_position: position,
                    context: ReferenceContext {
                        include_declaration: args.include_declaration,
                    },
                    work_done_progress_params: WorkDoneProgressParams::default(),
                    partial_result_params: PartialResultParams::default(),
                })?,
            }
        }
    };

    client.request(feature.method(), Some(params)).await
}

fn resolve_path(client: &RpcClient, file: &Path) -> Result<(PathBuf, Url)> {
    let path = if file.is_absolute() {
        file.clean()
    } else {
        client.root().join(file).clean()
    };
    let uri = Url::from_file_path(&path).map_err(|_| RpcError::InvalidPath(path.clone()))?;
    Ok((path, uri))
}

/// Send `didOpen` the first time a document is used on this connection.
///
/// Concurrent callers for the same document wait until the notification is
/// written, so no request for it reaches the server first.
async fn open_document(client: &RpcClient, file: &Path) -> Result<Url> {
    let (path, uri) = resolve_path(client, file)?;
    let _opening = client.lock_document_opens().await;
    if client.is_document_open(&path) {
        return Ok(uri);
    }

    let text = tokio::fs::read_to_string(&path).await?;
    let params = DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: uri.clone(),
            language_id: language_id_for(client.config(), &path),
            version: 1,
            text,
        },
    };
    client
        .notify(DID_OPEN, Some(serde_json::to_value(params)?))
        .await?;

    client.mark_document_open(&path);
    debug!("[{}] Opened {}", client.name(), path.display());
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, ServerKind};
    use crate::test_utils::FakeServer;
    use crate::transport::Message;

    #[test]
    fn test_from_name() {
        assert_eq!(LspFeature::from_name("hover"), Some(LspFeature::Hover));
        assert_eq!(
            LspFeature::from_name("lsp_goto_definition"),
            Some(LspFeature::GotoDefinition)
        );
        assert_eq!(LspFeature::from_name("rename"), None);
    }

    #[test]
    fn test_descriptors_follow_capabilities() {
        let capabilities = json!({
            "hoverProvider": true,
            "definitionProvider": {"workDoneProgress": false},
            "referencesProvider": false,
            "documentSymbolProvider": null
        });
        let names: Vec<String> = feature_descriptors("ra", &capabilities)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["goto_definition", "hover", "diagnostics"]);
    }

    #[test]
    fn test_schemas_require_file() {
        for feature in LspFeature::ALL {
            let schema = feature.input_schema();
            assert_eq!(schema["type"], "object");
            let required = schema["required"].as_array().unwrap();
            if feature == LspFeature::WorkspaceSymbols {
                assert_eq!(required, &vec![json!("query")]);
            } else {
                assert!(required.contains(&json!("file")));
            }
        }
    }

    #[test]
    fn test_position_args_default_include_declaration() {
        let args: PositionArgs =
            serde_json::from_value(json!({"file": "src/lib.rs", "line": 3, "character": 7})).unwrap();
        assert!(args.include_declaration);
        assert_eq!(args.file, PathBuf::from("src/lib.rs"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_open_document_once_before_requests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn lib() {}\n").unwrap();

        let mut config = ServerConfig::new("fake-ls", "unused").with_kind(ServerKind::Lsp);
        config.request_timeout = 5.0;
        config.startup_timeout = 5.0;
        let client = RpcClient::new(config).with_root(dir.path());
        let (mut server, reader, writer) = FakeServer::pair();
        let (started, _) = tokio::join!(
            client.start_with_transport(reader, writer),
            server.handshake(json!({"hoverProvider": true}))
        );
        started.unwrap();

        let args = json!({"file": "lib.rs", "line": 0, "character": 3});
        let fake = async {
            match server.recv().await {
                Message::Notification(n) => assert_eq!(n.method, DID_OPEN),
                other => panic!("expected didOpen first, got {:?}", other),
            }
            for _ in 0..2 {
                match server.recv().await {
                    Message::Request(req) => {
                        assert_eq!(req.method, LspFeature::Hover.method());
                        server.reply(req.id, json!({"contents": "doc"})).await;
                    }
                    other => panic!("expected hover request, got {:?}", other),
                }
            }
        };
        let (first, second, _) = tokio::join!(
            call_feature(&client, "hover", args.clone()),
            call_feature(&client, "hover", args.clone()),
            fake
        );
        assert_eq!(first.unwrap()["contents"], "doc");
        assert_eq!(second.unwrap()["contents"], "doc");
        assert!(client.is_document_open(&dir.path().join("lib.rs")));
    }
}
