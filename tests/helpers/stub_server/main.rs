//! Stub stdio server for integration tests
//!
//! Speaks Content-Length framed JSON-RPC 2.0 on stdin/stdout. Behaviour is
//! picked with flags:
//!
//! - `--tag <t>` -- identifies this instance in tool output.
//! - `--tools a,b` -- tool names advertised by `tools/list` (default `echo`).
//! - `--mode <m>` -- one of:
//!   - `normal` (default) -- MCP server with capabilities `{"x": true}`.
//!   - `lsp` -- language server offering hover and definition, publishing one
//!     diagnostic per opened document.
//!   - `fail-init` -- answers `initialize` with an error.
//!   - `silent-init` -- never answers `initialize`.
//!   - `bad-frame` -- answers `initialize` with a malformed header.
//!
//! Tool calls named `crash` exit the process; `sleep` is never answered.

use serde_json::{json, Value};
use std::io::{self, BufRead, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Lsp,
    FailInit,
    SilentInit,
    BadFrame,
}

struct Options {
    tag: String,
    tools: Vec<String>,
    mode: Mode,
}

fn parse_options() -> Options {
    let mut options = Options {
        tag: "stub".to_string(),
        tools: vec!["echo".to_string()],
        mode: Mode::Normal,
    };

    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let value = args.next().unwrap_or_default();
        match flag.as_str() {
            "--tag" => options.tag = value,
            "--tools" => {
                options.tools = value
                    .split(',')
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "--mode" => {
                options.mode = match value.as_str() {
                    "lsp" => Mode::Lsp,
                    "fail-init" => Mode::FailInit,
                    "silent-init" => Mode::SilentInit,
                    "bad-frame" => Mode::BadFrame,
                    _ => Mode::Normal,
                }
            }
            other => eprintln!("stub_server: ignoring unknown flag {}", other),
        }
    }
    options
}

/// Next frame body, or `None` on EOF.
fn read_frame(input: &mut impl BufRead) -> Option<Value> {
    let mut length = None;
    loop {
        let mut line = String::new();
        if input.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let mut body = vec![0u8; length?];
    input.read_exact(&mut body).ok()?;
    serde_json::from_slice(&body).ok()
}

fn write_frame(out: &mut impl Write, message: &Value) {
    let body = message.to_string();
    let _ = write!(out, "Content-Length: {}\r\n\r\n{}", body.len(), body);
    let _ = out.flush();
}

fn result(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error(id: &Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn text(content: String, is_error: bool) -> Value {
    json!({"content": [{"type": "text", "text": content}], "isError": is_error})
}

fn main() {
    let options = parse_options();
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    eprintln!("stub_server[{}] ready", options.tag);

    while let Some(message) = read_frame(&mut input) {
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = message.get("id").filter(|id| !id.is_null()).cloned() else {
            // Notifications
            match method {
                "exit" => std::process::exit(0),
                "textDocument/didOpen" if options.mode == Mode::Lsp => {
                    let uri = params["textDocument"]["uri"].clone();
                    let diagnostics = json!({
                        "jsonrpc": "2.0",
                        "method": "textDocument/publishDiagnostics",
                        "params": {
                            "uri": uri,
                            "diagnostics": [{
                                "range": {
                                    "start": {"line": 0, "character": 0},
                                    "end": {"line": 0, "character": 4}
                                },
                                "severity": 1,
                                "source": "stub",
                                "message": format!("stub diagnostic from {}", options.tag)
                            }]
                        }
                    });
                    write_frame(&mut out, &diagnostics);
                }
                _ => {}
            }
            continue;
        };

        let response = match method {
            "initialize" => match options.mode {
                Mode::FailInit => error(&id, -32603, "initialization refused"),
                Mode::SilentInit => continue,
                Mode::BadFrame => {
                    let _ = out.write_all(b"Content-Length: not-a-number\r\n\r\n{}");
                    let _ = out.flush();
                    continue;
                }
                Mode::Lsp => result(
                    &id,
                    json!({
                        "capabilities": {
                            "hoverProvider": true,
                            "definitionProvider": true,
                            "textDocumentSync": 1
                        },
                        "serverInfo": {"name": "stub-ls", "version": "0.0.0"}
                    }),
                ),
                Mode::Normal => result(
                    &id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"x": true},
                        "serverInfo": {"name": "stub", "version": "0.0.0"}
                    }),
                ),
            },
            "ping" => result(&id, json!({})),
            "shutdown" => result(&id, Value::Null),
            "tools/list" => {
                let tools: Vec<Value> = options
                    .tools
                    .iter()
                    .map(|name| {
                        json!({
                            "name": name,
                            "description": format!("{} from {}", name, options.tag),
                            "inputSchema": {
                                "type": "object",
                                "properties": {"text": {"type": "string"}}
                            }
                        })
                    })
                    .collect();
                result(&id, json!({"tools": tools}))
            }
            "resources/list" => result(&id, json!({"resources": []})),
            "prompts/list" => result(&id, json!({"prompts": []})),
            "tools/call" => {
                let name = params["name"].as_str().unwrap_or("");
                match name {
                    "crash" => std::process::exit(3),
                    "sleep" => continue,
                    "echo" => {
                        let echoed = params["arguments"]["text"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| options.tag.clone());
                        result(&id, text(echoed, false))
                    }
                    known if options.tools.iter().any(|t| t == known) => {
                        result(&id, text(format!("{}:{}", options.tag, known), false))
                    }
                    unknown => result(&id, text(format!("unknown tool {}", unknown), true)),
                }
            }
            "textDocument/hover" if options.mode == Mode::Lsp => result(
                &id,
                json!({"contents": {"kind": "plaintext", "value": format!("hover from {}", options.tag)}}),
            ),
            "textDocument/definition" if options.mode == Mode::Lsp => {
                let uri = params["textDocument"]["uri"].clone();
                result(
                    &id,
                    json!([{
                        "uri": uri,
                        "range": {
                            "start": {"line": 2, "character": 4},
                            "end": {"line": 2, "character": 8}
                        }
                    }]),
                )
            }
            other => error(&id, -32601, &format!("Method not found: {}", other)),
        };

        write_frame(&mut out, &response);
    }
}
