//! Built-in language server entries
//!
//! Zero-config routing for the most common languages. They never
//! auto-start; `Registry::ensure_server_for_file` launches them on demand.

use crate::config::server::{ServerConfig, ServerKind};

pub fn get_default_configs() -> Vec<ServerConfig> {
    vec![
        rust_config(),
        python_config(),
        typescript_config(),
        go_config(),
    ]
}

fn lsp(name: &str, command: &str, args: &[&str], language_id: &str, extensions: &[&str]) -> ServerConfig {
    let mut config = ServerConfig::new(name, command)
        .with_args(args.iter().copied())
        .with_kind(ServerKind::Lsp);
    config.auto_start = false;
    config.language_id = Some(language_id.to_string());
    config.file_extensions = extensions.iter().map(|e| e.to_string()).collect();
    config
}

fn typescript_config() -> ServerConfig {
    lsp(
        "typescript-language-server",
        "typescript-language-server",
        &["--stdio"],
        "typescript",
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"],
    )
}

fn python_config() -> ServerConfig {
    lsp(
        "pyright",
        "pyright-langserver",
        &["--stdio"],
        "python",
        &["py", "pyi"],
    )
}

fn rust_config() -> ServerConfig {
    lsp("rust-analyzer", "rust-analyzer", &[], "rust", &["rs"])
}

fn go_config() -> ServerConfig {
    lsp("gopls", "gopls", &[], "go", &["go"])
}
