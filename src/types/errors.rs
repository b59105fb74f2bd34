use crate::types::ServerStatus;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    /// Spawn failure, stream EOF or write failure. Fatal to the connection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed frame header or body. Fatal to the connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request '{method}' timed out after {}ms", timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    #[error("Remote error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Server '{server}' is not running (status: {status})")]
    NotRunning { server: String, status: ServerStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid file path: {0}")]
    InvalidPath(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// Whether this error takes the whole connection down with it.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RpcError::Transport("eof".into()).is_connection_fatal());
        assert!(RpcError::Protocol("bad header".into()).is_connection_fatal());
        assert!(!RpcError::Timeout {
            method: "tools/list".into(),
            timeout: Duration::from_millis(10),
        }
        .is_connection_fatal());
        assert!(!RpcError::Remote {
            code: -32601,
            message: "Method not found".into(),
            data: None,
        }
        .is_connection_fatal());
    }

    #[test]
    fn test_not_running_message() {
        let err = RpcError::NotRunning {
            server: "github".into(),
            status: ServerStatus::Error,
        };
        assert_eq!(
            err.to_string(),
            "Server 'github' is not running (status: error)"
        );
    }
}
