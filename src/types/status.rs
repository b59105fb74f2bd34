//! Connection lifecycle states

use serde::Serialize;
use std::fmt;

/// State machine of a single server connection.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`, with
/// `Starting -> Error` and `Running -> Error` on failure. A fresh start is
/// allowed from `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Error => "error",
        }
    }

    /// A new `start()` may begin from these states.
    pub fn can_start(&self) -> bool {
        matches!(self, ServerStatus::Stopped | ServerStatus::Error)
    }

    /// Shutting down, or already down on purpose.
    pub fn is_winding_down(&self) -> bool {
        matches!(self, ServerStatus::Stopping | ServerStatus::Stopped)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
