//! Stdio JSON-RPC client
//!
//! Request/response correlation, notification dispatch and the initialize
//! handshake for one server connection.

mod client;
mod notifications;
mod pending;

pub use client::{ConnectionState, NotificationHandler, RpcClient};
pub use notifications::{NotificationStore, StoredNotification};
pub use pending::{PendingRequest, PendingTable};
