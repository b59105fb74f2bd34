//! Shared error and status types

mod errors;
mod status;

pub use errors::{Result, RpcError};
pub use status::ServerStatus;
