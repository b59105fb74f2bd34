//! Remote capabilities exposed as uniform local tools

mod adapter;
mod descriptor;
mod output;

pub use adapter::{collect_tools, wrap_descriptors, CapabilityAdapter, LocalTool};
pub use descriptor::{CapabilityKind, RemoteCapabilityDescriptor};
pub use output::ToolOutput;
