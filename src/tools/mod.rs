//! Local actions the assistant can invoke.

pub mod builtins;
pub mod registry;
pub mod types;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolAction, ToolDefinition, ToolResult};
