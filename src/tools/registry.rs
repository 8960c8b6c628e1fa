//! Tool registry.
//!
//! The [`ToolRegistry`] holds the tools the assistant may call, exports
//! their definitions for the session configuration, and executes calls.
//! Execution never fails past the registry boundary: unknown tools, bad
//! arguments and handler errors all come back as failure [`ToolResult`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::builtins::builtin_tools;
use super::types::{Tool, ToolDefinition, ToolResult};
use crate::error::{Result, VoiceError};

/// Registry of assistant-invocable tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for tool in builtin_tools() {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.definition();
        match self
            .definitions
            .iter_mut()
            .find(|d| d.name == definition.name)
        {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn exists(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Look up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::UnknownTool`] when `name` is not registered.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| VoiceError::UnknownTool(name.to_owned()))
    }

    /// Execute `name` with raw JSON argument text.
    pub fn execute(&self, name: &str, args_json: &str) -> ToolResult {
        let outcome = self
            .lookup(name)
            .and_then(|tool| parse_arguments(args_json).and_then(|args| tool.execute(args)));
        match outcome {
            Ok(result) => {
                info!(tool = name, "executed tool");
                result
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolResult::failure(e.to_string())
            }
        }
    }
}

/// Parse tool arguments; empty text means no arguments.
fn parse_arguments(raw: &str) -> Result<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| VoiceError::ToolFailed(format!("invalid tool arguments: {e}")))
}
