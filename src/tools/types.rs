//! Core tool types.
//!
//! Defines the [`Tool`] trait that every assistant-invocable action
//! implements, the [`ToolDefinition`] advertised to the assistant, and the
//! structured [`ToolResult`] returned over the channel.

use serde::Serialize;

use crate::error::Result;

/// Public description of a tool, advertised in the session configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// A `function`-type definition.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".to_owned(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Side effect a successful tool asks the controller to perform.
///
/// Serialized flat into the result as `action` plus its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolAction {
    /// End the conversation (ACTIVE → OFF).
    EndConversation,
    /// Set output volume, already clamped to `0..=100`.
    SetVolume { level: u8 },
    /// Show or hide a named external surface.
    SetModuleVisibility { module: String, visible: bool },
}

/// Result of a tool execution, sent back to the assistant as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(flatten)]
    pub action: Option<ToolAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result requesting `action`.
    pub fn success(action: ToolAction, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: Some(action),
            message: Some(message.into()),
            error: None,
        }
    }

    /// Create a failed result with an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: None,
            message: None,
            error: Some(error.into()),
        }
    }

    /// JSON text sent as the `function_call_output`.
    pub fn to_output(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"failed to serialize tool result"}"#.to_owned()
        })
    }
}

/// An action the assistant may invoke.
///
/// Tools validate arguments and describe the side effect they want; they do
/// not perform controller-level effects themselves.
pub trait Tool: Send + Sync {
    /// Name the assistant calls (e.g. `"setVolume"`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn schema(&self) -> serde_json::Value;

    /// Execute the tool with parsed JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::ToolFailed`](crate::error::VoiceError::ToolFailed)
    /// for invalid arguments.
    fn execute(&self, args: serde_json::Value) -> Result<ToolResult>;

    /// Definition advertised to the assistant.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.schema())
    }
}
