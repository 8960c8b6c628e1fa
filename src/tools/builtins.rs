//! Built-in tools offered to the assistant.

use std::sync::Arc;

use serde_json::json;

use super::types::{Tool, ToolAction, ToolResult};
use crate::error::{Result, VoiceError};

pub const END_CONVERSATION: &str = "endConversation";
pub const SET_VOLUME: &str = "setVolume";
pub const SET_MODULE_VISIBILITY: &str = "setModuleVisibility";

/// All built-in tools, in advertisement order.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(EndConversationTool),
        Arc::new(SetVolumeTool),
        Arc::new(SetModuleVisibilityTool),
    ]
}

/// Ends the current conversation and turns the microphone off.
pub struct EndConversationTool;

impl Tool for EndConversationTool {
    fn name(&self) -> &str {
        END_CONVERSATION
    }

    fn description(&self) -> &str {
        "Ends the current conversation and turns off the voice assistant"
    }

    fn schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    fn execute(&self, _args: serde_json::Value) -> Result<ToolResult> {
        Ok(ToolResult::success(
            ToolAction::EndConversation,
            "Conversation ended",
        ))
    }
}

/// Sets the output volume as a percentage.
pub struct SetVolumeTool;

impl Tool for SetVolumeTool {
    fn name(&self) -> &str {
        SET_VOLUME
    }

    fn description(&self) -> &str {
        "Sets the speaker volume as a percentage from 0 (mute) to 100 (loudest)"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "level": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 100,
                    "description": "Volume percentage"
                }
            },
            "required": ["level"]
        })
    }

    fn execute(&self, args: serde_json::Value) -> Result<ToolResult> {
        let requested = args
            .get("level")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| VoiceError::ToolFailed("`level` must be a number".to_owned()))?;
        let level = requested.clamp(0.0, 100.0).round() as u8;
        Ok(ToolResult::success(
            ToolAction::SetVolume { level },
            format!("Volume set to {level}%"),
        ))
    }
}

/// Shows or hides a named surface on the display.
pub struct SetModuleVisibilityTool;

impl Tool for SetModuleVisibilityTool {
    fn name(&self) -> &str {
        SET_MODULE_VISIBILITY
    }

    fn description(&self) -> &str {
        "Shows or hides a named module on the display"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "module": {"type": "string", "description": "Module name, e.g. \"clock\""},
                "visible": {"type": "boolean", "description": "true to show, false to hide"}
            },
            "required": ["module", "visible"]
        })
    }

    fn execute(&self, args: serde_json::Value) -> Result<ToolResult> {
        let module = args
            .get("module")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| VoiceError::ToolFailed("`module` must be a non-empty string".to_owned()))?;
        let visible = args
            .get("visible")
            .and_then(serde_json::Value::as_bool)
            .ok_or_else(|| VoiceError::ToolFailed("`visible` must be a boolean".to_owned()))?;
        Ok(ToolResult::success(
            ToolAction::SetModuleVisibility {
                module: module.to_owned(),
                visible,
            },
            format!("{module} {}", if visible { "shown" } else { "hidden" }),
        ))
    }
}
