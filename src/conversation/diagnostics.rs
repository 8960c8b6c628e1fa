//! API traffic diagnostics at `off`, `concise` or `verbose` verbosity.

use tracing::info;

use crate::config::ApiLogLevel;
use crate::realtime::ServerEvent;
use crate::realtime::events::event_type;

/// Emit the diagnostic line for one inbound event.
pub fn log_inbound(
    level: ApiLogLevel,
    log_activity_updates: bool,
    raw: &serde_json::Value,
    event: &ServerEvent,
) {
    match level {
        ApiLogLevel::Off => {}
        ApiLogLevel::Concise => {
            if let Some(line) = concise_line(event, log_activity_updates) {
                info!(target: "aurora::api", event_type = event_type(raw), "{line}");
            }
        }
        ApiLogLevel::Verbose => {
            let pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
            info!(target: "aurora::api", event_type = event_type(raw), "received:\n{pretty}");
        }
    }
}

/// Human-readable summary of an event, or `None` when it is not worth a line.
///
/// "Assistant finished speaking" is left to the activity log when activity
/// updates are enabled.
pub fn concise_line(event: &ServerEvent, log_activity_updates: bool) -> Option<String> {
    match event {
        ServerEvent::SpeechStarted => Some("User started speaking".to_owned()),
        ServerEvent::SpeechStopped => Some("User stopped speaking".to_owned()),
        ServerEvent::ItemCreated { item } if item.is_user() => {
            Some("User input captured".to_owned())
        }
        ServerEvent::ItemCreated { item } if item.is_assistant() => {
            Some("Assistant responding".to_owned())
        }
        ServerEvent::TranscriptDelta { delta } => Some(format!("Assistant: \"{delta}\"")),
        ServerEvent::TranscriptDone { transcript } => {
            Some(format!("Complete response: \"{transcript}\""))
        }
        ServerEvent::ContentPartDone if !log_activity_updates => {
            Some("Assistant finished speaking".to_owned())
        }
        ServerEvent::ResponseDone { response } => {
            let usage = response.as_ref().and_then(|r| r.usage.as_ref());
            Some(match usage {
                Some(u) => format!(
                    "Response complete (tokens: {} total, {} in, {} out)",
                    u.total_tokens, u.input_tokens, u.output_tokens
                ),
                None => "Response complete".to_owned(),
            })
        }
        ServerEvent::SessionCreated { .. } => Some("Session created".to_owned()),
        ServerEvent::SessionUpdated => Some("Session updated".to_owned()),
        ServerEvent::FunctionCallArgumentsDone { name, .. } => {
            Some(format!("Tool call: {name}"))
        }
        ServerEvent::Error { error } => Some(format!(
            "Server error: {}",
            error
                .as_ref()
                .and_then(|e| e.message.as_deref())
                .unwrap_or("unknown")
        )),
        _ => None,
    }
}
