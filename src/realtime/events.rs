//! Structured events exchanged with the realtime assistant over the data channel.
//!
//! Inbound events are classified into the closed [`ServerEvent`] sum type.
//! Types this crate does not act on land in [`ServerEvent::Unrecognized`] so
//! new server events never break parsing. Outbound events are [`ClientEvent`]s.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};
use crate::tools::ToolDefinition;

/// Event sent by the assistant service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Incremental text of the assistant's spoken response.
    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta {
        #[serde(default)]
        delta: String,
    },
    /// Full transcript of one spoken response part.
    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone,
    /// The assistant finished a response.
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseSummary>,
    },
    #[serde(rename = "conversation.item.created")]
    ItemCreated { item: ConversationItem },
    /// Transcription of the user's spoken input, when enabled on the session.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,
    /// The assistant wants a tool executed.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        name: String,
        call_id: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Option<SessionInfo>,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated,
    /// Server-side error report (does not close the channel by itself).
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<ErrorDetail>,
    },
    /// Any type not listed above.
    #[serde(other)]
    Unrecognized,
}

/// Summary attached to `response.done`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseSummary {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Token accounting for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Conversation item announced by `conversation.item.created`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConversationItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl ConversationItem {
    pub fn is_user(&self) -> bool {
        self.role.as_deref() == Some("user")
    }

    pub fn is_assistant(&self) -> bool {
        self.role.as_deref() == Some("assistant")
    }
}

/// Session descriptor carried by `session.created`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: Option<String>,
}

/// Body of a server `error` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServerEvent {
    /// Parse raw channel bytes into the raw JSON value and its classification.
    ///
    /// The raw value is what gets logged; the classification drives the
    /// state machine.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::MalformedEvent`] when the bytes are not JSON,
    /// carry no `type`, or a known type has fields of the wrong shape.
    pub fn parse(raw: &[u8]) -> Result<(serde_json::Value, Self)> {
        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| VoiceError::MalformedEvent(format!("invalid JSON: {e}")))?;
        let event = Self::deserialize(&value).map_err(|e| {
            VoiceError::MalformedEvent(format!("unexpected {} event: {e}", event_type(&value)))
        })?;
        Ok((value, event))
    }
}

/// The `type` discriminator of a raw event, or `"<untyped>"`.
pub fn event_type(value: &serde_json::Value) -> &str {
    value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("<untyped>")
}

/// Event sent to the assistant service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Session configuration sent once the channel opens.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
    /// Ask the assistant to produce a response now.
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseCreate },
    /// Add an item (tool output) to the conversation.
    #[serde(rename = "conversation.item.create")]
    ItemCreate { item: FunctionCallOutput },
}

/// Payload of `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub instructions: String,
    pub modalities: Vec<String>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: String,
    /// Omitted when user speech should not be transcribed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
}

/// Transcription settings for the user's spoken input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Payload of `response.create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseCreate {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A `function_call_output` conversation item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCallOutput {
    #[serde(rename = "type")]
    pub item_type: String,
    pub call_id: String,
    pub output: String,
}

impl ClientEvent {
    /// Session configuration advertising instructions, modalities and tools.
    pub fn session_update(
        instructions: impl Into<String>,
        modalities: Vec<String>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self::SessionUpdate {
            session: SessionUpdate {
                instructions: instructions.into(),
                modalities,
                tools,
                tool_choice: "auto".to_owned(),
                input_audio_transcription: None,
            },
        }
    }

    /// Ask the service to transcribe user speech with `model`.
    ///
    /// Has no effect on events other than `session.update`.
    #[must_use]
    pub fn with_input_transcription(mut self, model: Option<String>) -> Self {
        if let Self::SessionUpdate { session } = &mut self {
            session.input_audio_transcription =
                model.map(|model| InputAudioTranscription { model });
        }
        self
    }

    /// Request a response with the given modalities.
    pub fn response_create(modalities: Vec<String>) -> Self {
        Self::ResponseCreate {
            response: ResponseCreate {
                modalities,
                instructions: None,
            },
        }
    }

    /// Return a tool's serialized result for `call_id`.
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ItemCreate {
            item: FunctionCallOutput {
                item_type: "function_call_output".to_owned(),
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    /// JSON value of this event (what gets logged and sent).
    pub fn to_value(&self) -> serde_json::Value {
        // Serializing these plain structs cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
