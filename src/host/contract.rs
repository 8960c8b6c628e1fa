//! Versioned newline-delimited JSON messages exchanged with the native shell.
//!
//! The shell owns the microphone, speakers and the WebRTC stack. It sends
//! [`HostCommand`]s on stdin and receives [`HostEvent`]s wrapped in an
//! [`EventEnvelope`] on stdout.

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationState, Message};
use crate::realtime::ConnectionState;
use crate::tools::ToolResult;

/// Contract version stamped on every outbound envelope.
pub const EVENT_VERSION: u32 = 1;

/// Command sent by the shell.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command")]
pub enum HostCommand {
    /// A key press; the configured toggle key flips the microphone.
    #[serde(rename = "key")]
    Key { key: String },
    #[serde(rename = "toggle")]
    Toggle,
    /// Local offer SDP, in reply to `offer.request`.
    #[serde(rename = "offer")]
    Offer { sdp: String },
    #[serde(rename = "channel.open")]
    ChannelOpen,
    /// One inbound data-channel message (UTF-8 JSON text).
    #[serde(rename = "channel.message")]
    ChannelMessage { data: String },
    #[serde(rename = "connection.state")]
    ConnectionState { state: ConnectionState },
    #[serde(rename = "shutdown")]
    Shutdown,
}

impl HostCommand {
    /// Parse one protocol line.
    ///
    /// # Errors
    ///
    /// Returns the serde error for unknown commands or bad fields.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Event sent to the shell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum HostEvent {
    /// Create a peer connection with local audio and a data channel, then
    /// reply with `offer`.
    #[serde(rename = "offer.request")]
    OfferRequest,
    /// Remote answer SDP to apply.
    #[serde(rename = "answer")]
    Answer { sdp: String },
    #[serde(rename = "channel.send")]
    ChannelSend { data: String },
    /// Close the data channel and the peer connection.
    #[serde(rename = "channel.close")]
    ChannelClose,
    #[serde(rename = "state")]
    State { state: ConversationState },
    #[serde(rename = "transcript")]
    Transcript { messages: Vec<Message> },
    #[serde(rename = "volume")]
    Volume { level: u8 },
    #[serde(rename = "module.visibility")]
    ModuleVisibility { module: String, visible: bool },
    #[serde(rename = "tool.result")]
    ToolResult {
        name: String,
        call_id: String,
        result: ToolResult,
    },
    /// A command line could not be understood.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Outbound line: the event plus the contract version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    pub v: u32,
    #[serde(flatten)]
    pub event: HostEvent,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(event: HostEvent) -> Self {
        Self {
            v: EVENT_VERSION,
            event,
        }
    }

    /// Serialize to one JSON line (without the trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"v":{EVENT_VERSION},"event":"error","message":"serialization failed: {e}"}}"#)
        })
    }
}
