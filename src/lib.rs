//! Aurora: a voice session manager for a realtime speech assistant.
//!
//! A microphone toggle turns a conversation on and off. While it is on, the
//! crate negotiates a media session with the realtime service, exchanges
//! structured events over the data channel, executes tool calls, keeps a
//! bounded on-screen transcript and records every event to disk.
//!
//! # Architecture
//!
//! - **Controller**: OFF/ACTIVE state machine fed from a single input queue
//! - **Negotiator**: credential issuance and offer/answer over HTTPS
//! - **Watchdog**: inactivity timeout evaluated on each tick
//! - **Tools**: assistant-invocable actions with structured results
//! - **Session log**: append-only event log with debounced atomic writes
//! - **Host bridge**: NDJSON protocol to the native shell that owns audio
//!   and WebRTC

pub mod aurora_dirs;
pub mod config;
pub mod conversation;
pub mod error;
pub mod host;
pub mod realtime;
pub mod redact;
pub mod session_log;
pub mod tools;

pub use config::AssistantConfig;
pub use conversation::{ActionHooks, ConversationController, ConversationState, Input};
pub use error::{Result, VoiceError};
pub use realtime::{SessionNegotiator, Transport};
pub use session_log::ConversationLogger;
pub use tools::ToolRegistry;
