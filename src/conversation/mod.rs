//! Conversation state machine and the pieces it drives.

pub mod controller;
pub mod diagnostics;
pub mod transcript;
pub mod watchdog;

pub use controller::{
    ActionHooks, ConversationController, ConversationState, Input, NoopHooks, StopReason,
};
pub use transcript::{Message, MessageKind, Transcript};
pub use watchdog::{ActivityClock, ActivityWatchdog, WatchdogVerdict};
