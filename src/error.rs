//! Error types for the voice session manager.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`VoiceError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// The session-issuance endpoint refused or returned garbage.
    pub const CREDENTIAL_FAILED: &str = "CREDENTIAL_FAILED";

    /// The offer/answer handshake failed.
    pub const NEGOTIATION_FAILED: &str = "NEGOTIATION_FAILED";

    /// The realtime channel failed or disconnected.
    pub const CHANNEL_FAILED: &str = "CHANNEL_FAILED";

    /// An inbound payload could not be parsed as a structured event.
    pub const MALFORMED_EVENT: &str = "MALFORMED_EVENT";

    /// The assistant asked for a tool that is not registered.
    pub const UNKNOWN_TOOL: &str = "UNKNOWN_TOOL";

    /// A tool rejected its arguments or failed while executing.
    pub const TOOL_FAILED: &str = "TOOL_FAILED";

    /// Conversation log could not be written.
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";

    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
}

/// Top-level error type for session management.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Remote credential issuance failed.
    #[error("[{}] {}", error_codes::CREDENTIAL_FAILED, .0)]
    Credential(String),

    /// Offer/answer negotiation failed.
    #[error("[{}] {}", error_codes::NEGOTIATION_FAILED, .0)]
    Negotiation(String),

    /// Connection-level failure reported by the channel.
    #[error("[{}] {}", error_codes::CHANNEL_FAILED, .0)]
    Channel(String),

    /// Unparseable inbound payload.
    #[error("[{}] {}", error_codes::MALFORMED_EVENT, .0)]
    MalformedEvent(String),

    /// Tool name not found in the registry.
    #[error("[{}] unknown tool: {}", error_codes::UNKNOWN_TOOL, .0)]
    UnknownTool(String),

    /// Tool argument validation or execution failure.
    #[error("[{}] {}", error_codes::TOOL_FAILED, .0)]
    ToolFailed(String),

    /// Log write or directory failure.
    #[error("[{}] {}", error_codes::STORAGE_ERROR, .0)]
    Storage(String),

    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),
}

impl VoiceError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Credential(_) => error_codes::CREDENTIAL_FAILED,
            Self::Negotiation(_) => error_codes::NEGOTIATION_FAILED,
            Self::Channel(_) => error_codes::CHANNEL_FAILED,
            Self::MalformedEvent(_) => error_codes::MALFORMED_EVENT,
            Self::UnknownTool(_) => error_codes::UNKNOWN_TOOL,
            Self::ToolFailed(_) => error_codes::TOOL_FAILED,
            Self::Storage(_) => error_codes::STORAGE_ERROR,
            Self::Config(_) => error_codes::CONFIG_INVALID,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Credential(m)
            | Self::Negotiation(m)
            | Self::Channel(m)
            | Self::MalformedEvent(m)
            | Self::UnknownTool(m)
            | Self::ToolFailed(m)
            | Self::Storage(m)
            | Self::Config(m) => m,
        }
    }

    /// Returns true if this error ends the current session.
    ///
    /// Credential, negotiation and channel failures are fatal. Everything
    /// else is recovered locally and the conversation continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Credential(_) | Self::Negotiation(_) | Self::Channel(_)
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_prefix() {
        let err = VoiceError::Credential("status 500".into());
        assert_eq!(err.to_string(), "[CREDENTIAL_FAILED] status 500");
    }

    #[test]
    fn unknown_tool_display_names_the_tool() {
        let err = VoiceError::UnknownTool("launchRocket".into());
        assert_eq!(err.to_string(), "[UNKNOWN_TOOL] unknown tool: launchRocket");
        assert_eq!(err.message(), "launchRocket");
    }

    #[test]
    fn codes_are_stable() {
        let cases = [
            (VoiceError::Credential(String::new()), "CREDENTIAL_FAILED"),
            (VoiceError::Negotiation(String::new()), "NEGOTIATION_FAILED"),
            (VoiceError::Channel(String::new()), "CHANNEL_FAILED"),
            (VoiceError::MalformedEvent(String::new()), "MALFORMED_EVENT"),
            (VoiceError::UnknownTool(String::new()), "UNKNOWN_TOOL"),
            (VoiceError::ToolFailed(String::new()), "TOOL_FAILED"),
            (VoiceError::Storage(String::new()), "STORAGE_ERROR"),
            (VoiceError::Config(String::new()), "CONFIG_INVALID"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn only_connection_errors_are_fatal() {
        assert!(VoiceError::Credential("x".into()).is_fatal());
        assert!(VoiceError::Negotiation("x".into()).is_fatal());
        assert!(VoiceError::Channel("x".into()).is_fatal());
        assert!(!VoiceError::MalformedEvent("x".into()).is_fatal());
        assert!(!VoiceError::UnknownTool("x".into()).is_fatal());
        assert!(!VoiceError::ToolFailed("x".into()).is_fatal());
        assert!(!VoiceError::Storage("x".into()).is_fatal());
        assert!(!VoiceError::Config("x".into()).is_fatal());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VoiceError>();
    }
}
