//! Configuration types for the voice session manager.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VoiceError};
use crate::redact::RedactedString;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Input controls.
    pub controls: ControlsConfig,
    /// Conversation behaviour (timeouts, transcript size, instructions).
    pub conversation: ConversationConfig,
    /// Remote realtime service settings.
    pub realtime: RealtimeConfig,
    /// Diagnostic logging of API traffic and activity.
    pub diagnostics: DiagnosticsConfig,
    /// Conversation log persistence.
    pub logging: LoggingConfig,
}

/// Input controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Key that toggles the microphone between OFF and ACTIVE.
    pub microphone_toggle_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            microphone_toggle_key: "o".to_owned(),
        }
    }
}

/// Conversation behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Silence (in ms) from either side that ends the conversation.
    pub inactivity_timeout_ms: u64,
    /// Maximum transcript messages retained for display.
    pub max_messages: usize,
    /// Instructions sent to the assistant in the session configuration.
    pub instructions: String,
    /// Output modalities requested from the assistant.
    pub modalities: Vec<String>,
    /// Ask the assistant to speak first once the channel opens.
    pub greet_on_connect: bool,
    /// Model used to transcribe the user's speech. Empty disables user
    /// transcript lines.
    pub input_transcription_model: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: 60_000,
            max_messages: 10,
            instructions: "You are Aurora, a helpful assistant for a smart mirror. \
                           Be concise and clear in your responses."
                .to_owned(),
            modalities: vec!["text".to_owned(), "audio".to_owned()],
            greet_on_connect: true,
            input_transcription_model: "whisper-1".to_owned(),
        }
    }
}

impl ConversationConfig {
    /// Transcription model to request, if transcription is enabled.
    pub fn input_transcription(&self) -> Option<String> {
        let model = self.input_transcription_model.trim();
        (!model.is_empty()).then(|| model.to_owned())
    }

    /// Inactivity threshold as a [`Duration`].
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }
}

/// Remote realtime service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Base URL of the service (no trailing path).
    pub api_base_url: String,
    /// Realtime model requested for the session.
    pub model: String,
    /// Voice requested for the session.
    pub voice: String,
    /// Static API secret. Leave empty to read it from `api_key_env`.
    pub api_key: String,
    /// Environment variable consulted when `api_key` is empty.
    pub api_key_env: String,
    /// Timeout for each HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com".to_owned(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_owned(),
            voice: "verse".to_owned(),
            api_key: String::new(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

impl RealtimeConfig {
    /// Resolve the API secret from config or the environment.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] when neither source provides a key.
    pub fn resolve_api_key(&self) -> Result<RedactedString> {
        if !self.api_key.trim().is_empty() {
            return Ok(RedactedString::new(self.api_key.trim()));
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(RedactedString::new(key.trim())),
            _ => Err(VoiceError::Config(format!(
                "no API key configured; set realtime.api_key or {}",
                self.api_key_env
            ))),
        }
    }
}

/// Verbosity of API traffic diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiLogLevel {
    /// No API diagnostics.
    #[default]
    #[serde(alias = "false")]
    Off,
    /// One human-readable line per interesting event.
    Concise,
    /// Every inbound event pretty-printed.
    Verbose,
}

/// Diagnostic logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// API traffic verbosity.
    pub api_log: ApiLogLevel,
    /// Log activity-clock updates and the timeout countdown.
    pub log_activity_updates: bool,
    /// General debug output (channel lifecycle, outbound configuration).
    pub debug: bool,
}

/// Conversation log persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for session log files (None = `aurora_dirs::logs_dir()`).
    pub logs_dir: Option<PathBuf>,
    /// Quiet period before a debounced write, in ms.
    pub save_debounce_ms: u64,
    /// Persist events recorded before any session id was issued.
    ///
    /// When enabled, such events are written under a synthetic
    /// `orphan-<uuid>` session id instead of being discarded.
    pub persist_orphaned_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logs_dir: None,
            save_debounce_ms: 1_000,
            persist_orphaned_events: false,
        }
    }
}

impl LoggingConfig {
    /// Effective log directory.
    pub fn resolved_logs_dir(&self) -> PathBuf {
        self.logs_dir
            .clone()
            .unwrap_or_else(crate::aurora_dirs::logs_dir)
    }

    /// Debounce quiet period as a [`Duration`].
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VoiceError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| VoiceError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VoiceError::Config(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| VoiceError::Config(format!("failed to write {}: {e}", path.display())))
    }

    /// Returns the default config file path: `<config_dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::aurora_dirs::config_dir().join("config.toml")
    }
}
