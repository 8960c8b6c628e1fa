//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/aurora/` | `~/.local/share/aurora/` |
//! | Config | `~/Library/Application Support/aurora/` | `~/.config/aurora/` |
//!
//! Overrides for testing or custom deployments:
//! - `AURORA_DATA_DIR` overrides [`data_dir`]
//! - `AURORA_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/aurora/` by default. Override with
/// the `AURORA_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AURORA_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("aurora"))
        .unwrap_or_else(|| PathBuf::from("/tmp/aurora-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/aurora/` by default. Override with
/// the `AURORA_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AURORA_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("aurora"))
        .unwrap_or_else(|| PathBuf::from("/tmp/aurora-config"))
}

/// Conversation log directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
