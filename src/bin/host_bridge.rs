//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Usage: `aurora-host [CONFIG_PATH]`. Without a path the platform default
//! config location is used; a missing file means defaults.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use std::path::PathBuf;

use aurora::AssistantConfig;
use aurora::host::stdio::run_stdio_bridge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AssistantConfig::default_config_path);
    let config = AssistantConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", config_path.display()))?;

    tracing::info!(config = %config_path.display(), "aurora-host starting");

    run_stdio_bridge(config).await.map_err(|e| {
        tracing::error!(error = %e, "aurora-host exited with error");
        anyhow::anyhow!("aurora-host failed: {e}")
    })?;

    tracing::info!("aurora-host shut down cleanly");
    Ok(())
}
