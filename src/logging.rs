use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::snapshot::{ConfigSnapshot, MAX_TOKENS_KEY};

const LOG_FILE_NAME: &str = "ai-config-display.log";

/// Parse a rotation duration string into a Rotation enum value
pub fn parse_rotation(rotation: &str) -> Result<Rotation> {
    match rotation.to_lowercase().as_str() {
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        "never" => Ok(Rotation::NEVER),
        _ => Err(anyhow!("Invalid rotation value: {}. Valid values are: hourly, daily, never", rotation)),
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging to stdout and a rotating JSON log file
///
/// # Arguments
///
/// * `log_dir` - Directory where log files will be stored
/// * `rotation` - Log rotation duration (HOURLY, DAILY, NEVER)
///
/// # Environment Variables
///
/// * `RUST_LOG` - Sets the log level (trace, debug, info, warn, error). Defaults to "info" if not set.
pub fn init<P: AsRef<Path>>(log_dir: P, rotation: Rotation) -> Result<()> {
    let log_dir = log_dir.as_ref();

    // Create the log directory if it doesn't exist
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // Set up file appender with specified rotation
    let file_appender = RollingFileAppender::new(rotation, log_dir, LOG_FILE_NAME);
    // Set up a non-blocking writer
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Plain text to stdout, JSON to the log file
    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter()),
        )
        .with(
            fmt::Layer::new()
                .json()
                .with_writer(non_blocking)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter()),
        );

    // Set the subscriber as the global default
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    info!("Logging initialized to {}", log_dir.display());

    // The guard flushes the file writer on drop, so it has to live for the whole process
    Box::leak(Box::new(guard));

    Ok(())
}

/// Log a served request and how it was answered
pub fn log_request(method: &str, path: &str, status: u16, format: &str) {
    info!(
        target: "request",
        method = %method,
        path = %path,
        status = status,
        format = %format,
        "Request served"
    );
}

/// Log a snapshot that is about to be published
pub fn log_snapshot(snapshot: &ConfigSnapshot) {
    let max_tokens = snapshot
        .param(MAX_TOKENS_KEY)
        .map(|v| v.to_string())
        .unwrap_or_else(|| String::from("unset"));

    info!(
        target: "snapshot",
        model = %snapshot.model_name(),
        messages = snapshot.messages().len(),
        max_tokens = %max_tokens,
        enabled = snapshot.enabled(),
        "Configuration updated"
    );
    debug!(target: "snapshot", "Current messages: {:?}", snapshot.messages());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_rotation() {
        assert!(parse_rotation("Daily").is_ok());
        assert!(parse_rotation("hourly").is_ok());
        assert!(parse_rotation("never").is_ok());
        assert!(parse_rotation("weekly").is_err());
    }

    #[test]
    fn test_init_logging() {
        let temp_dir = TempDir::new().unwrap();
        let result = init(temp_dir.path(), Rotation::DAILY);
        assert!(result.is_ok());
        assert!(temp_dir.path().exists());
    }
}
