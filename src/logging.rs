//! Tracing subscriber setup.

use alpaca_core::config::LogFormat;
use alpaca_core::{ConfigError, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Fails with
/// [`ConfigError::AlreadyInitialized`] if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|_| ConfigError::AlreadyInitialized {
        what: "tracing subscriber".to_string(),
    })
}
