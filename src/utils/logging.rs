//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber driven by [`LoggingConfig`]: one
//! `fmt` layer per enabled sink (console, file), sharing a single filter.
//! `RUST_LOG` takes precedence over the configured level when set.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{BosonError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the filter: `RUST_LOG` if present, else the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_ascii_lowercase()))
}

/// One output layer per enabled sink.
fn sink_layers(config: &LoggingConfig) -> Result<Vec<BoxedLayer>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.log_to_console {
        let layer = fmt::layer().with_target(true);
        layers.push(if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            BosonError::ConfigError("log_file_path is required for file logging".to_string())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BosonError::ConfigError(format!("Failed to open log file: {e}")))?;
        let layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file));
        layers.push(if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    if layers.is_empty() {
        return Err(BosonError::ConfigError(
            "at least one of log_to_console or log_to_file must be enabled".to_string(),
        ));
    }
    Ok(layers)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let layers = sink_layers(config)?;
    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config))
        .try_init()
        .map_err(|e| BosonError::ConfigError(format!("Failed to install logger: {e}")))?;

    tracing::info!(
        app = %config.app_name,
        console = config.log_to_console,
        file = config.log_to_file,
        "Logging initialized"
    );
    Ok(())
}
