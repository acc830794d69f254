//! Tracing subscriber setup

use crate::config::{LogFormat, LoggingConfig};
use crate::{BridgeError, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already installed.
///
/// ```no_run
/// use portway_bridge::{init_tracing, LogFormat, LoggingConfig};
///
/// let config = LoggingConfig {
///     level: "portway_bridge=debug".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config).unwrap();
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| BridgeError::Config(format!("invalid log level {:?}: {}", config.level, e)))?;

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| BridgeError::Config(format!("failed to initialize tracing: {}", e)))
}
