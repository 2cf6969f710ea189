//! Structured logging initialization.
//!
//! Installs a `tracing-subscriber` registry with an env filter and a pretty or
//! JSON formatter, driven by [`LoggingConfig`]. `RUST_LOG` overrides the
//! configured level when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Initialize the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{crate_name}={level}",
            crate_name = env!("CARGO_CRATE_NAME"),
            level = config.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    } else {
        registry.with(fmt::layer().pretty()).try_init()
    };
    installed.map_err(|e| ProtocolError::ConfigError(format!("Failed to install logger: {e}")))?;

    tracing::info!(
        app = %config.app_name,
        level = %config.log_level,
        format = if config.json_format { "json" } else { "pretty" },
        "Logging initialized"
    );
    Ok(())
}
