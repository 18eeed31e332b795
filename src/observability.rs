use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, TriageConfig};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global tracing subscriber once.
///
/// `RUST_LOG` wins over the configured level when it is set.
///
/// # Errors
/// Returns an error when another subscriber was already installed.
pub fn init_tracing(config: &TriageConfig) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level().as_directive()));
        let registry = tracing_subscriber::registry().with(env_filter);

        match config.log_format() {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init(),
        }
        .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;

        tracing::info!(
            environment = %config.environment(),
            level = config.log_level().as_directive(),
            "tracing initialized"
        );
        Ok::<(), Error>(())
    })?;
    Ok(())
}
