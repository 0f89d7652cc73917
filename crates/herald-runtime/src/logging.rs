//! Logging bootstrap

use herald_core::{HeraldError, HeraldResult};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogConfig, LogFormat};

/// Build the filter: `RUST_LOG` when given, the configured directive otherwise
pub fn build_filter(config: &LogConfig, rust_log: Option<&str>) -> HeraldResult<EnvFilter> {
    let directive = rust_log.unwrap_or(&config.filter);
    EnvFilter::try_new(directive)
        .map_err(|e| HeraldError::Logging(format!("bad filter {directive:?}: {e}")))
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> HeraldResult<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(config, rust_log.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    installed.map_err(|e| HeraldError::Logging(e.to_string()))?;

    tracing::debug!(filter = %config.filter, format = ?config.format, "logging initialised");
    Ok(())
}
