// src/observability/mod.rs
//! Logging and metrics setup for the binary

use crate::utils::config::{LogFormat, ObservabilityConfig};
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| EngineError::Config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = Registry::default().with(filter);
    let installed = match config.log_format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init(),
    };

    installed.map_err(|e| EngineError::Config(format!("Failed to install subscriber: {}", e)))
}

/// Install the Prometheus exporter when a listen address is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(addr) = &config.metrics_addr else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| EngineError::Config(format!("Invalid metrics address '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::Config(format!("Failed to install metrics exporter: {}", e)))?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_without_address() {
        assert!(init_metrics(&ObservabilityConfig::default()).is_ok());
    }

    #[test]
    fn test_metrics_rejects_bad_address() {
        let config = ObservabilityConfig {
            metrics_addr: Some("not an address".into()),
            ..ObservabilityConfig::default()
        };
        assert!(matches!(init_metrics(&config), Err(EngineError::Config(_))));
    }
}
