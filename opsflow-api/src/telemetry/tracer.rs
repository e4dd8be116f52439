//! Tracing subscriber initialization
//!
//! Structured logs go to stdout, as JSON in production and human-readable
//! otherwise. `RUST_LOG` overrides the filter derived from `LOG_LEVEL`.

use crate::error::{ApiError, ApiResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" | "plain" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    /// `LOG_LEVEL` value: DEBUG, INFO, WARNING, ERROR or CRITICAL
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let log_format = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| LogFormat::parse(&s))
            .unwrap_or(if environment.eq_ignore_ascii_case("production") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            });
        Self {
            service_name: std::env::var("OPSFLOW_SERVICE_NAME")
                .unwrap_or_else(|_| "opsflow-api".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            log_format,
        }
    }
}

impl TelemetryConfig {
    /// `tracing` level for the configured `LOG_LEVEL`.
    pub fn tracing_level(&self) -> &'static str {
        match self.log_level.trim().to_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }

    fn default_filter(&self) -> String {
        let level = self.tracing_level();
        format!(
            "opsflow_api={level},opsflow_cache={level},tower_http=info,{level}",
            level = level
        )
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        environment = %config.environment,
        log_level = %config.log_level,
        "Telemetry initialized"
    );
    Ok(())
}
