//! API Configuration Module
//!
//! Settings for the backing store, identity provider, SMS gateway, cache
//! TTLs, CORS and rate limiting. Configuration is loaded from environment
//! variables with defaults suited to local development, then checked with
//! [`ApiConfig::validate`] before the server starts.

use crate::constants::{
    DEFAULT_CACHE_CLEANUP_INTERVAL_SECS, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_RATE_LIMIT_AUTHENTICATED, DEFAULT_RATE_LIMIT_BURST,
    DEFAULT_RATE_LIMIT_UNAUTHENTICATED, DEFAULT_SMS_API_URL, DEFAULT_SMS_SENDER_ID,
    DEFAULT_WS_CAPACITY, MIN_SECRET_KEY_LENGTH, VALID_LOG_LEVELS,
};
use opsflow_cache::CacheTtls;
use opsflow_core::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// ENVIRONMENT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            other => Err(ConfigError::InvalidValue {
                field: "ENVIRONMENT".to_string(),
                value: other.to_string(),
                reason: "expected development, production or testing".to_string(),
            }),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Testing => "testing",
        };
        f.write_str(s)
    }
}

/// Which `CustomerStore` implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Supabase PostgREST over HTTPS.
    Postgrest,
    /// Process-local store for development and tests.
    Memory,
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,

    // ========================================================================
    // Server
    // ========================================================================
    pub bind_host: String,
    pub port: u16,
    /// Request body cap in bytes.
    pub max_file_size: usize,
    /// Broadcast channel capacity for the WebSocket feed.
    pub ws_capacity: usize,

    // ========================================================================
    // Hosted database and auth
    // ========================================================================
    pub store_backend: StoreBackend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<SecretString>,
    pub supabase_service_key: Option<SecretString>,
    pub secret_key: Option<SecretString>,

    // ========================================================================
    // SMS gateway
    // ========================================================================
    pub sms_api_url: String,
    pub sms_api_key: Option<SecretString>,
    pub sms_sender_id: String,

    // ========================================================================
    // Cache
    // ========================================================================
    pub cache_ttls: CacheTtls,
    pub cache_cleanup_interval: Duration,

    // ========================================================================
    // Logging
    // ========================================================================
    /// One of DEBUG, INFO, WARNING, ERROR, CRITICAL.
    pub log_level: String,

    // ========================================================================
    // CORS
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate limiting
    // ========================================================================
    pub rate_limit_enabled: bool,
    /// Requests per minute per client IP.
    pub rate_limit_unauthenticated: u32,
    /// Requests per minute per user.
    pub rate_limit_authenticated: u32,
    pub rate_limit_burst: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_host: "0.0.0.0".to_string(),
            port: 8000,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            ws_capacity: DEFAULT_WS_CAPACITY,
            store_backend: StoreBackend::Memory,
            supabase_url: None,
            supabase_key: None,
            supabase_service_key: None,
            secret_key: None,
            sms_api_url: DEFAULT_SMS_API_URL.to_string(),
            sms_api_key: None,
            sms_sender_id: DEFAULT_SMS_SENDER_ID.to_string(),
            cache_ttls: CacheTtls::default(),
            cache_cleanup_interval: Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL_SECS),
            log_level: "INFO".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            cors_allow_credentials: true,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            rate_limit_enabled: true,
            rate_limit_unauthenticated: DEFAULT_RATE_LIMIT_UNAUTHENTICATED,
            rate_limit_authenticated: DEFAULT_RATE_LIMIT_AUTHENTICATED,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn secret(value: Option<String>) -> Option<SecretString> {
    value
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
}

fn split_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ENVIRONMENT`: development | production | testing
    /// - `OPSFLOW_BIND`, `PORT`: listen address (default 0.0.0.0:8000)
    /// - `OPSFLOW_STORE`: `memory` or `postgrest` (default: postgrest when
    ///   `SUPABASE_URL` is set)
    /// - `SUPABASE_URL`, `SUPABASE_KEY`, `SUPABASE_SERVICE_KEY`, `SECRET_KEY`
    /// - `ARKESEL_API_KEY` (or `SMS_API_KEY`), `ARKESEL_SENDER_ID` (or
    ///   `SMS_SENDER_ID`), `SMS_API_URL`
    /// - `CACHE_TTL_CUSTOMERS`, `CACHE_TTL_DASHBOARD`, `CACHE_TTL_ACTIONS`,
    ///   `CACHE_TTL_TEMPLATES`, `CACHE_CLEANUP_INTERVAL_SECS`
    /// - `LOG_LEVEL`, `MAX_FILE_SIZE`, `OPSFLOW_WS_CAPACITY`
    /// - `CORS_ORIGINS`, `CORS_ALLOW_CREDENTIALS`, `CORS_MAX_AGE_SECS`
    /// - `RATE_LIMIT_ENABLED`, `RATE_LIMIT_UNAUTHENTICATED`,
    ///   `RATE_LIMIT_AUTHENTICATED`, `RATE_LIMIT_BURST`
    ///
    /// Unparseable values fall back to their defaults; [`ApiConfig::validate`]
    /// reports the rules the values must satisfy.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let either = |a: &str, b: &str| lookup(a).or_else(|| lookup(b));

        let environment = match lookup("ENVIRONMENT") {
            Some(value) => value.parse()?,
            None => Environment::Development,
        };

        let supabase_url = lookup("SUPABASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let store_backend = match lookup("OPSFLOW_STORE").as_deref().map(str::trim) {
            Some("memory") => StoreBackend::Memory,
            Some("postgrest") | Some("supabase") => StoreBackend::Postgrest,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "OPSFLOW_STORE".to_string(),
                    value: other.to_string(),
                    reason: "expected memory or postgrest".to_string(),
                })
            }
            None if supabase_url.is_some() => StoreBackend::Postgrest,
            None => StoreBackend::Memory,
        };

        let cache_ttls = CacheTtls {
            customers: Duration::from_secs(parse_or(
                lookup("CACHE_TTL_CUSTOMERS"),
                defaults.cache_ttls.customers.as_secs(),
            )),
            dashboard: Duration::from_secs(parse_or(
                lookup("CACHE_TTL_DASHBOARD"),
                defaults.cache_ttls.dashboard.as_secs(),
            )),
            actions: Duration::from_secs(parse_or(
                lookup("CACHE_TTL_ACTIONS"),
                defaults.cache_ttls.actions.as_secs(),
            )),
            templates: Duration::from_secs(parse_or(
                lookup("CACHE_TTL_TEMPLATES"),
                defaults.cache_ttls.templates.as_secs(),
            )),
        };

        Ok(Self {
            environment,
            bind_host: lookup("OPSFLOW_BIND").unwrap_or(defaults.bind_host),
            port: parse_or(lookup("PORT"), defaults.port),
            max_file_size: parse_or(lookup("MAX_FILE_SIZE"), defaults.max_file_size),
            ws_capacity: parse_or(lookup("OPSFLOW_WS_CAPACITY"), defaults.ws_capacity),
            store_backend,
            supabase_url,
            supabase_key: secret(lookup("SUPABASE_KEY")),
            supabase_service_key: secret(lookup("SUPABASE_SERVICE_KEY")),
            secret_key: secret(lookup("SECRET_KEY")),
            sms_api_url: lookup("SMS_API_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.sms_api_url),
            sms_api_key: secret(either("ARKESEL_API_KEY", "SMS_API_KEY")),
            sms_sender_id: either("ARKESEL_SENDER_ID", "SMS_SENDER_ID")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.sms_sender_id),
            cache_ttls,
            cache_cleanup_interval: Duration::from_secs(parse_or(
                lookup("CACHE_CLEANUP_INTERVAL_SECS"),
                DEFAULT_CACHE_CLEANUP_INTERVAL_SECS,
            )),
            log_level: lookup("LOG_LEVEL")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or(defaults.log_level),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| split_origins(&s))
                .unwrap_or(defaults.cors_origins),
            cors_allow_credentials: lookup("CORS_ALLOW_CREDENTIALS")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.cors_allow_credentials),
            cors_max_age_secs: parse_or(lookup("CORS_MAX_AGE_SECS"), defaults.cors_max_age_secs),
            rate_limit_enabled: lookup("RATE_LIMIT_ENABLED")
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.rate_limit_enabled),
            rate_limit_unauthenticated: parse_or(
                lookup("RATE_LIMIT_UNAUTHENTICATED"),
                defaults.rate_limit_unauthenticated,
            ),
            rate_limit_authenticated: parse_or(
                lookup("RATE_LIMIT_AUTHENTICATED"),
                defaults.rate_limit_authenticated,
            ),
            rate_limit_burst: parse_or(lookup("RATE_LIMIT_BURST"), defaults.rate_limit_burst),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Listen address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == origin)
    }

    /// Check the configuration rules, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "LOG_LEVEL".to_string(),
                value: self.log_level.clone(),
                reason: format!("Log level must be one of: {}", VALID_LOG_LEVELS.join(", ")),
            });
        }

        let ttls = [
            ("CACHE_TTL_CUSTOMERS", self.cache_ttls.customers),
            ("CACHE_TTL_DASHBOARD", self.cache_ttls.dashboard),
            ("CACHE_TTL_ACTIONS", self.cache_ttls.actions),
            ("CACHE_TTL_TEMPLATES", self.cache_ttls.templates),
            ("CACHE_CLEANUP_INTERVAL_SECS", self.cache_cleanup_interval),
        ];
        if let Some((field, _)) = ttls.iter().find(|(_, ttl)| ttl.is_zero()) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.store_backend == StoreBackend::Postgrest {
            if self.supabase_url.is_none() {
                return Err(ConfigError::MissingRequired {
                    field: "SUPABASE_URL".to_string(),
                });
            }
            if self.supabase_key.is_none() {
                return Err(ConfigError::MissingRequired {
                    field: "SUPABASE_KEY".to_string(),
                });
            }
        }

        if self.is_production() {
            self.validate_production()?;
        }
        Ok(())
    }

    fn validate_production(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.supabase_url {
            if !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "SUPABASE_URL".to_string(),
                    value: url.clone(),
                    reason: "Supabase URL must start with https://".to_string(),
                });
            }
        }

        let secret_len = self
            .secret_key
            .as_ref()
            .map(|s| s.expose_secret().len())
            .unwrap_or(0);
        if secret_len < MIN_SECRET_KEY_LENGTH {
            return Err(ConfigError::InvalidValue {
                field: "SECRET_KEY".to_string(),
                value: "<redacted>".to_string(),
                reason: format!(
                    "Secret key must be at least {} characters long",
                    MIN_SECRET_KEY_LENGTH
                ),
            });
        }

        if let Some(origin) = self.cors_origins.iter().find(|o| !o.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "CORS_ORIGINS".to_string(),
                value: origin.clone(),
                reason: "Production CORS origins must use HTTPS".to_string(),
            });
        }

        if self.store_backend == StoreBackend::Memory {
            return Err(ConfigError::InvalidValue {
                field: "OPSFLOW_STORE".to_string(),
                value: "memory".to_string(),
                reason: "the in-memory store is not allowed in production".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.cache_ttls, CacheTtls::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_ttls_from_env() {
        let config = config_from(&[
            ("CACHE_TTL_CUSTOMERS", "30"),
            ("CACHE_TTL_DASHBOARD", "5"),
            ("CACHE_TTL_ACTIONS", "not-a-number"),
        ])
        .unwrap();
        assert_eq!(config.cache_ttls.customers, Duration::from_secs(30));
        assert_eq!(config.cache_ttls.dashboard, Duration::from_secs(5));
        assert_eq!(config.cache_ttls.actions, Duration::from_secs(180));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = config_from(&[("CACHE_TTL_DASHBOARD", "0")]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CACHE_TTL_DASHBOARD"));
    }

    #[test]
    fn test_log_level_rules() {
        let config = config_from(&[("LOG_LEVEL", "warning")]).unwrap();
        assert_eq!(config.log_level, "WARNING");
        assert!(config.validate().is_ok());

        let config = config_from(&[("LOG_LEVEL", "verbose")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_supabase_url_selects_postgrest() {
        let config = config_from(&[
            ("SUPABASE_URL", "https://x.supabase.co/"),
            ("SUPABASE_KEY", "anon"),
        ])
        .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgrest);
        assert_eq!(config.supabase_url.as_deref(), Some("https://x.supabase.co"));
        assert!(config.validate().is_ok());

        let config = config_from(&[("OPSFLOW_STORE", "postgrest")]).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_production_rules() {
        let base = [
            ("ENVIRONMENT", "production"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_KEY", "anon"),
            ("CORS_ORIGINS", "https://app.example.com"),
        ];
        let config = config_from(&base).unwrap();
        assert!(config.is_production());
        assert!(config.validate().is_err());

        let mut with_secret = base.to_vec();
        with_secret.push(("SECRET_KEY", "0123456789abcdef0123456789abcdef"));
        assert!(config_from(&with_secret).unwrap().validate().is_ok());

        let mut insecure = with_secret.clone();
        insecure[1] = ("SUPABASE_URL", "http://x.supabase.co");
        assert!(config_from(&insecure).unwrap().validate().is_err());

        let mut http_origin = with_secret;
        http_origin[3] = ("CORS_ORIGINS", "https://a.example.com, http://b.example.com");
        assert!(config_from(&http_origin).unwrap().validate().is_err());
    }

    #[test]
    fn test_invalid_environment() {
        assert!(config_from(&[("ENVIRONMENT", "staging")]).is_err());
        assert!(config_from(&[("OPSFLOW_STORE", "redis")]).is_err());
    }

    #[test]
    fn test_sms_key_aliases() {
        let config = config_from(&[("SMS_API_KEY", "k"), ("SMS_SENDER_ID", "Grid")]).unwrap();
        assert!(config.sms_api_key.is_some());
        assert_eq!(config.sms_sender_id, "Grid");
    }
}
