//! Constants for OpsFlow API
//!
//! This module contains the constant values used throughout the API.

// ============================================================================
// SECURITY
// ============================================================================

/// Minimum length for `SECRET_KEY` in production
pub const MIN_SECRET_KEY_LENGTH: usize = 32;

/// Accepted `LOG_LEVEL` values
pub const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Default rate limit for unauthenticated requests (per minute)
pub const DEFAULT_RATE_LIMIT_UNAUTHENTICATED: u32 = 100;

/// Default rate limit for authenticated requests (per minute)
pub const DEFAULT_RATE_LIMIT_AUTHENTICATED: u32 = 1000;

/// Default burst size for rate limiting
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

// ============================================================================
// SERVER
// ============================================================================

/// Default request body cap (10 MiB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Default WebSocket broadcast capacity
pub const DEFAULT_WS_CAPACITY: usize = 1024;

/// Interval between expired-entry sweeps
pub const DEFAULT_CACHE_CLEANUP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// SMS GATEWAY
// ============================================================================

pub const DEFAULT_SMS_API_URL: &str = "https://sms.arkesel.com/api/v2/sms/send";

/// Status lookups append the message id to this base
pub const SMS_STATUS_URL: &str = "https://sms.arkesel.com/api/v2/sms";

pub const DEFAULT_SMS_SENDER_ID: &str = "OpsFlow";

/// Recipients per gateway request
pub const SMS_BATCH_SIZE: usize = 1000;

/// Pause between recipient chunks
pub const SMS_BATCH_PAUSE_MS: u64 = 500;

/// Gateway request timeout
pub const SMS_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// BACKING STORE
// ============================================================================

/// Timeout for PostgREST and GoTrue requests
pub const STORE_TIMEOUT_SECS: u64 = 30;
