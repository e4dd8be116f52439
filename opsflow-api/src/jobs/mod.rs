//! Background Jobs for OpsFlow API
//!
//! - `cache_cleanup`: Evicts expired cache entries on an interval
//!
//! # Usage
//!
//! ```ignore
//! use opsflow_api::jobs::{cache_cleanup_task, CacheCleanupConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let config = CacheCleanupConfig::for_environment(api_config.environment);
//! tokio::spawn(cache_cleanup_task(cache, config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod cache_cleanup;

pub use cache_cleanup::{
    cache_cleanup_task, CacheCleanupConfig, CacheCleanupMetrics, CacheCleanupSnapshot,
};
