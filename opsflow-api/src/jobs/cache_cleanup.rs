//! Cache Cleanup Background Task
//!
//! Expired entries are already invisible to readers; this task evicts them so
//! the store and its namespace index do not grow without bound between writes.
//!
//! # Configuration
//!
//! ```rust
//! use opsflow_api::jobs::CacheCleanupConfig;
//! use std::time::Duration;
//!
//! let config = CacheCleanupConfig {
//!     check_interval: Duration::from_secs(60),
//!     enabled: true,
//!     log_sweeps: false,
//! };
//! ```

use crate::config::Environment;
use crate::constants::DEFAULT_CACHE_CLEANUP_INTERVAL_SECS;
use crate::telemetry::metrics;
use opsflow_cache::{CachedValue, TtlCache};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct CacheCleanupConfig {
    /// How often to sweep (default: 60 seconds)
    pub check_interval: Duration,

    /// When false the task returns immediately
    pub enabled: bool,

    /// Log every sweep that removed entries at info level (default: true)
    pub log_sweeps: bool,
}

impl Default for CacheCleanupConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL_SECS),
            enabled: true,
            log_sweeps: true,
        }
    }
}

impl CacheCleanupConfig {
    /// Short interval and chatty logs.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            enabled: true,
            log_sweeps: true,
        }
    }

    pub fn production() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL_SECS),
            enabled: true,
            log_sweeps: false,
        }
    }

    /// Preset for `environment`. Tests drive sweeps by hand.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self::development(),
            Environment::Production => Self::production(),
            Environment::Testing => Self {
                enabled: false,
                ..Self::development()
            },
        }
    }

    pub fn with_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct CacheCleanupMetrics {
    /// Total entries evicted since startup
    pub entries_expired: AtomicU64,

    /// Total sweeps completed
    pub cleanup_cycles: AtomicU64,

    /// Total sweeps that failed
    pub cleanup_errors: AtomicU64,
}

impl CacheCleanupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheCleanupSnapshot {
        CacheCleanupSnapshot {
            entries_expired: self.entries_expired.load(Ordering::Relaxed),
            cleanup_cycles: self.cleanup_cycles.load(Ordering::Relaxed),
            cleanup_errors: self.cleanup_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCleanupSnapshot {
    pub entries_expired: u64,
    pub cleanup_cycles: u64,
    pub cleanup_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep expired entries every `check_interval` until `shutdown_rx` turns
/// true. A failed sweep is logged and counted; the loop keeps going.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(cache_cleanup_task(cache, config, shutdown_rx));
///
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn cache_cleanup_task(
    cache: Arc<TtlCache<CachedValue>>,
    config: CacheCleanupConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheCleanupMetrics> {
    let metrics = Arc::new(CacheCleanupMetrics::new());
    if !config.enabled {
        tracing::info!("Cache cleanup task disabled");
        return metrics;
    }

    let mut cleanup_interval = interval(config.check_interval);
    cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        "Cache cleanup task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Cache cleanup task shutting down");
                    break;
                }
            }

            _ = cleanup_interval.tick() => {
                sweep(&cache, &config, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        entries_expired = snapshot.entries_expired,
        cleanup_cycles = snapshot.cleanup_cycles,
        cleanup_errors = snapshot.cleanup_errors,
        "Cache cleanup task completed"
    );

    metrics
}

/// One sweep. Returns the number of entries removed.
pub fn sweep(
    cache: &TtlCache<CachedValue>,
    config: &CacheCleanupConfig,
    cleanup_metrics: &CacheCleanupMetrics,
) -> usize {
    cleanup_metrics.cleanup_cycles.fetch_add(1, Ordering::Relaxed);

    match cache.cleanup_expired() {
        Ok(removed) => {
            cleanup_metrics
                .entries_expired
                .fetch_add(removed as u64, Ordering::Relaxed);
            if let Some(m) = metrics() {
                m.record_expired(removed);
            }
            if removed > 0 && config.log_sweeps {
                tracing::info!(removed, "Evicted expired cache entries");
            } else {
                tracing::trace!(removed, "Cache sweep completed");
            }
            removed
        }
        Err(e) => {
            tracing::error!(error = %e, "Cache cleanup failed");
            cleanup_metrics.cleanup_errors.fetch_add(1, Ordering::Relaxed);
            0
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use opsflow_cache::{CacheKey, CallArgs, ManualClock};

    fn expiring_cache(clock: Arc<ManualClock>) -> Arc<TtlCache<CachedValue>> {
        let cache: Arc<TtlCache<CachedValue>> = Arc::new(TtlCache::with_clock(clock));
        for i in 0..3 {
            let key = CacheKey::derive("customers", "list_customers", &CallArgs::new().arg(&i));
            let value: CachedValue = Arc::new(i);
            cache.set(&key, value, Duration::from_secs(1)).unwrap();
        }
        let keep = CacheKey::derive("templates", "templates", &CallArgs::new());
        let value: CachedValue = Arc::new("t");
        cache.set(&keep, value, Duration::from_secs(300)).unwrap();
        cache
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(CacheCleanupConfig::development().check_interval, Duration::from_secs(10));
        assert_eq!(
            CacheCleanupConfig::production().check_interval,
            Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL_SECS)
        );
        assert!(!CacheCleanupConfig::for_environment(Environment::Testing).enabled);
        assert!(CacheCleanupConfig::for_environment(Environment::Production).enabled);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let clock = Arc::new(ManualClock::new());
        let cache = expiring_cache(clock.clone());
        let metrics = CacheCleanupMetrics::new();
        let config = CacheCleanupConfig::default();

        assert_eq!(sweep(&cache, &config, &metrics), 0);
        clock.advance(Duration::from_secs(2));
        assert_eq!(sweep(&cache, &config, &metrics), 3);
        assert_eq!(cache.len().unwrap(), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.entries_expired, 3);
        assert_eq!(snapshot.cleanup_cycles, 2);
        assert_eq!(snapshot.cleanup_errors, 0);
    }

    #[tokio::test]
    async fn test_task_sweeps_until_shutdown() {
        let clock = Arc::new(ManualClock::new());
        let cache = expiring_cache(clock.clone());
        clock.advance(Duration::from_secs(2));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = CacheCleanupConfig::default().with_interval(Duration::from_millis(10));
        let handle = tokio::spawn(cache_cleanup_task(cache.clone(), config, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();

        assert_eq!(metrics.snapshot().entries_expired, 3);
        assert!(metrics.snapshot().cleanup_cycles >= 1);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disabled_task_returns_immediately() {
        let cache: Arc<TtlCache<CachedValue>> = Arc::new(TtlCache::new());
        let (_tx, rx) = watch::channel(false);
        let config = CacheCleanupConfig {
            enabled: false,
            ..Default::default()
        };
        let metrics = cache_cleanup_task(cache, config, rx).await;
        assert_eq!(metrics.snapshot().cleanup_cycles, 0);
    }
}
