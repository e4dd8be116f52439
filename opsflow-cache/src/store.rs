//! In-process TTL store.
//!
//! # Consistency
//!
//! Every operation runs under a single `std::sync::Mutex`. The lock is held
//! only for the synchronous critical section and never across an `.await`,
//! so a `(value, expires_at)` pair is always installed and observed as a unit.
//!
//! An entry is visible while `now < expires_at`. A read that finds an expired
//! entry evicts it and reports a miss; stale values are never returned.
//!
//! # Namespace index
//!
//! Alongside the entries the store keeps `namespace -> {keys}`. Bulk
//! invalidation walks the index instead of scanning every key, and the index
//! is updated in the same critical section as the entry map.

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    namespace: String,
    expires_at: Instant,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    namespaces: HashMap<String, HashSet<String>>,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            namespaces: HashMap::new(),
        }
    }

    /// Remove one entry and its index slot.
    fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        if let Some(keys) = self.namespaces.get_mut(&entry.namespace) {
            keys.remove(key);
            if keys.is_empty() {
                self.namespaces.remove(&entry.namespace);
            }
        }
        true
    }

    fn remove_namespace(&mut self, namespace: &str) -> usize {
        let Some(keys) = self.namespaces.remove(namespace) else {
            return 0;
        };
        keys.iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count()
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live value.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries currently stored, live or not yet swept.
    pub entry_count: u64,
    /// Entries removed because their TTL ran out.
    pub expirations: u64,
    /// Entries removed by delete, prefix purge or clear.
    pub evictions: u64,
    /// Namespaces with at least one entry.
    pub namespace_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

/// Key/value store with per-entry expiry.
///
/// Construct one per process and share it through an `Arc`.
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            clock,
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, Inner<V>>> {
        self.inner.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Live value for `key`, evicting it first if it has expired.
    pub fn get(&self, key: &CacheKey) -> CacheResult<Option<V>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;

        let state = inner.entries.get(key.as_str()).map(|e| e.is_live(now));
        match state {
            Some(true) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(inner.entries.get(key.as_str()).map(|e| e.value.clone()))
            }
            Some(false) => {
                inner.remove(key.as_str());
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Insert or overwrite `key`, expiring `ttl` from now.
    pub fn set(&self, key: &CacheKey, value: V, ttl: Duration) -> CacheResult<()> {
        let now = self.clock.now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| far_future(now));
        let mut inner = self.lock()?;

        inner.remove(key.as_str());
        inner
            .namespaces
            .entry(key.namespace().to_string())
            .or_default()
            .insert(key.as_str().to_string());
        inner.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                value,
                namespace: key.namespace().to_string(),
                expires_at,
                created_at: now,
            },
        );
        Ok(())
    }

    /// Remove `key`. Absent keys are a no-op.
    pub fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let removed = self.lock()?.remove(key.as_str());
        if removed {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    /// Remove every entry in `prefix` and in namespaces nested under it
    /// (`prefix:...`). Returns the number of entries removed.
    pub fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut inner = self.lock()?;
        let nested = format!("{}:", prefix);
        let targets: Vec<String> = inner
            .namespaces
            .keys()
            .filter(|ns| ns.as_str() == prefix || ns.starts_with(&nested))
            .cloned()
            .collect();

        let removed: usize = targets
            .iter()
            .map(|ns| inner.remove_namespace(ns))
            .sum();
        drop(inner);

        self.counters
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    /// Remove every entry in exactly `namespace`.
    pub fn delete_namespace(&self, namespace: &str) -> CacheResult<usize> {
        let removed = self.lock()?.remove_namespace(namespace);
        self.counters
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    /// Drop everything. Safe to call repeatedly.
    pub fn clear(&self) -> CacheResult<usize> {
        let mut inner = self.lock()?;
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.namespaces.clear();
        drop(inner);

        self.counters
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    /// Evict every entry with `expires_at <= now` and return how many went.
    pub fn cleanup_expired(&self) -> CacheResult<usize> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        drop(inner);

        self.counters
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        Ok(expired.len())
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn len(&self) -> CacheResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// How long ago a live entry was written.
    pub fn age(&self, key: &CacheKey) -> CacheResult<Option<Duration>> {
        let now = self.clock.now();
        let inner = self.lock()?;
        Ok(inner
            .entries
            .get(key.as_str())
            .filter(|e| e.is_live(now))
            .map(|e| now.saturating_duration_since(e.created_at)))
    }

    /// Live keys in `namespace`.
    pub fn keys_in(&self, namespace: &str) -> CacheResult<Vec<String>> {
        let now = self.clock.now();
        let inner = self.lock()?;
        let mut keys: Vec<String> = inner
            .namespaces
            .get(namespace)
            .map(|keys| {
                keys.iter()
                    .filter(|k| inner.entries.get(k.as_str()).is_some_and(|e| e.is_live(now)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        let inner = self.lock()?;
        Ok(CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            entry_count: inner.entries.len() as u64,
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            namespace_count: inner.namespaces.len() as u64,
        })
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Expiry used when `now + ttl` overflows `Instant`.
fn far_future(now: Instant) -> Instant {
    const CENTURY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
    now.checked_add(CENTURY).unwrap_or(now)
}
