//! Memoization of async reads.
//!
//! [`Memoizer::cached_call`] derives a key from `(namespace, operation, args)`,
//! returns the stored value on a hit without running the read, and on a miss
//! awaits the read and stores its `Ok` value. Errors pass through untouched
//! and are never cached. A read that is dropped before completing writes
//! nothing. Concurrent misses on the same key each run the read.
//!
//! The cache is an accelerator only: if the store is unusable the read is
//! performed directly and the failure is logged.

use crate::key::{CacheKey, CallArgs};
use crate::store::TtlCache;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Type-erased value held by the shared store.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Outcome of a memoized lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

impl Lookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Hit => "hit",
            Lookup::Miss => "miss",
        }
    }
}

/// Receives one event per memoized lookup, e.g. to feed metrics.
pub trait LookupObserver: Send + Sync {
    fn record(&self, namespace: &str, outcome: Lookup);
}

#[derive(Clone)]
pub struct Memoizer {
    cache: Arc<TtlCache<CachedValue>>,
    observer: Option<Arc<dyn LookupObserver>>,
}

impl fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("cache", &self.cache)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Memoizer {
    pub fn new(cache: Arc<TtlCache<CachedValue>>) -> Self {
        Self {
            cache,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LookupObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cache(&self) -> &Arc<TtlCache<CachedValue>> {
        &self.cache
    }

    fn observe(&self, namespace: &str, outcome: Lookup) {
        if let Some(observer) = &self.observer {
            observer.record(namespace, outcome);
        }
    }

    fn lookup<T: Clone + Send + Sync + 'static>(&self, key: &CacheKey) -> Option<T> {
        let stored = match self.cache.get(key) {
            Ok(stored) => stored?,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, calling through");
                return None;
            }
        };
        let value = (*stored).downcast_ref::<T>().cloned();
        if value.is_none() {
            tracing::warn!(key = %key, "Cached value has unexpected type, treating as miss");
        }
        value
    }

    fn store<T: Clone + Send + Sync + 'static>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let erased: CachedValue = Arc::new(value.clone());
        if let Err(e) = self.cache.set(key, erased, ttl) {
            tracing::warn!(error = %e, key = %key, "Cache write failed");
        }
    }

    /// Run `read` through the cache.
    pub async fn cached_call<T, E, F, Fut>(
        &self,
        namespace: &str,
        operation: &str,
        args: &CallArgs,
        ttl: Duration,
        read: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = CacheKey::derive(namespace, operation, args);

        if let Some(hit) = self.lookup::<T>(&key) {
            self.observe(namespace, Lookup::Hit);
            tracing::debug!(key = %key, "Cache hit");
            return Ok(hit);
        }

        self.observe(namespace, Lookup::Miss);
        tracing::debug!(key = %key, "Cache miss");
        let value = read().await?;
        self.store(&key, &value, ttl);
        Ok(value)
    }

    /// Like [`Memoizer::cached_call`], but an `Ok(None)` result is not stored,
    /// so lookups of missing records keep reaching the backing store.
    pub async fn cached_call_opt<T, E, F, Fut>(
        &self,
        namespace: &str,
        operation: &str,
        args: &CallArgs,
        ttl: Duration,
        read: F,
    ) -> Result<Option<T>, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let key = CacheKey::derive(namespace, operation, args);

        if let Some(hit) = self.lookup::<T>(&key) {
            self.observe(namespace, Lookup::Hit);
            return Ok(Some(hit));
        }

        self.observe(namespace, Lookup::Miss);
        let value = read().await?;
        if let Some(found) = &value {
            self.store(&key, found, ttl);
        }
        Ok(value)
    }
}
