//! OpsFlow Cache - TTL store, memoization and invalidation
//!
//! Sits in front of the hosted database to absorb repeated list and dashboard
//! reads. Components, leaves first:
//!
//! - [`TtlCache`]: key/value map with per-entry expiry and a namespace index
//! - [`CacheKey`] / [`CallArgs`]: deterministic keys from call arguments
//! - [`Memoizer`]: wraps an async read so repeats hit the store until expiry
//! - [`CacheInvalidator`]: named evictions run by writers
//!
//! The store is an explicit instance owned by application state; there is no
//! process-wide cache. Each process has its own view, bounded by the TTLs.
//!
//! # Example
//!
//! ```
//! use opsflow_cache::{CacheInvalidator, CallArgs, Memoizer, TtlCache, namespace};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test_block(async {
//! let cache = Arc::new(TtlCache::new());
//! let memo = Memoizer::new(cache.clone());
//! let invalidator = CacheInvalidator::new(cache);
//!
//! let args = CallArgs::new().kwarg("page", &1);
//! let page: Result<Vec<String>, ()> = memo
//!     .cached_call(namespace::CUSTOMERS, "list", &args, Duration::from_secs(300), || async {
//!         Ok(vec!["Ama Mensah".to_string()])
//!     })
//!     .await;
//! assert!(page.is_ok());
//!
//! invalidator.invalidate_customers(None).unwrap();
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod memo;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, CacheResult};
pub use invalidation::{namespace, CacheInvalidator, CacheTtls};
pub use key::{CacheKey, CallArgs};
pub use memo::{CachedValue, Lookup, LookupObserver, Memoizer};
pub use store::{CacheStats, TtlCache};
