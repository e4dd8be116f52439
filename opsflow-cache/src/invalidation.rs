//! Named invalidation after writes.
//!
//! Every memoized read lives in one of the namespaces below. Writers call the
//! matching `invalidate_*` operation after committing and before responding,
//! so the next read misses and goes to the backing store.
//!
//! | Operation | Namespaces evicted |
//! |---|---|
//! | `invalidate_customers(Some(id))` | `customers`, `customer:{id}`, `dashboard` |
//! | `invalidate_customers(None)` | `customers`, every `customer:*`, `dashboard` |
//! | `invalidate_actions(Some(id))` | `actions`, `actions:customer:{id}` |
//! | `invalidate_actions(None)` | `actions` and every `actions:*` |
//! | `invalidate_dashboard()` | `dashboard` |
//! | `invalidate_templates()` | `templates` |
//! | `invalidate_all()` | everything |

use crate::error::CacheResult;
use crate::memo::CachedValue;
use crate::store::TtlCache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Namespace names shared by readers and writers.
pub mod namespace {
    use uuid::Uuid;

    /// Customer list pages.
    pub const CUSTOMERS: &str = "customers";
    /// Parent of the per-customer namespaces.
    pub const CUSTOMER: &str = "customer";
    pub const DASHBOARD: &str = "dashboard";
    /// Global action lists; per-customer lists nest beneath it.
    pub const ACTIONS: &str = "actions";
    pub const TEMPLATES: &str = "templates";

    pub fn customer(id: Uuid) -> String {
        format!("{}:{}", CUSTOMER, id)
    }

    pub fn customer_actions(id: Uuid) -> String {
        format!("{}:customer:{}", ACTIONS, id)
    }
}

/// Per-family TTLs, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub customers: Duration,
    pub dashboard: Duration,
    pub actions: Duration,
    pub templates: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            customers: Duration::from_secs(300),
            dashboard: Duration::from_secs(60),
            actions: Duration::from_secs(180),
            templates: Duration::from_secs(300),
        }
    }
}

impl CacheTtls {
    pub fn from_secs(customers: u64, dashboard: u64, actions: u64, templates: u64) -> Self {
        Self {
            customers: Duration::from_secs(customers),
            dashboard: Duration::from_secs(dashboard),
            actions: Duration::from_secs(actions),
            templates: Duration::from_secs(templates),
        }
    }
}

#[derive(Debug)]
pub struct CacheInvalidator<V = CachedValue> {
    cache: Arc<TtlCache<V>>,
}

impl<V> Clone for CacheInvalidator<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<V: Clone> CacheInvalidator<V> {
    pub fn new(cache: Arc<TtlCache<V>>) -> Self {
        Self { cache }
    }

    /// Customer lists, the affected single-customer reads, and the dashboard.
    pub fn invalidate_customers(&self, customer_id: Option<Uuid>) -> CacheResult<usize> {
        let mut removed = self.cache.delete_namespace(namespace::CUSTOMERS)?;
        removed += match customer_id {
            Some(id) => self.cache.delete_namespace(&namespace::customer(id))?,
            None => self.cache.delete_prefix(namespace::CUSTOMER)?,
        };
        removed += self.invalidate_dashboard()?;
        tracing::debug!(?customer_id, removed, "Invalidated customer cache");
        Ok(removed)
    }

    pub fn invalidate_dashboard(&self) -> CacheResult<usize> {
        self.cache.delete_prefix(namespace::DASHBOARD)
    }

    /// Action lists. Without an id every per-customer list goes too.
    pub fn invalidate_actions(&self, customer_id: Option<Uuid>) -> CacheResult<usize> {
        let removed = match customer_id {
            Some(id) => {
                self.cache.delete_namespace(namespace::ACTIONS)?
                    + self.cache.delete_namespace(&namespace::customer_actions(id))?
            }
            None => self.cache.delete_prefix(namespace::ACTIONS)?,
        };
        tracing::debug!(?customer_id, removed, "Invalidated action cache");
        Ok(removed)
    }

    pub fn invalidate_templates(&self) -> CacheResult<usize> {
        self.cache.delete_prefix(namespace::TEMPLATES)
    }

    pub fn invalidate_all(&self) -> CacheResult<usize> {
        let removed = self.cache.clear()?;
        tracing::info!(removed, "Cleared cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{CacheKey, CallArgs};

    fn populated() -> (Arc<TtlCache<u8>>, CacheInvalidator<u8>, Uuid, Uuid) {
        let cache = Arc::new(TtlCache::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ttl = Duration::from_secs(300);
        let namespaces = [
            namespace::CUSTOMERS.to_string(),
            namespace::customer(a),
            namespace::customer(b),
            namespace::DASHBOARD.to_string(),
            namespace::ACTIONS.to_string(),
            namespace::customer_actions(a),
            namespace::customer_actions(b),
            namespace::TEMPLATES.to_string(),
        ];
        for ns in &namespaces {
            cache
                .set(&CacheKey::derive(ns, "read", &CallArgs::new()), 1, ttl)
                .unwrap();
        }
        let invalidator = CacheInvalidator::new(cache.clone());
        (cache, invalidator, a, b)
    }

    fn present(cache: &TtlCache<u8>, ns: &str) -> bool {
        !cache.keys_in(ns).unwrap().is_empty()
    }

    #[test]
    fn test_invalidate_single_customer() {
        let (cache, inv, a, b) = populated();
        assert_eq!(inv.invalidate_customers(Some(a)).unwrap(), 3);
        assert!(!present(&cache, namespace::CUSTOMERS));
        assert!(!present(&cache, &namespace::customer(a)));
        assert!(present(&cache, &namespace::customer(b)));
        assert!(!present(&cache, namespace::DASHBOARD));
        assert!(present(&cache, namespace::ACTIONS));
    }

    #[test]
    fn test_invalidate_all_customers() {
        let (cache, inv, a, b) = populated();
        assert_eq!(inv.invalidate_customers(None).unwrap(), 4);
        assert!(!present(&cache, &namespace::customer(a)));
        assert!(!present(&cache, &namespace::customer(b)));
        assert!(present(&cache, &namespace::customer_actions(a)));
    }

    #[test]
    fn test_invalidate_actions() {
        let (cache, inv, a, b) = populated();
        assert_eq!(inv.invalidate_actions(Some(a)).unwrap(), 2);
        assert!(present(&cache, &namespace::customer_actions(b)));

        assert_eq!(inv.invalidate_actions(None).unwrap(), 1);
        assert!(!present(&cache, &namespace::customer_actions(b)));
        assert!(present(&cache, namespace::CUSTOMERS));
    }

    #[test]
    fn test_invalidate_templates_and_all() {
        let (cache, inv, _, _) = populated();
        assert_eq!(inv.invalidate_templates().unwrap(), 1);
        assert_eq!(inv.invalidate_all().unwrap(), 7);
        assert_eq!(inv.invalidate_all().unwrap(), 0);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_default_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.customers, Duration::from_secs(300));
        assert_eq!(ttls.dashboard, Duration::from_secs(60));
        assert_eq!(ttls.actions, Duration::from_secs(180));
        assert_eq!(CacheTtls::from_secs(1, 2, 3, 4).templates, Duration::from_secs(4));
    }
}
