//! Cached backing store
//!
//! [`CachedStore`] has the read and write operations routes need. Reads go
//! through the [`Memoizer`]; writes hit the backing store first and then run
//! the matching [`CacheInvalidator`] operations before returning, so the next
//! read after a write always reaches the store.
//!
//! | Read                 | Namespace                 | TTL        |
//! |----------------------|---------------------------|------------|
//! | `list_customers`     | `customers`               | customers  |
//! | `get_customer`       | `customer:{id}`           | customers  |
//! | `dashboard`          | `dashboard`               | dashboard  |
//! | `list_actions`       | `actions` / `actions:customer:{id}` | actions |
//! | `templates`          | `templates`               | templates  |

use crate::store::CustomerStore;
use crate::telemetry::{metrics, CacheMetricsObserver};
use opsflow_cache::{
    namespace, CacheInvalidator, CacheResult, CacheStats, CacheTtls, CachedValue, CallArgs,
    Memoizer, TtlCache,
};
use opsflow_core::{
    ActionFilters, ActionWithCustomer, Customer, CustomerAction, CustomerActionCreate,
    CustomerCreate, CustomerFilters, CustomerId, CustomerUpdate, DashboardData, MessageTemplate,
    OpsResult, Paginated,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct CachedStore {
    store: Arc<dyn CustomerStore>,
    memo: Memoizer,
    invalidator: CacheInvalidator,
    ttls: CacheTtls,
}

impl CachedStore {
    pub fn new(store: Arc<dyn CustomerStore>, cache: Arc<TtlCache<CachedValue>>, ttls: CacheTtls) -> Self {
        Self {
            store,
            memo: Memoizer::new(Arc::clone(&cache)).with_observer(Arc::new(CacheMetricsObserver)),
            invalidator: CacheInvalidator::new(cache),
            ttls,
        }
    }

    /// Uncached access for bulk work that invalidates once at the end.
    pub fn store(&self) -> &Arc<dyn CustomerStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TtlCache<CachedValue>> {
        self.memo.cache()
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    pub fn cache_stats(&self) -> CacheResult<CacheStats> {
        self.cache().stats()
    }

    fn invalidated(&self, family: &'static str, result: CacheResult<usize>) {
        match result {
            Ok(removed) => {
                if let Some(m) = metrics() {
                    m.record_invalidation(family, removed);
                }
            }
            // A poisoned store fails reads through to the backing store, so
            // nothing stale can be served.
            Err(e) => tracing::error!(error = %e, family, "Cache invalidation failed"),
        }
    }

    // === Customers ===

    pub async fn list_customers(&self, filters: &CustomerFilters) -> OpsResult<Paginated<Customer>> {
        let args = CallArgs::new().arg(filters);
        self.memo
            .cached_call(namespace::CUSTOMERS, "list_customers", &args, self.ttls.customers, || {
                self.store.list_customers(filters)
            })
            .await
    }

    pub async fn get_customer(&self, id: CustomerId) -> OpsResult<Option<Customer>> {
        let args = CallArgs::new().arg(&id);
        self.memo
            .cached_call_opt(
                &namespace::customer(id),
                "get_customer",
                &args,
                self.ttls.customers,
                || self.store.get_customer(id),
            )
            .await
    }

    pub async fn create_customer(&self, req: &CustomerCreate) -> OpsResult<Customer> {
        let customer = self.store.create_customer(req).await?;
        self.invalidated("customers", self.invalidator.invalidate_customers(None));
        Ok(customer)
    }

    pub async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> OpsResult<Option<Customer>> {
        let updated = self.store.update_customer(id, update).await?;
        if updated.is_some() {
            self.invalidated("customers", self.invalidator.invalidate_customers(Some(id)));
            // Action listings embed the customer's name and account number.
            if update.name.is_some() || update.account_number.is_some() {
                self.invalidated("actions", self.invalidator.invalidate_actions(Some(id)));
            }
        }
        Ok(updated)
    }

    /// Deleting a customer also drops its actions.
    pub async fn delete_customer(&self, id: CustomerId) -> OpsResult<bool> {
        let deleted = self.store.delete_customer(id).await?;
        if deleted {
            self.invalidated("customers", self.invalidator.invalidate_customers(Some(id)));
            self.invalidated("actions", self.invalidator.invalidate_actions(Some(id)));
        }
        Ok(deleted)
    }

    pub async fn dashboard(&self) -> OpsResult<DashboardData> {
        self.memo
            .cached_call(
                namespace::DASHBOARD,
                "dashboard",
                &CallArgs::new(),
                self.ttls.dashboard,
                || self.store.dashboard(),
            )
            .await
    }

    // === Actions ===

    pub async fn create_action(&self, req: &CustomerActionCreate) -> OpsResult<CustomerAction> {
        let action = self.store.create_action(req).await?;
        self.invalidated("actions", self.invalidator.invalidate_actions(Some(req.customer_id)));
        self.invalidated("dashboard", self.invalidator.invalidate_dashboard());
        Ok(action)
    }

    pub async fn create_actions(
        &self,
        reqs: &[CustomerActionCreate],
    ) -> OpsResult<Vec<CustomerAction>> {
        let actions = self.store.create_actions(reqs).await?;
        self.invalidated("actions", self.invalidator.invalidate_actions(None));
        self.invalidated("dashboard", self.invalidator.invalidate_dashboard());
        Ok(actions)
    }

    pub async fn list_actions(
        &self,
        filters: &ActionFilters,
    ) -> OpsResult<Paginated<ActionWithCustomer>> {
        let ns = match filters.customer_id {
            Some(id) => namespace::customer_actions(id),
            None => namespace::ACTIONS.to_string(),
        };
        let args = CallArgs::new().arg(filters);
        self.memo
            .cached_call(&ns, "list_actions", &args, self.ttls.actions, || {
                self.store.list_actions(filters)
            })
            .await
    }

    // === Templates ===

    pub async fn templates(&self) -> OpsResult<Vec<MessageTemplate>> {
        self.memo
            .cached_call(
                namespace::TEMPLATES,
                "templates",
                &CallArgs::new(),
                self.ttls.templates,
                || self.store.templates(),
            )
            .await
    }

    /// Cached template for `action`, if one exists.
    pub async fn template_for(&self, action: &str) -> OpsResult<Option<MessageTemplate>> {
        Ok(self
            .templates()
            .await?
            .into_iter()
            .find(|t| t.action == action))
    }

    pub async fn update_template(
        &self,
        action: &str,
        message: &str,
    ) -> OpsResult<Option<MessageTemplate>> {
        let updated = self.store.update_template(action, message).await?;
        if updated.is_some() {
            self.invalidated("templates", self.invalidator.invalidate_templates());
        }
        Ok(updated)
    }

    // === Batch ===

    /// Evict everything a batch upload may have touched.
    pub fn invalidate_after_batch(&self) {
        self.invalidated("customers", self.invalidator.invalidate_customers(None));
        self.invalidated("actions", self.invalidator.invalidate_actions(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use opsflow_cache::ManualClock;
    use opsflow_core::{ActionType, CustomerStatus};
    use opsflow_test_utils::fixtures;
    use std::time::Duration;

    fn cached() -> (Arc<InMemoryStore>, Arc<ManualClock>, CachedStore) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(TtlCache::with_clock(clock.clone()));
        let cached = CachedStore::new(store.clone(), cache, CacheTtls::default());
        (store, clock, cached)
    }

    #[tokio::test]
    async fn test_list_is_memoized_until_write() {
        let (store, _, cached) = cached();
        let filters = CustomerFilters::default();

        cached.list_customers(&filters).await.unwrap();
        cached.list_customers(&filters).await.unwrap();
        assert_eq!(store.read_count(), 1);

        cached
            .create_customer(&fixtures::customer_create("ACC-100"))
            .await
            .unwrap();
        let page = cached.list_customers(&filters).await.unwrap();
        assert_eq!(store.read_count(), 2);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_missing_customer_not_cached() {
        let (store, _, cached) = cached();
        let id = uuid::Uuid::new_v4();
        assert!(cached.get_customer(id).await.unwrap().is_none());
        assert!(cached.get_customer(id).await.unwrap().is_none());
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_update_evicts_single_and_dashboard() {
        let (store, _, cached) = cached();
        let created = cached
            .create_customer(&fixtures::customer_create("ACC-200"))
            .await
            .unwrap();

        cached.get_customer(created.id).await.unwrap();
        let before = cached.dashboard().await.unwrap();
        assert_eq!(before.connected_customers, 1);
        let reads = store.read_count();

        let update = CustomerUpdate {
            status: Some(CustomerStatus::Disconnected),
            ..Default::default()
        };
        cached.update_customer(created.id, &update).await.unwrap();

        let fresh = cached.get_customer(created.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, CustomerStatus::Disconnected);
        let after = cached.dashboard().await.unwrap();
        assert_eq!(after.disconnected_customers, 1);
        assert_eq!(store.read_count(), reads + 2);
    }

    #[tokio::test]
    async fn test_action_write_evicts_customer_action_list() {
        let (store, _, cached) = cached();
        let customer = cached
            .create_customer(&fixtures::customer_create("ACC-300"))
            .await
            .unwrap();
        let filters = ActionFilters {
            customer_id: Some(customer.id),
            ..Default::default()
        };

        assert_eq!(cached.list_actions(&filters).await.unwrap().total, 0);
        cached
            .create_action(&fixtures::action_create(customer.id, ActionType::Warn))
            .await
            .unwrap();
        let reads = store.read_count();
        assert_eq!(cached.list_actions(&filters).await.unwrap().total, 1);
        assert_eq!(store.read_count(), reads + 1);
    }

    #[tokio::test]
    async fn test_rename_evicts_joined_action_lists() {
        let (_, _, cached) = cached();
        let customer = cached
            .create_customer(&fixtures::customer_create("ACC-400"))
            .await
            .unwrap();
        cached
            .create_action(&fixtures::action_create(customer.id, ActionType::Warn))
            .await
            .unwrap();
        let per_customer = ActionFilters {
            customer_id: Some(customer.id),
            ..Default::default()
        };
        let all = ActionFilters::default();

        let warm = cached.list_actions(&all).await.unwrap();
        assert_eq!(warm.data[0].customer.as_deref(), Some("Kofi Boateng"));
        cached.list_actions(&per_customer).await.unwrap();

        let update = CustomerUpdate {
            name: Some("Ama Mensah".to_string()),
            account_number: Some("ACC-401".to_string()),
            ..Default::default()
        };
        cached.update_customer(customer.id, &update).await.unwrap();

        for filters in [&all, &per_customer] {
            let page = cached.list_actions(filters).await.unwrap();
            assert_eq!(page.data[0].customer.as_deref(), Some("Ama Mensah"));
            assert_eq!(page.data[0].account_number.as_deref(), Some("ACC-401"));
        }
    }

    #[tokio::test]
    async fn test_status_update_keeps_action_lists() {
        let (store, _, cached) = cached();
        let customer = cached
            .create_customer(&fixtures::customer_create("ACC-500"))
            .await
            .unwrap();
        let all = ActionFilters::default();
        cached.list_actions(&all).await.unwrap();

        let update = CustomerUpdate {
            status: Some(CustomerStatus::Warned),
            ..Default::default()
        };
        cached.update_customer(customer.id, &update).await.unwrap();
        let reads = store.read_count();
        cached.list_actions(&all).await.unwrap();
        assert_eq!(store.read_count(), reads);
    }

    #[tokio::test]
    async fn test_templates_expire_after_ttl() {
        let (store, clock, cached) = cached();
        cached.templates().await.unwrap();
        cached.template_for("warn").await.unwrap();
        assert_eq!(store.read_count(), 1);

        clock.advance(CacheTtls::default().templates + Duration::from_secs(1));
        cached.templates().await.unwrap();
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_template_update_keeps_cache() {
        let (store, _, cached) = cached();
        cached.templates().await.unwrap();
        assert!(cached.update_template("nope", "x").await.unwrap().is_none());
        cached.templates().await.unwrap();
        assert_eq!(store.read_count(), 1);
    }
}
