//! Backing store seam.
//!
//! [`CustomerStore`] is everything the HTTP layer needs from persistence.
//! Two implementations exist: [`PostgrestStore`] talks to the hosted
//! database, [`InMemoryStore`] keeps everything in process for development
//! and tests. Neither caches; memoization sits in front of them in
//! [`crate::cached_store::CachedStore`].

mod memory;
mod postgrest;

pub use memory::InMemoryStore;
pub use postgrest::PostgrestStore;

use async_trait::async_trait;
use opsflow_core::{
    ActionFilters, ActionWithCustomer, Customer, CustomerAction, CustomerActionCreate,
    CustomerCreate, CustomerFilters, CustomerId, CustomerUpdate, DashboardData, MessageTemplate,
    OpsResult, Paginated,
};

#[async_trait]
pub trait CustomerStore: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    // === Customers ===

    /// Insert a customer. A taken account number is `StorageError::Duplicate`.
    async fn create_customer(&self, req: &CustomerCreate) -> OpsResult<Customer>;

    async fn get_customer(&self, id: CustomerId) -> OpsResult<Option<Customer>>;

    /// Filtered page, newest first.
    async fn list_customers(&self, filters: &CustomerFilters) -> OpsResult<Paginated<Customer>>;

    /// Apply the present fields. `None` when the customer does not exist.
    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> OpsResult<Option<Customer>>;

    /// Delete a customer and its actions. `false` when nothing was deleted.
    async fn delete_customer(&self, id: CustomerId) -> OpsResult<bool>;

    async fn customers_by_account_numbers(
        &self,
        account_numbers: &[String],
    ) -> OpsResult<Vec<Customer>>;

    async fn customers_by_ids(&self, ids: &[CustomerId]) -> OpsResult<Vec<Customer>>;

    /// Insert many customers in one request.
    async fn create_customers(&self, reqs: &[CustomerCreate]) -> OpsResult<Vec<Customer>>;

    // === Actions ===

    async fn create_action(&self, req: &CustomerActionCreate) -> OpsResult<CustomerAction>;

    async fn create_actions(&self, reqs: &[CustomerActionCreate])
        -> OpsResult<Vec<CustomerAction>>;

    /// Actions joined with customer name and account number, newest first.
    async fn list_actions(
        &self,
        filters: &ActionFilters,
    ) -> OpsResult<Paginated<ActionWithCustomer>>;

    async fn actions_for_batch(&self, batch_id: &str) -> OpsResult<Vec<CustomerAction>>;

    // === Dashboard ===

    async fn dashboard(&self) -> OpsResult<DashboardData>;

    // === Templates ===

    async fn templates(&self) -> OpsResult<Vec<MessageTemplate>>;

    /// Replace a template body. `None` when no template exists for `action`.
    async fn update_template(
        &self,
        action: &str,
        message: &str,
    ) -> OpsResult<Option<MessageTemplate>>;

    /// Cheap round trip used by the readiness probe.
    async fn ping(&self) -> OpsResult<()>;
}
