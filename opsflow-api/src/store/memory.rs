//! Process-local [`CustomerStore`].
//!
//! Selected with `OPSFLOW_STORE=memory`. Tables live behind one
//! `tokio::sync::RwLock`; every read bumps a counter so tests can tell
//! whether a request reached the store or was served from cache.

use super::CustomerStore;
use async_trait::async_trait;
use chrono::Utc;
use opsflow_core::{
    new_id, ActionFilters, ActionWithCustomer, Customer, CustomerAction, CustomerActionCreate,
    CustomerCreate, CustomerFilters, CustomerId, CustomerUpdate, DashboardData, EntityType,
    MessageTemplate, OpsResult, Paginated, StorageError, RECENT_ACTIONS_LIMIT,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    /// Insertion order.
    customers: Vec<Customer>,
    actions: Vec<CustomerAction>,
    templates: Vec<MessageTemplate>,
}

impl Tables {
    fn customer(&self, id: CustomerId) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    fn account_taken(&self, account_number: &str, except: Option<CustomerId>) -> bool {
        self.customers
            .iter()
            .any(|c| c.account_number == account_number && Some(c.id) != except)
    }

    /// Actions newest first, joined with their customers.
    fn joined_actions(&self, customer_id: Option<CustomerId>) -> Vec<ActionWithCustomer> {
        let by_id: HashMap<CustomerId, &Customer> =
            self.customers.iter().map(|c| (c.id, c)).collect();
        let mut actions: Vec<&CustomerAction> = self
            .actions
            .iter()
            .rev()
            .filter(|a| customer_id.map_or(true, |id| a.customer_id == id))
            .collect();
        actions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        actions
            .into_iter()
            .map(|a| ActionWithCustomer::join(a.clone(), by_id.get(&a.customer_id).copied()))
            .collect()
    }
}

fn duplicate(account_number: &str) -> StorageError {
    StorageError::Duplicate {
        entity_type: EntityType::Customer,
        field: "account_number".to_string(),
        value: account_number.to_string(),
    }
}

#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    reads: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store seeded with the default message templates.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                templates: MessageTemplate::defaults(),
                ..Tables::default()
            }),
            reads: AtomicU64::new(0),
        }
    }

    /// Store with no templates at all.
    pub fn without_templates() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            reads: AtomicU64::new(0),
        }
    }

    /// Number of read operations served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn build_customer(req: &CustomerCreate) -> Customer {
        let now = Utc::now();
        Customer {
            id: new_id(),
            name: req.name.clone(),
            account_number: req.account_number.clone(),
            phone: req.phone.clone(),
            status: req.status,
            arrears: req.arrears.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn build_action(req: &CustomerActionCreate) -> CustomerAction {
        CustomerAction {
            id: new_id(),
            customer_id: req.customer_id,
            action: req.action,
            performed_by: req.performed_by.clone(),
            source: req.source,
            batch_id: req.batch_id.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_customer(&self, req: &CustomerCreate) -> OpsResult<Customer> {
        let mut tables = self.tables.write().await;
        if tables.account_taken(&req.account_number, None) {
            return Err(duplicate(&req.account_number).into());
        }
        let customer = Self::build_customer(req);
        tables.customers.push(customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> OpsResult<Option<Customer>> {
        self.count_read();
        Ok(self.tables.read().await.customer(id).cloned())
    }

    async fn list_customers(&self, filters: &CustomerFilters) -> OpsResult<Paginated<Customer>> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut matching: Vec<Customer> = tables
            .customers
            .iter()
            .rev()
            .filter(|c| filters.matches(c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page = filters.pagination();
        Ok(Paginated::new(page.slice(&matching), matching.len(), page))
    }

    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> OpsResult<Option<Customer>> {
        let mut tables = self.tables.write().await;
        if let Some(account_number) = &update.account_number {
            if tables.account_taken(account_number, Some(id)) {
                return Err(duplicate(account_number).into());
            }
        }
        let Some(customer) = tables.customers.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if !update.is_empty() {
            customer.apply(update, Utc::now());
        }
        Ok(Some(customer.clone()))
    }

    async fn delete_customer(&self, id: CustomerId) -> OpsResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.customers.len();
        tables.customers.retain(|c| c.id != id);
        if tables.customers.len() == before {
            return Ok(false);
        }
        tables.actions.retain(|a| a.customer_id != id);
        Ok(true)
    }

    async fn customers_by_account_numbers(
        &self,
        account_numbers: &[String],
    ) -> OpsResult<Vec<Customer>> {
        self.count_read();
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .iter()
            .filter(|c| account_numbers.contains(&c.account_number))
            .cloned()
            .collect())
    }

    async fn customers_by_ids(&self, ids: &[CustomerId]) -> OpsResult<Vec<Customer>> {
        self.count_read();
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn create_customers(&self, reqs: &[CustomerCreate]) -> OpsResult<Vec<Customer>> {
        let mut tables = self.tables.write().await;
        // All or nothing, like a single multi-row insert.
        for (i, req) in reqs.iter().enumerate() {
            let repeated = reqs[..i]
                .iter()
                .any(|r| r.account_number == req.account_number);
            if repeated || tables.account_taken(&req.account_number, None) {
                return Err(duplicate(&req.account_number).into());
            }
        }
        let created: Vec<Customer> = reqs.iter().map(Self::build_customer).collect();
        tables.customers.extend(created.iter().cloned());
        Ok(created)
    }

    async fn create_action(&self, req: &CustomerActionCreate) -> OpsResult<CustomerAction> {
        let mut tables = self.tables.write().await;
        if tables.customer(req.customer_id).is_none() {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Action,
                reason: format!("customer {} does not exist", req.customer_id),
            }
            .into());
        }
        let action = Self::build_action(req);
        tables.actions.push(action.clone());
        Ok(action)
    }

    async fn create_actions(
        &self,
        reqs: &[CustomerActionCreate],
    ) -> OpsResult<Vec<CustomerAction>> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = reqs.iter().find(|r| tables.customer(r.customer_id).is_none()) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Action,
                reason: format!("customer {} does not exist", missing.customer_id),
            }
            .into());
        }
        let created: Vec<CustomerAction> = reqs.iter().map(Self::build_action).collect();
        tables.actions.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_actions(
        &self,
        filters: &ActionFilters,
    ) -> OpsResult<Paginated<ActionWithCustomer>> {
        self.count_read();
        let tables = self.tables.read().await;
        let joined = tables.joined_actions(filters.customer_id);
        let page = filters.pagination();
        Ok(Paginated::new(page.slice(&joined), joined.len(), page))
    }

    async fn actions_for_batch(&self, batch_id: &str) -> OpsResult<Vec<CustomerAction>> {
        self.count_read();
        let tables = self.tables.read().await;
        Ok(tables
            .actions
            .iter()
            .filter(|a| a.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn dashboard(&self) -> OpsResult<DashboardData> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut recent = tables.joined_actions(None);
        recent.truncate(RECENT_ACTIONS_LIMIT);
        Ok(DashboardData::summarize(
            tables
                .customers
                .iter()
                .map(|c| (c.status, c.arrears.as_str())),
            recent,
        ))
    }

    async fn templates(&self) -> OpsResult<Vec<MessageTemplate>> {
        self.count_read();
        Ok(self.tables.read().await.templates.clone())
    }

    async fn update_template(
        &self,
        action: &str,
        message: &str,
    ) -> OpsResult<Option<MessageTemplate>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .templates
            .iter_mut()
            .find(|t| t.action == action)
            .map(|t| {
                t.message = message.to_string();
                t.clone()
            }))
    }

    async fn ping(&self) -> OpsResult<()> {
        Ok(())
    }
}
