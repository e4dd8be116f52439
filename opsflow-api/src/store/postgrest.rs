//! [`CustomerStore`] over Supabase PostgREST.
//!
//! Tables: `customers`, `customer_actions`, `message_templates`. Lists ask
//! for `Prefer: count=exact` and read the total from `Content-Range`.

use super::CustomerStore;
use crate::constants::STORE_TIMEOUT_SECS;
use async_trait::async_trait;
use chrono::Utc;
use opsflow_core::{
    ActionFilters, ActionWithCustomer, Customer, CustomerAction, CustomerActionCreate,
    CustomerCreate, CustomerFilters, CustomerId, CustomerStatus, CustomerUpdate, DashboardData,
    EntityType, MessageTemplate, OpsResult, Paginated, Pagination, StorageError,
    RECENT_ACTIONS_LIMIT,
};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const ACTION_SELECT: &str = "*,customer:customers(name,account_number)";

#[derive(Debug, Deserialize)]
struct CustomerRef {
    name: Option<String>,
    account_number: Option<String>,
}

/// `customer_actions` row with the embedded customer.
#[derive(Debug, Deserialize)]
struct ActionRow {
    #[serde(flatten)]
    action: CustomerAction,
    #[serde(default)]
    customer: Option<CustomerRef>,
}

impl From<ActionRow> for ActionWithCustomer {
    fn from(row: ActionRow) -> Self {
        let (customer, account_number) = match row.customer {
            Some(c) => (c.name, c.account_number),
            None => (None, None),
        };
        ActionWithCustomer {
            action: row.action,
            customer,
            account_number,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusRow {
    status: CustomerStatus,
    #[serde(default)]
    arrears: serde_json::Value,
}

impl StatusRow {
    fn arrears_text(&self) -> String {
        match &self.arrears {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => "0".to_string(),
        }
    }
}

/// Total from a `Content-Range: 0-49/123` header.
fn parse_total(headers: &header::HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}

/// Strip characters that carry meaning inside a PostgREST `or=(...)` list.
fn sanitize_search(term: &str) -> String {
    term.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"'))
        .collect()
}

/// `in.("a","b")` operand.
fn in_list<T: ToString>(values: &[T]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.to_string().replace('"', "")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    rest_url: String,
    api_key: SecretString,
}

impl PostgrestStore {
    /// `base_url` is the project URL; requests go to `{base_url}/rest/v1`.
    pub fn new(base_url: &str, api_key: SecretString) -> OpsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(STORE_TIMEOUT_SECS))
            .build()
            .map_err(|e| StorageError::Unavailable {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(&self, entity_type: EntityType, req: RequestBuilder) -> OpsResult<Response> {
        let response = req.send().await.map_err(|e| StorageError::Unavailable {
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(table = entity_type.table(), status = status.as_u16(), body = %body, "PostgREST request failed");
        let err = match status {
            StatusCode::CONFLICT => StorageError::Duplicate {
                entity_type,
                field: "account_number".to_string(),
                value: body,
            },
            s if s.is_server_error() => StorageError::Unavailable {
                reason: format!("status {}: {}", s.as_u16(), body),
            },
            s => StorageError::QueryFailed {
                entity_type,
                reason: format!("status {}: {}", s.as_u16(), body),
            },
        };
        Err(err.into())
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        entity_type: EntityType,
        req: RequestBuilder,
    ) -> OpsResult<Vec<T>> {
        let response = self.send(entity_type, req).await?;
        response.json::<Vec<T>>().await.map_err(|e| {
            StorageError::QueryFailed {
                entity_type,
                reason: format!("invalid response body: {}", e),
            }
            .into()
        })
    }

    async fn page<T: DeserializeOwned>(
        &self,
        entity_type: EntityType,
        req: RequestBuilder,
        page: Pagination,
    ) -> OpsResult<(Vec<T>, usize)> {
        let req = req
            .query(&[
                ("offset", page.offset().to_string()),
                ("limit", page.limit.to_string()),
            ])
            .header("Prefer", "count=exact");
        let response = self.send(entity_type, req).await?;
        let total = parse_total(response.headers());
        let data: Vec<T> = response.json().await.map_err(|e| StorageError::QueryFailed {
            entity_type,
            reason: format!("invalid response body: {}", e),
        })?;
        let total = total.unwrap_or(page.offset() + data.len());
        Ok((data, total))
    }

    async fn find_by_account(&self, account_number: &str) -> OpsResult<Option<Customer>> {
        let req = self.request(Method::GET, "customers").query(&[
            ("select", "*".to_string()),
            ("account_number", format!("eq.{}", account_number)),
            ("limit", "1".to_string()),
        ]);
        Ok(self
            .rows::<Customer>(EntityType::Customer, req)
            .await?
            .into_iter()
            .next())
    }

    async fn joined_actions(
        &self,
        customer_id: Option<CustomerId>,
        page: Pagination,
    ) -> OpsResult<(Vec<ActionWithCustomer>, usize)> {
        let mut req = self.request(Method::GET, "customer_actions").query(&[
            ("select", ACTION_SELECT.to_string()),
            ("order", "timestamp.desc".to_string()),
        ]);
        if let Some(id) = customer_id {
            req = req.query(&[("customer_id", format!("eq.{}", id))]);
        }
        let (rows, total) = self.page::<ActionRow>(EntityType::Action, req, page).await?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

#[async_trait]
impl CustomerStore for PostgrestStore {
    fn backend(&self) -> &'static str {
        "postgrest"
    }

    async fn create_customer(&self, req: &CustomerCreate) -> OpsResult<Customer> {
        if self.find_by_account(&req.account_number).await?.is_some() {
            return Err(StorageError::Duplicate {
                entity_type: EntityType::Customer,
                field: "account_number".to_string(),
                value: req.account_number.clone(),
            }
            .into());
        }
        let request = self
            .request(Method::POST, "customers")
            .header("Prefer", "return=representation")
            .json(req);
        self.rows::<Customer>(EntityType::Customer, request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StorageError::InsertFailed {
                    entity_type: EntityType::Customer,
                    reason: "insert returned no rows".to_string(),
                }
                .into()
            })
    }

    async fn get_customer(&self, id: CustomerId) -> OpsResult<Option<Customer>> {
        let req = self.request(Method::GET, "customers").query(&[
            ("select", "*".to_string()),
            ("id", format!("eq.{}", id)),
        ]);
        Ok(self
            .rows::<Customer>(EntityType::Customer, req)
            .await?
            .into_iter()
            .next())
    }

    async fn list_customers(&self, filters: &CustomerFilters) -> OpsResult<Paginated<Customer>> {
        let mut req = self.request(Method::GET, "customers").query(&[
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ]);
        if let Some(term) = filters.search_term() {
            let term = sanitize_search(term);
            req = req.query(&[(
                "or",
                format!(
                    "(name.ilike.*{t}*,account_number.ilike.*{t}*,phone.ilike.*{t}*)",
                    t = term
                ),
            )]);
        }
        if let Some(status) = filters.status {
            req = req.query(&[("status", format!("eq.{}", status.as_db_str()))]);
        }
        if let Some(min) = filters.arrears_min {
            req = req.query(&[("arrears", format!("gte.{}", min))]);
        }
        if let Some(max) = filters.arrears_max {
            req = req.query(&[("arrears", format!("lte.{}", max))]);
        }

        let page = filters.pagination();
        let (data, total) = self.page::<Customer>(EntityType::Customer, req, page).await?;
        Ok(Paginated::new(data, total, page))
    }

    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> OpsResult<Option<Customer>> {
        if update.is_empty() {
            return self.get_customer(id).await;
        }
        let mut body = serde_json::to_value(update).map_err(|e| StorageError::UpdateFailed {
            entity_type: EntityType::Customer,
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(map) = body.as_object_mut() {
            map.insert("updated_at".to_string(), serde_json::json!(Utc::now()));
        }
        let req = self
            .request(Method::PATCH, "customers")
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&body);
        Ok(self
            .rows::<Customer>(EntityType::Customer, req)
            .await?
            .into_iter()
            .next())
    }

    async fn delete_customer(&self, id: CustomerId) -> OpsResult<bool> {
        let req = self
            .request(Method::DELETE, "customers")
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");
        let deleted = self.rows::<Customer>(EntityType::Customer, req).await?;
        Ok(!deleted.is_empty())
    }

    async fn customers_by_account_numbers(
        &self,
        account_numbers: &[String],
    ) -> OpsResult<Vec<Customer>> {
        if account_numbers.is_empty() {
            return Ok(Vec::new());
        }
        let req = self.request(Method::GET, "customers").query(&[
            ("select", "*".to_string()),
            ("account_number", in_list(account_numbers)),
        ]);
        self.rows(EntityType::Customer, req).await
    }

    async fn customers_by_ids(&self, ids: &[CustomerId]) -> OpsResult<Vec<Customer>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let req = self
            .request(Method::GET, "customers")
            .query(&[("select", "*".to_string()), ("id", in_list(ids))]);
        self.rows(EntityType::Customer, req).await
    }

    async fn create_customers(&self, reqs: &[CustomerCreate]) -> OpsResult<Vec<Customer>> {
        if reqs.is_empty() {
            return Ok(Vec::new());
        }
        let req = self
            .request(Method::POST, "customers")
            .header("Prefer", "return=representation")
            .json(reqs);
        self.rows(EntityType::Customer, req).await
    }

    async fn create_action(&self, req: &CustomerActionCreate) -> OpsResult<CustomerAction> {
        self.create_actions(std::slice::from_ref(req))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StorageError::InsertFailed {
                    entity_type: EntityType::Action,
                    reason: "insert returned no rows".to_string(),
                }
                .into()
            })
    }

    async fn create_actions(
        &self,
        reqs: &[CustomerActionCreate],
    ) -> OpsResult<Vec<CustomerAction>> {
        if reqs.is_empty() {
            return Ok(Vec::new());
        }
        let req = self
            .request(Method::POST, "customer_actions")
            .header("Prefer", "return=representation")
            .json(reqs);
        self.rows(EntityType::Action, req).await
    }

    async fn list_actions(
        &self,
        filters: &ActionFilters,
    ) -> OpsResult<Paginated<ActionWithCustomer>> {
        let page = filters.pagination();
        let (data, total) = self.joined_actions(filters.customer_id, page).await?;
        Ok(Paginated::new(data, total, page))
    }

    async fn actions_for_batch(&self, batch_id: &str) -> OpsResult<Vec<CustomerAction>> {
        let req = self.request(Method::GET, "customer_actions").query(&[
            ("select", "*".to_string()),
            ("batch_id", format!("eq.{}", batch_id)),
        ]);
        self.rows(EntityType::Action, req).await
    }

    async fn dashboard(&self) -> OpsResult<DashboardData> {
        let req = self
            .request(Method::GET, "customers")
            .query(&[("select", "status,arrears")]);
        let rows: Vec<StatusRow> = self.rows(EntityType::Customer, req).await?;
        let amounts: Vec<(CustomerStatus, String)> =
            rows.iter().map(|r| (r.status, r.arrears_text())).collect();

        let recent_page = Pagination::new(1, RECENT_ACTIONS_LIMIT as u32);
        let (recent, _) = self.joined_actions(None, recent_page).await?;

        Ok(DashboardData::summarize(
            amounts.iter().map(|(s, a)| (*s, a.as_str())),
            recent,
        ))
    }

    async fn templates(&self) -> OpsResult<Vec<MessageTemplate>> {
        let req = self
            .request(Method::GET, "message_templates")
            .query(&[("select", "action,message")]);
        self.rows(EntityType::Template, req).await
    }

    async fn update_template(
        &self,
        action: &str,
        message: &str,
    ) -> OpsResult<Option<MessageTemplate>> {
        let req = self
            .request(Method::PATCH, "message_templates")
            .query(&[
                ("action", format!("eq.{}", action)),
                ("select", "action,message".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({
                "message": message,
                "updated_at": Utc::now(),
            }));
        Ok(self
            .rows::<MessageTemplate>(EntityType::Template, req)
            .await?
            .into_iter()
            .next())
    }

    async fn ping(&self) -> OpsResult<()> {
        let req = self
            .request(Method::GET, "customers")
            .query(&[("select", "id"), ("limit", "1")]);
        self.send(EntityType::Customer, req).await.map(|_| ())
    }
}
