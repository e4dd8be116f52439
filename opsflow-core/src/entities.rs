//! Core entity structures

use crate::validation::{validate_account_number, validate_amount, validate_name, validate_phone};
use crate::{
    ActionSource, ActionType, CustomerId, CustomerStatus, RowStatus, Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CUSTOMERS
// ============================================================================

/// A utility customer as stored in the `customers` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub account_number: String,
    pub phone: String,
    pub status: CustomerStatus,
    /// Outstanding balance, always rendered with two decimals.
    pub arrears: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Customer {
    /// Arrears as a number; malformed values count as zero.
    pub fn arrears_value(&self) -> f64 {
        self.arrears.parse().unwrap_or(0.0)
    }

    /// Apply the present fields of an update, bumping `updated_at`.
    pub fn apply(&mut self, update: &CustomerUpdate, now: Timestamp) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(account_number) = &update.account_number {
            self.account_number = account_number.clone();
        }
        if let Some(phone) = &update.phone {
            self.phone = phone.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(arrears) = &update.arrears {
            self.arrears = arrears.clone();
        }
        self.updated_at = now;
    }
}

fn default_arrears() -> String {
    "0.00".to_string()
}

/// Request body for creating a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCreate {
    pub name: String,
    pub account_number: String,
    pub phone: String,
    #[serde(default)]
    pub status: CustomerStatus,
    #[serde(default = "default_arrears")]
    pub arrears: String,
}

impl CustomerCreate {
    /// Validate every field and return the normalized record.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        Ok(Self {
            name: validate_name(&self.name)?,
            account_number: validate_account_number(&self.account_number)?,
            phone: validate_phone(&self.phone)?,
            status: self.status,
            arrears: validate_amount(&self.arrears)?,
        })
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CustomerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrears: Option<String>,
}

impl CustomerUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.account_number.is_none()
            && self.phone.is_none()
            && self.status.is_none()
            && self.arrears.is_none()
    }

    pub fn normalized(self) -> Result<Self, ValidationError> {
        Ok(Self {
            name: self.name.as_deref().map(validate_name).transpose()?,
            account_number: self
                .account_number
                .as_deref()
                .map(validate_account_number)
                .transpose()?,
            phone: self.phone.as_deref().map(validate_phone).transpose()?,
            status: self.status,
            arrears: self.arrears.as_deref().map(validate_amount).transpose()?,
        })
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

/// A recorded connect/disconnect/warn operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAction {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub action: ActionType,
    pub performed_by: String,
    #[serde(default)]
    pub source: ActionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerActionCreate {
    pub customer_id: CustomerId,
    pub action: ActionType,
    pub performed_by: String,
    #[serde(default)]
    pub source: ActionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl CustomerActionCreate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.performed_by.trim().is_empty() {
            return Err(ValidationError::required("performed_by"));
        }
        Ok(())
    }
}

/// Action joined with the owning customer's display fields.
///
/// `customer` and `account_number` are `None` when the customer row is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionWithCustomer {
    #[serde(flatten)]
    pub action: CustomerAction,
    pub customer: Option<String>,
    pub account_number: Option<String>,
}

impl ActionWithCustomer {
    pub fn join(action: CustomerAction, customer: Option<&Customer>) -> Self {
        Self {
            customer: customer.map(|c| c.name.clone()),
            account_number: customer.map(|c| c.account_number.clone()),
            action,
        }
    }
}

// ============================================================================
// TEMPLATES
// ============================================================================

/// SMS body stored per action. `{amount}` is replaced by the arrears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplateUpdate {
    pub message: String,
}

/// Placeholder substituted with `GHS {arrears}` when a template is rendered.
pub const AMOUNT_PLACEHOLDER: &str = "{amount}";

impl MessageTemplate {
    pub fn render(&self, arrears: &str) -> String {
        self.message
            .replace(AMOUNT_PLACEHOLDER, &format!("GHS {}", arrears))
    }

    /// Templates seeded into a fresh store.
    pub fn defaults() -> Vec<MessageTemplate> {
        vec![
            MessageTemplate {
                action: ActionType::Warn.as_db_str().to_string(),
                message: "Dear customer, your account is in arrears of {amount}. \
                          Please pay promptly to avoid disconnection."
                    .to_string(),
            },
            MessageTemplate {
                action: ActionType::Disconnect.as_db_str().to_string(),
                message: "Dear customer, your supply has been disconnected due to \
                          outstanding arrears of {amount}."
                    .to_string(),
            },
            MessageTemplate {
                action: ActionType::Connect.as_db_str().to_string(),
                message: "Dear customer, your supply has been reconnected. Thank you."
                    .to_string(),
            },
        ]
    }
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    pub title: String,
    pub value: String,
    pub change: f64,
    pub is_positive: bool,
}

impl Kpi {
    fn count(title: &str, value: usize, is_positive: bool) -> Self {
        Self {
            title: title.to_string(),
            value: value.to_string(),
            change: 0.0,
            is_positive,
        }
    }
}

/// Snapshot shown on the operator dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    pub total_customers: usize,
    pub connected_customers: usize,
    pub disconnected_customers: usize,
    pub warned_customers: usize,
    pub total_arrears: String,
    pub recent_actions: Vec<ActionWithCustomer>,
    pub kpis: Vec<Kpi>,
}

/// Number of actions shown on the dashboard.
pub const RECENT_ACTIONS_LIMIT: usize = 10;

impl DashboardData {
    /// Summarize `(status, arrears)` rows plus the newest actions.
    pub fn summarize<'a, I>(rows: I, mut recent_actions: Vec<ActionWithCustomer>) -> Self
    where
        I: IntoIterator<Item = (CustomerStatus, &'a str)>,
    {
        let mut total = 0;
        let mut connected = 0;
        let mut disconnected = 0;
        let mut warned = 0;
        let mut arrears = 0.0_f64;

        for (status, amount) in rows {
            total += 1;
            match status {
                CustomerStatus::Connected => connected += 1,
                CustomerStatus::Disconnected => disconnected += 1,
                CustomerStatus::Warned => warned += 1,
            }
            arrears += amount.parse::<f64>().unwrap_or(0.0);
        }

        recent_actions.truncate(RECENT_ACTIONS_LIMIT);

        Self {
            total_customers: total,
            connected_customers: connected,
            disconnected_customers: disconnected,
            warned_customers: warned,
            total_arrears: format!("{:.2}", arrears),
            recent_actions,
            kpis: vec![
                Kpi::count("Total Customers", total, true),
                Kpi::count("Connected", connected, true),
                Kpi::count("Disconnected", disconnected, false),
                Kpi::count("Warned", warned, false),
            ],
        }
    }
}

// ============================================================================
// BATCH UPLOAD
// ============================================================================

/// One spreadsheet row after client-side parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUploadItem {
    pub row: u32,
    pub name: String,
    pub account_number: String,
    pub phone: String,
    pub arrears: String,
    #[serde(default)]
    pub status: RowStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUploadRequest {
    pub data: Vec<BatchUploadItem>,
    pub batch_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProcessResponse {
    pub message: String,
    pub actions_created: usize,
    pub customers_created: usize,
    pub customers_updated: usize,
    pub batch_id: String,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerForValidation {
    pub name: String,
    pub account_number: String,
    pub phone: String,
    pub arrears: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorItem {
    pub row: u32,
    pub error: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerValidationResponse {
    pub validated: Vec<BatchUploadItem>,
    pub errors: Vec<ValidationErrorItem>,
    pub total: usize,
    pub valid_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedAction {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub action: ActionType,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCustomer {
    pub id: CustomerId,
    pub name: String,
    pub account_number: String,
    pub status: CustomerStatus,
}

/// Result of checking that every customer touched by a batch is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchVerification {
    pub batch_id: String,
    pub total_actions: usize,
    pub total_customers: usize,
    pub connected_customers: usize,
    pub verification_passed: bool,
    pub actions: Vec<VerifiedAction>,
    pub customers: Vec<VerifiedCustomer>,
}

impl BatchVerification {
    pub fn build(batch_id: &str, actions: &[CustomerAction], customers: &[Customer]) -> Self {
        let connected = customers
            .iter()
            .filter(|c| c.status == CustomerStatus::Connected)
            .count();
        Self {
            batch_id: batch_id.to_string(),
            total_actions: actions.len(),
            total_customers: customers.len(),
            connected_customers: connected,
            verification_passed: !actions.is_empty() && connected == customers.len(),
            actions: actions
                .iter()
                .map(|a| VerifiedAction {
                    id: a.id,
                    customer_id: a.customer_id,
                    action: a.action,
                    timestamp: a.timestamp,
                })
                .collect(),
            customers: customers
                .iter()
                .map(|c| VerifiedCustomer {
                    id: c.id,
                    name: c.name.clone(),
                    account_number: c.account_number.clone(),
                    status: c.status,
                })
                .collect(),
        }
    }
}

// ============================================================================
// SMS
// ============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRequest {
    pub customer_id: CustomerId,
    pub message: String,
    #[serde(default = "default_true")]
    pub include_arrears: bool,
}

impl SmsRequest {
    /// Final body, with the arrears line appended when requested.
    pub fn compose(&self, customer: &Customer) -> String {
        if self.include_arrears && !customer.arrears.is_empty() {
            format!(
                "{}\nYour current arrears are: GHS {}",
                self.message, customer.arrears
            )
        } else {
            self.message.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSmsRequest {
    pub recipients: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub recipients_count: usize,
}

/// Delivery status reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsStatus {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub details: serde_json::Value,
}

// ============================================================================
// AUTH
// ============================================================================

/// Authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Name recorded as `performed_by`: metadata name, then email, then "System".
    pub fn display_name(&self) -> String {
        self.user_metadata
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| "System".to_string())
    }
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: AuthUser,
}
