//! Enum types for OpsFlow entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// Kind of record held by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Customer,
    Action,
    Template,
    User,
}

impl EntityType {
    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Customer => "customers",
            EntityType::Action => "customer_actions",
            EntityType::Template => "message_templates",
            EntityType::User => "users",
        }
    }
}

// ============================================================================
// CUSTOMER STATUS
// ============================================================================

/// Supply status of a utility customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    /// Supply is on
    #[default]
    Connected,
    /// Supply has been cut
    Disconnected,
    /// Customer has been warned about pending disconnection
    Warned,
}

impl CustomerStatus {
    /// All statuses in display order.
    pub const ALL: [CustomerStatus; 3] = [
        CustomerStatus::Connected,
        CustomerStatus::Disconnected,
        CustomerStatus::Warned,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CustomerStatus::Connected => "connected",
            CustomerStatus::Disconnected => "disconnected",
            CustomerStatus::Warned => "warned",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_lowercase().as_str() {
            "connected" => Ok(CustomerStatus::Connected),
            "disconnected" => Ok(CustomerStatus::Disconnected),
            "warned" => Ok(CustomerStatus::Warned),
            _ => Err(ParseEnumError::new("status", s)),
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for CustomerStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Operation performed on a customer's supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Connect,
    Disconnect,
    Warn,
}

impl ActionType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ActionType::Connect => "connect",
            ActionType::Disconnect => "disconnect",
            ActionType::Warn => "warn",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_lowercase().as_str() {
            "connect" => Ok(ActionType::Connect),
            "disconnect" => Ok(ActionType::Disconnect),
            "warn" => Ok(ActionType::Warn),
            _ => Err(ParseEnumError::new("action", s)),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ActionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Where an action originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionSource {
    /// Performed by an operator through the UI
    #[default]
    Manual,
    /// Produced while processing a spreadsheet batch
    Batch,
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSource::Manual => write!(f, "manual"),
            ActionSource::Batch => write!(f, "batch"),
        }
    }
}

// ============================================================================
// SMS NOTICES
// ============================================================================

/// Kind of templated SMS notice sent to a single customer.
///
/// Each notice is rendered from the stored template of its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Warning,
    Disconnection,
    Connection,
}

impl NoticeKind {
    /// Action whose template this notice is rendered from.
    pub fn action(&self) -> ActionType {
        match self {
            NoticeKind::Warning => ActionType::Warn,
            NoticeKind::Disconnection => ActionType::Disconnect,
            NoticeKind::Connection => ActionType::Connect,
        }
    }

    /// Template key in the `message_templates` table.
    pub fn template_action(&self) -> &'static str {
        self.action().as_db_str()
    }

    pub fn label(&self) -> &'static str {
        match self {
            NoticeKind::Warning => "Warning",
            NoticeKind::Disconnection => "Disconnection",
            NoticeKind::Connection => "Connection",
        }
    }

    pub fn from_path(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_lowercase().as_str() {
            "warning" => Ok(NoticeKind::Warning),
            "disconnection" => Ok(NoticeKind::Disconnection),
            "connection" => Ok(NoticeKind::Connection),
            _ => Err(ParseEnumError::new("notice", s)),
        }
    }
}

/// Validation state of a spreadsheet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Validated,
    Error,
    #[default]
    Pending,
}

// ============================================================================
// PARSE ERROR
// ============================================================================

/// Error when parsing an enum from its string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}
