//! Error types for OpsFlow operations

use crate::EntityType;
use thiserror::Error;

/// Backing store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Duplicate {entity_type:?}: {field} '{value}' already exists")]
    Duplicate {
        entity_type: EntityType,
        field: String,
        value: String,
    },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    #[error("Query failed on {entity_type:?}: {reason}")]
    QueryFailed { entity_type: EntityType, reason: String },

    #[error("Backing store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn required(field: &str) -> Self {
        ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }
    }

    /// Name of the offending field, when the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. } => Some(field),
            ValidationError::ConstraintViolation { .. } => None,
        }
    }

    /// Human-readable reason without the field prefix.
    pub fn reason(&self) -> String {
        match self {
            ValidationError::RequiredFieldMissing { field } => format!("{} is required", field),
            ValidationError::InvalidValue { reason, .. }
            | ValidationError::ConstraintViolation { reason, .. } => reason.clone(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors from the identity provider and the SMS gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Request to {gateway} failed with status {status}: {message}")]
    RequestFailed {
        gateway: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {gateway}: {reason}")]
    InvalidResponse { gateway: String, reason: String },

    #[error("{gateway} is not configured")]
    NotConfigured { gateway: String },

    #[error("Credentials rejected by {gateway}")]
    Unauthorized { gateway: String },
}

/// Master error type for all OpsFlow errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpsError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Result type alias for OpsFlow operations.
pub type OpsResult<T> = Result<T, OpsError>;

// =============================================================================
// TESTS
// =============================================================================
