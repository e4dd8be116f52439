//! Error Types for OpsFlow API
//!
//! This module defines error handling for the HTTP layer:
//! - ErrorCode enum for categorizing errors
//! - ApiError struct for structured error responses
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversions from the domain and cache error enums
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use opsflow_cache::CacheError;
use opsflow_core::{EntityType, GatewayError, OpsError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Bearer token was rejected by the identity provider
    InvalidToken,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// A field failed validation
    ValidationError,

    /// Required field is missing from request
    RequiredFieldMissing,

    /// Request body or query could not be decoded
    InvalidInput,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    CustomerNotFound,

    /// Template lookup by path parameter
    TemplateNotFound,

    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Another customer already uses the account number
    CustomerAlreadyExists,

    EntityAlreadyExists,

    // ========================================================================
    // Server and Upstream Errors (5xx)
    // ========================================================================
    InternalServerError,

    /// Backing store rejected or failed a query
    DatabaseQueryError,

    /// Backing store could not be reached
    DatabaseConnectionError,

    /// A configured SMS template is missing from the store
    TemplateMissing,

    /// SMS gateway is not configured
    SmsNotConfigured,

    /// SMS gateway rejected the request or could not be reached
    SmsSendFailed,

    /// Identity provider or other upstream failed
    UpstreamError,

    ServiceUnavailable,

    /// Request rate limit exceeded
    TooManyRequests,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,

            ErrorCode::ValidationError
            | ErrorCode::RequiredFieldMissing
            | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::CustomerNotFound
            | ErrorCode::TemplateNotFound
            | ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::CustomerAlreadyExists | ErrorCode::EntityAlreadyExists => {
                StatusCode::CONFLICT
            }

            ErrorCode::SmsSendFailed | ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,

            ErrorCode::DatabaseConnectionError | ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::InternalServerError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::TemplateMissing
            | ErrorCode::SmsNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Not authenticated",
            ErrorCode::InvalidToken => "Could not validate credentials",

            ErrorCode::ValidationError => "Please check your input and try again",
            ErrorCode::RequiredFieldMissing => "Required field is missing",
            ErrorCode::InvalidInput => "Invalid input data",

            ErrorCode::CustomerNotFound => "Customer not found",
            ErrorCode::TemplateNotFound => "Template not found",
            ErrorCode::EntityNotFound => "Entity not found",

            ErrorCode::CustomerAlreadyExists => "Customer already exists",
            ErrorCode::EntityAlreadyExists => "Entity already exists",

            ErrorCode::InternalServerError => "An unexpected error occurred. Please try again",
            ErrorCode::DatabaseQueryError => "Database operation failed",
            ErrorCode::DatabaseConnectionError => {
                "Unable to connect to the service. Please try again later"
            }
            ErrorCode::TemplateMissing => "SMS template not found in database.",
            ErrorCode::SmsNotConfigured => "SMS service is not configured.",
            ErrorCode::SmsSendFailed => "Failed to communicate with SMS provider.",
            ErrorCode::UpstreamError => "Upstream service failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::TooManyRequests => "Rate limit exceeded",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (offending field, ids, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an error using the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn customer_not_found(customer_id: impl fmt::Display) -> Self {
        let id = customer_id.to_string();
        Self::new(
            ErrorCode::CustomerNotFound,
            format!("Customer with ID {} not found", id),
        )
        .with_details(serde_json::json!({ "customer_id": id }))
    }

    pub fn template_not_found(action: &str) -> Self {
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("Template for action '{}' not found", action),
        )
    }

    /// A notice template the SMS routes rely on is absent.
    pub fn template_missing(label: &str) -> Self {
        Self::new(
            ErrorCode::TemplateMissing,
            format!("{} SMS template not found in database.", label),
        )
    }

    pub fn customer_already_exists(account_number: &str) -> Self {
        Self::new(
            ErrorCode::CustomerAlreadyExists,
            format!(
                "Customer with account number {} already exists",
                account_number
            ),
        )
        .with_details(serde_json::json!({ "account_number": account_number }))
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseQueryError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }

    /// Map a gateway failure raised while talking to the SMS provider.
    pub fn sms(err: GatewayError) -> Self {
        tracing::error!(error = %err, "SMS gateway error");
        match err {
            GatewayError::NotConfigured { .. } => Self::from_code(ErrorCode::SmsNotConfigured),
            GatewayError::RequestFailed { message, .. } => Self::new(
                ErrorCode::SmsSendFailed,
                format!("SMS provider error: {}", message),
            ),
            GatewayError::InvalidResponse { .. } | GatewayError::Unauthorized { .. } => {
                Self::from_code(ErrorCode::SmsSendFailed)
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// 401 responses carry `WWW-Authenticate: Bearer`.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let code = match err {
            ValidationError::RequiredFieldMissing { .. } => ErrorCode::RequiredFieldMissing,
            _ => ErrorCode::ValidationError,
        };
        let details = match err.field() {
            Some(field) => serde_json::json!({ "field": field }),
            None => serde_json::json!({}),
        };
        ApiError::new(code, err.reason()).with_details(details)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity_type, id } => match entity_type {
                EntityType::Customer => ApiError::customer_not_found(id),
                EntityType::Template => ApiError::template_not_found(&id),
                EntityType::Action => ApiError::new(
                    ErrorCode::EntityNotFound,
                    format!("Action with ID {} not found", id),
                ),
                EntityType::User => ApiError::new(
                    ErrorCode::EntityNotFound,
                    format!("User {} not found", id),
                ),
            },
            StorageError::Duplicate {
                entity_type: EntityType::Customer,
                value,
                ..
            } => ApiError::customer_already_exists(&value),
            StorageError::Duplicate {
                entity_type,
                field,
                value,
            } => ApiError::new(
                ErrorCode::EntityAlreadyExists,
                format!("{:?} with {} {} already exists", entity_type, field, value),
            ),
            StorageError::Unavailable { reason } => {
                tracing::error!(reason = %reason, "Backing store unavailable");
                ApiError::from_code(ErrorCode::DatabaseConnectionError)
            }
            StorageError::LockPoisoned => {
                tracing::error!("Storage lock poisoned");
                ApiError::from_code(ErrorCode::InternalServerError)
            }
            other => {
                tracing::error!(error = %other, "Database error");
                ApiError::database_error(other.to_string())
            }
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        tracing::error!(error = %err, "Upstream error");
        match err {
            GatewayError::Unauthorized { .. } => ApiError::invalid_token(
                ErrorCode::InvalidToken.default_message(),
            ),
            GatewayError::NotConfigured { gateway } => ApiError::new(
                ErrorCode::ServiceUnavailable,
                format!("{} is not configured.", gateway),
            ),
            other => ApiError::new(ErrorCode::UpstreamError, other.to_string()),
        }
    }
}

impl From<OpsError> for ApiError {
    fn from(err: OpsError) -> Self {
        match err {
            OpsError::Storage(e) => e.into(),
            OpsError::Validation(e) => e.into(),
            OpsError::Gateway(e) => e.into(),
            OpsError::Config(e) => {
                tracing::error!(error = %e, "Configuration error");
                ApiError::from_code(ErrorCode::InternalServerError)
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!(error = %err, "Cache error");
        ApiError::internal_error(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
