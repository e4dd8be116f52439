//! Middleware for the OpsFlow API
//!
//! - `auth`: bearer-token authentication and the [`AuthExtractor`]
//! - `rate_limit`: per-user / per-IP quotas
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .route("/api/customers", get(handler))
//!     // Innermost: sees the AuthUser and keys by user id
//!     .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//!     // Outermost
//! ```

mod auth;
mod rate_limit;

pub use auth::{auth_middleware, AuthExtractor, AuthMiddlewareState};
pub use rate_limit::{rate_limit_middleware, RateLimitError, RateLimitKey, RateLimitState};
