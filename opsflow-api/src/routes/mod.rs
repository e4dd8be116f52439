//! REST API Routes Module
//!
//! Route handlers grouped by resource, plus the router builder that puts
//! authentication, rate limiting, observability and CORS in front of them.
//!
//! Includes:
//! - Customer, action and template CRUD (cache-backed)
//! - SMS notices through the configured gateway
//! - Spreadsheet batch validation and processing
//! - Sign-in and account creation
//! - Health checks, metrics and the WebSocket event feed (public)

pub mod actions;
pub mod auth;
pub mod customers;
pub mod health;
pub mod sms;
pub mod templates;
pub mod upload;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{auth_middleware, rate_limit_middleware, AuthMiddlewareState, RateLimitState};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};
use crate::ws::{ws_handler, ws_status};

pub use actions::create_router as actions_router;
pub use customers::create_router as customers_router;
pub use health::create_router as health_router;
pub use sms::create_router as sms_router;
pub use templates::create_router as templates_router;
pub use upload::create_router as upload_router;

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!(
            "Rate limiting is disabled in production. Set RATE_LIMIT_ENABLED=true to enable it."
        );
    }
    Ok(())
}

// ============================================================================
// SECURE ROUTER BUILDER
// ============================================================================

/// Builds the application router with auth and rate limiting by default.
///
/// Everything under `/api` except sign-in and sign-up requires a bearer
/// token. Public routes (auth entry points, health, metrics, `/ws`) are rate
/// limited per client IP; protected routes per user.
pub struct SecureRouterBuilder {
    state: AppState,
    auth_state: AuthMiddlewareState,
    rate_limit_state: RateLimitState,
}

impl SecureRouterBuilder {
    /// In production the CORS configuration must be explicit.
    pub fn new(state: AppState) -> ApiResult<Self> {
        if state.config.is_production() {
            validate_api_config_for_production(&state.config)?;
        }

        let auth_state = AuthMiddlewareState::new(Arc::clone(&state.identity));
        let rate_limit_state = RateLimitState::new(&state.config);

        Ok(Self {
            state,
            auth_state,
            rate_limit_state,
        })
    }

    fn build_protected_routes(&self) -> Router {
        let cached = &self.state.cached;
        let ws = &self.state.ws;

        Router::new()
            .nest("/customers", customers::create_router(cached.clone(), Arc::clone(ws)))
            .nest("/actions", actions::create_router(cached.clone(), Arc::clone(ws)))
            .nest("/templates", templates::create_router(cached.clone()))
            .nest("/sms", sms::create_router(cached.clone(), Arc::clone(&self.state.sms)))
            .nest(
                "/upload",
                upload::create_router(cached.clone())
                    .layer(DefaultBodyLimit::max(self.state.config.max_file_size)),
            )
            .nest("/auth", auth::create_protected_router(Arc::clone(&self.state.identity)))
    }

    fn build_public_routes(&self) -> Router {
        let ws_routes = Router::new()
            .route("/ws", get(ws_handler))
            .route("/ws/status", get(ws_status))
            .with_state(Arc::clone(&self.state.ws));

        Router::new()
            .nest("/api/auth", auth::create_public_router(Arc::clone(&self.state.identity)))
            .nest("/health", health::create_router(self.state.cached.clone()))
            .route("/metrics", get(metrics_handler))
            .merge(ws_routes)
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS (outermost) - handles preflight requests
    /// 2. Observability - tracing and metrics
    /// 3. Auth (protected routes only) - resolves the bearer token
    /// 4. Rate Limiting - keyed by user when auth ran, by IP otherwise
    pub fn build(self) -> Router {
        let protected = Router::new()
            .nest("/api", self.build_protected_routes())
            .layer(from_fn_with_state(self.rate_limit_state.clone(), rate_limit_middleware))
            .layer(from_fn_with_state(self.auth_state.clone(), auth_middleware));

        let public = self
            .build_public_routes()
            .layer(from_fn_with_state(self.rate_limit_state.clone(), rate_limit_middleware));

        let cors = build_cors_layer(&self.state.config);

        Router::new()
            .merge(protected)
            .merge(public)
            .layer(from_fn(observability_middleware))
            .layer(cors)
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Empty origins allow any origin (development); otherwise only the
/// configured ones.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the complete API router.
///
/// - `/api/customers`, `/api/actions`, `/api/templates`, `/api/sms`,
///   `/api/upload`, `/api/auth/{register,me}` (bearer token required)
/// - `/api/auth/{token,signup}` (public)
/// - `/health/*`, `/metrics`, `/ws`, `/ws/status` (public)
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    SecureRouterBuilder::new(state).map(SecureRouterBuilder::build)
}
