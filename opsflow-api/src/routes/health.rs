//! Health Check Endpoints
//!
//! - `/health` - Basic status
//! - `/health/live` - Process alive check
//! - `/health/ready` - Backing store connectivity check
//! - `/health/cache` - Cache statistics
//!
//! No authentication required for health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use opsflow_cache::CacheStats;

use crate::cached_store::CachedStore;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub store: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub backend: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct HealthState {
    pub cached: CachedStore,
    pub start_time: std::time::Instant,
}

impl HealthState {
    pub fn new(cached: CachedStore) -> Self {
        Self {
            cached,
            start_time: std::time::Instant::now(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        message: None,
        details: None,
    })
}

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - 503 when the backing store cannot be reached
pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let store = state.cached.store();
    let start = std::time::Instant::now();

    let store_health = match store.ping().await {
        Ok(()) => ComponentHealth {
            backend: store.backend().to_string(),
            status: HealthStatus::Healthy,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            ComponentHealth {
                backend: store.backend().to_string(),
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(format!("Store check failed: {}", e)),
            }
        }
    };

    let overall_status = store_health.status;
    let response = HealthResponse {
        status: overall_status,
        message: None,
        details: Some(HealthDetails {
            store: store_health,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall_status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// GET /health/cache - Degraded when the cache lock is poisoned; reads then
/// bypass the cache.
pub async fn cache_health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    match state.cached.cache_stats() {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::to_value(CacheHealth {
                status: HealthStatus::Healthy,
                hit_rate: stats.hit_rate(),
                stats,
            })
            .unwrap_or_default()),
        ),
        Err(e) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": HealthStatus::Degraded,
                "error": e.to_string(),
            })),
        ),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no auth required)
pub fn create_router(cached: CachedStore) -> Router {
    let state = Arc::new(HealthState::new(cached));

    Router::new()
        .route("/", get(health))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/cache", get(cache_health))
        .with_state(state)
}
