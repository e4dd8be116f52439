//! Customer REST API Routes
//!
//! CRUD over customers plus the dashboard summary. Reads are memoized by
//! [`CachedStore`]; every successful write is broadcast over the WebSocket
//! feed after its cache eviction has run.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use opsflow_core::{CustomerCreate, CustomerFilters, CustomerId, CustomerUpdate};

use crate::{
    cached_store::CachedStore,
    error::{ApiError, ApiResult},
    events::WsEvent,
    ws::WsState,
};

// ============================================================================
// SHARED STATE
// ============================================================================

#[derive(Clone)]
pub struct CustomerState {
    pub cached: CachedStore,
    pub ws: Arc<WsState>,
}

impl CustomerState {
    pub fn new(cached: CachedStore, ws: Arc<WsState>) -> Self {
        Self { cached, ws }
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/customers - Create a customer
pub async fn create_customer(
    State(state): State<Arc<CustomerState>>,
    Json(req): Json<CustomerCreate>,
) -> ApiResult<impl IntoResponse> {
    let req = req.normalized()?;
    tracing::info!(account_number = %req.account_number, "Creating customer");

    let customer = state.cached.create_customer(&req).await?;
    state.ws.broadcast(WsEvent::CustomerCreated(customer.clone()));

    tracing::info!(customer_id = %customer.id, "Customer created");
    Ok((StatusCode::CREATED, Json(customer)))
}

/// GET /api/customers - Filtered, paginated list, newest first
pub async fn list_customers(
    State(state): State<Arc<CustomerState>>,
    Query(filters): Query<CustomerFilters>,
) -> ApiResult<impl IntoResponse> {
    filters.validate()?;
    let page = state.cached.list_customers(&filters).await?;
    tracing::debug!(count = page.data.len(), total = page.total, page = page.page, "Customers fetched");
    Ok(Json(page))
}

/// GET /api/customers/{id}
pub async fn get_customer(
    State(state): State<Arc<CustomerState>>,
    Path(id): Path<CustomerId>,
) -> ApiResult<impl IntoResponse> {
    let customer = state
        .cached
        .get_customer(id)
        .await?
        .ok_or_else(|| ApiError::customer_not_found(id))?;
    Ok(Json(customer))
}

/// PUT /api/customers/{id} - Partial update
pub async fn update_customer(
    State(state): State<Arc<CustomerState>>,
    Path(id): Path<CustomerId>,
    Json(req): Json<CustomerUpdate>,
) -> ApiResult<impl IntoResponse> {
    let req = req.normalized()?;
    let customer = state
        .cached
        .update_customer(id, &req)
        .await?
        .ok_or_else(|| ApiError::customer_not_found(id))?;

    state.ws.broadcast(WsEvent::CustomerUpdated(customer.clone()));
    Ok(Json(customer))
}

/// DELETE /api/customers/{id}
pub async fn delete_customer(
    State(state): State<Arc<CustomerState>>,
    Path(id): Path<CustomerId>,
) -> ApiResult<impl IntoResponse> {
    if !state.cached.delete_customer(id).await? {
        return Err(ApiError::customer_not_found(id));
    }

    state.ws.broadcast(WsEvent::customer_deleted(id));
    tracing::info!(customer_id = %id, "Customer deleted");
    Ok(Json(json!({ "message": "Customer deleted successfully" })))
}

/// GET /api/customers/dashboard/data
pub async fn dashboard(State(state): State<Arc<CustomerState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.cached.dashboard().await?))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(cached: CachedStore, ws: Arc<WsState>) -> Router {
    let state = Arc::new(CustomerState::new(cached, ws));

    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/dashboard/data", get(dashboard))
        .route(
            "/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use opsflow_cache::{CacheTtls, TtlCache};
    use opsflow_core::CustomerStatus;
    use opsflow_test_utils::fixtures;

    fn state() -> Arc<CustomerState> {
        let cached = CachedStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(TtlCache::new()),
            CacheTtls::default(),
        );
        Arc::new(CustomerState::new(cached, Arc::new(WsState::new(16))))
    }

    #[tokio::test]
    async fn test_create_broadcasts_and_returns_created() {
        let state = state();
        let mut rx = state.ws.subscribe();

        let response = create_customer(
            State(state.clone()),
            Json(fixtures::customer_create("ACC-1001")),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        match rx.try_recv().unwrap() {
            WsEvent::CustomerCreated(c) => assert_eq!(c.account_number, "ACC-1001"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_account_conflicts() {
        let state = state();
        let req = fixtures::customer_create("ACC-1002");
        create_customer(State(state.clone()), Json(req.clone())).await.unwrap();

        let err = create_customer(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_update_unknown_customer_is_404() {
        let state = state();
        let update = CustomerUpdate {
            status: Some(CustomerStatus::Warned),
            ..Default::default()
        };
        let err = update_customer(State(state), Path(uuid::Uuid::new_v4()), Json(update))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_phone_rejected() {
        let state = state();
        let mut req = fixtures::customer_create("ACC-1003");
        req.phone = "12".to_string();
        let err = create_customer(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_broadcasts_id() {
        let state = state();
        let customer = state
            .cached
            .create_customer(&fixtures::customer_create("ACC-1004"))
            .await
            .unwrap();
        let mut rx = state.ws.subscribe();

        delete_customer(State(state.clone()), Path(customer.id)).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), WsEvent::customer_deleted(customer.id));

        let err = get_customer(State(state), Path(customer.id)).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
