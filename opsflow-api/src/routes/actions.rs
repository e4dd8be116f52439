//! Customer Action REST API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use opsflow_core::{ActionFilters, CustomerActionCreate, CustomerId, Pagination};

use crate::{cached_store::CachedStore, error::ApiResult, events::WsEvent, ws::WsState};

#[derive(Clone)]
pub struct ActionState {
    pub cached: CachedStore,
    pub ws: Arc<WsState>,
}

impl ActionState {
    pub fn new(cached: CachedStore, ws: Arc<WsState>) -> Self {
        Self { cached, ws }
    }
}

/// Page parameters for the per-customer listing.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// POST /api/actions
pub async fn create_action(
    State(state): State<Arc<ActionState>>,
    Json(req): Json<CustomerActionCreate>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let action = state.cached.create_action(&req).await?;
    state.ws.broadcast(WsEvent::ActionCreated(action.clone()));
    tracing::info!(action_id = %action.id, customer_id = %action.customer_id, action = %action.action, "Action recorded");
    Ok((StatusCode::CREATED, Json(action)))
}

/// GET /api/actions?customer_id&page&limit
pub async fn list_actions(
    State(state): State<Arc<ActionState>>,
    Query(filters): Query<ActionFilters>,
) -> ApiResult<impl IntoResponse> {
    filters.pagination().validate()?;
    Ok(Json(state.cached.list_actions(&filters).await?))
}

/// GET /api/actions/customer/{customer_id} - One page of a customer's actions
pub async fn customer_actions(
    State(state): State<Arc<ActionState>>,
    Path(customer_id): Path<CustomerId>,
    Query(params): Query<PageParams>,
) -> ApiResult<impl IntoResponse> {
    let defaults = ActionFilters::default();
    let filters = ActionFilters {
        customer_id: Some(customer_id),
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
    };
    Pagination::new(filters.page, filters.limit).validate()?;
    Ok(Json(state.cached.list_actions(&filters).await?.data))
}

/// POST /api/actions/batch
pub async fn create_actions(
    State(state): State<Arc<ActionState>>,
    Json(reqs): Json<Vec<CustomerActionCreate>>,
) -> ApiResult<impl IntoResponse> {
    for req in &reqs {
        req.validate()?;
    }
    let actions = state.cached.create_actions(&reqs).await?;
    for action in &actions {
        state.ws.broadcast(WsEvent::ActionCreated(action.clone()));
    }
    tracing::info!(count = actions.len(), "Batch actions recorded");
    Ok((StatusCode::CREATED, Json(actions)))
}

pub fn create_router(cached: CachedStore, ws: Arc<WsState>) -> Router {
    let state = Arc::new(ActionState::new(cached, ws));

    Router::new()
        .route("/", get(list_actions).post(create_action))
        .route("/batch", post(create_actions))
        .route("/customer/:customer_id", get(customer_actions))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use opsflow_cache::{CacheTtls, TtlCache};
    use opsflow_core::ActionType;
    use opsflow_test_utils::fixtures;

    fn state() -> Arc<ActionState> {
        let cached = CachedStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(TtlCache::new()),
            CacheTtls::default(),
        );
        Arc::new(ActionState::new(cached, Arc::new(WsState::new(16))))
    }

    #[tokio::test]
    async fn test_batch_broadcasts_each_action() {
        let state = state();
        let customer = state
            .cached
            .create_customer(&fixtures::customer_create("ACC-2001"))
            .await
            .unwrap();
        let mut rx = state.ws.subscribe();

        let reqs = vec![
            fixtures::action_create(customer.id, ActionType::Warn),
            fixtures::action_create(customer.id, ActionType::Disconnect),
        ];
        create_actions(State(state.clone()), Json(reqs)).await.unwrap();

        for _ in 0..2 {
            assert!(matches!(rx.try_recv().unwrap(), WsEvent::ActionCreated(_)));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_customer_actions_returns_page_data() {
        let state = state();
        let customer = state
            .cached
            .create_customer(&fixtures::customer_create("ACC-2002"))
            .await
            .unwrap();
        create_action(
            State(state.clone()),
            Json(fixtures::action_create(customer.id, ActionType::Warn)),
        )
        .await
        .unwrap();

        let response = customer_actions(State(state), Path(customer.id), Query(PageParams::default()))
            .await
            .unwrap()
            .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(1));
        assert_eq!(json[0]["account_number"], "ACC-2002");
    }

    #[tokio::test]
    async fn test_blank_operator_rejected() {
        let state = state();
        let mut req = fixtures::action_create(uuid::Uuid::new_v4(), ActionType::Connect);
        req.performed_by = "  ".to_string();
        let err = create_action(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
