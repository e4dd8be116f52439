//! Message Template REST API Routes

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use std::sync::Arc;

use opsflow_core::MessageTemplateUpdate;

use crate::{
    cached_store::CachedStore,
    error::{ApiError, ApiResult},
};

#[derive(Clone)]
pub struct TemplateState {
    pub cached: CachedStore,
}

/// GET /api/templates
pub async fn list_templates(State(state): State<Arc<TemplateState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.cached.templates().await?))
}

/// PUT /api/templates/{action}
pub async fn update_template(
    State(state): State<Arc<TemplateState>>,
    Path(action): Path<String>,
    Json(req): Json<MessageTemplateUpdate>,
) -> ApiResult<impl IntoResponse> {
    match state.cached.update_template(&action, &req.message).await? {
        Some(template) => Ok(Json(template)),
        None => {
            tracing::warn!(action = %action, "Attempted to update non-existent template");
            Err(ApiError::template_not_found(&action))
        }
    }
}

pub fn create_router(cached: CachedStore) -> Router {
    let state = Arc::new(TemplateState { cached });

    Router::new()
        .route("/", get(list_templates))
        .route("/:action", put(update_template))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use axum::http::StatusCode;
    use opsflow_cache::{CacheTtls, TtlCache};

    fn state() -> Arc<TemplateState> {
        Arc::new(TemplateState {
            cached: CachedStore::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(TtlCache::new()),
                CacheTtls::default(),
            ),
        })
    }

    #[tokio::test]
    async fn test_update_visible_on_next_read() {
        let state = state();
        state.cached.templates().await.unwrap();

        update_template(
            State(state.clone()),
            Path("warn".to_string()),
            Json(MessageTemplateUpdate {
                message: "Pay {amount} now".to_string(),
            }),
        )
        .await
        .unwrap();

        let warn = state.cached.template_for("warn").await.unwrap().unwrap();
        assert_eq!(warn.message, "Pay {amount} now");
    }

    #[tokio::test]
    async fn test_unknown_action_is_404() {
        let err = update_template(
            State(state()),
            Path("reminder".to_string()),
            Json(MessageTemplateUpdate {
                message: "x".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
