//! Batch Upload REST API Routes
//!
//! The client parses the spreadsheet; these endpoints validate rows, apply a
//! validated batch and verify it afterwards.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use opsflow_core::{BatchUploadRequest, CustomerForValidation};

use crate::{
    cached_store::CachedStore, error::ApiResult, middleware::AuthExtractor, services,
};

#[derive(Clone)]
pub struct UploadState {
    pub cached: CachedStore,
}

/// POST /api/upload/validate-customers
pub async fn validate_customers(Json(rows): Json<Vec<CustomerForValidation>>) -> impl IntoResponse {
    Json(services::validate_customers(&rows))
}

/// POST /api/upload/process-batch
pub async fn process_batch(
    State(state): State<Arc<UploadState>>,
    AuthExtractor(user): AuthExtractor,
    Json(req): Json<BatchUploadRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services::process_batch(&state.cached, &user, &req).await?))
}

/// GET /api/upload/batch/{batch_id}/verify
pub async fn verify_batch(
    State(state): State<Arc<UploadState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services::verify_batch(&state.cached, &batch_id).await?))
}

pub fn create_router(cached: CachedStore) -> Router {
    let state = Arc::new(UploadState { cached });

    Router::new()
        .route("/validate-customers", post(validate_customers))
        .route("/process-batch", post(process_batch))
        .route("/batch/:batch_id/verify", get(verify_batch))
        .with_state(state)
}
