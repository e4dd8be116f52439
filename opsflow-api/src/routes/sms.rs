//! SMS REST API Routes
//!
//! Free-form, bulk and templated notices. Customers and templates are read
//! through the cache; sending itself is delegated to the [`SmsGateway`].

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use opsflow_core::{
    BulkSmsRequest, Customer, CustomerId, NoticeKind, OpsError, SmsRequest, SmsResponse, SmsStatus,
};

use crate::{
    cached_store::CachedStore,
    error::{ApiError, ApiResult, ErrorCode},
    sms::SmsGateway,
    telemetry::metrics,
};

#[derive(Clone)]
pub struct SmsState {
    pub cached: CachedStore,
    pub gateway: Arc<dyn SmsGateway>,
}

impl SmsState {
    pub fn new(cached: CachedStore, gateway: Arc<dyn SmsGateway>) -> Self {
        Self { cached, gateway }
    }

    fn ensure_configured(&self) -> ApiResult<()> {
        if self.gateway.is_configured() {
            Ok(())
        } else {
            tracing::error!("SMS gateway credentials are not configured");
            Err(ApiError::from_code(ErrorCode::SmsNotConfigured))
        }
    }

    async fn customer(&self, id: CustomerId) -> ApiResult<Customer> {
        self.cached
            .get_customer(id)
            .await?
            .ok_or_else(|| ApiError::customer_not_found(id))
    }

    /// Send and record the outcome under `kind`.
    async fn deliver(&self, kind: &str, recipients: &[String], message: &str) -> ApiResult<Option<String>> {
        let result = self.gateway.send(recipients, message).await;
        if let Some(m) = metrics() {
            m.record_sms(kind, result.is_ok());
        }
        result.map_err(|e| match e {
            OpsError::Gateway(g) => ApiError::sms(g),
            other => other.into(),
        })
    }
}

/// POST /api/sms/send - Free-form message to one customer
pub async fn send_sms(
    State(state): State<Arc<SmsState>>,
    Json(req): Json<SmsRequest>,
) -> ApiResult<impl IntoResponse> {
    state.ensure_configured()?;
    let customer = state.customer(req.customer_id).await?;
    let message = req.compose(&customer);

    let message_id = state.deliver("custom", &[customer.phone.clone()], &message).await?;
    tracing::info!(customer_id = %customer.id, "Sent custom SMS");

    Ok(Json(SmsResponse {
        success: true,
        message: format!("SMS sent to {}.", customer.name),
        message_id,
        recipients_count: 1,
    }))
}

/// POST /api/sms/send-bulk
pub async fn send_bulk_sms(
    State(state): State<Arc<SmsState>>,
    Json(req): Json<BulkSmsRequest>,
) -> ApiResult<impl IntoResponse> {
    state.ensure_configured()?;
    if req.recipients.is_empty() {
        return Err(ApiError::validation("At least one recipient is required"));
    }

    let message_id = state.deliver("bulk", &req.recipients, &req.message).await?;
    tracing::info!(recipients = req.recipients.len(), "Initiated bulk SMS");

    Ok(Json(SmsResponse {
        success: true,
        message: "SMS sent successfully.".to_string(),
        message_id,
        recipients_count: req.recipients.len(),
    }))
}

/// POST /api/sms/send/{kind}/{customer_id} - Templated notice
pub async fn send_notice(
    State(state): State<Arc<SmsState>>,
    Path((kind, customer_id)): Path<(String, CustomerId)>,
) -> ApiResult<impl IntoResponse> {
    let kind = NoticeKind::from_path(&kind)
        .map_err(|_| ApiError::invalid_input(format!("Unknown notice kind '{}'", kind)))?;
    state.ensure_configured()?;

    let customer = state.customer(customer_id).await?;
    let template = state
        .cached
        .template_for(kind.template_action())
        .await?
        .ok_or_else(|| ApiError::template_missing(kind.label()))?;
    let message = template.render(&customer.arrears);

    let message_id = state
        .deliver(kind.template_action(), &[customer.phone.clone()], &message)
        .await?;
    tracing::info!(customer_id = %customer.id, notice = kind.label(), "Sent notice SMS");

    Ok(Json(SmsResponse {
        success: true,
        message: format!("{} SMS sent to {}.", kind.label(), customer.name),
        message_id,
        recipients_count: 1,
    }))
}

/// GET /api/sms/status/{message_id}
pub async fn sms_status(
    State(state): State<Arc<SmsState>>,
    Path(message_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let details = state.gateway.status(&message_id).await.map_err(|e| match e {
        OpsError::Gateway(g) => ApiError::sms(g),
        other => other.into(),
    })?;
    let status = details
        .get("data")
        .and_then(|d| d.get("status"))
        .or_else(|| details.get("status"))
        .and_then(|s| s.as_str())
        .map(str::to_string);

    Ok(Json(SmsStatus {
        message_id,
        status,
        details,
    }))
}

pub fn create_router(cached: CachedStore, gateway: Arc<dyn SmsGateway>) -> Router {
    let state = Arc::new(SmsState::new(cached, gateway));

    Router::new()
        .route("/send", post(send_sms))
        .route("/send-bulk", post(send_bulk_sms))
        .route("/send/:kind/:customer_id", post(send_notice))
        .route("/status/:message_id", get(sms_status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use opsflow_cache::{CacheTtls, TtlCache};
    use opsflow_core::{GatewayError, OpsResult};
    use opsflow_test_utils::fixtures;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(Vec<String>, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl SmsGateway for Recorder {
        fn is_configured(&self) -> bool {
            true
        }

        async fn send(&self, recipients: &[String], message: &str) -> OpsResult<Option<String>> {
            if self.fail {
                return Err(GatewayError::RequestFailed {
                    gateway: "SMS service".to_string(),
                    status: 200,
                    message: "Insufficient balance".to_string(),
                }
                .into());
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipients.to_vec(), message.to_string()));
            Ok(Some("msg-1".to_string()))
        }

        async fn status(&self, message_id: &str) -> OpsResult<serde_json::Value> {
            Ok(serde_json::json!({ "status": "success", "data": { "id": message_id, "status": "DELIVRD" } }))
        }
    }

    fn state(recorder: Arc<Recorder>, store: InMemoryStore) -> Arc<SmsState> {
        let cached = CachedStore::new(Arc::new(store), Arc::new(TtlCache::new()), CacheTtls::default());
        Arc::new(SmsState::new(cached, recorder))
    }

    #[tokio::test]
    async fn test_custom_sms_appends_arrears() {
        let recorder = Arc::new(Recorder::default());
        let state = state(recorder.clone(), InMemoryStore::new());
        let customer = state
            .cached
            .create_customer(&fixtures::customer_create("ACC-3001"))
            .await
            .unwrap();

        let req = SmsRequest {
            customer_id: customer.id,
            message: "Hello".to_string(),
            include_arrears: true,
        };
        send_sms(State(state), Json(req)).await.unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].0, vec![customer.phone.clone()]);
        assert_eq!(sent[0].1, "Hello\nYour current arrears are: GHS 45.00");
    }

    #[tokio::test]
    async fn test_notice_renders_template() {
        let recorder = Arc::new(Recorder::default());
        let state = state(recorder.clone(), InMemoryStore::new());
        let customer = state
            .cached
            .create_customer(&fixtures::customer_create("ACC-3002"))
            .await
            .unwrap();
        state
            .cached
            .update_template("warn", "You owe {amount}.")
            .await
            .unwrap();

        send_notice(State(state), Path(("warning".to_string(), customer.id)))
            .await
            .unwrap();
        assert_eq!(recorder.sent.lock().unwrap()[0].1, "You owe GHS 45.00.");
    }

    #[tokio::test]
    async fn test_missing_template_is_500() {
        let state = state(Arc::new(Recorder::default()), InMemoryStore::without_templates());
        let customer = state
            .cached
            .create_customer(&fixtures::customer_create("ACC-3003"))
            .await
            .unwrap();

        let err = send_notice(State(state), Path(("connection".to_string(), customer.id)))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Connection SMS template not found in database.");
    }

    #[tokio::test]
    async fn test_provider_failure_is_bad_gateway() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let state = state(recorder, InMemoryStore::new());
        let req = BulkSmsRequest {
            recipients: vec!["0241234567".to_string()],
            message: "Outage tonight".to_string(),
        };
        let err = send_bulk_sms(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "SMS provider error: Insufficient balance");
    }

    #[tokio::test]
    async fn test_status_extracts_delivery_state() {
        let state = state(Arc::new(Recorder::default()), InMemoryStore::new());
        let response = sms_status(State(state), Path("msg-9".to_string()))
            .await
            .unwrap()
            .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "DELIVRD");
        assert_eq!(json["message_id"], "msg-9");
    }
}
