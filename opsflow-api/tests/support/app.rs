//! In-process application for HTTP-level tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use opsflow_api::{
    create_api_router, ApiConfig, AppState, Environment, InMemoryStore, SmsGateway,
    StaticIdentityProvider,
};
use opsflow_core::{AuthUser, OpsResult};
use opsflow_test_utils::fixtures;
use tower::ServiceExt;

pub const TOKEN: &str = "test-operator-token";

/// SMS gateway that records instead of sending.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(Vec<String>, String)>>,
}

impl RecordingGateway {
    pub fn messages(&self) -> Vec<(Vec<String>, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsGateway for RecordingGateway {
    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, recipients: &[String], message: &str) -> OpsResult<Option<String>> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((recipients.to_vec(), message.to_string()));
        Ok(Some(format!("msg-{}", sent.len())))
    }

    async fn status(&self, message_id: &str) -> OpsResult<serde_json::Value> {
        Ok(serde_json::json!({ "data": { "id": message_id, "status": "DELIVRD" } }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub sms: Arc<RecordingGateway>,
    pub user: AuthUser,
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        environment: Environment::Testing,
        rate_limit_enabled: false,
        ..Default::default()
    }
}

pub fn test_app() -> TestApp {
    test_app_with(test_config(), InMemoryStore::new())
}

pub fn test_app_with(config: ApiConfig, store: InMemoryStore) -> TestApp {
    let store = Arc::new(store);
    let sms = Arc::new(RecordingGateway::default());
    let user = fixtures::auth_user();
    let identity = StaticIdentityProvider::new().with_token(TOKEN, user.clone());

    let state = AppState::new(config, store.clone(), Arc::new(identity), sms.clone());
    let router = create_api_router(state.clone()).expect("router builds");

    TestApp {
        router,
        state,
        store,
        sms,
        user,
    }
}

impl TestApp {
    /// Authenticated request; `body` is sent as JSON when present.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.call(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.call(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.call(Method::DELETE, uri, None).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}

pub fn customer_body(account_number: &str, arrears: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "Yaw Asante",
        "account_number": account_number,
        "phone": "0241234567",
        "status": "connected",
        "arrears": arrears,
    })
}
