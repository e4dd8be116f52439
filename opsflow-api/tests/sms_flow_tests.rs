//! SMS Flow Tests
//!
//! Notices are rendered from the stored template with the customer's current
//! arrears. A template edit or an arrears update SHALL be reflected in the
//! very next message, cached reads notwithstanding.

#[path = "support/app.rs"]
mod support;

use axum::http::StatusCode;
use opsflow_api::InMemoryStore;
use support::{customer_body, test_app, test_app_with, test_config};

#[tokio::test]
async fn test_warning_notice_uses_current_arrears() {
    let app = test_app();
    let (_, created) = app.post("/api/customers", customer_body("ACC-9001", "80")).await;
    let id = created["id"].as_str().unwrap().to_string();

    app.put("/api/templates/warn", serde_json::json!({ "message": "Arrears of {amount} due." }))
        .await;
    let (status, body) = app.post(&format!("/api/sms/send/warning/{}", id), serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Warning SMS sent to Yaw Asante.");
    assert_eq!(body["recipients_count"], 1);

    app.put(&format!("/api/customers/{}", id), serde_json::json!({ "arrears": "95.5" }))
        .await;
    app.post(&format!("/api/sms/send/warning/{}", id), serde_json::json!({}))
        .await;

    let messages = app.sms.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].0, vec!["0241234567".to_string()]);
    assert_eq!(messages[0].1, "Arrears of GHS 80.00 due.");
    assert_eq!(messages[1].1, "Arrears of GHS 95.50 due.");
}

#[tokio::test]
async fn test_custom_message_without_arrears() {
    let app = test_app();
    let (_, created) = app.post("/api/customers", customer_body("ACC-9002", "10")).await;

    let (status, body) = app
        .post(
            "/api/sms/send",
            serde_json::json!({
                "customer_id": created["id"],
                "message": "Maintenance on Friday",
                "include_arrears": false,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message_id"], "msg-1");
    assert_eq!(app.sms.messages()[0].1, "Maintenance on Friday");
}

#[tokio::test]
async fn test_unknown_customer_is_404() {
    let app = test_app();
    let uri = format!("/api/sms/send/connection/{}", uuid::Uuid::new_v4());
    let (status, _) = app.post(&uri, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.sms.messages().is_empty());
}

#[tokio::test]
async fn test_unknown_notice_kind_is_400() {
    let app = test_app();
    let uri = format!("/api/sms/send/reminder/{}", uuid::Uuid::new_v4());
    let (status, _) = app.post(&uri, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_template_is_500() {
    let app = test_app_with(test_config(), InMemoryStore::without_templates());
    let (_, created) = app.post("/api/customers", customer_body("ACC-9003", "10")).await;
    let uri = format!("/api/sms/send/disconnection/{}", created["id"].as_str().unwrap());

    let (status, body) = app.post(&uri, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Disconnection SMS template not found in database.");
}

#[tokio::test]
async fn test_bulk_and_status() {
    let app = test_app();
    let (status, body) = app
        .post(
            "/api/sms/send-bulk",
            serde_json::json!({ "recipients": ["0241111111", "0242222222"], "message": "Outage" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recipients_count"], 2);

    let (status, _) = app
        .post("/api/sms/send-bulk", serde_json::json!({ "recipients": [], "message": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/api/sms/status/msg-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "DELIVRD");
}
