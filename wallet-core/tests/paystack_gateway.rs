//! PaystackGateway against a local HTTP server

use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;
use wallet_core::config::{GatewayConfig, GatewayProvider};
use wallet_core::gateway::{signature, ChargeStatus, GatewayError};
use wallet_core::{PaymentGateway, PaystackGateway};

const SECRET: &str = "sk_test_paystack";
const BEARER: &str = "Bearer sk_test_paystack";

fn gateway_for(base_url: String, timeout_secs: u64) -> PaystackGateway {
    PaystackGateway::new(&GatewayConfig {
        provider: GatewayProvider::Paystack,
        api_url: base_url,
        secret_key: SECRET.to_string(),
        timeout_secs,
    })
    .unwrap()
}

#[tokio::test]
async fn test_initialize_charge() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/transaction/initialize")
                .header("authorization", BEARER)
                .json_body(json!({
                    "email": "payer@example.com",
                    "amount": 500000,
                    "reference": "TXN_1700000000_0000beef"
                }));
            then.status(200).json_body(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc123",
                    "access_code": "abc123",
                    "reference": "TXN_1700000000_0000beef"
                }
            }));
        })
        .await;

    let gateway = gateway_for(server.base_url(), 5);
    let init = gateway
        .initialize_charge("payer@example.com", 500_000, "TXN_1700000000_0000beef")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(init.authorization_url, "https://checkout.paystack.com/abc123");
    assert_eq!(init.gateway_reference, "TXN_1700000000_0000beef");
    assert_eq!(init.access_code.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_initialize_rejected_by_provider() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/transaction/initialize");
            then.status(400).json_body(json!({
                "status": false,
                "message": "Invalid Email Address Passed"
            }));
        })
        .await;

    let gateway = gateway_for(server.base_url(), 5);
    let err = gateway
        .initialize_charge("nope", 100, "TXN_1_00000001")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GatewayError::InitFailed("Invalid Email Address Passed".to_string())
    );
}

#[tokio::test]
async fn test_status_false_with_ok_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/transaction/initialize");
            then.status(200)
                .json_body(json!({ "status": false, "message": "Duplicate Transaction Reference" }));
        })
        .await;

    let gateway = gateway_for(server.base_url(), 5);
    let err = gateway
        .initialize_charge("payer@example.com", 100, "TXN_1_00000001")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InitFailed(_)));
}

#[tokio::test]
async fn test_verify_charge() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/transaction/verify/TXN_1700000000_0000cafe")
                .header("authorization", BEARER);
            then.status(200).json_body(json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "reference": "TXN_1700000000_0000cafe",
                    "status": "success",
                    "amount": 250075,
                    "gateway_response": "Successful",
                    "paid_at": "2024-03-01T10:15:30.000Z",
                    "currency": "NGN"
                }
            }));
        })
        .await;

    let gateway = gateway_for(server.base_url(), 5);
    let charge = gateway.verify_charge("TXN_1700000000_0000cafe").await.unwrap();

    assert_eq!(charge.status, ChargeStatus::Success);
    assert_eq!(charge.amount_minor, 250_075);
    assert_eq!(charge.gateway_message.as_deref(), Some("Successful"));
    assert_eq!(
        charge.paid_at.map(|t| t.to_rfc3339()),
        Some("2024-03-01T10:15:30+00:00".to_string())
    );
}

#[tokio::test]
async fn test_verify_unknown_reference() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/transaction/verify/TXN_0_00000000");
            then.status(404).json_body(json!({
                "status": false,
                "message": "Transaction reference not found"
            }));
        })
        .await;

    let gateway = gateway_for(server.base_url(), 5);
    let err = gateway.verify_charge("TXN_0_00000000").await.unwrap_err();
    assert!(matches!(err, GatewayError::VerificationFailed(ref m) if m == "Transaction reference not found"));
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/transaction/initialize");
            then.status(502).body("Bad Gateway");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/transaction/verify/TXN_1_00000001");
            then.status(503)
                .json_body(json!({ "status": false, "message": "Service Unavailable" }));
        })
        .await;

    let gateway = gateway_for(server.base_url(), 5);
    let err = gateway
        .initialize_charge("payer@example.com", 100, "TXN_1_00000001")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Unavailable(_)));

    let err = gateway.verify_charge("TXN_1_00000001").await.unwrap_err();
    assert!(matches!(err, GatewayError::Unavailable(_)));
    assert!(wallet_core::WalletError::from(err).is_retryable());
}

#[tokio::test]
async fn test_timeout_is_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/transaction/initialize");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({ "status": true, "message": "late", "data": null }));
        })
        .await;

    let gateway = gateway_for(server.base_url(), 1);
    let err = gateway
        .initialize_charge("payer@example.com", 100, "TXN_1_00000001")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Unavailable(_)));
}

#[tokio::test]
async fn test_unreachable_host_is_unavailable() {
    let gateway = gateway_for("http://127.0.0.1:1".to_string(), 2);
    let err = gateway.verify_charge("TXN_1_00000001").await.unwrap_err();
    assert!(matches!(err, GatewayError::Unavailable(_)));
}

#[test]
fn test_webhook_signature_uses_secret_key() {
    let gateway = gateway_for("http://127.0.0.1:1".to_string(), 2);
    let body = br#"{"event":"charge.success","data":{"reference":"TXN_1_00000001","status":"success"}}"#;

    let good = signature::sign(SECRET.as_bytes(), body);
    assert!(gateway.verify_webhook_signature(&good, body));

    let bad = signature::sign(b"sk_live_other", body);
    assert!(!gateway.verify_webhook_signature(&bad, body));
}
