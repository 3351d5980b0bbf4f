//! Integration tests for the HTTP API.
//!
//! The wallet service is mocked with a second in-process server bound to a
//! real port; the chain RPC points at a refused loopback port so handlers
//! exercise their no-chain fallbacks. Nothing here talks to the network.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use alloy_primitives::{address, Address};
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_test::TestServer;
use caliburd::api::{router, AppState};
use caliburd::config::{Config, PaywallConfig};
use calibur_core::payment::encode_payment_header;
use calibur_core::store::DcaConfig;
use serde_json::{json, Value};
use tempfile::TempDir;

const USER: Address = address!("0x1111111111111111111111111111111111111111");
const AGENT: Address = address!("0x2222222222222222222222222222222222222222");

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// A stand-in wallet service: accepts any session token as USER and hands
/// out a fixed agent wallet.
fn mock_wallet_service() -> Router {
    Router::new()
        .route(
            "/v1/sessions/verify",
            post(|| async { Json(json!({ "userId": "user_1", "accounts": [USER] })) }),
        )
        .route(
            "/v1/wallets",
            post(|| async { Json(json!({ "id": "wallet_agent_1", "address": AGENT })) }),
        )
        .route(
            "/v1/wallets/{id}",
            get(|| async { Json(json!({ "id": "wallet_agent_1", "address": AGENT })) }),
        )
}

/// Spawn the mock wallet service on a real port and return it with its URL.
fn spawn_wallet_service() -> (TestServer, String) {
    let server = TestServer::builder()
        .http_transport()
        .build(mock_wallet_service())
        .expect("mock wallet service starts");
    let url = server
        .server_address()
        .expect("http transport has an address")
        .to_string();
    (server, url)
}

fn test_config(dir: &TempDir, wallet_url: &str) -> Config {
    Config {
        port: 0,
        store_path: dir.path().join("test.redb"),
        chain_id: 84532,
        // Port 9 (discard) refuses connections on loopback.
        rpc_url: "http://127.0.0.1:9".to_string(),
        bundler_url: "http://127.0.0.1:9".to_string(),
        publishable_key: None,
        policy_id: None,
        wallet_service_url: wallet_url.to_string(),
        wallet_secret_key: Some("sk_test".to_string()),
        shield: None,
        cron_secret: None,
        treasury_key: None,
        usdc_address: address!("0x036cbd53842c5426634e7929541ec2318f3dcf7e"),
        mock_token_address: address!("0xbabe0001489722187fbaf0689c47b2f5e97545c5"),
        treasury_sink: address!("0x000000000000000000000000000000000000dead"),
        dca_frequency_secs: 60,
        allowed_origins: Vec::new(),
        airdrop_per_minute: 10,
        paywall: PaywallConfig {
            pay_to: "0x000000000000000000000000000000000000dead".to_string(),
            network: "base-sepolia".to_string(),
            resource: "https://example.com/api/content".to_string(),
            description: "Premium content".to_string(),
            mime_type: "application/json".to_string(),
            max_amount_required: "10000".to_string(),
            max_timeout_seconds: Some(300),
            asset: "0x036cbd53842c5426634e7929541ec2318f3dcf7e".to_string(),
            asset_name: "USDC".to_string(),
            asset_version: "2".to_string(),
        },
    }
}

fn api_server(config: Config) -> TestServer {
    let state = AppState::new(config).expect("state builds");
    TestServer::new(router(state)).expect("test server starts")
}

fn auth_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_static("Bearer session-token"),
    )
}

// =============================================================================
// HEALTH
// =============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server.get("/api/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chainId"], 84532);
}

// =============================================================================
// PAYWALL
// =============================================================================

#[tokio::test]
async fn content_answers_402_without_payment() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server.get("/api/content").await;
    assert_eq!(response.status_code(), 402);
    let body: Value = response.json();
    assert_eq!(body["x402Version"], 1);
    assert_eq!(body["paymentRequirements"]["scheme"], "exact");
    assert_eq!(
        body["paymentRequirements"]["payTo"],
        "0x000000000000000000000000000000000000dead"
    );
    assert_eq!(body["paymentRequirements"]["extra"]["name"], "USDC");
}

#[tokio::test]
async fn content_unlocks_with_transaction_hash() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server
        .get("/api/content")
        .add_header(
            HeaderName::from_static("x-transaction-hash"),
            HeaderValue::from_static("0xabc123"),
        )
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["transactionHash"], "0xabc123");
    assert!(body["content"]["title"].is_string());
}

#[tokio::test]
async fn content_unlocks_with_payment_header() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let header = encode_payment_header(&json!({
        "x402Version": 1,
        "scheme": "exact",
        "network": "base-sepolia",
        "payload": { "signature": "0x00" },
    }))
    .unwrap();
    let response = server
        .get("/api/content")
        .add_header(
            HeaderName::from_static("x-payment"),
            HeaderValue::from_str(&header).unwrap(),
        )
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn content_rejects_malformed_payment_header() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server
        .get("/api/content")
        .add_header(
            HeaderName::from_static("x-payment"),
            HeaderValue::from_static("!!not-base64!!"),
        )
        .await;
    assert_eq!(response.status_code(), 402);
    let body: Value = response.json();
    assert_eq!(body["error"], "Invalid payment header");
    assert_eq!(body["x402Version"], 1);
}

// =============================================================================
// AIRDROP
// =============================================================================

#[tokio::test]
async fn airdrop_requires_a_session_token() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server
        .post("/api/airdrop")
        .json(&json!({ "address": USER }))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn airdrop_rate_limit_answers_429() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir, "http://127.0.0.1:9");
    config.airdrop_per_minute = 1;
    let server = api_server(config);

    // First request burns the quota (and fails auth); second hits the limit.
    let first = server
        .post("/api/airdrop")
        .json(&json!({ "address": USER }))
        .await;
    assert_eq!(first.status_code(), 401);

    let second = server
        .post("/api/airdrop")
        .json(&json!({ "address": USER }))
        .await;
    assert_eq!(second.status_code(), 429);
}

// =============================================================================
// DCA
// =============================================================================

#[tokio::test]
async fn dca_status_requires_an_address() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server.get("/api/dca").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn dca_status_requires_a_session_token() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server
        .get("/api/dca")
        .add_query_param("address", USER.to_string())
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn dca_status_falls_back_when_chain_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let (_wallet, wallet_url) = spawn_wallet_service();
    let server = api_server(test_config(&dir, &wallet_url));

    let (name, value) = auth_header();
    let response = server
        .get("/api/dca")
        .add_query_param("address", USER.to_string())
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["enabled"], false);
    assert_eq!(body["purchases"], json!([]));
}

#[tokio::test]
async fn dca_enable_provisions_an_agent() {
    let dir = tempfile::tempdir().unwrap();
    let (_wallet, wallet_url) = spawn_wallet_service();
    let server = api_server(test_config(&dir, &wallet_url));

    let (name, value) = auth_header();
    let response = server
        .post("/api/dca")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "address": USER,
            "enabled": true,
            "amount": "2.5",
            "frequencySecs": 120,
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["amount"], "2.5");
    assert_eq!(body["frequencySecs"], 120);
    assert_eq!(
        body["agentAddress"].as_str().unwrap().to_lowercase(),
        AGENT.to_string().to_lowercase()
    );

    // The schedule survives into status, even with the chain unreachable.
    let status = server
        .get("/api/dca")
        .add_query_param("address", USER.to_string())
        .add_header(name, value)
        .await;
    status.assert_status_ok();
    let status: Value = status.json();
    assert_eq!(status["amount"], "2.5");
    assert_eq!(status["frequencySecs"], 120);
}

#[tokio::test]
async fn dca_reenable_reuses_the_agent_wallet() {
    let dir = tempfile::tempdir().unwrap();
    let (_wallet, wallet_url) = spawn_wallet_service();
    let server = api_server(test_config(&dir, &wallet_url));

    let (name, value) = auth_header();
    let first = server
        .post("/api/dca")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "address": USER, "enabled": true }))
        .await;
    first.assert_status_ok();
    let first: Value = first.json();

    let second = server
        .post("/api/dca")
        .add_header(name, value)
        .json(&json!({ "address": USER, "enabled": true, "amount": "3" }))
        .await;
    second.assert_status_ok();
    let second: Value = second.json();

    assert_eq!(first["agentAddress"], second["agentAddress"]);
    assert_eq!(second["amount"], "3");
}

#[tokio::test]
async fn dca_enable_rejects_out_of_range_schedules() {
    let dir = tempfile::tempdir().unwrap();
    let (_wallet, wallet_url) = spawn_wallet_service();
    let server = api_server(test_config(&dir, &wallet_url));

    let (name, value) = auth_header();
    let huge_frequency = server
        .post("/api/dca")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "address": USER,
            "enabled": true,
            "frequencySecs": u64::MAX,
        }))
        .await;
    assert_eq!(huge_frequency.status_code(), 400);

    let zero_frequency = server
        .post("/api/dca")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "address": USER, "enabled": true, "frequencySecs": 0 }))
        .await;
    assert_eq!(zero_frequency.status_code(), 400);

    let huge_amount = server
        .post("/api/dca")
        .add_header(name, value)
        .json(&json!({
            "address": USER,
            "enabled": true,
            "amount": "99999999999999",
        }))
        .await;
    assert_eq!(huge_amount.status_code(), 400);
}

#[tokio::test]
async fn dca_enable_rejects_bad_amounts() {
    let dir = tempfile::tempdir().unwrap();
    let (_wallet, wallet_url) = spawn_wallet_service();
    let server = api_server(test_config(&dir, &wallet_url));

    let (name, value) = auth_header();
    let response = server
        .post("/api/dca")
        .add_header(name, value)
        .json(&json!({
            "address": USER,
            "enabled": true,
            "amount": "1.2.3",
        }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn dca_rejects_an_address_outside_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let (_wallet, wallet_url) = spawn_wallet_service();
    let server = api_server(test_config(&dir, &wallet_url));

    let other = address!("0x9999999999999999999999999999999999999999");
    let (name, value) = auth_header();
    let response = server
        .post("/api/dca")
        .add_header(name, value)
        .json(&json!({ "address": other, "enabled": true }))
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn dca_disable_keeps_history_but_marks_inactive() {
    let dir = tempfile::tempdir().unwrap();
    let (_wallet, wallet_url) = spawn_wallet_service();
    let server = api_server(test_config(&dir, &wallet_url));

    let (name, value) = auth_header();
    server
        .post("/api/dca")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "address": USER, "enabled": true }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/dca")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "address": USER, "enabled": false }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["enabled"], false);

    // Manual execution now refuses.
    let execute = server
        .post("/api/dca/execute")
        .add_header(name, value)
        .json(&json!({ "address": USER }))
        .await;
    assert_eq!(execute.status_code(), 400);
}

// =============================================================================
// CRON EXECUTION
// =============================================================================

#[tokio::test]
async fn cron_batch_requires_the_shared_secret() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir, "http://127.0.0.1:9");
    config.cron_secret = Some("topsecret".to_string());
    let server = api_server(config);

    let missing = server.get("/api/dca/execute").await;
    assert_eq!(missing.status_code(), 401);

    let wrong = server
        .get("/api/dca/execute")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer wrong"),
        )
        .await;
    assert_eq!(wrong.status_code(), 401);

    let right = server
        .get("/api/dca/execute")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer topsecret"),
        )
        .await;
    right.assert_status_ok();
    let body: Value = right.json();
    assert_eq!(body["executed"], 0);
}

#[tokio::test]
async fn cron_batch_skips_a_stored_out_of_range_frequency() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(test_config(&dir, "http://127.0.0.1:9")).expect("state builds");
    // A roster entry predating the configure-time bounds.
    state
        .store
        .set(
            USER,
            &DcaConfig {
                enabled: true,
                amount: "1".to_string(),
                frequency_secs: u64::MAX,
                purchases: Vec::new(),
                last_purchase_ms: 1,
                agent_address: Some(AGENT),
                agent_id: Some("wallet_agent_1".to_string()),
            },
        )
        .expect("writable");
    let server = TestServer::new(router(state)).expect("test server starts");

    let response = server.get("/api/dca/execute").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["executed"], 0);
    assert_eq!(body["results"][0]["skipped"], "not due");
}

#[tokio::test]
async fn cron_batch_is_open_when_no_secret_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server.get("/api/dca/execute").await;
    response.assert_status_ok();
}

// =============================================================================
// SHIELD
// =============================================================================

#[tokio::test]
async fn shield_session_without_credentials_is_a_500() {
    let dir = tempfile::tempdir().unwrap();
    let server = api_server(test_config(&dir, "http://127.0.0.1:9"));

    let response = server.post("/api/shield-session").await;
    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["error"], "Shield configuration is missing");
}
