//! # x402 paywall
//!
//! Demo premium-content endpoint. Without proof of payment the handler
//! answers 402 with machine-readable payment requirements; with an
//! `X-PAYMENT` header (or the demo's `X-TRANSACTION-HASH` shortcut) it
//! serves the content.
//!
//! Payment headers are decoded but not settled onchain here; settlement
//! verification belongs to a facilitator in a real deployment.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use calibur_core::payment::{decode_payment_header, PaymentRequiredResponse, PaymentRequirements};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::config::PaywallConfig;

fn requirements(config: &PaywallConfig) -> PaymentRequirements {
    PaymentRequirements {
        scheme: "exact".to_string(),
        network: config.network.clone(),
        resource: config.resource.clone(),
        description: config.description.clone(),
        mime_type: config.mime_type.clone(),
        max_amount_required: config.max_amount_required.clone(),
        max_timeout_seconds: config.max_timeout_seconds,
        asset: config.asset.clone(),
        pay_to: config.pay_to.clone(),
        extra: calibur_core::payment::AssetExtra {
            name: config.asset_name.clone(),
            version: config.asset_version.clone(),
        },
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn premium_content(note: &str) -> Value {
    json!({
        "title": "Premium market report",
        "note": note,
        "timestamp": now_secs(),
    })
}

/// `GET|POST /api/content`
pub async fn content(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    // The demo shortcut: a settled transaction hash from a prior payment.
    if let Some(tx_hash) = headers
        .get("x-transaction-hash")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        tracing::info!(tx_hash, "content unlocked by transaction hash");
        return Ok(Json(json!({
            "success": true,
            "message": "Payment accepted",
            "transactionHash": tx_hash,
            "content": premium_content("unlocked by settled transaction"),
        })));
    }

    if let Some(header) = headers
        .get("x-payment")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        let payload = decode_payment_header(header).map_err(|err| {
            tracing::warn!(error = %err, "rejecting malformed payment header");
            ApiError::InvalidPayment
        })?;
        let scheme = payload.get("scheme").and_then(Value::as_str);
        tracing::info!(scheme, "content unlocked by x402 payment");
        return Ok(Json(json!({
            "success": true,
            "message": "Payment accepted",
            "content": premium_content("unlocked by x402 payment"),
        })));
    }

    Err(ApiError::PaymentRequired(Box::new(
        PaymentRequiredResponse::new(
            "Payment required to access this content",
            requirements(&state.config.paywall),
        ),
    )))
}
