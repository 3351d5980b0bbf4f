//! # x402 Payment Codec
//!
//! HTTP 402 payment-required flow: the server advertises payment
//! requirements in a 402 response body, the client answers with a signed
//! payment authorization base64-encoded into the `X-PAYMENT` header.
//!
//! This module only encodes and decodes; verification against a facilitator
//! is out of scope for the demo server.

use crate::CodecError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Protocol version advertised in 402 responses.
pub const X402_VERSION: u32 = 1;

/// What the server will accept as payment for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme, `"exact"` for fixed-price resources.
    pub scheme: String,
    /// Network identifier (e.g. `"base-sepolia"`).
    pub network: String,
    /// URL of the gated resource.
    pub resource: String,
    /// Human-readable description.
    pub description: String,
    /// MIME type of the gated content.
    pub mime_type: String,
    /// Price in the asset's smallest unit, as a decimal string.
    pub max_amount_required: String,
    /// How long a signed authorization stays valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// ERC-20 asset contract.
    pub asset: String,
    /// Receiving address.
    pub pay_to: String,
    /// EIP-712 domain hints for the asset.
    pub extra: AssetExtra,
}

/// EIP-712 domain name/version of the payment asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetExtra {
    pub name: String,
    pub version: String,
}

/// Body of a 402 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub error: String,
    pub x402_version: u32,
    pub payment_requirements: PaymentRequirements,
}

impl PaymentRequiredResponse {
    /// Standard 402 body for the given requirements.
    #[must_use]
    pub fn new(error: impl Into<String>, requirements: PaymentRequirements) -> Self {
        Self {
            error: error.into(),
            x402_version: X402_VERSION,
            payment_requirements: requirements,
        }
    }
}

/// Decode an `X-PAYMENT` header: base64-encoded JSON.
///
/// The payload shape is scheme-specific, so this returns untyped JSON;
/// malformed base64 or JSON is a codec error (the caller answers 402).
pub fn decode_payment_header(header: &str) -> Result<serde_json::Value, CodecError> {
    let decoded = STANDARD.decode(header.trim())?;
    Ok(serde_json::from_slice(&decoded)?)
}

/// Encode a payment payload into header form. Used by tests and clients.
pub fn encode_payment_header(payload: &serde_json::Value) -> Result<String, CodecError> {
    Ok(STANDARD.encode(serde_json::to_vec(payload)?))
}

// =============================================================================
// TESTS
// =============================================================================
