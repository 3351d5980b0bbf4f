//! # API error mapping
//!
//! Single error type for every handler. Client-caused failures map to 4xx
//! with a short message; everything upstream (RPC, wallet service, bundler,
//! store) collapses into a logged 500 so internals never leak to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use calibur_core::payment::PaymentRequiredResponse;
use serde_json::json;
use thiserror::Error;

use crate::account::AccountError;
use crate::bundler::BundlerError;
use crate::rpc::RpcError;
use crate::wallet::WalletError;

/// Errors a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid bearer token.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but acting on someone else's account.
    #[error("{0}")]
    Forbidden(String),

    /// The request itself is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The x402 challenge: payment terms the client must satisfy.
    #[error("payment required")]
    PaymentRequired(Box<PaymentRequiredResponse>),

    /// A payment header was supplied but could not be decoded.
    #[error("invalid payment header")]
    InvalidPayment,

    /// Faucet quota exhausted.
    #[error("rate limit exceeded")]
    RateLimited,

    /// A required secret or credential is absent from the deployment.
    #[error("{0}")]
    Misconfigured(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Bundler(#[from] BundlerError),
    #[error(transparent)]
    Store(#[from] calibur_core::store::StoreError),
    #[error(transparent)]
    Codec(#[from] calibur_core::CodecError),
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Rpc(err) => Self::Rpc(err),
            AccountError::Wallet(err) => Self::Wallet(err),
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(msg) => error_body(StatusCode::UNAUTHORIZED, &msg),
            Self::Forbidden(msg) => error_body(StatusCode::FORBIDDEN, &msg),
            Self::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, &msg),
            Self::PaymentRequired(challenge) => {
                (StatusCode::PAYMENT_REQUIRED, Json(*challenge)).into_response()
            }
            Self::InvalidPayment => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "Invalid payment header",
                    "x402Version": calibur_core::payment::X402_VERSION,
                })),
            )
                .into_response(),
            Self::RateLimited => error_body(
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Try again later.",
            ),
            Self::Misconfigured(msg) => {
                tracing::error!(error = %msg, "handler hit missing configuration");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, &msg)
            }
            Self::Rpc(_) | Self::Wallet(_) | Self::Bundler(_) | Self::Store(_) | Self::Codec(_) => {
                tracing::error!(error = %self, "request failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
