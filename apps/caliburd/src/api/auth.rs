//! # Request authentication
//!
//! Bearer-token auth backed by the wallet service, ownership checks for
//! address-scoped operations, and the constant-time cron secret gate.

use alloy_primitives::Address;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::wallet::SessionUser;

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// Verify the request's session token against the wallet service.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<SessionUser, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization token".into()))?;
    state.wallet.verify_session(token).await.map_err(|err| {
        tracing::warn!(error = %err, "session verification failed");
        ApiError::Unauthorized("Invalid or expired session".into())
    })
}

/// Authenticate and require that `address` belongs to the session.
pub async fn authorize_address(
    state: &AppState,
    headers: &HeaderMap,
    address: Address,
) -> Result<SessionUser, ApiError> {
    let user = authenticate(state, headers).await?;
    if !user.accounts.contains(&address) {
        return Err(ApiError::Forbidden(
            "Address does not belong to the authenticated user".into(),
        ));
    }
    Ok(user)
}

/// Gate scheduled-execution endpoints behind the shared cron secret.
///
/// When no secret is configured the gate is open; that is the local-dev
/// posture, matching an empty-env deployment.
pub fn check_cron_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = &state.config.cron_secret else {
        return Ok(());
    };
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization token".into()))?;
    // ct_eq already treats differing lengths as unequal without an early out.
    if !bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
        return Err(ApiError::Unauthorized("Invalid cron secret".into()));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
