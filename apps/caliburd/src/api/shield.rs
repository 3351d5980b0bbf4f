//! # Shield recovery sessions
//!
//! Hands the frontend a one-time recovery session so the embedded signer can
//! reconstruct its key share without the encryption share ever reaching the
//! browser as configuration.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::AppState;

/// `POST /api/shield-session`
pub async fn create_session(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let shield = state
        .config
        .shield
        .as_ref()
        .ok_or_else(|| ApiError::Misconfigured("Shield configuration is missing".into()))?;
    let session = state.wallet.create_recovery_session(shield).await?;
    Ok(Json(json!({ "session": session })))
}
