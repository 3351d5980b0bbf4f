//! # Test-token faucet
//!
//! Sends 1 USDC from the treasury EOA to an authenticated user's account.
//! The treasury signs a plain EIP-1559 transfer; no account abstraction is
//! involved on the sending side.
//!
//! The rate limiter runs before authentication so quota cannot be burned
//! probing the identity service.

use alloy_consensus::{SignableTransaction, TxEip1559};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use calibur_core::calls;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::auth::authorize_address;
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::rpc::RpcError;

/// 1 USDC in 6-decimal atoms.
const AIRDROP_ATOMS: u64 = 1_000_000;

/// Gas limit used when estimation fails; generous for an ERC-20 transfer.
const FALLBACK_GAS_LIMIT: u64 = 100_000;

#[derive(Debug, Deserialize)]
pub struct AirdropRequest {
    address: Address,
}

fn to_u128(value: U256, what: &'static str) -> Result<u128, ApiError> {
    u128::try_from(value).map_err(|_| ApiError::Rpc(RpcError::QuantityRange(what)))
}

/// `POST /api/airdrop`
pub async fn request_airdrop(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AirdropRequest>,
) -> Result<Json<Value>, ApiError> {
    if state.airdrop_limiter.check().is_err() {
        return Err(ApiError::RateLimited);
    }
    authorize_address(&state, &headers, request.address).await?;

    let key = state
        .config
        .treasury_key
        .as_deref()
        .ok_or_else(|| ApiError::Misconfigured("Treasury signer is not configured".into()))?;
    let signer: PrivateKeySigner = key
        .parse()
        .map_err(|_| ApiError::Misconfigured("Treasury private key is invalid".into()))?;
    let treasury = signer.address();

    let transfer = calls::erc20_transfer(
        state.config.usdc_address,
        request.address,
        U256::from(AIRDROP_ATOMS),
    );
    let nonce = state.rpc.transaction_count(treasury).await?;
    let (max_fee, priority_fee) = state.rpc.suggested_fees().await?;
    let gas_limit = match state
        .rpc
        .estimate_gas(treasury, state.config.usdc_address, &transfer.data)
        .await
    {
        Ok(gas) => gas,
        Err(err) => {
            tracing::debug!(error = %err, "gas estimation failed, using fallback");
            FALLBACK_GAS_LIMIT
        }
    };

    let tx = TxEip1559 {
        chain_id: state.config.chain_id,
        nonce,
        gas_limit,
        max_fee_per_gas: to_u128(max_fee, "max_fee_per_gas")?,
        max_priority_fee_per_gas: to_u128(priority_fee, "max_priority_fee_per_gas")?,
        to: TxKind::Call(state.config.usdc_address),
        value: U256::ZERO,
        access_list: Default::default(),
        input: transfer.data,
    };
    let signature = signer
        .sign_hash(&tx.signature_hash())
        .await
        .map_err(|err| ApiError::Misconfigured(format!("Treasury signing failed: {err}")))?;
    let raw = Bytes::from(tx.into_signed(signature).encoded_2718());

    let tx_hash = state.rpc.send_raw_transaction(&raw).await?;
    tracing::info!(recipient = %request.address, tx_hash = %tx_hash, "airdrop sent");

    Ok(Json(json!({
        "success": true,
        "transactionHash": tx_hash,
        "amount": "1",
        "token": state.config.usdc_address,
    })))
}
