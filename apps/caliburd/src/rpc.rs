//! # JSON-RPC client
//!
//! Thin JSON-RPC 2.0 client over `reqwest`, plus the typed chain reads the
//! handlers need (ERC-4337 nonces, registered session keys, fee data). The
//! same client backs both the public node and the bundler endpoint; the
//! bundler variant just carries a bearer token.

use alloy_primitives::{Address, Bytes, B256, U256};
use calibur_core::calls;
use calibur_core::{CodecError, Key, KeySettings};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Priority fee used when the node refuses `eth_maxPriorityFeePerGas`.
const FALLBACK_PRIORITY_FEE_WEI: u64 = 1_500_000_000;

/// Errors from RPC transport or decoding.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Network or HTTP failure.
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Node { code: i64, message: String },

    /// Response had neither a result nor an error.
    #[error("rpc response for {0} carried no result")]
    MissingResult(String),

    /// A returned quantity did not fit the expected width.
    #[error("rpc quantity out of range for {0}")]
    QuantityRange(&'static str),

    /// ABI decoding of an `eth_call` result failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

/// JSON-RPC client bound to one endpoint.
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    bearer: Option<String>,
    chain_id: OnceCell<u64>,
}

impl RpcClient {
    /// Client for a plain node endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            bearer: None,
            chain_id: OnceCell::new(),
        }
    }

    /// Client that authenticates with a bearer token, as sponsored bundler
    /// endpoints expect.
    #[must_use]
    pub fn with_bearer(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            ..Self::new(url)
        }
    }

    /// Issue a raw JSON-RPC request and deserialize the result.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let mut req = self.http.post(&self.url).json(&body);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }
        let response: RpcResponse<T> = req.send().await?.json().await?;
        if let Some(err) = response.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))
    }

    /// `eth_call` against `to` with the given calldata.
    pub async fn call(&self, to: Address, data: &Bytes) -> Result<Bytes, RpcError> {
        self.request(
            "eth_call",
            json!([{ "to": to, "data": data }, "latest"]),
        )
        .await
    }

    /// Chain id, fetched once and cached for the client's lifetime.
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        self.chain_id
            .get_or_try_init(|| async {
                let id: U256 = self.request("eth_chainId", json!([])).await?;
                u64::try_from(id).map_err(|_| RpcError::QuantityRange("eth_chainId"))
            })
            .await
            .copied()
    }

    /// Current gas price.
    pub async fn gas_price(&self) -> Result<U256, RpcError> {
        self.request("eth_gasPrice", json!([])).await
    }

    /// Suggested priority fee, with a fixed fallback for nodes that do not
    /// serve `eth_maxPriorityFeePerGas`.
    pub async fn max_priority_fee(&self) -> U256 {
        match self.request("eth_maxPriorityFeePerGas", json!([])).await {
            Ok(fee) => fee,
            Err(err) => {
                tracing::debug!(error = %err, "priority fee unavailable, using fallback");
                U256::from(FALLBACK_PRIORITY_FEE_WEI)
            }
        }
    }

    /// `(max_fee_per_gas, max_priority_fee_per_gas)` for an EIP-1559
    /// submission. Max fee is double the current gas price so the op
    /// survives moderate base-fee movement while pending.
    pub async fn suggested_fees(&self) -> Result<(U256, U256), RpcError> {
        let gas_price = self.gas_price().await?;
        let priority = self.max_priority_fee().await;
        Ok((gas_price.saturating_mul(U256::from(2u8)), priority))
    }

    /// Pending transaction count (EOA nonce) for `address`.
    pub async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        let count: U256 = self
            .request("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        u64::try_from(count).map_err(|_| RpcError::QuantityRange("eth_getTransactionCount"))
    }

    /// Gas estimate for a plain transaction.
    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
    ) -> Result<u64, RpcError> {
        let gas: U256 = self
            .request(
                "eth_estimateGas",
                json!([{ "from": from, "to": to, "data": data }]),
            )
            .await?;
        u64::try_from(gas).map_err(|_| RpcError::QuantityRange("eth_estimateGas"))
    }

    /// Broadcast a signed transaction, returning its hash.
    pub async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, RpcError> {
        self.request("eth_sendRawTransaction", json!([raw])).await
    }

    // =========================================================================
    // ACCOUNT READS
    // =========================================================================

    /// ERC-4337 nonce for `sender` on the entry point (key 0).
    pub async fn entry_point_nonce(&self, sender: Address) -> Result<U256, RpcError> {
        let data = calls::entry_point_nonce_call(sender, 0);
        let raw = self.call(calibur_core::ENTRY_POINT_08, &data).await?;
        Ok(calls::decode_nonce(&raw)?)
    }

    /// All keys registered on `account`, paired with their hashes.
    pub async fn registered_keys(&self, account: Address) -> Result<Vec<(Key, B256)>, RpcError> {
        let raw = self.call(account, &calls::key_count_call()).await?;
        let count = calls::decode_key_count(&raw)?;
        let mut keys = Vec::with_capacity(count as usize);
        for index in 0..count {
            let raw = self.call(account, &calls::key_at_call(index)).await?;
            let key = calls::decode_key_at(&raw)?;
            let hash = calibur_core::keys::hash_key(&key);
            keys.push((key, hash));
        }
        Ok(keys)
    }

    /// Settings of one registered key.
    pub async fn key_settings(
        &self,
        account: Address,
        key_hash: B256,
    ) -> Result<KeySettings, RpcError> {
        let raw = self
            .call(account, &calls::get_key_settings_call(key_hash))
            .await?;
        Ok(calls::decode_key_settings(&raw)?)
    }

    /// Whether `key_hash` is registered on `account`.
    pub async fn is_registered(&self, account: Address, key_hash: B256) -> Result<bool, RpcError> {
        let raw = self
            .call(account, &calls::is_registered_call(key_hash))
            .await?;
        Ok(calls::decode_is_registered(&raw)?)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Port 9 (discard) refuses connections on loopback.
        let client = RpcClient::new("http://127.0.0.1:9");
        let err = client.chain_id().await.expect_err("must fail");
        assert!(matches!(err, RpcError::Transport(_)));
    }

    #[tokio::test]
    async fn priority_fee_falls_back_on_error() {
        let client = RpcClient::new("http://127.0.0.1:9");
        let fee = client.max_priority_fee().await;
        assert_eq!(fee, U256::from(FALLBACK_PRIORITY_FEE_WEI));
    }
}
