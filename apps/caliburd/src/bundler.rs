//! # Bundler pipeline
//!
//! Drives a batch of calls through the ERC-4337 sponsorship pipeline:
//! stub-signed estimation, paymaster quotes (ERC-7677), signing, submission
//! and receipt polling. Gas prices come from the caller so the node and
//! bundler endpoints stay independent.

use alloy_primitives::{Address, Bytes, B256, U256};
use calibur_core::userop::UserOperation;
use calibur_core::{Call, ENTRY_POINT_08};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::account::{AccountError, SmartAccount};
use crate::rpc::{RpcClient, RpcError};

/// How often receipt polling retries.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Errors from the user-operation pipeline.
#[derive(Debug, Error)]
pub enum BundlerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Account(#[from] AccountError),

    /// No receipt appeared before the deadline.
    #[error("no receipt for user operation {0} within the deadline")]
    ReceiptTimeout(B256),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasEstimate {
    pre_verification_gas: U256,
    verification_gas_limit: U256,
    call_gas_limit: U256,
    #[serde(default)]
    paymaster_verification_gas_limit: Option<U256>,
    #[serde(default)]
    paymaster_post_op_gas_limit: Option<U256>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymasterQuote {
    paymaster: Address,
    paymaster_data: Bytes,
    #[serde(default)]
    paymaster_verification_gas_limit: Option<U256>,
    #[serde(default)]
    paymaster_post_op_gas_limit: Option<U256>,
}

/// On-chain receipt details of an included user operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionReceipt {
    pub transaction_hash: B256,
}

/// Receipt of a user operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: B256,
    pub success: bool,
    pub receipt: InclusionReceipt,
}

/// Client for a sponsored bundler endpoint.
#[derive(Debug)]
pub struct BundlerClient {
    rpc: RpcClient,
    chain_id: u64,
    policy_id: Option<String>,
}

impl BundlerClient {
    #[must_use]
    pub fn new(url: impl Into<String>, bearer: Option<String>, chain_id: u64) -> Self {
        let url = url.into();
        let rpc = match bearer {
            Some(token) => RpcClient::with_bearer(url, token),
            None => RpcClient::new(url),
        };
        Self {
            rpc,
            chain_id,
            policy_id: None,
        }
    }

    /// Attach a sponsorship policy forwarded as paymaster context.
    #[must_use]
    pub fn with_policy(mut self, policy_id: Option<String>) -> Self {
        self.policy_id = policy_id;
        self
    }

    fn paymaster_context(&self) -> serde_json::Value {
        match &self.policy_id {
            Some(policy) => json!({ "policyId": policy }),
            None => json!({}),
        }
    }

    fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    fn apply_quote(op: &mut UserOperation, quote: PaymasterQuote) {
        op.paymaster = Some(quote.paymaster);
        op.paymaster_data = Some(quote.paymaster_data);
        if quote.paymaster_verification_gas_limit.is_some() {
            op.paymaster_verification_gas_limit = quote.paymaster_verification_gas_limit;
        }
        if quote.paymaster_post_op_gas_limit.is_some() {
            op.paymaster_post_op_gas_limit = quote.paymaster_post_op_gas_limit;
        }
    }

    /// Build, sponsor, sign and submit a batch of calls as one user
    /// operation. Returns the user-operation hash.
    pub async fn send_user_operation<A: SmartAccount>(
        &self,
        account: &A,
        batch: &[Call],
        fees: (U256, U256),
    ) -> Result<B256, BundlerError> {
        let (max_fee, priority_fee) = fees;
        let mut op = UserOperation {
            sender: account.address(),
            nonce: account.nonce().await?,
            call_data: account.encode_calls(batch),
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority_fee,
            signature: account.stub_signature(),
            ..UserOperation::default()
        };

        // Stub sponsorship so estimation sees realistic paymaster fields.
        let stub: PaymasterQuote = self
            .rpc
            .request(
                "pm_getPaymasterStubData",
                json!([op, ENTRY_POINT_08, self.chain_id_hex(), self.paymaster_context()]),
            )
            .await?;
        Self::apply_quote(&mut op, stub);

        let estimate: GasEstimate = self
            .rpc
            .request("eth_estimateUserOperationGas", json!([op, ENTRY_POINT_08]))
            .await?;
        op.pre_verification_gas = estimate.pre_verification_gas;
        op.verification_gas_limit = estimate.verification_gas_limit;
        op.call_gas_limit = estimate.call_gas_limit;
        if estimate.paymaster_verification_gas_limit.is_some() {
            op.paymaster_verification_gas_limit = estimate.paymaster_verification_gas_limit;
        }
        if estimate.paymaster_post_op_gas_limit.is_some() {
            op.paymaster_post_op_gas_limit = estimate.paymaster_post_op_gas_limit;
        }

        // Final sponsorship over the estimated operation.
        let quote: PaymasterQuote = self
            .rpc
            .request(
                "pm_getPaymasterData",
                json!([op, ENTRY_POINT_08, self.chain_id_hex(), self.paymaster_context()]),
            )
            .await?;
        Self::apply_quote(&mut op, quote);

        op.signature = account.sign_user_operation(&op).await?;

        let hash: B256 = self
            .rpc
            .request("eth_sendUserOperation", json!([op, ENTRY_POINT_08]))
            .await?;
        tracing::info!(user_op_hash = %hash, sender = %op.sender, "user operation submitted");
        Ok(hash)
    }

    /// Poll for the operation's receipt until `timeout` elapses.
    pub async fn wait_for_receipt(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<UserOperationReceipt, BundlerError> {
        let deadline = Instant::now() + timeout;
        loop {
            let receipt: Option<UserOperationReceipt> = self
                .rpc
                .request("eth_getUserOperationReceipt", json!([hash]))
                .await
                .ok()
                .flatten();
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(BundlerError::ReceiptTimeout(hash));
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
