//! # Smart-account adapters
//!
//! Bridges a modular smart account to the ERC-4337 pipeline: batched-call
//! encoding, stub signatures for estimation, and real signatures over the
//! entry point's typed-data hash.
//!
//! Two variants exist. [`RootAccount`] signs as the account owner (root key,
//! zero key hash). [`SessionAccount`] signs with a registered session key and
//! wraps the raw signature in the key-hash envelope the account's validation
//! path expects.

use alloy_primitives::{Address, Bytes, B256, U256};
use calibur_core::signature::{stub_signature, wrap_root_signature, wrap_signature};
use calibur_core::userop::UserOperation;
use calibur_core::{calls, Call, Key, ROOT_KEY_HASH};
use std::sync::Arc;

use crate::rpc::{RpcClient, RpcError};
use crate::wallet::{DigestSigner, WalletError};

/// Errors from account signing.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// The account-side surface the bundler pipeline needs.
#[allow(async_fn_in_trait)]
pub trait SmartAccount {
    /// Address of the smart account itself.
    fn address(&self) -> Address;

    /// Calldata for the entry point's `executeUserOp` dispatch.
    fn encode_calls(&self, batch: &[Call]) -> Bytes;

    /// Well-formed placeholder signature for gas estimation.
    fn stub_signature(&self) -> Bytes;

    /// Current entry-point nonce.
    async fn nonce(&self) -> Result<U256, RpcError>;

    /// Sign the operation's typed-data hash.
    async fn sign_user_operation(&self, op: &UserOperation) -> Result<Bytes, AccountError>;
}

/// Shared plumbing for both account variants.
#[derive(Debug)]
struct AccountInner<S> {
    rpc: Arc<RpcClient>,
    signer: S,
    address: Address,
    /// Statically-known chain id; when absent the node is asked once.
    chain: Option<u64>,
}

impl<S> AccountInner<S> {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        match self.chain {
            Some(id) => Ok(id),
            None => self.rpc.chain_id().await,
        }
    }
}

/// Account acting under its root (owner) key.
#[derive(Debug)]
pub struct RootAccount<S> {
    inner: AccountInner<S>,
}

impl<S: DigestSigner> RootAccount<S> {
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>, signer: S, address: Address, chain: Option<u64>) -> Self {
        Self {
            inner: AccountInner {
                rpc,
                signer,
                address,
                chain,
            },
        }
    }
}

impl<S: DigestSigner> SmartAccount for RootAccount<S> {
    fn address(&self) -> Address {
        self.inner.address
    }

    fn encode_calls(&self, batch: &[Call]) -> Bytes {
        calls::encode_execute_user_op(batch)
    }

    fn stub_signature(&self) -> Bytes {
        stub_signature(ROOT_KEY_HASH)
    }

    async fn nonce(&self) -> Result<U256, RpcError> {
        self.inner.rpc.entry_point_nonce(self.inner.address).await
    }

    async fn sign_user_operation(&self, op: &UserOperation) -> Result<Bytes, AccountError> {
        let chain_id = self.inner.chain_id().await?;
        let digest = op.signing_hash(chain_id);
        let raw = self.inner.signer.sign_digest(digest).await?;
        Ok(wrap_root_signature(raw))
    }
}

/// Account acting under a registered session key.
#[derive(Debug)]
pub struct SessionAccount<S> {
    inner: AccountInner<S>,
    key_hash: B256,
}

impl<S: DigestSigner> SessionAccount<S> {
    #[must_use]
    pub fn new(
        rpc: Arc<RpcClient>,
        signer: S,
        address: Address,
        key_hash: B256,
        chain: Option<u64>,
    ) -> Self {
        Self {
            inner: AccountInner {
                rpc,
                signer,
                address,
                chain,
            },
            key_hash,
        }
    }

    /// Convenience constructor for a secp256k1 agent key.
    #[must_use]
    pub fn for_agent(
        rpc: Arc<RpcClient>,
        signer: S,
        address: Address,
        agent: Address,
        chain: Option<u64>,
    ) -> Self {
        let key_hash = calibur_core::keys::hash_key(&Key::secp256k1(agent));
        Self::new(rpc, signer, address, key_hash, chain)
    }

    /// Hash of the session key this account signs with.
    #[must_use]
    pub fn key_hash(&self) -> B256 {
        self.key_hash
    }
}

impl<S: DigestSigner> SmartAccount for SessionAccount<S> {
    fn address(&self) -> Address {
        self.inner.address
    }

    fn encode_calls(&self, batch: &[Call]) -> Bytes {
        calls::encode_execute_user_op(batch)
    }

    fn stub_signature(&self) -> Bytes {
        stub_signature(self.key_hash)
    }

    async fn nonce(&self) -> Result<U256, RpcError> {
        self.inner.rpc.entry_point_nonce(self.inner.address).await
    }

    async fn sign_user_operation(&self, op: &UserOperation) -> Result<Bytes, AccountError> {
        let chain_id = self.inner.chain_id().await?;
        let digest = op.signing_hash(chain_id);
        let raw = self.inner.signer.sign_digest(digest).await?;
        Ok(wrap_signature(self.key_hash, raw, Bytes::new()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::LocalSigner;
    use alloy_primitives::address;
    use alloy_signer_local::PrivateKeySigner;

    fn rpc() -> Arc<RpcClient> {
        Arc::new(RpcClient::new("http://127.0.0.1:9"))
    }

    fn sample_op(sender: Address) -> UserOperation {
        UserOperation {
            sender,
            nonce: U256::from(7u8),
            call_data: Bytes::from(vec![0xab; 4]),
            ..UserOperation::default()
        }
    }

    #[test]
    fn session_stub_embeds_key_hash() {
        let agent = address!("00000000000000000000000000000000000000aa");
        let account = SessionAccount::for_agent(
            rpc(),
            LocalSigner(PrivateKeySigner::random()),
            address!("00000000000000000000000000000000000000bb"),
            agent,
            Some(84532),
        );
        let stub = account.stub_signature();
        assert_eq!(&stub[..32], account.key_hash().as_slice());
    }

    #[test]
    fn root_stub_embeds_zero_hash() {
        let account = RootAccount::new(
            rpc(),
            LocalSigner(PrivateKeySigner::random()),
            address!("00000000000000000000000000000000000000bb"),
            Some(84532),
        );
        assert_eq!(&account.stub_signature()[..32], ROOT_KEY_HASH.as_slice());
    }

    #[tokio::test]
    async fn session_signature_is_enveloped() {
        let signer = LocalSigner(PrivateKeySigner::random());
        let owner = address!("00000000000000000000000000000000000000bb");
        let account = SessionAccount::for_agent(
            rpc(),
            signer,
            owner,
            address!("00000000000000000000000000000000000000aa"),
            Some(84532),
        );
        let wrapped = account
            .sign_user_operation(&sample_op(owner))
            .await
            .expect("signs offline with a fixed chain id");
        assert_eq!(&wrapped[..32], account.key_hash().as_slice());
        // bytes head for the signature field sits after two offset words
        assert!(wrapped.len() > 32 + 32 + 32 + 32 + 65);
    }

    #[tokio::test]
    async fn root_signature_is_raw_envelope_with_zero_hash() {
        let owner = address!("00000000000000000000000000000000000000bb");
        let account = RootAccount::new(
            rpc(),
            LocalSigner(PrivateKeySigner::random()),
            owner,
            Some(84532),
        );
        let wrapped = account
            .sign_user_operation(&sample_op(owner))
            .await
            .expect("signs offline with a fixed chain id");
        assert_eq!(&wrapped[..32], ROOT_KEY_HASH.as_slice());
    }
}
