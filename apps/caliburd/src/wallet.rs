//! # Wallet service client
//!
//! Client for the hosted wallet service: session verification for bearer
//! auth, backend agent wallets, remote digest signing, and shield recovery
//! sessions. The service is treated as an opaque HTTP API; everything
//! chain-shaped stays in this crate.

use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use calibur_core::signature::normalize_signature;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::ShieldConfig;

/// Errors from the wallet service.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// No API secret configured; remote calls are impossible.
    #[error("wallet service secret is not configured")]
    NotConfigured,

    /// Network or HTTP failure.
    #[error("wallet service transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("wallet service rejected the request: {status}")]
    Api { status: u16 },

    /// Local signer failure.
    #[error("signer error: {0}")]
    Signer(String),
}

/// A verified user session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    /// Opaque user id at the wallet service.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Smart-account addresses the session may act for.
    #[serde(default)]
    pub accounts: Vec<Address>,
}

/// A service-custodied agent wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendWallet {
    pub id: String,
    pub address: Address,
}

/// Wallet service API client.
#[derive(Debug)]
pub struct WalletClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

impl WalletClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, secret_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            secret_key,
        }
    }

    fn secret(&self) -> Result<&str, WalletError> {
        self.secret_key.as_deref().ok_or(WalletError::NotConfigured)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, WalletError> {
        let secret = self.secret()?;
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(secret)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WalletError::Api {
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// Verify a user's session token, returning the session's identity and
    /// linked accounts.
    pub async fn verify_session(&self, token: &str) -> Result<SessionUser, WalletError> {
        self.post("/v1/sessions/verify", json!({ "accessToken": token }))
            .await
    }

    /// Create a fresh backend wallet to act as a session agent.
    pub async fn create_backend_wallet(&self) -> Result<BackendWallet, WalletError> {
        self.post("/v1/wallets", json!({ "chainType": "evm" })).await
    }

    /// Look up an existing backend wallet.
    pub async fn get_backend_wallet(&self, id: &str) -> Result<BackendWallet, WalletError> {
        let secret = self.secret()?;
        let response = self
            .http
            .get(format!("{}/v1/wallets/{id}", self.base_url))
            .bearer_auth(secret)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WalletError::Api {
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// Sign a 32-byte digest with a backend wallet. The returned signature
    /// is normalized to the 27/28 recovery-id convention.
    pub async fn sign_digest(&self, wallet_id: &str, digest: B256) -> Result<Bytes, WalletError> {
        #[derive(Deserialize)]
        struct Signed {
            signature: Bytes,
        }
        let signed: Signed = self
            .post(
                &format!("/v1/wallets/{wallet_id}/sign"),
                json!({ "hash": digest }),
            )
            .await?;
        Ok(normalize_signature(signed.signature))
    }

    /// Create a shield recovery session for client-side key reconstruction.
    pub async fn create_recovery_session(
        &self,
        shield: &ShieldConfig,
    ) -> Result<String, WalletError> {
        #[derive(Deserialize)]
        struct Recovery {
            session: String,
        }
        let recovery: Recovery = self
            .post(
                "/v1/shield/recovery-sessions",
                json!({
                    "publishableKey": shield.publishable_key,
                    "secretKey": shield.secret_key,
                    "encryptionShare": shield.encryption_share,
                }),
            )
            .await?;
        Ok(recovery.session)
    }
}

// =============================================================================
// DIGEST SIGNERS
// =============================================================================

/// Anything that can produce a 65-byte secp256k1 signature over a digest.
/// Implementations return signatures already normalized to v in {27, 28}.
#[allow(async_fn_in_trait)]
pub trait DigestSigner {
    async fn sign_digest(&self, digest: B256) -> Result<Bytes, WalletError>;
}

/// Signs through a service-custodied backend wallet.
#[derive(Debug, Clone)]
pub struct RemoteSigner {
    client: Arc<WalletClient>,
    wallet_id: String,
}

impl RemoteSigner {
    #[must_use]
    pub fn new(client: Arc<WalletClient>, wallet_id: impl Into<String>) -> Self {
        Self {
            client,
            wallet_id: wallet_id.into(),
        }
    }
}

impl DigestSigner for RemoteSigner {
    async fn sign_digest(&self, digest: B256) -> Result<Bytes, WalletError> {
        self.client.sign_digest(&self.wallet_id, digest).await
    }
}

/// Signs with an in-process private key. Used for tests and local tooling.
#[derive(Debug, Clone)]
pub struct LocalSigner(pub PrivateKeySigner);

impl DigestSigner for LocalSigner {
    async fn sign_digest(&self, digest: B256) -> Result<Bytes, WalletError> {
        let signature = self
            .0
            .sign_hash(&digest)
            .await
            .map_err(|err| WalletError::Signer(err.to_string()))?;
        Ok(normalize_signature(Bytes::from(signature.as_bytes().to_vec())))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_secret_short_circuits() {
        let client = WalletClient::new("http://127.0.0.1:9", None);
        let err = client.verify_session("token").await.expect_err("must fail");
        assert!(matches!(err, WalletError::NotConfigured));
    }

    #[tokio::test]
    async fn local_signer_yields_normalized_65_bytes() {
        let signer = LocalSigner(PrivateKeySigner::random());
        let sig = signer.sign_digest(B256::repeat_byte(0x42)).await.expect("signs");
        assert_eq!(sig.len(), 65);
        let v = sig[64];
        assert!(v == 27 || v == 28);
    }
}
