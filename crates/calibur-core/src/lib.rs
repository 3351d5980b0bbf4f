//! # Calibur Core
//!
//! Deterministic codec layer for Calibur smart accounts (ERC-7702 delegated
//! accounts with a registry of secondary signing keys).
//!
//! This crate is THE LOGIC: every function here is pure and synchronous.
//! It translates between the onchain packed representations (key hashes,
//! settings words, ABI calldata, user-operation digests) and their structured
//! Rust forms. Network transports, signers, and HTTP handlers live in the
//! app layer (`apps/caliburd`).
//!
//! ## Modules
//!
//! - [`keys`] — key hashing and settings bit-packing
//! - [`calls`] — ABI encoding of self-calls, batched execute, and view calls
//! - [`signature`] — recovery-id normalization and the signature envelope
//! - [`userop`] — user-operation packing and the EntryPoint v0.8 signing hash
//! - [`payment`] — x402 payment header codec
//! - [`units`] — decimal token-amount conversion
//! - [`store`] — redb-backed DCA agent store

pub mod calls;
pub mod keys;
pub mod payment;
pub mod signature;
pub mod store;
pub mod units;
pub mod userop;

use alloy_primitives::{address, hex, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Calibur v0.8 delegate implementation address.
pub const CALIBUR_ADDRESS: Address = address!("0x000000009b1d0af20d8c6d0a44e162d11f9b8f00");

/// ERC-4337 EntryPoint v0.8.
pub const ENTRY_POINT_08: Address = address!("0x4337084d9e255ff0702461cf8895ce9e3b5ff108");

/// Root key hash sentinel: operations signed by the owner EOA itself.
pub const ROOT_KEY_HASH: B256 = B256::ZERO;

/// Fixed 65-byte signature used for gas estimation.
pub const STUB_SIGNATURE: [u8; 65] = hex!(
    "fffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Errors from the codec layer.
///
/// All of these are terminal: the functions are pure, so there is nothing
/// to retry. Malformed input is rejected, never coerced.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Unknown key type discriminant read from the chain.
    #[error("unknown key type: {0}")]
    UnknownKeyType(u8),

    /// Expiration does not fit the 40-bit field of the settings word.
    #[error("expiration {0} exceeds 40 bits")]
    ExpirationOverflow(u64),

    /// Secp256k1 agent public keys must be abi.encode(address): 32 bytes.
    #[error("expected 32-byte agent public key, got {0} bytes")]
    InvalidAgentPublicKey(usize),

    /// ABI decoding of a contract return value failed.
    #[error("abi decode error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    /// Decimal amount string could not be parsed into atoms.
    #[error("invalid decimal amount: {0}")]
    InvalidAmount(String),

    /// Payment header was not valid base64.
    #[error("payment header is not valid base64")]
    PaymentHeaderBase64(#[from] base64::DecodeError),

    /// Payment header decoded to invalid JSON.
    #[error("payment header is not valid JSON: {0}")]
    PaymentHeaderJson(#[from] serde_json::Error),
}

// =============================================================================
// KEY TYPES
// =============================================================================

/// Discriminant of a registered signing key.
///
/// Matches the onchain `KeyType` enum ordinals exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyType {
    /// Raw P-256 public key.
    P256,
    /// WebAuthn-wrapped P-256 credential.
    WebAuthnP256,
    /// Ethereum address (abi-encoded), validated via ecrecover.
    Secp256k1,
}

impl KeyType {
    /// Onchain discriminant value.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::P256 => 0,
            Self::WebAuthnP256 => 1,
            Self::Secp256k1 => 2,
        }
    }

    /// Parse a discriminant read from the chain.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::P256),
            1 => Ok(Self::WebAuthnP256),
            2 => Ok(Self::Secp256k1),
            other => Err(CodecError::UnknownKeyType(other)),
        }
    }
}

/// A signing key registered (or to be registered) on a Calibur account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Key discriminant.
    pub key_type: KeyType,
    /// Type-specific public key encoding.
    pub public_key: Bytes,
}

impl Key {
    /// Create a key from its parts.
    #[must_use]
    pub fn new(key_type: KeyType, public_key: Bytes) -> Self {
        Self {
            key_type,
            public_key,
        }
    }

    /// Build a secp256k1 key for an agent address.
    ///
    /// The onchain encoding for secp256k1 keys is `abi.encode(address)`:
    /// the address left-padded to 32 bytes.
    #[must_use]
    pub fn secp256k1(agent: Address) -> Self {
        Self {
            key_type: KeyType::Secp256k1,
            public_key: Bytes::from(agent.into_word().to_vec()),
        }
    }
}

/// Per-key permissions, stored onchain as a single packed word.
///
/// Layout: `(isAdmin << 200) | (expiration << 160) | hook`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySettings {
    /// Admin keys may manage other keys.
    pub is_admin: bool,
    /// Unix expiration in seconds; 0 means never expires. 40-bit field.
    pub expiration: u64,
    /// Validation hook contract; zero address means none.
    pub hook: Address,
}

impl KeySettings {
    /// Settings for a restricted session key: non-admin, with expiry, no hook.
    #[must_use]
    pub fn session(expiration: u64) -> Self {
        Self {
            is_admin: false,
            expiration,
            hook: Address::ZERO,
        }
    }

    /// Whether the key is expired at the given unix time.
    ///
    /// An expiration of 0 means the key never expires.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiration > 0 && self.expiration <= now
    }
}

// =============================================================================
// CALLS
// =============================================================================

/// A single call in a batched execution.
///
/// Self-calls against the account's own key registry use `Address::ZERO`
/// as the target sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Call target.
    pub to: Address,
    /// Wei attached to the call.
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
}

impl Call {
    /// A plain call with no value attached.
    #[must_use]
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data,
        }
    }

    /// A self-call against the account's own registry.
    #[must_use]
    pub fn self_call(data: Bytes) -> Self {
        Self::new(Address::ZERO, data)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_type_roundtrip() {
        for kt in [KeyType::P256, KeyType::WebAuthnP256, KeyType::Secp256k1] {
            assert!(matches!(KeyType::from_u8(kt.as_u8()), Ok(parsed) if parsed == kt));
        }
        assert!(KeyType::from_u8(3).is_err());
    }

    #[test]
    fn secp256k1_key_is_left_padded_address() {
        let agent = address!("0xbabe0001489722187fbaf0689c47b2f5e97545c5");
        let key = Key::secp256k1(agent);
        assert_eq!(key.public_key.len(), 32);
        assert_eq!(&key.public_key[..12], &[0u8; 12]);
        assert_eq!(&key.public_key[12..], agent.as_slice());
    }

    #[test]
    fn settings_expiry_semantics() {
        let never = KeySettings::session(0);
        assert!(!never.is_expired(u64::MAX));

        let expired = KeySettings::session(100);
        assert!(expired.is_expired(100));
        assert!(expired.is_expired(101));
        assert!(!expired.is_expired(99));
    }

    #[test]
    fn self_call_sentinel() {
        let call = Call::self_call(Bytes::from(vec![1, 2, 3]));
        assert_eq!(call.to, Address::ZERO);
        assert_eq!(call.value, U256::ZERO);
    }
}
