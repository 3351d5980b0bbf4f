//! # Signature Envelope
//!
//! The account validates signatures wrapped in an abi-encoded
//! `(bytes32 keyHash, bytes signature, bytes hookData)` envelope. The key
//! hash selects which registered key to validate against; [`ROOT_KEY_HASH`]
//! selects the owner EOA itself.
//!
//! Some signers return ECDSA recovery ids in compact form (0/1) instead of
//! the Ethereum convention (27/28); [`normalize_signature`] corrects that
//! before the signature goes onchain.

use crate::{ROOT_KEY_HASH, STUB_SIGNATURE};
use alloy_primitives::{Bytes, B256};
use alloy_sol_types::SolValue;

/// Normalize an ECDSA signature so the recovery id is 27 or 28.
///
/// Inputs that are not 65 bytes are returned unchanged: non-secp256k1
/// signatures (WebAuthn, P-256 envelopes) pass through untouched.
#[must_use]
pub fn normalize_signature(signature: Bytes) -> Bytes {
    if signature.len() != 65 {
        return signature;
    }
    let v = signature[64];
    if v >= 27 {
        return signature;
    }
    let mut bytes = signature.to_vec();
    bytes[64] = v + 27;
    Bytes::from(bytes)
}

/// Wrap a raw signature in the envelope the account expects:
/// `abi.encode(keyHash, signature, hookData)`.
#[must_use]
pub fn wrap_signature(key_hash: B256, signature: Bytes, hook_data: Bytes) -> Bytes {
    Bytes::from((key_hash, signature, hook_data).abi_encode_params())
}

/// Envelope for an owner-signed (root key) operation.
#[must_use]
pub fn wrap_root_signature(signature: Bytes) -> Bytes {
    wrap_signature(ROOT_KEY_HASH, signature, Bytes::new())
}

/// Stub envelope used for gas estimation against the given key.
///
/// The inner bytes are a fixed worst-case-shaped signature that never
/// verifies; bundlers only use it to size the operation.
#[must_use]
pub fn stub_signature(key_hash: B256) -> Bytes {
    wrap_signature(key_hash, Bytes::from(STUB_SIGNATURE.to_vec()), Bytes::new())
}

// =============================================================================
// TESTS
// =============================================================================
