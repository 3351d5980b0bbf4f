//! # Call Encoding
//!
//! ABI encoding for the Calibur account surface: key-management self-calls
//! (`register`/`update`/`revoke`), the batched `execute` envelope, the
//! `executeUserOp` calldata used by the 4337 pipeline, and the read-side
//! view calls with their return decoders.
//!
//! The `to` of every key-management call is the zero address: the account
//! interprets it as a call against itself.

use crate::{keys, Call, CodecError, Key, KeySettings, KeyType};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolValue};

/// Selector of `executeUserOp`, the entry the EntryPoint invokes with the
/// already-validated batched call. The account expects this exact selector
/// prepended to an abi-encoded `BatchedCall`.
pub const EXECUTE_USER_OP_SELECTOR: [u8; 4] = [0x8d, 0xd7, 0x71, 0x2f];

mod abi {
    use alloy_sol_types::sol;

    sol! {
        /// Onchain key representation.
        struct SolKey {
            uint8 keyType;
            bytes publicKey;
        }

        /// One call of a batch.
        struct SolCallItem {
            address to;
            uint256 value;
            bytes data;
        }

        /// The batched-call envelope the account executes.
        struct SolBatchedCall {
            SolCallItem[] calls;
            bool revertOnFailure;
        }

        function register(SolKey key);
        function update(bytes32 keyHash, uint256 settings);
        function revoke(bytes32 keyHash);
        function execute(SolBatchedCall batchedCall);

        function getKey(bytes32 keyHash) view returns (SolKey key);
        function getKeySettings(bytes32 keyHash) view returns (uint256 settings);
        function keyCount() view returns (uint256 count);
        function keyAt(uint256 i) view returns (SolKey key);
        function isRegistered(bytes32 keyHash) view returns (bool registered);
    }
}

sol! {
    /// EntryPoint nonce accessor (v0.7/v0.8).
    function getNonce(address sender, uint192 key) view returns (uint256 nonce);

    /// Minimal ERC-20 surface used by the demo flows.
    function transfer(address to, uint256 amount) returns (bool success);

    /// Mock token faucet mint.
    function mint(address to, uint256 amount);
}

fn to_sol_key(key: &Key) -> abi::SolKey {
    abi::SolKey {
        keyType: key.key_type.as_u8(),
        publicKey: key.public_key.clone(),
    }
}

fn from_sol_key(key: abi::SolKey) -> Result<Key, CodecError> {
    Ok(Key {
        key_type: KeyType::from_u8(key.keyType)?,
        public_key: key.publicKey,
    })
}

// =============================================================================
// SELF-CALL ENCODERS
// =============================================================================

/// Encode a `register(key)` self-call.
#[must_use]
pub fn encode_register_key(key: &Key) -> Call {
    let data = abi::registerCall { key: to_sol_key(key) }.abi_encode();
    Call::self_call(Bytes::from(data))
}

/// Encode an `update(keyHash, settings)` self-call.
///
/// Fails if the settings cannot be packed (expiration overflow).
pub fn encode_update_key_settings(
    key_hash: B256,
    settings: &KeySettings,
) -> Result<Call, CodecError> {
    let data = abi::updateCall {
        keyHash: key_hash,
        settings: keys::pack_settings(settings)?,
    }
    .abi_encode();
    Ok(Call::self_call(Bytes::from(data)))
}

/// Encode a `revoke(keyHash)` self-call.
#[must_use]
pub fn encode_revoke_key(key_hash: B256) -> Call {
    let data = abi::revokeCall { keyHash: key_hash }.abi_encode();
    Call::self_call(Bytes::from(data))
}

// =============================================================================
// EXECUTE ENCODERS
// =============================================================================

fn to_batched_call(calls: &[Call], revert_on_failure: bool) -> abi::SolBatchedCall {
    abi::SolBatchedCall {
        calls: calls
            .iter()
            .map(|c| abi::SolCallItem {
                to: c.to,
                value: c.value,
                data: c.data.clone(),
            })
            .collect(),
        revertOnFailure: revert_on_failure,
    }
}

/// Encode a direct `execute(BatchedCall)` call.
///
/// The returned calldata can be sent as a transaction to the account's own
/// address (owner-signed path, no bundler involved).
#[must_use]
pub fn encode_execute(calls: &[Call], revert_on_failure: bool) -> Bytes {
    Bytes::from(
        abi::executeCall {
            batchedCall: to_batched_call(calls, revert_on_failure),
        }
        .abi_encode(),
    )
}

/// Encode the `executeUserOp` calldata carried inside a user operation.
///
/// This is the fixed selector followed by the abi-encoded batched call;
/// `revertOnFailure` is always set on this path.
#[must_use]
pub fn encode_execute_user_op(calls: &[Call]) -> Bytes {
    let mut data = EXECUTE_USER_OP_SELECTOR.to_vec();
    data.extend_from_slice(&to_batched_call(calls, true).abi_encode());
    Bytes::from(data)
}

// =============================================================================
// VIEW CALLS
// =============================================================================

/// Calldata for `keyCount()`.
#[must_use]
pub fn key_count_call() -> Bytes {
    Bytes::from(abi::keyCountCall {}.abi_encode())
}

/// Decode a `keyCount()` return.
pub fn decode_key_count(data: &[u8]) -> Result<u64, CodecError> {
    let count = abi::keyCountCall::abi_decode_returns(data)?;
    // A count beyond u64 is not a real registry; saturate instead of panicking.
    Ok(u64::try_from(count).unwrap_or(u64::MAX))
}

/// Calldata for `keyAt(i)`.
#[must_use]
pub fn key_at_call(index: u64) -> Bytes {
    Bytes::from(abi::keyAtCall { i: U256::from(index) }.abi_encode())
}

/// Decode a `keyAt(i)` return.
pub fn decode_key_at(data: &[u8]) -> Result<Key, CodecError> {
    from_sol_key(abi::keyAtCall::abi_decode_returns(data)?)
}

/// Calldata for `getKey(keyHash)`.
#[must_use]
pub fn get_key_call(key_hash: B256) -> Bytes {
    Bytes::from(abi::getKeyCall { keyHash: key_hash }.abi_encode())
}

/// Decode a `getKey(keyHash)` return.
pub fn decode_get_key(data: &[u8]) -> Result<Key, CodecError> {
    from_sol_key(abi::getKeyCall::abi_decode_returns(data)?)
}

/// Calldata for `getKeySettings(keyHash)`.
#[must_use]
pub fn get_key_settings_call(key_hash: B256) -> Bytes {
    Bytes::from(abi::getKeySettingsCall { keyHash: key_hash }.abi_encode())
}

/// Decode a `getKeySettings(keyHash)` return into structured settings.
pub fn decode_key_settings(data: &[u8]) -> Result<KeySettings, CodecError> {
    let packed = abi::getKeySettingsCall::abi_decode_returns(data)?;
    Ok(keys::unpack_settings(packed))
}

/// Calldata for `isRegistered(keyHash)`.
#[must_use]
pub fn is_registered_call(key_hash: B256) -> Bytes {
    Bytes::from(abi::isRegisteredCall { keyHash: key_hash }.abi_encode())
}

/// Decode an `isRegistered(keyHash)` return.
pub fn decode_is_registered(data: &[u8]) -> Result<bool, CodecError> {
    Ok(abi::isRegisteredCall::abi_decode_returns(data)?)
}

// =============================================================================
// ENTRYPOINT + TOKEN CALLDATA
// =============================================================================

/// Calldata for the EntryPoint's `getNonce(sender, key)`.
#[must_use]
pub fn entry_point_nonce_call(sender: Address, key: u64) -> Bytes {
    Bytes::from(
        getNonceCall {
            sender,
            key: alloy_primitives::aliases::U192::from(key),
        }
        .abi_encode(),
    )
}

/// Decode a `getNonce` return.
pub fn decode_nonce(data: &[u8]) -> Result<U256, CodecError> {
    Ok(getNonceCall::abi_decode_returns(data)?)
}

/// ERC-20 `transfer(to, amount)` call against a token contract.
#[must_use]
pub fn erc20_transfer(token: Address, to: Address, amount: U256) -> Call {
    Call::new(token, Bytes::from(transferCall { to, amount }.abi_encode()))
}

/// Mock token `mint(to, amount)` call.
#[must_use]
pub fn erc20_mint(token: Address, to: Address, amount: U256) -> Call {
    Call::new(token, Bytes::from(mintCall { to, amount }.abi_encode()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::pack_settings;
    use alloy_primitives::address;

    fn sample_key() -> Key {
        Key::secp256k1(address!("0xbabe0001489722187fbaf0689c47b2f5e97545c5"))
    }

    #[test]
    fn register_decodes_back_to_key() {
        let key = sample_key();
        let call = encode_register_key(&key);
        assert_eq!(call.to, Address::ZERO);
        assert_eq!(call.value, U256::ZERO);

        let decoded = abi::registerCall::abi_decode(&call.data).expect("valid calldata");
        assert_eq!(decoded.key.keyType, key.key_type.as_u8());
        assert_eq!(decoded.key.publicKey, key.public_key);
    }

    #[test]
    fn update_decodes_back_to_settings() {
        let key_hash = crate::keys::hash_key(&sample_key());
        let settings = KeySettings::session(1_700_000_000);

        let call = encode_update_key_settings(key_hash, &settings).expect("valid settings");
        assert_eq!(call.to, Address::ZERO);

        let decoded = abi::updateCall::abi_decode(&call.data).expect("valid calldata");
        assert_eq!(decoded.keyHash, key_hash);
        assert_eq!(decoded.settings, pack_settings(&settings).expect("valid"));
    }

    #[test]
    fn revoke_carries_key_hash() {
        let key_hash = crate::keys::hash_key(&sample_key());
        let call = encode_revoke_key(key_hash);

        let decoded = abi::revokeCall::abi_decode(&call.data).expect("valid calldata");
        assert_eq!(decoded.keyHash, key_hash);
    }

    #[test]
    fn execute_user_op_uses_fixed_selector() {
        let calls = vec![Call::new(
            address!("0x036cbd53842c5426634e7929541ec2318f3dcf7e"),
            Bytes::from(vec![0xde, 0xad]),
        )];
        let data = encode_execute_user_op(&calls);
        assert_eq!(&data[..4], &EXECUTE_USER_OP_SELECTOR);

        // The payload after the selector is the plain abi-encoded batch.
        let batch =
            abi::SolBatchedCall::abi_decode(&data[4..]).expect("valid batched call encoding");
        assert_eq!(batch.calls.len(), 1);
        assert!(batch.revertOnFailure);
        assert_eq!(batch.calls[0].to, calls[0].to);
    }

    #[test]
    fn execute_roundtrip() {
        let calls = vec![
            encode_register_key(&sample_key()),
            encode_revoke_key(B256::ZERO),
        ];
        let data = encode_execute(&calls, true);

        let decoded = abi::executeCall::abi_decode(&data).expect("valid calldata");
        assert_eq!(decoded.batchedCall.calls.len(), 2);
        assert!(decoded.batchedCall.revertOnFailure);
    }

    #[test]
    fn view_return_decoding() {
        let count = decode_key_count(&U256::from(3u8).abi_encode()).expect("valid return");
        assert_eq!(count, 3);

        let registered = decode_is_registered(&true.abi_encode()).expect("valid return");
        assert!(registered);

        let packed = pack_settings(&KeySettings::session(42)).expect("valid");
        let settings = decode_key_settings(&packed.abi_encode()).expect("valid return");
        assert_eq!(settings.expiration, 42);
        assert!(!settings.is_admin);
    }

    #[test]
    fn key_at_roundtrip_through_abi() {
        let key = sample_key();
        let encoded = to_sol_key(&key).abi_encode();
        let decoded = decode_key_at(&encoded).expect("valid return");
        assert_eq!(decoded, key);
    }

    #[test]
    fn get_key_roundtrip_through_abi() {
        let key = sample_key();
        let call = get_key_call(crate::keys::hash_key(&key));
        assert_eq!(call.len(), 4 + 32);

        let encoded = to_sol_key(&key).abi_encode();
        let decoded = decode_get_key(&encoded).expect("valid return");
        assert_eq!(decoded, key);
    }

    #[test]
    fn nonce_call_decoding() {
        let nonce = decode_nonce(&U256::from(7u8).abi_encode()).expect("valid return");
        assert_eq!(nonce, U256::from(7u8));
    }
}
