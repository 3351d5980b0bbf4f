//! # Key Codec
//!
//! Key hashing and settings bit-packing for the Calibur key registry.
//!
//! Both directions must be byte-exact with the onchain library: `hash_key`
//! is used to address keys in the registry, and a divergent hash silently
//! breaks every lookup. There is no freedom of representation here.

use crate::{CodecError, Key, KeySettings};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{sol_data, SolType};

/// Width of the expiration field in the packed settings word.
const EXPIRATION_BITS: u32 = 40;

/// Bit offset of the expiration field.
const EXPIRATION_OFFSET: usize = 160;

/// Bit offset of the admin flag.
const ADMIN_OFFSET: usize = 200;

// =============================================================================
// KEY HASHING
// =============================================================================

/// Hash a key the same way `KeyLib.hash()` does onchain:
/// `keccak256(abi.encode(keyType, keccak256(publicKey)))`.
#[must_use]
pub fn hash_key(key: &Key) -> B256 {
    let public_key_hash = keccak256(&key.public_key);
    let encoded = <(sol_data::Uint<8>, sol_data::FixedBytes<32>)>::abi_encode_params(&(
        key.key_type.as_u8(),
        public_key_hash,
    ));
    keccak256(encoded)
}

/// Decode the agent address from a secp256k1 public key encoding.
///
/// Secp256k1 keys store `abi.encode(address)`: the address left-padded to
/// 32 bytes. Anything else is rejected.
pub fn agent_address(key: &Key) -> Result<Address, CodecError> {
    if key.public_key.len() != 32 {
        return Err(CodecError::InvalidAgentPublicKey(key.public_key.len()));
    }
    let word = B256::from_slice(&key.public_key);
    Ok(Address::from_word(word))
}

// =============================================================================
// SETTINGS PACKING
// =============================================================================

/// Pack `KeySettings` into the uint256 bit layout used onchain:
/// `(isAdmin << 200) | (expiration << 160) | hook`.
///
/// Fails if the expiration does not fit its 40-bit field; silently
/// truncating would register a key with a different expiry than requested.
pub fn pack_settings(settings: &KeySettings) -> Result<U256, CodecError> {
    if settings.expiration >> EXPIRATION_BITS != 0 {
        return Err(CodecError::ExpirationOverflow(settings.expiration));
    }

    let admin = U256::from(u8::from(settings.is_admin)) << ADMIN_OFFSET;
    let expiration = U256::from(settings.expiration) << EXPIRATION_OFFSET;
    let hook = U256::from_be_bytes(settings.hook.into_word().0);

    Ok(admin | expiration | hook)
}

/// Unpack a settings word into its three fields.
///
/// Exact inverse of [`pack_settings`] for every representable input.
#[must_use]
pub fn unpack_settings(packed: U256) -> KeySettings {
    let hook_mask = (U256::from(1u8) << EXPIRATION_OFFSET) - U256::from(1u8);
    let expiration_mask = (U256::from(1u8) << EXPIRATION_BITS as usize) - U256::from(1u8);

    let hook = Address::from_word(B256::from(packed & hook_mask));
    let expiration = ((packed >> EXPIRATION_OFFSET) & expiration_mask).to::<u64>();
    let is_admin = packed.bit(ADMIN_OFFSET);

    KeySettings {
        is_admin,
        expiration,
        hook,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyType;
    use alloy_primitives::{address, Bytes};
    use proptest::prelude::*;

    #[test]
    fn hash_matches_manual_abi_layout() {
        // abi.encode(uint8, bytes32) is two 32-byte words: the type
        // discriminant right-aligned, then the public key hash.
        let key = Key::secp256k1(address!("0xbabe0001489722187fbaf0689c47b2f5e97545c5"));
        let mut words = [0u8; 64];
        words[31] = KeyType::Secp256k1.as_u8();
        words[32..].copy_from_slice(keccak256(&key.public_key).as_slice());

        assert_eq!(hash_key(&key), keccak256(words));
    }

    #[test]
    fn hash_is_deterministic_and_type_sensitive() {
        let public_key = Bytes::from(vec![0xaa; 32]);
        let secp = Key::new(KeyType::Secp256k1, public_key.clone());
        let p256 = Key::new(KeyType::P256, public_key);

        assert_eq!(hash_key(&secp), hash_key(&secp));
        assert_ne!(hash_key(&secp), hash_key(&p256));
    }

    #[test]
    fn agent_address_roundtrip() {
        let agent = address!("0x000000000000000000000000000000000000dead");
        let key = Key::secp256k1(agent);
        assert!(matches!(agent_address(&key), Ok(a) if a == agent));
    }

    #[test]
    fn agent_address_rejects_wrong_length() {
        let key = Key::new(KeyType::Secp256k1, Bytes::from(vec![0u8; 20]));
        assert!(matches!(
            agent_address(&key),
            Err(CodecError::InvalidAgentPublicKey(20))
        ));
    }

    #[test]
    fn pack_golden_vector() {
        // {isAdmin: false, expiration: 1700000000, hook: 0x…dEaD}
        let settings = KeySettings {
            is_admin: false,
            expiration: 1_700_000_000,
            hook: address!("0x000000000000000000000000000000000000dead"),
        };
        let packed = pack_settings(&settings).expect("valid settings");
        let expected: U256 = "0x6553f100000000000000000000000000000000000000dead"
            .parse()
            .expect("valid hex");
        assert_eq!(packed, expected);
        assert_eq!(unpack_settings(packed), settings);
    }

    #[test]
    fn pack_all_fields_saturated() {
        let settings = KeySettings {
            is_admin: true,
            expiration: (1 << EXPIRATION_BITS) - 1,
            hook: address!("0xffffffffffffffffffffffffffffffffffffffff"),
        };
        let packed = pack_settings(&settings).expect("valid settings");
        let expected: U256 = "0x1ffffffffffffffffffffffffffffffffffffffffffffffffff"
            .parse()
            .expect("valid hex");
        assert_eq!(packed, expected);
        assert_eq!(unpack_settings(packed), settings);
    }

    #[test]
    fn pack_rejects_expiration_overflow() {
        let settings = KeySettings::session(1 << EXPIRATION_BITS);
        assert!(matches!(
            pack_settings(&settings),
            Err(CodecError::ExpirationOverflow(_))
        ));
    }

    proptest! {
        #[test]
        fn settings_roundtrip(
            is_admin in any::<bool>(),
            expiration in 0u64..(1 << EXPIRATION_BITS),
            hook in any::<[u8; 20]>(),
        ) {
            let settings = KeySettings {
                is_admin,
                expiration,
                hook: Address::from(hook),
            };
            let packed = pack_settings(&settings).expect("in valid domain");
            prop_assert_eq!(unpack_settings(packed), settings);
        }

        #[test]
        fn distinct_keys_hash_distinct(a in any::<[u8; 20]>(), b in any::<[u8; 20]>()) {
            prop_assume!(a != b);
            let ka = Key::secp256k1(Address::from(a));
            let kb = Key::secp256k1(Address::from(b));
            prop_assert_ne!(hash_key(&ka), hash_key(&kb));
        }
    }
}
