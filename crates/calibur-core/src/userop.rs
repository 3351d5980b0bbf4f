//! # User Operations
//!
//! The transaction-like structure submitted to an ERC-4337 bundler. This
//! module carries the unpacked wire form (what bundler RPC methods accept),
//! the packed form (what the EntryPoint hashes), and the EntryPoint v0.8
//! EIP-712 signing hash.

use crate::ENTRY_POINT_08;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{eip712_domain, sol, SolStruct};
use serde::{Deserialize, Serialize};

sol! {
    /// The packed form hashed by EntryPoint v0.8 as an EIP-712 struct.
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
    }
}

/// An unpacked user operation in the v0.7/v0.8 bundler wire format.
///
/// Optional fields are omitted from the JSON entirely when unset; bundlers
/// reject explicit nulls for the factory/paymaster groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The account sending the operation.
    pub sender: Address,
    /// EntryPoint nonce (sequence key in the high 192 bits).
    pub nonce: U256,
    /// Account factory, or the EIP-7702 delegation marker bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<Bytes>,
    /// Factory calldata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    /// The calldata executed by the account (`executeUserOp` payload).
    pub call_data: Bytes,
    /// Gas limit for the execution phase.
    pub call_gas_limit: U256,
    /// Gas limit for the validation phase.
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler for pre-verification work.
    pub pre_verification_gas: U256,
    /// EIP-1559 max fee.
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee.
    pub max_priority_fee_per_gas: U256,
    /// Sponsoring paymaster, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Gas limit for paymaster validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Gas limit for the paymaster post-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    /// Paymaster-specific data blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// Signature envelope (keyHash, signature, hookData).
    pub signature: Bytes,
}

/// Concatenate two gas values into a single 32-byte word, 16 bytes each.
///
/// Values are truncated to 128 bits; real gas limits are nowhere near that.
fn gas_word(high: U256, low: U256) -> B256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes::<32>()[16..]);
    word[16..].copy_from_slice(&low.to_be_bytes::<32>()[16..]);
    B256::from(word)
}

impl UserOperation {
    /// `initCode` of the packed form: factory bytes followed by factory data.
    #[must_use]
    pub fn init_code(&self) -> Bytes {
        let mut out = Vec::new();
        if let Some(factory) = &self.factory {
            out.extend_from_slice(factory);
        }
        if let Some(data) = &self.factory_data {
            out.extend_from_slice(data);
        }
        Bytes::from(out)
    }

    /// `paymasterAndData` of the packed form: paymaster address, the two
    /// paymaster gas limits, then the paymaster data. Empty when unsponsored.
    #[must_use]
    pub fn paymaster_and_data(&self) -> Bytes {
        let Some(paymaster) = self.paymaster else {
            return Bytes::new();
        };
        let mut out = Vec::with_capacity(52);
        out.extend_from_slice(paymaster.as_slice());
        let verification = self.paymaster_verification_gas_limit.unwrap_or_default();
        let post_op = self.paymaster_post_op_gas_limit.unwrap_or_default();
        out.extend_from_slice(&gas_word(verification, post_op)[..]);
        if let Some(data) = &self.paymaster_data {
            out.extend_from_slice(data);
        }
        Bytes::from(out)
    }

    /// The packed representation hashed by the EntryPoint.
    ///
    /// The signature is not part of the hashed struct.
    #[must_use]
    pub fn pack(&self) -> PackedUserOperation {
        PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code(),
            callData: self.call_data.clone(),
            accountGasLimits: gas_word(self.verification_gas_limit, self.call_gas_limit),
            preVerificationGas: self.pre_verification_gas,
            gasFees: gas_word(self.max_priority_fee_per_gas, self.max_fee_per_gas),
            paymasterAndData: self.paymaster_and_data(),
        }
    }

    /// EIP-712 signing hash under the EntryPoint v0.8 domain
    /// (`name: "ERC4337", version: "1"`).
    #[must_use]
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        self.signing_hash_for(chain_id, ENTRY_POINT_08)
    }

    /// Signing hash against an explicit EntryPoint address.
    #[must_use]
    pub fn signing_hash_for(&self, chain_id: u64, entry_point: Address) -> B256 {
        let domain = eip712_domain! {
            name: "ERC4337",
            version: "1",
            chain_id: chain_id,
            verifying_contract: entry_point,
        };
        self.pack().eip712_signing_hash(&domain)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: address!("0xbabe0001489722187fbaf0689c47b2f5e97545c5"),
            nonce: U256::from(7u8),
            call_data: Bytes::from(vec![0x8d, 0xd7, 0x71, 0x2f]),
            call_gas_limit: U256::from(100_000u64),
            verification_gas_limit: U256::from(200_000u64),
            pre_verification_gas: U256::from(50_000u64),
            max_fee_per_gas: U256::from(1_000_000_000u64),
            max_priority_fee_per_gas: U256::from(100_000_000u64),
            signature: Bytes::new(),
            ..UserOperation::default()
        }
    }

    #[test]
    fn gas_word_layout() {
        let word = gas_word(U256::from(0xAAu8), U256::from(0xBBu8));
        assert_eq!(word[15], 0xAA);
        assert_eq!(word[31], 0xBB);
        assert_eq!(&word[..15], &[0u8; 15]);
    }

    #[test]
    fn init_code_concatenates_factory_parts() {
        let mut op = sample_op();
        assert!(op.init_code().is_empty());

        op.factory = Some(Bytes::from(vec![0x77, 0x02]));
        assert_eq!(op.init_code(), Bytes::from(vec![0x77, 0x02]));

        op.factory_data = Some(Bytes::from(vec![0x01]));
        assert_eq!(op.init_code(), Bytes::from(vec![0x77, 0x02, 0x01]));
    }

    #[test]
    fn paymaster_and_data_layout() {
        let mut op = sample_op();
        assert!(op.paymaster_and_data().is_empty());

        op.paymaster = Some(address!("0x000000000000000000000000000000000000dead"));
        op.paymaster_verification_gas_limit = Some(U256::from(1u8));
        op.paymaster_post_op_gas_limit = Some(U256::from(2u8));
        op.paymaster_data = Some(Bytes::from(vec![0xff]));

        let blob = op.paymaster_and_data();
        assert_eq!(blob.len(), 20 + 32 + 1);
        assert_eq!(&blob[..20], op.paymaster.expect("set").as_slice());
        assert_eq!(blob[20 + 15], 1); // verification limit, low byte
        assert_eq!(blob[20 + 31], 2); // post-op limit, low byte
        assert_eq!(blob[52], 0xff);
    }

    #[test]
    fn signing_hash_is_deterministic_and_domain_separated() {
        let op = sample_op();
        assert_eq!(op.signing_hash(84532), op.signing_hash(84532));
        assert_ne!(op.signing_hash(84532), op.signing_hash(8453));

        let mut other = op.clone();
        other.nonce = U256::from(8u8);
        assert_ne!(op.signing_hash(84532), other.signing_hash(84532));
    }

    #[test]
    fn signature_is_not_part_of_the_hash() {
        let op = sample_op();
        let mut signed = op.clone();
        signed.signature = Bytes::from(vec![0xab; 65]);
        assert_eq!(op.signing_hash(84532), signed.signing_hash(84532));
    }

    #[test]
    fn wire_json_omits_unset_groups() {
        let op = sample_op();
        let json = serde_json::to_value(&op).expect("serializable");
        let obj = json.as_object().expect("object");
        assert!(!obj.contains_key("factory"));
        assert!(!obj.contains_key("paymaster"));
        assert!(obj.contains_key("callData"));
        assert!(obj.contains_key("maxFeePerGas"));
    }
}
