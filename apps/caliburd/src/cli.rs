//! # CLI commands
//!
//! Debug tooling around the codec and the store. Every command is a plain
//! `cmd_*` function that returns its rendered output, so integration tests
//! can call them without spawning a process; `main` just prints.

use alloy_primitives::{Address, Bytes, B256, U256};
use calibur_core::keys::{hash_key, pack_settings, unpack_settings};
use calibur_core::payment::decode_payment_header;
use calibur_core::store::DcaStore;
use calibur_core::{CodecError, Key, KeySettings, KeyType};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] calibur_core::store::StoreError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session-key tooling for Calibur smart accounts.
#[derive(Debug, Parser)]
#[command(name = "caliburd", version, about)]
pub struct Cli {
    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server.
    Serve,
    /// Compute the registry hash of a key.
    HashKey {
        /// Agent address; shorthand for a secp256k1 key.
        #[arg(long, conflicts_with_all = ["key_type", "public_key"])]
        agent: Option<String>,
        /// Key type discriminant (0, 1 or 2).
        #[arg(long, requires = "public_key")]
        key_type: Option<u8>,
        /// Hex public key bytes.
        #[arg(long, requires = "key_type")]
        public_key: Option<String>,
    },
    /// Pack or unpack a key-settings word.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Inspect the DCA store.
    Agents {
        /// Path of the store file.
        #[arg(long, default_value = "caliburd.redb")]
        store: PathBuf,
    },
    /// Decode a base64 x402 payment header.
    DecodePayment {
        /// The raw `X-PAYMENT` header value.
        header: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Pack settings fields into the onchain word.
    Pack {
        #[arg(long)]
        admin: bool,
        /// Unix expiration in seconds; 0 for never.
        #[arg(long, default_value_t = 0)]
        expiration: u64,
        /// Hook contract address.
        #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
        hook: String,
    },
    /// Unpack an onchain settings word.
    Unpack {
        /// The word, hex or decimal.
        word: String,
    },
}

fn parse_cli_address(raw: &str) -> Result<Address, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidInput(format!("invalid address: {raw}")))
}

fn parse_word(raw: &str) -> Result<U256, CliError> {
    let parsed = if let Some(hex) = raw.strip_prefix("0x") {
        U256::from_str_radix(hex, 16)
    } else {
        U256::from_str_radix(raw, 10)
    };
    parsed.map_err(|_| CliError::InvalidInput(format!("invalid settings word: {raw}")))
}

/// `hash-key`: registry hash of a key given either an agent address or an
/// explicit type and public key.
pub fn cmd_hash_key(
    agent: Option<&str>,
    key_type: Option<u8>,
    public_key: Option<&str>,
    json: bool,
) -> Result<String, CliError> {
    let key = match (agent, key_type, public_key) {
        (Some(agent), _, _) => Key::secp256k1(parse_cli_address(agent)?),
        (None, Some(key_type), Some(public_key)) => {
            let key_type = KeyType::from_u8(key_type)?;
            let raw = public_key.strip_prefix("0x").unwrap_or(public_key);
            let bytes = alloy_primitives::hex::decode(raw)
                .map_err(|_| CliError::InvalidInput(format!("invalid hex: {public_key}")))?;
            Key::new(key_type, Bytes::from(bytes))
        }
        _ => {
            return Err(CliError::InvalidInput(
                "provide --agent, or --key-type with --public-key".into(),
            ))
        }
    };
    let hash = hash_key(&key);
    if json {
        Ok(serde_json::to_string_pretty(&json!({
            "keyType": key.key_type,
            "keyHash": hash,
        }))?)
    } else {
        Ok(format!("{hash}"))
    }
}

/// `settings pack`
pub fn cmd_settings_pack(
    admin: bool,
    expiration: u64,
    hook: &str,
    json: bool,
) -> Result<String, CliError> {
    let settings = KeySettings {
        is_admin: admin,
        expiration,
        hook: parse_cli_address(hook)?,
    };
    let word = pack_settings(&settings)?;
    if json {
        Ok(serde_json::to_string_pretty(&json!({
            "settings": settings,
            "word": B256::from(word),
        }))?)
    } else {
        Ok(format!("{}", B256::from(word)))
    }
}

/// `settings unpack`
pub fn cmd_settings_unpack(word: &str, json: bool) -> Result<String, CliError> {
    let settings = unpack_settings(parse_word(word)?);
    if json {
        Ok(serde_json::to_string_pretty(&settings)?)
    } else {
        Ok(format!(
            "admin: {}\nexpiration: {}\nhook: {}",
            settings.is_admin, settings.expiration, settings.hook
        ))
    }
}

/// `agents`: list enrolled DCA users and their schedules.
pub fn cmd_agents_list(store_path: &Path, json: bool) -> Result<String, CliError> {
    let store = DcaStore::open(store_path)?;
    let mut entries = Vec::new();
    for address in store.list_agents()? {
        let config = store.get(address)?;
        entries.push(json!({
            "address": address,
            "config": config,
        }));
    }
    if json {
        Ok(serde_json::to_string_pretty(&entries)?)
    } else if entries.is_empty() {
        Ok("no enrolled agents".to_string())
    } else {
        let mut out = String::new();
        for entry in &entries {
            out.push_str(&format!(
                "{} enabled={} amount={} every {}s\n",
                entry["address"].as_str().unwrap_or("?"),
                entry["config"]["enabled"],
                entry["config"]["amount"],
                entry["config"]["frequencySecs"],
            ));
        }
        Ok(out.trim_end().to_string())
    }
}

/// `decode-payment`: pretty-print a base64 x402 payment header.
pub fn cmd_decode_payment(header: &str, _json: bool) -> Result<String, CliError> {
    let payload = decode_payment_header(header)?;
    Ok(serde_json::to_string_pretty(&payload)?)
}

// =============================================================================
// TESTS
// =============================================================================
