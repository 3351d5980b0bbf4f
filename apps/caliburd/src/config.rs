//! # Configuration
//!
//! Environment-based configuration for the server and CLI. `.env` files are
//! loaded by `main` before this runs; everything here reads plain env vars
//! and fails fast on values that cannot possibly work.
//!
//! Secrets (wallet service key, treasury key, cron secret) are optional at
//! startup: handlers that need a missing secret answer 500 at call time,
//! which keeps the rest of the API usable in partial deployments.

use alloy_primitives::Address;
use std::path::PathBuf;
use thiserror::Error;

/// Base Sepolia, the demo chain.
pub const DEFAULT_CHAIN_ID: u64 = 84532;

/// Default public RPC for the demo chain.
const DEFAULT_RPC_URL: &str = "https://sepolia.base.org";

/// USDC on Base Sepolia.
const DEFAULT_USDC: &str = "0x036cbd53842c5426634e7929541ec2318f3dcf7e";

/// Demo mock token minted as the "purchased" asset.
const DEFAULT_MOCK_TOKEN: &str = "0xbabe0001489722187fbaf0689c47b2f5e97545c5";

/// Demo recipient of DCA spends; a DEX router in a real deployment.
const DEFAULT_TREASURY_SINK: &str = "0x000000000000000000000000000000000000dead";

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric env var did not parse.
    #[error("invalid value for {0}: {1}")]
    InvalidNumber(&'static str, String),

    /// An address env var did not parse.
    #[error("invalid address for {0}: {1}")]
    InvalidAddress(&'static str, String),
}

/// Shield recovery-session credentials. All three parts are required for
/// the recovery endpoint to function.
#[derive(Debug, Clone)]
pub struct ShieldConfig {
    pub publishable_key: String,
    pub secret_key: String,
    pub encryption_share: String,
}

/// x402 paywall settings advertised in 402 responses.
#[derive(Debug, Clone)]
pub struct PaywallConfig {
    pub pay_to: String,
    pub network: String,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub max_amount_required: String,
    pub max_timeout_seconds: Option<u64>,
    pub asset: String,
    pub asset_name: String,
    pub asset_version: String,
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds on.
    pub port: u16,
    /// Path of the redb DCA store.
    pub store_path: PathBuf,
    /// Chain id; used for typed-data domains and transaction signing.
    pub chain_id: u64,
    /// Public node RPC.
    pub rpc_url: String,
    /// Sponsored bundler/paymaster RPC.
    pub bundler_url: String,
    /// Publishable key sent as a bearer token to the bundler RPC.
    pub publishable_key: Option<String>,
    /// Sponsorship policy id forwarded to the paymaster.
    pub policy_id: Option<String>,
    /// Wallet service base URL (sessions, backend wallets, shield).
    pub wallet_service_url: String,
    /// Wallet service API secret.
    pub wallet_secret_key: Option<String>,
    /// Shield recovery credentials.
    pub shield: Option<ShieldConfig>,
    /// Shared secret for the cron execution endpoint.
    pub cron_secret: Option<String>,
    /// Private key (hex) of the airdrop treasury EOA.
    pub treasury_key: Option<String>,
    /// USDC token contract.
    pub usdc_address: Address,
    /// Mock token contract minted by DCA purchases.
    pub mock_token_address: Address,
    /// Where DCA spends are sent.
    pub treasury_sink: Address,
    /// Seconds between DCA purchases; matches the external cron interval.
    pub dca_frequency_secs: u64,
    /// Allowed CORS origins; empty means any.
    pub allowed_origins: Vec<String>,
    /// Airdrop faucet requests allowed per minute.
    pub airdrop_per_minute: u32,
    /// Paywall settings.
    pub paywall: PaywallConfig,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name, raw)),
        None => Ok(default),
    }
}

fn address(name: &'static str, default: &str) -> Result<Address, ConfigError> {
    let raw = var(name).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::InvalidAddress(name, raw))
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let shield = match (
            var("SHIELD_PUBLISHABLE_KEY"),
            var("SHIELD_SECRET_KEY"),
            var("SHIELD_ENCRYPTION_SHARE"),
        ) {
            (Some(publishable_key), Some(secret_key), Some(encryption_share)) => {
                Some(ShieldConfig {
                    publishable_key,
                    secret_key,
                    encryption_share,
                })
            }
            _ => None,
        };

        let allowed_origins = var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port: number("PORT", 3001)?,
            store_path: var("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("caliburd.redb")),
            chain_id: number("CHAIN_ID", DEFAULT_CHAIN_ID)?,
            rpc_url: var("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            bundler_url: var("BUNDLER_RPC_URL")
                .unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            publishable_key: var("PUBLISHABLE_KEY"),
            policy_id: var("POLICY_ID"),
            wallet_service_url: var("WALLET_SERVICE_URL")
                .unwrap_or_else(|| "https://api.openfort.io".to_string()),
            wallet_secret_key: var("WALLET_SECRET_KEY"),
            shield,
            cron_secret: var("CRON_SECRET"),
            treasury_key: var("TREASURY_PRIVATE_KEY"),
            usdc_address: address("USDC_ADDRESS", DEFAULT_USDC)?,
            mock_token_address: address("MOCK_TOKEN_ADDRESS", DEFAULT_MOCK_TOKEN)?,
            treasury_sink: address("TREASURY_SINK_ADDRESS", DEFAULT_TREASURY_SINK)?,
            dca_frequency_secs: number("DCA_FREQUENCY_SECONDS", 60)?,
            allowed_origins,
            airdrop_per_minute: number("AIRDROP_PER_MINUTE", 10)?,
            paywall: PaywallConfig {
                pay_to: var("PAY_TO_ADDRESS").unwrap_or_default(),
                network: var("X402_NETWORK").unwrap_or_else(|| "base-sepolia".to_string()),
                resource: var("X402_RESOURCE").unwrap_or_default(),
                description: var("X402_DESCRIPTION")
                    .unwrap_or_else(|| "Premium content".to_string()),
                mime_type: var("X402_MIME_TYPE")
                    .unwrap_or_else(|| "application/json".to_string()),
                max_amount_required: var("X402_MAX_AMOUNT")
                    .unwrap_or_else(|| "10000".to_string()),
                max_timeout_seconds: match var("X402_TIMEOUT") {
                    Some(raw) => Some(
                        raw.parse()
                            .map_err(|_| ConfigError::InvalidNumber("X402_TIMEOUT", raw))?,
                    ),
                    None => None,
                },
                asset: var("X402_ASSET_ADDRESS").unwrap_or_else(|| DEFAULT_USDC.to_string()),
                asset_name: var("X402_ASSET_NAME").unwrap_or_else(|| "USDC".to_string()),
                asset_version: var("X402_ASSET_VERSION").unwrap_or_else(|| "2".to_string()),
            },
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
