//! # DCA scheduler
//!
//! Dollar-cost-averaging over session keys. The user registers a backend
//! agent wallet as a non-admin session key on their smart account; the
//! executor then spends on their behalf through sponsored user operations.
//!
//! Enablement is read from the chain (the key registry is the source of
//! truth); the store only carries schedule parameters and history. A user
//! who revoked their agent key onchain is dropped from the executor roster
//! on the next run.

use alloy_primitives::{keccak256, Address, B256, U256};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use calibur_core::store::{DcaConfig, DcaPurchase};
use calibur_core::{calls, units, Call, KeyType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::account::SessionAccount;
use crate::api::auth::{authorize_address, check_cron_secret};
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::wallet::RemoteSigner;

/// How long the executor waits for a purchase receipt.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// USDC decimals.
const USDC_DECIMALS: u32 = 6;

/// Mock purchase-token decimals.
const TOKEN_DECIMALS: u32 = 18;

/// Largest accepted purchase interval: one year.
const MAX_FREQUENCY_SECS: u64 = 31_536_000;

/// Largest accepted spend per purchase, in USDC atoms (1M USDC).
const MAX_SPEND_ATOMS: u64 = 1_000_000_000_000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
        .unwrap_or(0)
}

// =============================================================================
// PRICE ORACLE
// =============================================================================

/// Simulated spot price in integer cents, deterministic in the timestamp.
///
/// Derived from a keccak of the millisecond clock so repeated runs in the
/// same millisecond price identically. Range is 2800.00 to 3199.99.
fn simulated_price_cents(now_ms: u64) -> u64 {
    let digest = keccak256(now_ms.to_be_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    280_000 + u64::from_be_bytes(word) % 40_000
}

fn format_price(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Token output in wei for a USDC spend at the given price.
///
/// `usdc_atoms * 10^18 / (10^6 * price_cents / 100)`, folded into integer
/// arithmetic as `usdc_atoms * 10^14 / price_cents`.
fn token_out_wei(usdc_atoms: U256, price_cents: u64) -> U256 {
    usdc_atoms * U256::from(10u8).pow(U256::from(14u8)) / U256::from(price_cents)
}

// =============================================================================
// SCHEDULE BOUNDS
// =============================================================================

/// Parse and bound a spend amount. Used at configure time and again by the
/// executor, so a stored schedule can never carry a spend the pipeline
/// cannot price.
fn parse_spend(amount: &str) -> Result<U256, ApiError> {
    let atoms = units::parse_units(amount, USDC_DECIMALS)
        .map_err(|_| ApiError::BadRequest(format!("Invalid amount: {amount}")))?;
    if atoms.is_zero() || atoms > U256::from(MAX_SPEND_ATOMS) {
        return Err(ApiError::BadRequest(format!(
            "Amount out of range: {amount}"
        )));
    }
    Ok(atoms)
}

/// The "due" window: 80% of the configured frequency, in milliseconds, so a
/// cron tick that lands slightly early does not push every purchase a full
/// interval late. Saturates so a stored out-of-range frequency skips the
/// entry instead of tearing down the batch.
fn purchase_window_ms(frequency_secs: u64) -> u64 {
    frequency_secs.saturating_mul(800)
}

// =============================================================================
// CHAIN STATE
// =============================================================================

/// The active DCA agent on `account`, if any: the first registered
/// secp256k1 key that is neither admin nor expired.
async fn find_active_agent(
    state: &AppState,
    account: Address,
    now_secs: u64,
) -> Result<Option<(Address, B256)>, ApiError> {
    for (key, key_hash) in state.rpc.registered_keys(account).await? {
        if key.key_type != KeyType::Secp256k1 {
            continue;
        }
        let settings = state.rpc.key_settings(account, key_hash).await?;
        if settings.is_admin || settings.is_expired(now_secs) {
            continue;
        }
        let agent = calibur_core::keys::agent_address(&key)?;
        return Ok(Some((agent, key_hash)));
    }
    Ok(None)
}

/// Whether a specific agent address is still an active session key.
///
/// Cheaper than a full registry scan: one `isRegistered` probe on the
/// agent's key hash, then its settings.
async fn agent_is_active(
    state: &AppState,
    account: Address,
    agent: Address,
    now_secs: u64,
) -> Result<bool, ApiError> {
    let key_hash = calibur_core::keys::hash_key(&calibur_core::Key::secp256k1(agent));
    if !state.rpc.is_registered(account, key_hash).await? {
        return Ok(false);
    }
    let settings = state.rpc.key_settings(account, key_hash).await?;
    Ok(!settings.is_admin && !settings.is_expired(now_secs))
}

// =============================================================================
// STATUS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaStatus {
    enabled: bool,
    amount: String,
    frequency_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_address: Option<Address>,
    last_purchase_ms: u64,
    purchases: Vec<DcaPurchase>,
}

impl DcaStatus {
    fn from_parts(enabled: bool, agent: Option<Address>, cached: Option<DcaConfig>) -> Self {
        let cached = cached.unwrap_or_else(|| DcaConfig {
            enabled: false,
            amount: "1".to_string(),
            frequency_secs: 30,
            purchases: Vec::new(),
            last_purchase_ms: 0,
            agent_address: None,
            agent_id: None,
        });
        Self {
            enabled,
            amount: cached.amount,
            frequency_secs: cached.frequency_secs,
            agent_address: agent.or(cached.agent_address),
            last_purchase_ms: cached.last_purchase_ms,
            purchases: cached.purchases,
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid address: {raw}")))
}

/// `GET /api/dca?address=0x..`
///
/// Enablement comes from the key registry; when the chain is unreachable
/// the cached schedule is reported as disabled rather than failing the
/// request.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Json<DcaStatus>, ApiError> {
    let address = query
        .address
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Missing address query parameter".into()))?;
    let address = parse_address(address)?;
    authorize_address(&state, &headers, address).await?;

    let cached = state.store.get(address)?;
    match find_active_agent(&state, address, now_ms() / 1000).await {
        Ok(active) => {
            let enabled = active.is_some();
            let agent = active.map(|(agent, _)| agent);
            Ok(Json(DcaStatus::from_parts(enabled, agent, cached)))
        }
        Err(err) => {
            tracing::warn!(error = %err, %address, "key registry scan failed, reporting cached state as disabled");
            Ok(Json(DcaStatus::from_parts(false, None, cached)))
        }
    }
}

// =============================================================================
// CONFIGURE
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    address: String,
    enabled: bool,
    amount: Option<String>,
    frequency_secs: Option<u64>,
}

/// `POST /api/dca`
///
/// Enabling provisions (or reuses) a backend agent wallet and stores the
/// schedule; the client then registers the agent as a session key onchain.
/// Disabling marks the schedule inactive; the client revokes the key.
pub async fn configure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&request.address)?;
    authorize_address(&state, &headers, address).await?;

    let existing = state.store.get(address)?;

    if !request.enabled {
        if let Some(mut config) = existing {
            config.enabled = false;
            state.store.set(address, &config)?;
        }
        tracing::info!(%address, "dca disabled");
        return Ok(Json(json!({ "enabled": false })));
    }

    // Validate before storing so the executor never sees a bad schedule.
    if let Some(amount) = &request.amount {
        parse_spend(amount)?;
    }
    if let Some(frequency) = request.frequency_secs {
        if frequency == 0 || frequency > MAX_FREQUENCY_SECS {
            return Err(ApiError::BadRequest(format!(
                "Frequency out of range: {frequency}"
            )));
        }
    }

    // Reuse the existing agent wallet when one was provisioned before and
    // the wallet service still knows it; otherwise provision a fresh one.
    let reusable = match existing
        .as_ref()
        .and_then(|config| config.agent_id.clone().zip(config.agent_address))
    {
        Some((id, addr)) => match state.wallet.get_backend_wallet(&id).await {
            Ok(_) => Some((id, addr)),
            Err(err) => {
                tracing::warn!(error = %err, %address, "stored agent wallet is gone, reprovisioning");
                None
            }
        },
        None => None,
    };
    let (agent_id, agent_address) = match reusable {
        Some(agent) => agent,
        None => {
            let wallet = state.wallet.create_backend_wallet().await?;
            tracing::info!(%address, agent = %wallet.address, "provisioned dca agent wallet");
            (wallet.id, wallet.address)
        }
    };

    let previous = existing.unwrap_or(DcaConfig {
        enabled: false,
        amount: "1".to_string(),
        frequency_secs: state.config.dca_frequency_secs,
        purchases: Vec::new(),
        last_purchase_ms: 0,
        agent_address: None,
        agent_id: None,
    });
    let config = DcaConfig {
        enabled: true,
        amount: request.amount.unwrap_or(previous.amount),
        frequency_secs: request.frequency_secs.unwrap_or(previous.frequency_secs),
        agent_address: Some(agent_address),
        agent_id: Some(agent_id),
        purchases: previous.purchases,
        last_purchase_ms: previous.last_purchase_ms,
    };
    state.store.set(address, &config)?;

    Ok(Json(json!({
        "enabled": true,
        "agentAddress": agent_address,
        "amount": config.amount,
        "frequencySecs": config.frequency_secs,
    })))
}

// =============================================================================
// EXECUTION
// =============================================================================

/// One purchase: USDC to the treasury sink, mock token minted back.
async fn execute_purchase(
    state: &AppState,
    user: Address,
    config: &mut DcaConfig,
) -> Result<B256, ApiError> {
    let (agent_id, agent_address) = config
        .agent_id
        .clone()
        .zip(config.agent_address)
        .ok_or_else(|| ApiError::BadRequest("DCA agent has not been provisioned".into()))?;

    let usdc_atoms = parse_spend(&config.amount)?;
    let started_ms = now_ms();
    let price_cents = simulated_price_cents(started_ms);
    let out_wei = token_out_wei(usdc_atoms, price_cents);

    let batch: Vec<Call> = vec![
        calls::erc20_transfer(state.config.usdc_address, state.config.treasury_sink, usdc_atoms),
        calls::erc20_mint(state.config.mock_token_address, user, out_wei),
    ];

    let signer = RemoteSigner::new(Arc::clone(&state.wallet), agent_id);
    let account = SessionAccount::for_agent(
        Arc::clone(&state.rpc),
        signer,
        user,
        agent_address,
        Some(state.config.chain_id),
    );

    let fees = state.rpc.suggested_fees().await?;
    let hash = state
        .bundler
        .send_user_operation(&account, &batch, fees)
        .await?;
    let receipt = state.bundler.wait_for_receipt(hash, RECEIPT_TIMEOUT).await;
    let tx_hash = match receipt {
        Ok(receipt) => Some(receipt.receipt.transaction_hash.to_string()),
        Err(err) => {
            // Submitted but not yet included; record the purchase anyway.
            tracing::warn!(error = %err, user_op_hash = %hash, "purchase receipt not seen in time");
            None
        }
    };

    config.purchases.push(DcaPurchase {
        timestamp_secs: started_ms / 1000,
        usdc_spent: config.amount.clone(),
        token_received: units::format_units(out_wei, TOKEN_DECIMALS),
        price: format_price(price_cents),
        tx_hash,
    });
    config.last_purchase_ms = started_ms;
    state.store.set(user, config)?;

    tracing::info!(%user, user_op_hash = %hash, price = %format_price(price_cents), "dca purchase executed");
    Ok(hash)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEntry {
    address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_op_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// `GET /api/dca/execute` — the cron entry point.
///
/// Walks the enrolled roster; for each user checks the purchase window and
/// the onchain key, executes when due, and unenrolls users whose agent key
/// is gone. A failure for one user never aborts the batch.
pub async fn run_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    check_cron_secret(&state, &headers)?;

    let mut results = Vec::new();
    let mut executed = 0u32;
    for address in state.store.list_agents()? {
        let entry = run_batch_entry(&state, address).await;
        match entry {
            Ok(Some(hash)) => {
                executed += 1;
                results.push(BatchEntry {
                    address,
                    user_op_hash: Some(hash),
                    skipped: None,
                    error: None,
                });
            }
            Ok(None) => results.push(BatchEntry {
                address,
                user_op_hash: None,
                skipped: Some("not due"),
                error: None,
            }),
            Err(err) => {
                tracing::error!(error = %err, %address, "dca batch entry failed");
                results.push(BatchEntry {
                    address,
                    user_op_hash: None,
                    skipped: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    Ok(Json(json!({ "executed": executed, "results": results })))
}

/// One roster entry of the batch. `Ok(None)` means skipped.
async fn run_batch_entry(state: &AppState, address: Address) -> Result<Option<B256>, ApiError> {
    let Some(mut config) = state.store.get(address)? else {
        return Ok(None);
    };
    let Some(agent) = config.agent_address.filter(|_| config.enabled) else {
        return Ok(None);
    };

    let now = now_ms();
    let window_ms = purchase_window_ms(config.frequency_secs);
    if config.last_purchase_ms > 0 && now.saturating_sub(config.last_purchase_ms) < window_ms {
        return Ok(None);
    }

    if !agent_is_active(state, address, agent, now / 1000).await? {
        tracing::info!(%address, "agent key revoked or expired onchain, unenrolling");
        state.store.remove(address)?;
        return Ok(None);
    }

    execute_purchase(state, address, &mut config).await.map(Some)
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    address: String,
}

/// `POST /api/dca/execute` — immediate single purchase, user-triggered.
pub async fn run_once(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&request.address)?;
    authorize_address(&state, &headers, address).await?;

    let mut config = state
        .store
        .get(address)?
        .filter(|config| config.enabled)
        .ok_or_else(|| ApiError::BadRequest("DCA is not enabled for this address".into()))?;
    let agent = config
        .agent_address
        .ok_or_else(|| ApiError::BadRequest("DCA agent has not been provisioned".into()))?;
    if !agent_is_active(&state, address, agent, now_ms() / 1000).await? {
        return Err(ApiError::BadRequest(
            "DCA agent key is not active onchain".into(),
        ));
    }

    let hash = execute_purchase(&state, address, &mut config).await?;
    let purchase = config.purchases.last().cloned();
    Ok(Json(json!({
        "success": true,
        "userOpHash": hash,
        "purchase": purchase,
    })))
}

// =============================================================================
// TESTS
// =============================================================================
