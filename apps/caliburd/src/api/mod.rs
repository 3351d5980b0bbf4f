//! # HTTP API
//!
//! Router, shared state, and the handlers. Routes mirror the frontend demo:
//!
//! - `GET  /api/health` — liveness
//! - `POST /api/shield-session` — embedded-wallet recovery session
//! - `POST /api/airdrop` — rate-limited test-token faucet
//! - `GET|POST /api/dca` — DCA status and enablement
//! - `GET|POST /api/dca/execute` — cron batch run and manual single run
//! - `GET|POST /api/content` — x402-paywalled content

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use calibur_core::store::{DcaStore, StoreError};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::json;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod airdrop;
pub mod auth;
pub mod dca;
pub mod error;
pub mod paywall;
pub mod shield;

use crate::bundler::BundlerClient;
use crate::config::Config;
use crate::rpc::RpcClient;
use crate::wallet::WalletClient;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<DcaStore>,
    pub rpc: Arc<RpcClient>,
    pub wallet: Arc<WalletClient>,
    pub bundler: Arc<BundlerClient>,
    pub airdrop_limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    /// Build state from configuration, opening the store.
    pub fn new(config: Config) -> Result<Self, StoreError> {
        let store = DcaStore::open(&config.store_path)?;
        let rpc = RpcClient::new(config.rpc_url.clone());
        let wallet = WalletClient::new(
            config.wallet_service_url.clone(),
            config.wallet_secret_key.clone(),
        );
        let bundler = BundlerClient::new(
            config.bundler_url.clone(),
            config.publishable_key.clone(),
            config.chain_id,
        )
        .with_policy(config.policy_id.clone());
        let quota = Quota::per_minute(
            NonZeroU32::new(config.airdrop_per_minute).unwrap_or(NonZeroU32::MIN),
        );
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            rpc: Arc::new(rpc),
            wallet: Arc::new(wallet),
            bundler: Arc::new(bundler),
            airdrop_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/shield-session", post(shield::create_session))
        .route("/api/airdrop", post(airdrop::request_airdrop))
        .route("/api/dca", get(dca::status).post(dca::configure))
        .route("/api/dca/execute", get(dca::run_batch).post(dca::run_once))
        .route("/api/content", get(paywall::content).post(paywall::content))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "caliburd listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install ctrl-c handler");
    }
}

/// `GET /api/health`
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "caliburd",
        "chainId": state.config.chain_id,
    }))
}
