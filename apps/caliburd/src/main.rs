//! # Caliburd
//!
//! Session-key backend for Calibur smart accounts: DCA scheduling over
//! sponsored user operations, a test-token faucet, shield recovery
//! sessions, and an x402-paywalled demo endpoint.

use caliburd::api::{self, AppState};
use caliburd::cli::{
    cmd_agents_list, cmd_decode_payment, cmd_hash_key, cmd_settings_pack, cmd_settings_unpack,
    Cli, Command, SettingsAction,
};
use caliburd::config::Config;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("caliburd=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    // A missing .env is the normal production case.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Serve => run_server().await,
        Command::HashKey {
            agent,
            key_type,
            public_key,
        } => cmd_hash_key(agent.as_deref(), key_type, public_key.as_deref(), cli.json)
            .map(Some)
            .map_err(|err| err.to_string()),
        Command::Settings { action } => match action {
            SettingsAction::Pack {
                admin,
                expiration,
                hook,
            } => cmd_settings_pack(admin, expiration, &hook, cli.json)
                .map(Some)
                .map_err(|err| err.to_string()),
            SettingsAction::Unpack { word } => cmd_settings_unpack(&word, cli.json)
                .map(Some)
                .map_err(|err| err.to_string()),
        },
        Command::Agents { store } => cmd_agents_list(&store, cli.json)
            .map(Some)
            .map_err(|err| err.to_string()),
        Command::DecodePayment { header } => cmd_decode_payment(&header, cli.json)
            .map(Some)
            .map_err(|err| err.to_string()),
    };

    match outcome {
        Ok(Some(output)) => println!("{output}"),
        Ok(None) => {}
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(1);
        }
    }
}

async fn run_server() -> Result<Option<String>, String> {
    let config = Config::from_env().map_err(|err| err.to_string())?;
    let state = AppState::new(config).map_err(|err| err.to_string())?;
    api::serve(state).await.map_err(|err| err.to_string())?;
    Ok(None)
}
