use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Discord login gateway that provisions panel accounts on first sign-in
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides HTTP_PORT)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Directory holding the store file (overrides STATE_PATH)
    #[arg(long)]
    state_path: Option<String>,

    /// Keep users and the email index in memory only (for local testing)
    #[arg(long)]
    ephemeral: bool,

    /// Validate configuration and exit
    #[arg(long)]
    check_config: bool,
}

mod config;
mod error;
mod gateway;
mod logging;
mod models;
mod provisioning;
mod state;
mod web;

#[cfg(test)]
mod test_support;

use config::GatewayConfig;
use gateway::AuthGateway;
use logging::TracingLogSink;
use provisioning::{AccountProvisioner, HttpPanelClient, RandomCredentials};
use state::{JsonFileStore, MemoryStore, SharedKvStore};

/// How often expired sessions are purged
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    logging::init_tracing();

    let config = GatewayConfig::from_env()?;
    info!(
        "Panel API at {}, generated passwords are {} characters",
        config.panel.url, config.panel.password_length
    );
    info!("Discord callback URL: {}", config.discord.callback_url);

    if args.check_config {
        info!("--check-config: configuration is valid");
        return Ok(());
    }

    let store: SharedKvStore = if args.ephemeral {
        warn!("--ephemeral: users and the email index will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        let state_path = args
            .state_path
            .or_else(|| std::env::var("STATE_PATH").ok())
            .unwrap_or_else(|| "state".to_string());

        // Ensure state directory exists
        tokio::fs::create_dir_all(&state_path).await.ok();

        let store_path = format!("{}/panel_store.json", state_path);
        info!("Loading store from {}...", store_path);
        let store = JsonFileStore::open(&store_path).await?;
        info!("Store has {} entries", store.len().await);
        Arc::new(store)
    };

    let http_client = reqwest::Client::new();
    let panel = Arc::new(HttpPanelClient::new(&config.panel, http_client.clone()));
    let provisioner = AccountProvisioner::new(
        store.clone(),
        panel,
        Arc::new(RandomCredentials),
        config.panel.password_length,
    );

    let sessions = web::create_session_store();
    let provider = Arc::new(web::DiscordOAuth::new(config.discord.clone(), http_client));

    let gateway = AuthGateway::new(
        provider,
        provisioner,
        store,
        sessions.clone(),
        Arc::new(TracingLogSink),
        config.default_return_to.clone(),
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sessions.cleanup_expired();
            if removed > 0 {
                info!("Removed {} expired sessions", removed);
            }
        }
    });

    let mut web_config = web::WebServerConfig::from_env();
    if let Some(port) = args.port {
        web_config.port = port;
    }

    let state = web::AppState {
        gateway: Arc::new(gateway),
    };

    if let Err(e) = web::start_web_server(web_config, state).await {
        error!("Web server error: {}", e);
        return Err(e);
    }

    warn!("Web server ended.");
    Ok(())
}
