mod api;

use anyhow::Context;
use api::AppState;
use ic_chain_substrate::RpcConnector;
use ic_contract_client::{ClientConfig, ContractClient, SimulatedState};
use ic_signer::{KeyringProvider, SignerGateway, SignerProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?;
    let signers = Arc::new(SignerGateway::default());
    match env_value("COUNTER_SIGNER_SEED") {
        Some(seed) => {
            let provider: Arc<dyn SignerProvider> =
                Arc::new(KeyringProvider::from_seed_hex("keyring", &seed).context("COUNTER_SIGNER_SEED")?);
            signers.install(provider).await;
        }
        None => warn!("COUNTER_SIGNER_SEED not set; increment/decrement will be refused"),
    }

    let connector = RpcConnector::with_timeout(config.call_timeout)?;
    let mut client = ContractClient::new(config, Arc::new(connector), signers, SimulatedState::new());
    let mode = client.initialize().await;
    info!("counter client initialized in {:?} mode", mode);

    let state = AppState::new(client);
    let app = api::router(state.clone());

    let addr: SocketAddr = env_value("COUNTER_LISTEN_ADDR")
        .as_deref()
        .unwrap_or(DEFAULT_LISTEN_ADDR)
        .parse()
        .context("COUNTER_LISTEN_ADDR must be host:port")?;
    info!("counter-service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
