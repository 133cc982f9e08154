use std::net::SocketAddr;

use dreambig::identity::{FirebaseClient, FirebaseConfig};
use dreambig::server::{ExchangeConfig, FirebaseVerifier, InMemoryAccountStore, auth_routes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ExchangeConfig::from_env()?;
    let verifier = FirebaseVerifier::from_env()?;
    let admin = FirebaseClient::new(FirebaseConfig::from_env()?);
    let accounts = InMemoryAccountStore::default();

    let app = auth_routes(config, verifier, admin, accounts);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_owned())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "DreamBig auth service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
