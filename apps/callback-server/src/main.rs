//! CCOIN Callback Server
//!
//! Receives Phantom's redirects on localhost and completes the handshake.

mod app;

use std::net::SocketAddr;
use std::sync::Arc;

use session_store::{FileStore, HandshakeStore, KeyValueStore};
use tracing::info;
use wallet_handshake::{FallbackOpener, HandshakeClient, HandshakeConfig, LinkOpener};

use app::AppState;

const CALLBACK_ADDR_ENV: &str = "CCOIN_CALLBACK_ADDR";
const DEFAULT_CALLBACK_ADDR: &str = "127.0.0.1:8787";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("callback_server=debug".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    info!("Starting CCOIN Callback Server");

    let config = HandshakeConfig::from_env()?;
    let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.store_path)?);
    let opener: Arc<dyn LinkOpener> =
        Arc::new(FallbackOpener::from_host_command(config.host_opener.as_deref())?);
    info!(store = %config.store_path.display(), "Using handshake store");

    let client = HandshakeClient::new(config, HandshakeStore::new(kv), opener)?;
    info!(state = ?client.state(), "Resumed handshake state");

    let app = app::router(AppState::new(client));

    let addr: SocketAddr = std::env::var(CALLBACK_ADDR_ENV)
        .unwrap_or_else(|_| DEFAULT_CALLBACK_ADDR.to_string())
        .parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
