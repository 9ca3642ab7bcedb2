//! Command handlers

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use crypto_session::decode_base58;
use deeplink_protocol::{MessageDisplay, RedirectParams, SendOptions};
use session_store::{FileStore, HandshakeStore, KeyValueStore};
use tracing::debug;
use wallet_handshake::{
    FallbackOpener, HandshakeClient, HandshakeConfig, LinkOpener, RecordingOpener, routes,
};

use crate::args::{Args, Command};

pub type CliClient = HandshakeClient<FileStore, Arc<dyn LinkOpener>>;

/// Environment configuration with command line flags on top
pub fn resolve_config(args: &Args) -> anyhow::Result<HandshakeConfig> {
    let mut config = HandshakeConfig::from_env()?;
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut HandshakeConfig, args: &Args) {
    if let Some(cluster) = args.cluster {
        config.cluster = cluster;
    }
    if let Some(store) = &args.store {
        config.store_path = store.clone();
    }
    if let Some(redirect) = &args.redirect_url {
        config.redirect_base = redirect.clone();
    }
    if let Some(app_url) = &args.app_url {
        config.app_url = app_url.clone();
    }
    if let Some(ms) = args.expiry_ms {
        config.session_expiry = (ms > 0).then(|| Duration::from_millis(ms));
    }
}

pub fn build_client(config: HandshakeConfig, print_only: bool) -> anyhow::Result<CliClient> {
    let kv = FileStore::open(&config.store_path)
        .with_context(|| format!("opening {}", config.store_path.display()))?;

    let opener: Arc<dyn LinkOpener> = if print_only {
        Arc::new(RecordingOpener::new())
    } else {
        Arc::new(FallbackOpener::from_host_command(config.host_opener.as_deref())?)
    };

    Ok(HandshakeClient::new(config, HandshakeStore::new(kv), opener)?)
}

/// Run one command, returning what to print
pub fn execute<S: KeyValueStore, O: LinkOpener>(
    client: &mut HandshakeClient<S, O>,
    command: Command,
) -> anyhow::Result<String> {
    match command {
        Command::Connect => {
            let url = client.connect()?;
            Ok(url.to_string())
        }

        Command::Complete { redirect } => {
            let params = RedirectParams::from_url(&redirect);
            let route = redirect
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default();
            debug!(route, "Completing redirect");

            match route {
                routes::CONNECTED => {
                    let session = client.complete_connect(&params)?;
                    Ok(format!("Connected to {}", session.wallet_address))
                }
                routes::SIGNED => {
                    let response = client.complete_sign_and_send(&params)?;
                    Ok(format!("Transaction signature: {}", response.signature))
                }
                routes::MESSAGE_SIGNED => {
                    let response = client.complete_sign_message(&params)?;
                    Ok(format!(
                        "Message signed by {}: {}",
                        response.public_key, response.signature
                    ))
                }
                routes::DISCONNECTED => {
                    client.complete_disconnect(&params)?;
                    Ok("Wallet acknowledged disconnect".to_string())
                }
                other => bail!("unrecognized redirect route {:?}", other),
            }
        }

        Command::Status => {
            let status = client.status()?;
            Ok(serde_json::to_string_pretty(&status)?)
        }

        Command::SignAndSend {
            transaction,
            skip_preflight,
            max_retries,
        } => {
            let tx = decode_base58(&transaction).context("transaction must be base58")?;
            let options = (skip_preflight || max_retries.is_some()).then(|| SendOptions {
                skip_preflight: skip_preflight.then_some(true),
                max_retries,
                ..Default::default()
            });
            let url = client.sign_and_send(&tx, options)?;
            Ok(url.to_string())
        }

        Command::SignMessage { message, hex } => {
            let display = if hex {
                MessageDisplay::Hex
            } else {
                MessageDisplay::Utf8
            };
            let url = client.sign_message(message.as_bytes(), display)?;
            Ok(url.to_string())
        }

        Command::Disconnect => match client.disconnect()? {
            Some(url) => Ok(url.to_string()),
            None => Ok("No session; local state cleared".to_string()),
        },
    }
}
