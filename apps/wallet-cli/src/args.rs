use std::path::PathBuf;

use clap::{Parser, Subcommand};
use deeplink_protocol::Cluster;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "ccoin-wallet")]
#[command(about = "Connect the CCOIN Mini-App to a Phantom wallet")]
pub struct Args {
    /// Solana cluster (overrides CCOIN_CLUSTER)
    #[arg(long, global = true)]
    pub cluster: Option<Cluster>,

    /// Handshake state file (overrides CCOIN_STORE_PATH)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Base URL the wallet redirects back to (overrides CCOIN_REDIRECT_URL)
    #[arg(long, global = true)]
    pub redirect_url: Option<Url>,

    /// Origin shown by the wallet (overrides CCOIN_APP_URL)
    #[arg(long, global = true)]
    pub app_url: Option<Url>,

    /// Session lifetime in milliseconds, 0 disables expiry
    #[arg(long, global = true)]
    pub expiry_ms: Option<u64>,

    /// Print links instead of opening them
    #[arg(long, global = true)]
    pub print_only: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a new connect attempt
    Connect,
    /// Finish a request from the wallet's redirect URL
    Complete {
        /// Full redirect URL as received from the wallet
        redirect: Url,
    },
    /// Show the current session
    Status,
    /// Ask the wallet to sign and submit a transaction
    SignAndSend {
        /// Serialized transaction, base58
        transaction: String,
        #[arg(long)]
        skip_preflight: bool,
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Ask the wallet to sign a message
    SignMessage {
        message: String,
        /// Display the message as hex in the wallet
        #[arg(long)]
        hex: bool,
    },
    /// End the session and wipe local state
    Disconnect,
}
