//! CCOIN Wallet CLI
//!
//! Drives the Phantom handshake from a terminal. Each invocation is one step;
//! handshake state lives in the store file between steps.

mod args;
mod commands;

use clap::Parser;
use tracing::info;

use args::Args;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wallet_cli=info".parse()?)
                .add_directive("wallet_handshake=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = commands::resolve_config(&args)?;
    info!(cluster = %config.cluster, store = %config.store_path.display(), "Loaded configuration");

    let mut client = commands::build_client(config, args.print_only)?;
    let output = commands::execute(&mut client, args.command)?;
    println!("{}", output);

    Ok(())
}
