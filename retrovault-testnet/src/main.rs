//! Run a localnet ledger node for manual CLI runs.

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use retrovault_testnet::{LedgerNode, OPERATION_FEE};

#[derive(Parser, Debug)]
#[command(about = "A local Retrovault ledger node")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8899")]
    listen: SocketAddr,

    /// Fund this base58 account from the faucet at boot.
    #[arg(long)]
    fund: Vec<retrovault::Address>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "retrovault_testnet=debug,retrovault=debug".to_string()),
        )
        .init();

    let args = Args::parse();
    let node = LedgerNode::new();
    for address in &args.fund {
        node.credit(address, OPERATION_FEE * 1_000_000);
        tracing::info!(%address, "funded from faucet");
    }

    let handle = node.spawn_at(args.listen).await?;
    tracing::info!("Ledger node running");
    tracing::info!("RPC: {}", handle.url());

    tokio::signal::ctrl_c().await?;
    Ok(())
}
