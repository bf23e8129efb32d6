//! The `retrovault` binary: publish, fetch and browse cartridges from the
//! terminal.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use retrovault::{
    Address, CartridgeClient, ConflictError, ContentId, Error as SdkError, Keypair, Network,
};
use url::Url;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "retrovault", version, about = "Content-addressed cartridge store")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Target cluster.
    #[arg(long, global = true, default_value = "devnet")]
    network: Network,

    /// RPC endpoint(s); the first is the primary, the rest fallbacks.
    /// Defaults to the network's public endpoint.
    #[arg(long, global = true)]
    url: Vec<Url>,

    /// Websocket endpoint for deployments fronting a subscription gateway.
    #[arg(long, global = true)]
    ws_url: Option<Url>,

    /// Path to a JSON keypair file (64-byte array).
    #[arg(long, global = true)]
    keypair: Option<PathBuf>,

    /// Directory for the persistent chunk cache.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog entries.
    List {
        /// Show one page only.
        #[arg(long, conflicts_with = "all")]
        page: Option<u32>,
        /// Walk every page.
        #[arg(long)]
        all: bool,
        /// Include entries flagged retired.
        #[arg(long)]
        include_retired: bool,
    },
    /// Show the manifest behind a content id.
    Info {
        /// Content id, 64 hex characters.
        content_id: ContentId,
    },
    /// Publish a file as a cartridge.
    Publish {
        /// The file to publish.
        path: PathBuf,
        /// Chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<u32>,
        /// Manifest metadata as a JSON document.
        #[arg(long)]
        metadata: Option<String>,
        /// Print the plan without submitting anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch a cartridge and write it to disk.
    Fetch {
        /// Content id, 64 hex characters.
        content_id: ContentId,
        /// Output path; defaults to `<content_id>.bin`.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip SHA-256 verification (diagnostics only).
        #[arg(long)]
        no_verify: bool,
    },
    /// Initialize the catalog (signer becomes admin).
    Init {
        /// Also create catalog page 0.
        #[arg(long)]
        create_page: bool,
    },
    /// Request funds from the faucet.
    Airdrop {
        /// Amount in base units.
        #[arg(long, default_value_t = 1_000_000)]
        amount: u64,
    },
    /// Show an account balance.
    Balance {
        /// Account to query; defaults to the keypair's.
        #[arg(long)]
        address: Option<Address>,
    },
    /// Print derived addresses.
    Pda(commands::PdaArgs),
}

fn build_client(global: &GlobalArgs) -> anyhow::Result<CartridgeClient> {
    let mut builder = CartridgeClient::builder().network(global.network);
    for url in &global.url {
        builder = builder.url(url.clone());
    }
    if let Some(path) = &global.keypair {
        builder = builder.keypair(Keypair::from_keypair_file(path)?);
    }
    if let Some(dir) = &global.cache_dir {
        builder = builder.cache_dir(dir.clone());
    }
    if let Some(ws) = &global.ws_url {
        tracing::debug!(%ws, "ws endpoint configured; the HTTP pipelines do not use it");
    }
    Ok(builder.build()?)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = build_client(&cli.global)?;
    match cli.command {
        Command::List {
            page,
            all,
            include_retired,
        } => commands::list(&client, page, all, include_retired).await,
        Command::Info { content_id } => commands::info(&client, &content_id).await,
        Command::Publish {
            path,
            chunk_size,
            metadata,
            dry_run,
        } => commands::publish(&client, &path, chunk_size, metadata, dry_run).await,
        Command::Fetch {
            content_id,
            output,
            no_verify,
        } => commands::fetch(&client, &content_id, output, no_verify).await,
        Command::Init { create_page } => commands::init(&client, create_page).await,
        Command::Airdrop { amount } => commands::airdrop(&client, amount).await,
        Command::Balance { address } => commands::balance(&client, address).await,
        Command::Pda(args) => commands::pda(&args),
    }
}

/// One line to stderr, plus the ledger program log when the node sent one.
fn report(error: &anyhow::Error) {
    eprintln!("error: {error:#}");
    if let Some(SdkError::Conflict(ConflictError::Program { logs, .. })) =
        error.downcast_ref::<SdkError>()
    {
        for line in logs {
            eprintln!("  {line}");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::FAILURE
        }
    }
}
