//! Command handlers.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use retrovault::{
    Address, CartridgeClient, ContentId, FetchOptions, PublishEvent, PublishOptions,
    PublishOutcome,
};
use retrovault_common::accounts::{CartridgeManifest, CatalogEntry};
use retrovault_common::address::{
    catalog_page_address, catalog_root_address, chunk_address, manifest_address,
};
use retrovault_common::constants::{DEFAULT_CHUNK_SIZE, MAX_BLOB_SIZE};

pub async fn list(
    client: &CartridgeClient,
    page: Option<u32>,
    all: bool,
    include_retired: bool,
) -> anyhow::Result<()> {
    let entries: Vec<CatalogEntry> = if all || page.is_none() {
        client.list_all(include_retired).await?
    } else {
        let page_index = page.unwrap_or(0);
        client
            .list_page(page_index, include_retired)
            .await?
            .with_context(|| format!("catalog page {page_index} does not exist"))?
    };

    if entries.is_empty() {
        println!("no cartridges");
        return Ok(());
    }
    for (position, entry) in entries.iter().enumerate() {
        let retired = if entry.is_retired() { "  [retired]" } else { "" };
        println!(
            "{position:4}  {}  {:>9} bytes  slot {}{}",
            entry.content_id, entry.blob_size, entry.created_slot, retired
        );
    }
    Ok(())
}

pub async fn info(client: &CartridgeClient, content_id: &ContentId) -> anyhow::Result<()> {
    let (address, manifest) = client
        .manifest_info(content_id)
        .await?
        .context("no manifest for this content id")?;
    print_manifest(&address, &manifest);
    Ok(())
}

fn print_manifest(address: &Address, manifest: &CartridgeManifest) {
    println!("content id:   {}", manifest.content_id);
    println!("manifest:     {address}");
    println!("blob size:    {} bytes", manifest.blob_size);
    println!(
        "chunks:       {} x {} bytes",
        manifest.chunk_count, manifest.chunk_size
    );
    println!("publisher:    {}", manifest.publisher);
    println!("created slot: {}", manifest.created_slot);
    println!(
        "finalized:    {}",
        if manifest.finalized { "yes" } else { "no" }
    );
    if !manifest.metadata.is_empty() {
        match std::str::from_utf8(&manifest.metadata) {
            Ok(text) => println!("metadata:     {text}"),
            Err(_) => println!("metadata:     {} opaque bytes", manifest.metadata.len()),
        }
    }
}

pub async fn publish(
    client: &CartridgeClient,
    path: &Path,
    chunk_size: Option<u32>,
    metadata: Option<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let blob = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);

    let metadata = match metadata {
        Some(text) => {
            let value: serde_json::Value =
                serde_json::from_str(&text).context("--metadata is not valid JSON")?;
            serde_json::to_vec(&value)?
        }
        None => vec![],
    };

    let content_id = ContentId::hash(&blob);
    let chunk_count = blob.len().div_ceil(chunk_size as usize);
    println!("content id: {content_id}");
    println!(
        "{} bytes in {chunk_count} chunk(s) of {chunk_size} bytes",
        blob.len()
    );

    if dry_run {
        anyhow::ensure!(
            blob.len() as u64 <= MAX_BLOB_SIZE,
            "blob exceeds the {MAX_BLOB_SIZE} byte limit"
        );
        match client.manifest_info(&content_id).await? {
            Some((_, manifest)) if manifest.finalized => {
                println!("already published and finalized; nothing to do")
            }
            Some(_) => println!("manifest exists but is open; publish would resume"),
            None => println!("not on the ledger; publish would start fresh"),
        }
        return Ok(());
    }

    let progress = Arc::new(|event: PublishEvent| match event {
        PublishEvent::Preparing => eprintln!("preparing…"),
        PublishEvent::Manifest => eprintln!("creating manifest…"),
        PublishEvent::Chunks {
            written,
            total,
            last_tx,
        } => match last_tx {
            Some(tx) => eprintln!("chunks {written}/{total}  {tx}"),
            None => eprintln!("chunks {written}/{total}"),
        },
        PublishEvent::Finalizing => eprintln!("finalizing…"),
        PublishEvent::Complete { .. } => eprintln!("done"),
    });

    let receipt = client
        .publish(
            blob,
            PublishOptions {
                chunk_size,
                metadata,
                skip_if_exists: true,
                progress: Some(progress),
                ..Default::default()
            },
        )
        .await?;

    match receipt.outcome {
        PublishOutcome::Published => println!(
            "published {} ({} transaction(s))",
            receipt.content_id,
            receipt.transactions.len()
        ),
        PublishOutcome::AlreadyExists => {
            println!("already published: {}", receipt.content_id)
        }
    }
    println!("manifest: {}", receipt.manifest_address);
    Ok(())
}

pub async fn fetch(
    client: &CartridgeClient,
    content_id: &ContentId,
    output: Option<PathBuf>,
    no_verify: bool,
) -> anyhow::Result<()> {
    let fetched = client
        .fetch(
            content_id,
            FetchOptions {
                skip_verify: no_verify,
                ..Default::default()
            },
        )
        .await?
        .context("no manifest for this content id")?;

    let path = output.unwrap_or_else(|| PathBuf::from(format!("{content_id}.bin")));
    std::fs::write(&path, &fetched.bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    println!(
        "wrote {} bytes to {}{}",
        fetched.bytes.len(),
        path.display(),
        if fetched.from_cache { " (from cache)" } else { "" }
    );
    Ok(())
}

pub async fn init(client: &CartridgeClient, create_page: bool) -> anyhow::Result<()> {
    let tx = client.init_catalog().await?;
    println!("catalog initialized: {tx}");
    if create_page {
        let tx = client.create_page(0).await?;
        println!("page 0 created: {tx}");
    }
    Ok(())
}

pub async fn airdrop(client: &CartridgeClient, amount: u64) -> anyhow::Result<()> {
    let keypair = client
        .keypair()
        .context("airdrop needs --keypair to know whom to fund")?;
    let address = Address::from_bytes(keypair.public_key().to_bytes());
    let tx = client.rpc().request_airdrop(&address, amount).await?;
    println!("airdropped {amount} to {address}: {tx}");
    Ok(())
}

pub async fn balance(client: &CartridgeClient, address: Option<Address>) -> anyhow::Result<()> {
    let address = match address {
        Some(address) => address,
        None => {
            let keypair = client
                .keypair()
                .context("balance needs --address or --keypair")?;
            Address::from_bytes(keypair.public_key().to_bytes())
        }
    };
    let balance = client.rpc().get_balance(&address).await?;
    println!("{address}: {balance}");
    Ok(())
}

/// Which derived address to print.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct PdaArgs {
    /// The catalog root singleton.
    #[arg(long)]
    pub catalog_root: bool,

    /// Catalog page N.
    #[arg(long, value_name = "N")]
    pub catalog_page: Option<u32>,

    /// Manifest of a content id.
    #[arg(long, value_name = "HEX")]
    pub manifest: Option<ContentId>,

    /// Chunk N of a content id, as `HEX:N`.
    #[arg(long, value_name = "HEX:N")]
    pub chunk: Option<ChunkRef>,
}

/// `HEX:N`: a content id plus chunk index.
#[derive(Debug, Clone)]
pub struct ChunkRef {
    content_id: ContentId,
    index: u32,
}

impl FromStr for ChunkRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hex, index) = s
            .split_once(':')
            .context("expected HEX:N, e.g. 2cf2…9824:0")?;
        Ok(Self {
            content_id: hex.parse().map_err(anyhow::Error::msg)?,
            index: index.parse().context("chunk index is not a number")?,
        })
    }
}

pub fn pda(args: &PdaArgs) -> anyhow::Result<()> {
    let (address, bump) = if args.catalog_root {
        catalog_root_address()
    } else if let Some(page_index) = args.catalog_page {
        catalog_page_address(page_index)
    } else if let Some(content_id) = &args.manifest {
        manifest_address(content_id)
    } else if let Some(chunk) = &args.chunk {
        chunk_address(&chunk.content_id, chunk.index)
    } else {
        unreachable!("clap group guarantees one selector")
    };
    println!("{address}  bump {bump}");
    Ok(())
}
