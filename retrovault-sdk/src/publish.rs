//! The publish pipeline: split, reserve, write chunks, finalize.

use std::time::Duration;

use retrovault_common::accounts::{CartridgeChunk, CartridgeManifest};
use retrovault_common::address::{chunk_address, manifest_address};
use retrovault_common::constants::{MAX_BLOB_SIZE, MAX_CHUNK_SIZE, METADATA_CAP};
use retrovault_common::{Address, ContentId, Keypair, Operation};
use tokio_util::sync::CancellationToken;

use crate::client::{decode_at, CartridgeClient};
use crate::errors::{ConflictError, Error, Result};
use crate::progress::{PublishEvent, PublishProgress};
use crate::transport::wire::MAX_MULTIPLE_ACCOUNTS;

/// Pause between upload waves.
const WAVE_PAUSE: Duration = Duration::from_millis(200);
/// Attempts per submission, transport and rate-limit failures only.
const MAX_SUBMIT_ATTEMPTS: u32 = 5;
/// First retry backoff; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

// Stable program error codes this pipeline reacts to (the program crate's
// error table).
const CODE_PAGE_FULL: u32 = 6005;
const CODE_MANIFEST_EXISTS: u32 = 6007;
const CODE_CHUNK_ALREADY_WRITTEN: u32 = 6015;

/// Options for [`CartridgeClient::publish`].
#[derive(Clone)]
pub struct PublishOptions {
    /// Chunk size in bytes, `1..=MAX_CHUNK_SIZE`.
    pub chunk_size: u32,
    /// Opaque manifest metadata, at most `METADATA_CAP` bytes.
    pub metadata: Vec<u8>,
    /// Concurrent chunk submissions per wave.
    pub concurrency: usize,
    /// Return [`PublishOutcome::AlreadyExists`] instead of failing when the
    /// cartridge is already finalized.
    pub skip_if_exists: bool,
    /// Phase observer.
    pub progress: Option<PublishProgress>,
    /// Cooperative cancellation; in-flight submissions finish, nothing new
    /// is started.
    pub cancel: Option<CancellationToken>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            chunk_size: retrovault_common::constants::DEFAULT_CHUNK_SIZE,
            metadata: vec![],
            concurrency: 3,
            skip_if_exists: false,
            progress: None,
            cancel: None,
        }
    }
}

impl std::fmt::Debug for PublishOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishOptions")
            .field("chunk_size", &self.chunk_size)
            .field("metadata_len", &self.metadata.len())
            .field("concurrency", &self.concurrency)
            .field("skip_if_exists", &self.skip_if_exists)
            .finish_non_exhaustive()
    }
}

/// How a publish concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The cartridge was finalized by this call.
    Published,
    /// It was already finalized and `skip_if_exists` was set.
    AlreadyExists,
}

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// The published content id.
    pub content_id: ContentId,
    /// Derived address of the manifest account.
    pub manifest_address: Address,
    /// Transaction ids issued by this call, in submission order.
    pub transactions: Vec<String>,
    /// Whether this call published or found the cartridge already there.
    pub outcome: PublishOutcome,
}

impl CartridgeClient {
    /// Publish `blob` as a content-addressed cartridge.
    ///
    /// Resumable: an earlier partial publish of the same bytes is picked up
    /// where it stopped, writing only the chunks still missing.
    pub async fn publish(&self, blob: Vec<u8>, options: PublishOptions) -> Result<PublishReceipt> {
        let progress = options.progress.clone();
        emit(&progress, PublishEvent::Preparing);

        let content_id = ContentId::hash(&blob);
        if self.deny_list.contains(&content_id) {
            return Err(Error::Refused { content_id });
        }
        if blob.is_empty() {
            return Err(Error::Input {
                message: "blob is empty".to_string(),
            });
        }
        if blob.len() as u64 > MAX_BLOB_SIZE {
            return Err(Error::Input {
                message: format!("blob is {} bytes, limit is {MAX_BLOB_SIZE}", blob.len()),
            });
        }
        if options.chunk_size == 0 || options.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Input {
                message: format!(
                    "chunk size {} out of range 1..={MAX_CHUNK_SIZE}",
                    options.chunk_size
                ),
            });
        }
        if options.metadata.len() > METADATA_CAP {
            return Err(Error::Input {
                message: format!(
                    "metadata is {} bytes, limit is {METADATA_CAP}",
                    options.metadata.len()
                ),
            });
        }
        let keypair = self.require_keypair()?.clone();
        let (manifest_addr, _) = manifest_address(&content_id);
        let mut transactions = Vec::new();

        // Probe for an earlier publish of the same bytes.
        let existing = match self.pool.get_account(&manifest_addr).await? {
            Some(account) => Some(decode_at(
                manifest_addr,
                &account.data,
                CartridgeManifest::decode,
            )?),
            None => None,
        };

        let resuming = existing.is_some();
        let manifest = match existing {
            Some(manifest) if manifest.finalized => {
                if options.skip_if_exists {
                    emit(&progress, PublishEvent::Complete { content_id });
                    return Ok(PublishReceipt {
                        content_id,
                        manifest_address: manifest_addr,
                        transactions,
                        outcome: PublishOutcome::AlreadyExists,
                    });
                }
                return Err(Error::Conflict(ConflictError::AlreadyFinalized {
                    content_id,
                }));
            }
            Some(manifest) => {
                if manifest.chunk_size != options.chunk_size {
                    tracing::warn!(
                        requested = options.chunk_size,
                        open = manifest.chunk_size,
                        "resuming with the open manifest's chunk size"
                    );
                }
                manifest
            }
            None => {
                emit(&progress, PublishEvent::Manifest);
                let operation = Operation::CreateManifest {
                    content_id,
                    blob_size: blob.len() as u64,
                    chunk_size: options.chunk_size,
                    declared_sha256: content_id.to_bytes(),
                    metadata: options.metadata.clone(),
                };
                match self
                    .submit_with_retry(&keypair, &operation, options.cancel.as_ref())
                    .await
                {
                    Ok(tx) => transactions.push(tx),
                    // Lost a race with a concurrent publish of the same id;
                    // fall through to resume against what exists now.
                    Err(Error::Conflict(ConflictError::Program {
                        code: Some(CODE_MANIFEST_EXISTS),
                        ..
                    })) => {}
                    Err(e) => return Err(e),
                }
                match self.pool.get_account(&manifest_addr).await? {
                    Some(account) => {
                        decode_at(manifest_addr, &account.data, CartridgeManifest::decode)?
                    }
                    None => {
                        return Err(Error::Input {
                            message: "manifest vanished right after creation".to_string(),
                        })
                    }
                }
            }
        };

        // Split at the manifest's geometry (it wins on resume).
        let chunk_size = manifest.chunk_size as usize;
        let pieces: Vec<&[u8]> = blob.chunks(chunk_size).collect();
        let total = manifest.chunk_count;

        // Which chunks are already on the ledger?
        let mut written = vec![false; total as usize];
        if resuming {
            self.probe_written_chunks(&content_id, &mut written).await?;
        }
        let mut written_count = written.iter().filter(|w| **w).count() as u32;
        emit(
            &progress,
            PublishEvent::Chunks {
                written: written_count,
                total,
                last_tx: None,
            },
        );

        let pending: Vec<u32> = (0..total).filter(|&i| !written[i as usize]).collect();
        let concurrency = options.concurrency.clamp(1, 64);

        for wave in pending.chunks(concurrency) {
            if is_cancelled(options.cancel.as_ref()) {
                return Err(Error::Cancelled);
            }

            let submissions = wave.iter().map(|&index| {
                let keypair = keypair.clone();
                let payload = pieces[index as usize].to_vec();
                let cancel = options.cancel.clone();
                async move {
                    let operation = Operation::WriteChunk {
                        content_id,
                        chunk_index: index,
                        payload,
                    };
                    let result = self
                        .submit_with_retry(&keypair, &operation, cancel.as_ref())
                        .await;
                    (index, result)
                }
            });

            for (index, result) in futures_util::future::join_all(submissions).await {
                match result {
                    Ok(tx) => {
                        written_count += 1;
                        emit(
                            &progress,
                            PublishEvent::Chunks {
                                written: written_count,
                                total,
                                last_tx: Some(tx.clone()),
                            },
                        );
                        transactions.push(tx);
                    }
                    // Already on the ledger (e.g. a retry whose first send
                    // landed): success for our purposes.
                    Err(Error::Conflict(ConflictError::Program {
                        code: Some(CODE_CHUNK_ALREADY_WRITTEN),
                        ..
                    })) => {
                        tracing::debug!(index, "chunk already written, continuing");
                        written_count += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            tokio::time::sleep(WAVE_PAUSE).await;
        }

        if is_cancelled(options.cancel.as_ref()) {
            return Err(Error::Cancelled);
        }

        emit(&progress, PublishEvent::Finalizing);
        let root = self.catalog_root().await?.ok_or_else(|| Error::Input {
            message: "catalog not initialized on this ledger".to_string(),
        })?;
        let page_index = root.latest_page_index;
        let operation = Operation::FinalizeCartridge {
            content_id,
            page_index,
        };
        match self
            .submit_with_retry(&keypair, &operation, options.cancel.as_ref())
            .await
        {
            Ok(tx) => transactions.push(tx),
            Err(Error::Conflict(ConflictError::Program {
                code: Some(CODE_PAGE_FULL),
                ..
            })) => {
                return Err(Error::Conflict(ConflictError::PageFull { page_index }));
            }
            Err(e) => return Err(e),
        }

        emit(&progress, PublishEvent::Complete { content_id });
        Ok(PublishReceipt {
            content_id,
            manifest_address: manifest_addr,
            transactions,
            outcome: PublishOutcome::Published,
        })
    }

    /// Mark indices whose chunk accounts already exist and are written.
    async fn probe_written_chunks(
        &self,
        content_id: &ContentId,
        written: &mut [bool],
    ) -> Result<()> {
        let addresses: Vec<(u32, Address)> = (0..written.len() as u32)
            .map(|index| (index, chunk_address(content_id, index).0))
            .collect();

        for batch in addresses.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let addrs: Vec<Address> = batch.iter().map(|(_, a)| *a).collect();
            let accounts = self.pool.get_multiple_accounts(&addrs).await?;
            for ((index, address), account) in batch.iter().zip(accounts) {
                if let Some(account) = account {
                    let chunk = decode_at(*address, &account.data, CartridgeChunk::decode)?;
                    written[*index as usize] = chunk.written;
                }
            }
        }
        Ok(())
    }

    /// Submit with up to [`MAX_SUBMIT_ATTEMPTS`] tries, doubling backoff,
    /// retrying only transport and rate-limit failures.
    async fn submit_with_retry(
        &self,
        keypair: &Keypair,
        operation: &Operation,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            if is_cancelled(cancel) {
                return Err(Error::Cancelled);
            }
            match self.submit(keypair, operation).await {
                Ok(tx) => return Ok(tx),
                Err(e) if e.is_retryable() && attempt < MAX_SUBMIT_ATTEMPTS => {
                    tracing::debug!(
                        op = operation.name(),
                        attempt,
                        ?backoff,
                        error = %e,
                        "submission failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn emit(progress: &Option<PublishProgress>, event: PublishEvent) {
    if let Some(observer) = progress {
        observer(event);
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}
