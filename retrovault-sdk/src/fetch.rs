//! The fetch pipeline: read manifest, gather chunks, reconstruct, verify.

use std::time::Duration;

use retrovault_common::accounts::{CartridgeChunk, CartridgeManifest};
use retrovault_common::address::{chunk_address, manifest_address};
use retrovault_common::{Address, ContentId};
use tokio_util::sync::CancellationToken;

use crate::client::{decode_at, CartridgeClient};
use crate::errors::{Error, Result};
use crate::progress::{FetchEvent, FetchProgress};
use crate::transport::wire::MAX_MULTIPLE_ACCOUNTS;

/// Batches submitted in parallel per wave.
const CONCURRENT_BATCHES: usize = 3;
/// Pause between waves.
const WAVE_PAUSE: Duration = Duration::from_millis(100);

/// Options for [`CartridgeClient::fetch`].
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Skip SHA-256 verification of the reconstruction. Verification is on
    /// by default; only turn it off for diagnostics.
    pub skip_verify: bool,
    /// Phase observer.
    pub progress: Option<FetchProgress>,
    /// Cooperative cancellation; in-flight batches finish, nothing new is
    /// started.
    pub cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("skip_verify", &self.skip_verify)
            .finish_non_exhaustive()
    }
}

/// A reconstructed cartridge.
#[derive(Debug, Clone)]
pub struct FetchedCartridge {
    /// The content id that was fetched.
    pub content_id: ContentId,
    /// The reconstructed blob.
    pub bytes: Vec<u8>,
    /// Whether the whole blob came from the local file cache.
    pub from_cache: bool,
}

impl CartridgeClient {
    /// Fetch and reconstruct the blob behind `content_id`.
    ///
    /// Returns `Ok(None)` when no manifest exists. Cached chunks are used
    /// where present; the reconstruction is verified against the manifest's
    /// declared SHA-256 unless `skip_verify` is set, and on a mismatch the
    /// cache entries for this content are invalidated before the error
    /// surfaces.
    pub async fn fetch(
        &self,
        content_id: &ContentId,
        options: FetchOptions,
    ) -> Result<Option<FetchedCartridge>> {
        let progress = options.progress.clone();

        // A verified reconstruction on disk short-circuits everything.
        if let Some(cache) = &self.cache {
            match cache.get_file(content_id, content_id.as_bytes()) {
                Ok(Some(bytes)) => {
                    emit(&progress, FetchEvent::Complete);
                    return Ok(Some(FetchedCartridge {
                        content_id: *content_id,
                        bytes,
                        from_cache: true,
                    }));
                }
                Ok(None) => {}
                Err(error) => tracing::warn!(%error, "file cache read failed, ignoring"),
            }
        }

        emit(&progress, FetchEvent::Manifest);
        let (manifest_addr, _) = manifest_address(content_id);
        let Some(account) = self.pool.get_account(&manifest_addr).await? else {
            return Ok(None);
        };
        let manifest = decode_at(manifest_addr, &account.data, CartridgeManifest::decode)?;
        let total = manifest.chunk_count;
        let total_bytes = manifest.blob_size;

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; total as usize];

        // Cache hits first.
        if let Some(cache) = &self.cache {
            match cache.get_all_chunks(content_id) {
                Ok(hits) => {
                    for (index, data) in hits {
                        if let Some(slot) = slots.get_mut(index as usize) {
                            *slot = Some(data);
                        }
                    }
                }
                Err(error) => tracing::warn!(%error, "chunk cache read failed, ignoring"),
            }
        }

        let mut loaded = slots.iter().filter(|s| s.is_some()).count() as u32;
        let mut bytes_loaded: u64 = slots
            .iter()
            .flatten()
            .map(|data| data.len() as u64)
            .sum();
        emit(
            &progress,
            FetchEvent::Chunks {
                loaded,
                total,
                bytes: bytes_loaded,
                total_bytes,
            },
        );

        // Batch the missing indices and fetch waves of batches.
        let missing: Vec<(u32, Address)> = (0..total)
            .filter(|&index| slots[index as usize].is_none())
            .map(|index| (index, chunk_address(content_id, index).0))
            .collect();
        let batches: Vec<&[(u32, Address)]> = missing.chunks(MAX_MULTIPLE_ACCOUNTS).collect();

        let mut fetched: Vec<(u32, Vec<u8>)> = Vec::with_capacity(missing.len());
        for wave in batches.chunks(CONCURRENT_BATCHES) {
            if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(Error::Cancelled);
            }

            let reads = wave.iter().map(|batch| async move {
                let addresses: Vec<Address> = batch.iter().map(|(_, a)| *a).collect();
                let accounts = self.pool.get_multiple_accounts(&addresses).await?;
                Ok::<_, Error>(
                    batch
                        .iter()
                        .zip(accounts)
                        .map(|((index, address), account)| (*index, *address, account))
                        .collect::<Vec<_>>(),
                )
            });

            for result in futures_util::future::join_all(reads).await {
                for (index, address, account) in result? {
                    let Some(account) = account else { continue };
                    let chunk = decode_at(address, &account.data, CartridgeChunk::decode)?;
                    loaded += 1;
                    bytes_loaded += chunk.data.len() as u64;
                    fetched.push((index, chunk.data.clone()));
                    slots[index as usize] = Some(chunk.data);
                }
            }
            emit(
                &progress,
                FetchEvent::Chunks {
                    loaded,
                    total,
                    bytes: bytes_loaded,
                    total_bytes,
                },
            );
            tokio::time::sleep(WAVE_PAUSE).await;
        }

        let still_missing: Vec<u32> = (0..total)
            .filter(|&index| slots[index as usize].is_none())
            .collect();
        if !still_missing.is_empty() {
            return Err(Error::MissingChunks {
                content_id: *content_id,
                indices: still_missing,
            });
        }

        let mut blob = Vec::with_capacity(total_bytes as usize);
        for slot in &slots {
            if let Some(data) = slot {
                blob.extend_from_slice(data);
            }
        }

        let verified = if options.skip_verify {
            false
        } else {
            emit(&progress, FetchEvent::Verifying);
            let actual = ContentId::hash(&blob);
            if actual.to_bytes() != manifest.sha256 {
                if let Some(cache) = &self.cache {
                    if let Err(error) = cache.invalidate(content_id) {
                        tracing::warn!(%error, "failed to invalidate cache after integrity failure");
                    }
                }
                return Err(Error::Integrity {
                    content_id: *content_id,
                    actual: actual.to_string(),
                });
            }
            true
        };

        // Cache write-back runs in the background; failures only cost a
        // future re-download.
        if let Some(cache) = self.cache.clone() {
            let content_id = *content_id;
            let sha256 = manifest.sha256;
            let file = verified.then(|| blob.clone());
            tokio::spawn(async move {
                if let Err(error) = cache.put_chunks(&content_id, &fetched) {
                    tracing::warn!(%error, "chunk cache write-back failed");
                }
                if let Some(bytes) = file {
                    if let Err(error) = cache.put_file(&content_id, &sha256, &bytes) {
                        tracing::warn!(%error, "file cache write-back failed");
                    }
                }
            });
        }

        emit(&progress, FetchEvent::Complete);
        Ok(Some(FetchedCartridge {
            content_id: *content_id,
            bytes: blob,
            from_cache: false,
        }))
    }
}

fn emit(progress: &Option<FetchProgress>, event: FetchEvent) {
    if let Some(observer) = progress {
        observer(event);
    }
}
