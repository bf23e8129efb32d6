//! Progress reporting for the publish and fetch pipelines.
//!
//! Pull-style callbacks: the pipelines call the observer at phase
//! boundaries, in the order the phases run. Implementations may forward to
//! channels or UIs; the contract is only the ordering.

use std::sync::Arc;

use retrovault_common::ContentId;

/// Phase transitions of a publish.
#[derive(Debug, Clone)]
pub enum PublishEvent {
    /// Hashing and splitting the blob.
    Preparing,
    /// Creating (or resuming) the manifest.
    Manifest,
    /// Chunk upload progress.
    Chunks {
        /// Chunks confirmed written so far.
        written: u32,
        /// Total chunks.
        total: u32,
        /// Transaction id of the most recent write.
        last_tx: Option<String>,
    },
    /// Appending the catalog entry.
    Finalizing,
    /// The cartridge is finalized and discoverable.
    Complete {
        /// The published content id.
        content_id: ContentId,
    },
}

/// Phase transitions of a fetch.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    /// Reading the manifest.
    Manifest,
    /// Chunk download progress.
    Chunks {
        /// Chunks available so far (cache hits included).
        loaded: u32,
        /// Total chunks.
        total: u32,
        /// Payload bytes available so far.
        bytes: u64,
        /// Total payload bytes.
        total_bytes: u64,
    },
    /// Hashing the reconstruction.
    Verifying,
    /// The blob is reconstructed and verified.
    Complete,
}

/// Observer for [`PublishEvent`]s.
pub type PublishProgress = Arc<dyn Fn(PublishEvent) + Send + Sync>;

/// Observer for [`FetchEvent`]s.
pub type FetchProgress = Arc<dyn Fn(FetchEvent) + Send + Sync>;
