//! Unified error types for the `retrovault` crate.
//!
//! This module centralizes all failures that can occur while publishing or
//! fetching cartridges and provides a single top-level [`Error`] enum plus
//! the convenient [`Result`] alias. Retryable conditions (transport
//! failures, rate-limit signals) are handled inside the pipelines and only
//! surface here once their retry budgets are exhausted.

use std::time::Duration;

use retrovault_common::{Address, ContentId, LayoutError};
use thiserror::Error;

/// The crate's top-level error type, grouping failures by kind:
///
/// - [`Error::Input`] — invalid caller arguments; never retried
/// - [`Error::Conflict`] — the ledger already holds an incompatible state
/// - [`Error::Layout`] — account bytes violate the schema (corruption)
/// - [`Error::MissingChunks`] — expected chunk accounts were absent
/// - [`Error::Integrity`] — reconstruction hash mismatch
/// - [`Error::Transport`] — network/RPC failure after retries
/// - [`Error::RateLimited`] — rate-limit waits exceeded their maxima
/// - [`Error::Refused`] — content id on the deny list
/// - [`Error::Cancelled`] — the caller aborted the pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid arguments (bad hex length, blob too large, chunk size out of
    /// range). Surfaced to the user, not retried.
    #[error("invalid input: {message}")]
    Input {
        /// Human-readable explanation of what was invalid.
        message: String,
    },

    /// A resource already exists in an incompatible state.
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Decoded account bytes violate the schema; treated as corruption.
    #[error("layout violation at {address}: {source}")]
    Layout {
        /// The account whose bytes were malformed.
        address: Address,
        /// The underlying layout error.
        source: LayoutError,
    },

    /// Chunk accounts the manifest promised were absent.
    #[error("missing {} chunk(s) of {content_id}", indices.len())]
    MissingChunks {
        /// The cartridge being fetched.
        content_id: ContentId,
        /// The chunk indices that could not be read.
        indices: Vec<u32>,
    },

    /// SHA-256 mismatch after full reconstruction. The cache entries for
    /// this content were invalidated before this surfaced.
    #[error("integrity failure for {content_id}: reconstruction hashed to {actual}")]
    Integrity {
        /// The cartridge whose reconstruction failed verification.
        content_id: ContentId,
        /// Hex digest the reconstruction actually produced.
        actual: String,
    },

    /// Network failure, timeout, or endpoint refusal, after the transport
    /// retry budget was spent.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The transport kept signalling rate exhaustion past the configured
    /// maxima.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited {
        /// How long the last signal asked us to wait.
        retry_after: Duration,
    },

    /// The content id is on the configured deny list.
    #[error("content {content_id} refused by deny list")]
    Refused {
        /// The refused content id.
        content_id: ContentId,
    },

    /// The caller requested abort; not an error on its own.
    #[error("operation cancelled")]
    Cancelled,

    /// The chunk cache failed in a way that cannot be ignored (opening).
    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),
}

/// The ledger already holds state this request cannot coexist with.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The manifest for this content id is already finalized.
    #[error("cartridge {content_id} already finalized")]
    AlreadyFinalized {
        /// The finalized content id.
        content_id: ContentId,
    },

    /// A chunk was already written; chunks cannot be rewritten.
    #[error("chunk {chunk_index} of {content_id} already written")]
    ChunkAlreadyWritten {
        /// The cartridge being published.
        content_id: ContentId,
        /// The index that was already written.
        chunk_index: u32,
    },

    /// The latest catalog page has no free slot; the administrator must
    /// create a new page first.
    #[error("catalog page {page_index} is full")]
    PageFull {
        /// Index of the full page.
        page_index: u32,
    },

    /// Any other program rejection, with the program's message.
    #[error("program rejected operation: {message}")]
    Program {
        /// The program's error message.
        message: String,
        /// The program's stable error code, when present.
        code: Option<u32>,
        /// Program log lines the node attached, for diagnostics.
        logs: Vec<String>,
    },
}

/// Transport and RPC-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network/protocol failure from reqwest (timeouts, TLS, I/O).
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint returned a JSON-RPC error envelope.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The endpoint answered with something that is not valid JSON-RPC.
    #[error("invalid rpc response: {message}")]
    InvalidResponse {
        /// What was wrong with the response.
        message: String,
    },

    /// Every endpoint in the pool failed within the attempt budget.
    #[error("all {attempts} attempts across the endpoint pool failed; last: {last}")]
    AllEndpointsFailed {
        /// How many attempts were made.
        attempts: usize,
        /// Message of the last failure.
        last: String,
    },
}

/// A specialized `Result` type for `retrovault` operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a pipeline may retry the failed submission.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::RateLimited { .. })
    }
}
