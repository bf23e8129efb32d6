//! Program failure codes.

use retrovault_common::LayoutError;

/// Why an operation was rejected. Any failure aborts all staged changes.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProgramError {
    /// The catalog root already exists.
    #[error("catalog already initialized")]
    CatalogExists,

    /// The catalog root does not exist yet.
    #[error("catalog not initialized")]
    CatalogMissing,

    /// The signer is not authorized for this operation.
    #[error("signer is not the authority for this operation")]
    Unauthorized,

    /// Pages must be created in order.
    #[error("page index {actual} out of order, next page is {expected}")]
    PageIndexMismatch {
        /// The root's current `page_count`.
        expected: u32,
        /// The index the caller asked for.
        actual: u32,
    },

    /// The referenced catalog page does not exist.
    #[error("catalog page {0} does not exist")]
    PageMissing(u32),

    /// The latest page has no free entry slot.
    #[error("catalog page {0} is full")]
    PageFull(u32),

    /// Finalize must target the currently appendable page.
    #[error("page {actual} is not the latest page {expected}")]
    NotLatestPage {
        /// The root's `latest_page_index`.
        expected: u32,
        /// The index the caller passed.
        actual: u32,
    },

    /// A manifest for this content id already exists.
    #[error("manifest already exists for this content id")]
    ManifestExists,

    /// No manifest exists for this content id.
    #[error("manifest does not exist for this content id")]
    ManifestMissing,

    /// The manifest is finalized and immutable.
    #[error("manifest is finalized")]
    ManifestFinalized,

    /// The blob is empty or exceeds the size bound.
    #[error("blob size {0} out of range")]
    BlobSizeOutOfRange(u64),

    /// The chunk size is zero or exceeds the transport budget.
    #[error("chunk size {0} out of range")]
    ChunkSizeOutOfRange(u32),

    /// The declared commitment does not equal the content id.
    #[error("declared sha256 does not match content id")]
    CommitmentMismatch,

    /// The metadata exceeds the fixed buffer.
    #[error("metadata length {0} exceeds capacity")]
    MetadataTooLong(usize),

    /// The chunk index is outside the manifest's geometry.
    #[error("chunk index {index} out of range, manifest has {count} chunks")]
    ChunkIndexOutOfRange {
        /// The offending index.
        index: u32,
        /// The manifest's `chunk_count`.
        count: u32,
    },

    /// Chunks cannot be rewritten.
    #[error("chunk {0} already written")]
    ChunkAlreadyWritten(u32),

    /// The payload does not match the expected chunk length.
    #[error("chunk {index} payload length {actual} does not match expected {expected}")]
    ChunkLengthMismatch {
        /// The offending index.
        index: u32,
        /// Length required by the manifest geometry.
        expected: u32,
        /// Length the caller sent.
        actual: u32,
    },

    /// Finalize requires every chunk written.
    #[error("chunk {0} missing or unwritten")]
    ChunkIncomplete(u32),

    /// Stored account bytes violate a layout; treated as corruption.
    #[error("account layout violation: {0}")]
    Layout(#[from] LayoutError),

    /// A counter would overflow.
    #[error("arithmetic overflow")]
    Overflow,
}

impl ProgramError {
    /// Stable numeric code carried on the wire, 6000-based.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            ProgramError::CatalogExists => 6000,
            ProgramError::CatalogMissing => 6001,
            ProgramError::Unauthorized => 6002,
            ProgramError::PageIndexMismatch { .. } => 6003,
            ProgramError::PageMissing(_) => 6004,
            ProgramError::PageFull(_) => 6005,
            ProgramError::NotLatestPage { .. } => 6006,
            ProgramError::ManifestExists => 6007,
            ProgramError::ManifestMissing => 6008,
            ProgramError::ManifestFinalized => 6009,
            ProgramError::BlobSizeOutOfRange(_) => 6010,
            ProgramError::ChunkSizeOutOfRange(_) => 6011,
            ProgramError::CommitmentMismatch => 6012,
            ProgramError::MetadataTooLong(_) => 6013,
            ProgramError::ChunkIndexOutOfRange { .. } => 6014,
            ProgramError::ChunkAlreadyWritten(_) => 6015,
            ProgramError::ChunkLengthMismatch { .. } => 6016,
            ProgramError::ChunkIncomplete(_) => 6017,
            ProgramError::Layout(_) => 6018,
            ProgramError::Overflow => 6019,
        }
    }
}
