//! Protocol-wide constants shared by the program and every client.

/// Entries per catalog page.
pub const PAGE_CAP: usize = 16;

/// Upper bound on the size of a stored blob, in bytes.
pub const MAX_BLOB_SIZE: u64 = 6 * 1024 * 1024;

/// Upper bound on `chunk_size`, dictated by the ledger's per-operation
/// transport budget.
pub const MAX_CHUNK_SIZE: u32 = 1024;

/// Chunk size used when the publisher does not pick one.
pub const DEFAULT_CHUNK_SIZE: u32 = 1024;

/// Capacity of the manifest's trailing metadata buffer.
pub const METADATA_CAP: usize = 256;

/// Catalog entry flag bit: hidden from listings unless explicitly requested.
pub const FLAG_RETIRED: u8 = 1 << 0;
