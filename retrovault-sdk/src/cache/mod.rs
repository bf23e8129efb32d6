//! Persistent chunk cache.
//!
//! A local LMDB environment with two keyspaces: `files` holds whole verified
//! reconstructions keyed by `content_id ‖ sha256`, `chunks` holds per-chunk
//! bytes keyed by `content_id ‖ chunk_index_le` for resumable downloads.
//! The cache is a pure hint: fetch verifies every reconstruction against the
//! ledger-declared hash, so corruption or loss here never breaks
//! correctness. There is no eviction; external tools may purge the
//! directory.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use retrovault_common::ContentId;

/// Bump on any key or value layout change; older data is invalidated on
/// open rather than migrated.
const CACHE_VERSION: u32 = 2;

const FILES_TABLE: &str = "files";
const CHUNKS_TABLE: &str = "chunks";
const META_TABLE: &str = "meta";
const VERSION_KEY: &[u8] = b"version";

const TABLES_COUNT: u32 = 3;

// Address space reservation, not disk usage.
const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024 * 1024;

/// Error touching the cache. Fatal when opening; logged and ignored on the
/// opportunistic read/write paths.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// LMDB failure.
    #[error(transparent)]
    Heed(#[from] heed::Error),
    /// Filesystem failure creating the cache directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Local persistent map from `(content_id, chunk_index)` to bytes, plus a
/// file-level space for instant re-loads.
#[derive(Debug, Clone)]
pub struct ChunkCache {
    env: Env,
    files: Database<Bytes, Bytes>,
    chunks: Database<Bytes, Bytes>,
    meta: Database<Bytes, Bytes>,
}

impl ChunkCache {
    /// Open (or create) the cache under `dir`, invalidating data written by
    /// an older layout version.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir)?;

        // SAFETY: LMDB env opening is unsafe because a corrupt lock file is
        // undefined behavior; we accept the standard caveat like every
        // other LMDB consumer.
        let env = unsafe {
            EnvOpenOptions::new()
                .max_dbs(TABLES_COUNT)
                .map_size(DEFAULT_MAP_SIZE)
                .open(dir)
        }?;

        let mut wtxn = env.write_txn()?;
        let files = env.create_database(&mut wtxn, Some(FILES_TABLE))?;
        let chunks = env.create_database(&mut wtxn, Some(CHUNKS_TABLE))?;
        let meta: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(META_TABLE))?;

        let stored = meta
            .get(&wtxn, VERSION_KEY)?
            .and_then(|b| b.try_into().ok().map(u32::from_le_bytes));
        if stored != Some(CACHE_VERSION) {
            tracing::info!(?stored, current = CACHE_VERSION, "cache version changed, clearing");
            files.clear(&mut wtxn)?;
            chunks.clear(&mut wtxn)?;
            meta.put(&mut wtxn, VERSION_KEY, &CACHE_VERSION.to_le_bytes())?;
        }
        wtxn.commit()?;

        Ok(Self {
            env,
            files,
            chunks,
            meta,
        })
    }

    fn chunk_key(content_id: &ContentId, chunk_index: u32) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[..32].copy_from_slice(content_id.as_bytes());
        key[32..].copy_from_slice(&chunk_index.to_le_bytes());
        key
    }

    fn file_key(content_id: &ContentId, sha256: &[u8; 32]) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(content_id.as_bytes());
        key[32..].copy_from_slice(sha256);
        key
    }

    // === Chunk space ===

    /// Read one cached chunk; `None` on miss.
    pub fn get_chunk(
        &self,
        content_id: &ContentId,
        chunk_index: u32,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let rtxn = self.env.read_txn()?;
        Ok(self
            .chunks
            .get(&rtxn, &Self::chunk_key(content_id, chunk_index))?
            .map(<[u8]>::to_vec))
    }

    /// Store one chunk. Idempotent.
    pub fn put_chunk(
        &self,
        content_id: &ContentId,
        chunk_index: u32,
        data: &[u8],
    ) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn()?;
        self.chunks
            .put(&mut wtxn, &Self::chunk_key(content_id, chunk_index), data)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Store a batch of chunks in one transaction.
    pub fn put_chunks(
        &self,
        content_id: &ContentId,
        batch: &[(u32, Vec<u8>)],
    ) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn()?;
        for (chunk_index, data) in batch {
            self.chunks
                .put(&mut wtxn, &Self::chunk_key(content_id, *chunk_index), data)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    /// All cached chunks of `content_id`, by index.
    pub fn get_all_chunks(
        &self,
        content_id: &ContentId,
    ) -> Result<Vec<(u32, Vec<u8>)>, CacheError> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for item in self.chunks.prefix_iter(&rtxn, content_id.as_bytes())? {
            let (key, value) = item?;
            let index_bytes: [u8; 4] = key[32..].try_into().expect("36-byte chunk key");
            out.push((u32::from_le_bytes(index_bytes), value.to_vec()));
        }
        out.sort_by_key(|(index, _)| *index);
        Ok(out)
    }

    /// Drop every cached chunk of `content_id`. Best-effort.
    pub fn clear_chunks(&self, content_id: &ContentId) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn()?;
        let keys: Vec<Vec<u8>> = self
            .chunks
            .prefix_iter(&wtxn, content_id.as_bytes())?
            .map(|item| item.map(|(key, _)| key.to_vec()))
            .collect::<Result<_, _>>()?;
        for key in keys {
            self.chunks.delete(&mut wtxn, &key)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    // === File space ===

    /// Read a whole cached reconstruction; `None` on miss.
    pub fn get_file(
        &self,
        content_id: &ContentId,
        sha256: &[u8; 32],
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let rtxn = self.env.read_txn()?;
        Ok(self
            .files
            .get(&rtxn, &Self::file_key(content_id, sha256))?
            .map(<[u8]>::to_vec))
    }

    /// Store a verified reconstruction. Idempotent.
    pub fn put_file(
        &self,
        content_id: &ContentId,
        sha256: &[u8; 32],
        data: &[u8],
    ) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn()?;
        self.files
            .put(&mut wtxn, &Self::file_key(content_id, sha256), data)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Drop the cached reconstruction(s) of `content_id`. Best-effort.
    pub fn clear_file(&self, content_id: &ContentId) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn()?;
        let keys: Vec<Vec<u8>> = self
            .files
            .prefix_iter(&wtxn, content_id.as_bytes())?
            .map(|item| item.map(|(key, _)| key.to_vec()))
            .collect::<Result<_, _>>()?;
        for key in keys {
            self.files.delete(&mut wtxn, &key)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    /// Drop everything this cache knows about `content_id`, both spaces.
    /// Used when a reconstruction fails verification.
    pub fn invalidate(&self, content_id: &ContentId) -> Result<(), CacheError> {
        self.clear_chunks(content_id)?;
        self.clear_file(content_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> (tempfile::TempDir, ChunkCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn chunk_space_roundtrip() {
        let (_dir, cache) = test_cache();
        let id = ContentId::hash(b"blob");

        assert_eq!(cache.get_chunk(&id, 0).unwrap(), None);
        cache.put_chunk(&id, 0, b"hell").unwrap();
        cache.put_chunk(&id, 1, b"o").unwrap();
        // Idempotent overwrite.
        cache.put_chunk(&id, 1, b"o").unwrap();

        assert_eq!(cache.get_chunk(&id, 1).unwrap(), Some(b"o".to_vec()));
        assert_eq!(
            cache.get_all_chunks(&id).unwrap(),
            vec![(0, b"hell".to_vec()), (1, b"o".to_vec())]
        );

        // Another content id does not leak into the prefix scan.
        let other = ContentId::hash(b"other");
        cache.put_chunk(&other, 0, b"x").unwrap();
        assert_eq!(cache.get_all_chunks(&id).unwrap().len(), 2);

        cache.clear_chunks(&id).unwrap();
        assert!(cache.get_all_chunks(&id).unwrap().is_empty());
        assert_eq!(cache.get_chunk(&other, 0).unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn file_space_roundtrip() {
        let (_dir, cache) = test_cache();
        let id = ContentId::hash(b"blob");
        let sha = id.to_bytes();

        assert_eq!(cache.get_file(&id, &sha).unwrap(), None);
        cache.put_file(&id, &sha, b"blob").unwrap();
        assert_eq!(cache.get_file(&id, &sha).unwrap(), Some(b"blob".to_vec()));

        cache.invalidate(&id).unwrap();
        assert_eq!(cache.get_file(&id, &sha).unwrap(), None);
    }

    #[test]
    fn reopen_keeps_data_within_same_version() {
        let dir = tempfile::tempdir().unwrap();
        let id = ContentId::hash(b"blob");
        {
            let cache = ChunkCache::open(dir.path()).unwrap();
            cache.put_chunk(&id, 0, b"data").unwrap();
        }
        let cache = ChunkCache::open(dir.path()).unwrap();
        assert_eq!(cache.get_chunk(&id, 0).unwrap(), Some(b"data".to_vec()));
    }
}
