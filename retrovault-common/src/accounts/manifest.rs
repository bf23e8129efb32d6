//! Cartridge manifests: the per-blob commitment record.

use crate::constants::{MAX_BLOB_SIZE, MAX_CHUNK_SIZE, METADATA_CAP};
use crate::content_id::ContentId;
use crate::keys::PublicKey;

use super::{LayoutError, Reader, Writer};

pub(crate) const DISCRIMINATOR: &[u8; 8] = &[0x30, 0xd8, 0xf2, 0x36, 0x7f, 0xd5, 0x86, 0x4f];

/// One per content blob, at seed `("manifest", content_id)`.
///
/// Records the declared SHA-256 commitment (equal to the content id by
/// construction), the chunking geometry, and the publisher. Once
/// `finalized` is set no field changes again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeManifest {
    /// SHA-256 of the blob, redundant with the address seed.
    pub content_id: ContentId,
    /// Total bytes of the blob.
    pub blob_size: u64,
    /// Declared chunk size in bytes.
    pub chunk_size: u32,
    /// `ceil(blob_size / chunk_size)`.
    pub chunk_count: u32,
    /// Declared commitment.
    pub sha256: [u8; 32],
    /// Whether the cartridge is immutable and catalogued.
    pub finalized: bool,
    /// Ledger slot at creation.
    pub created_slot: u64,
    /// Public key that issued `create_manifest`.
    pub publisher: PublicKey,
    /// Opaque trailing metadata; at most [`METADATA_CAP`] bytes.
    pub metadata: Vec<u8>,
    /// Derivation byte.
    pub bump: u8,
}

impl CartridgeManifest {
    /// Exact byte length of the account.
    pub const LEN: usize = 8 + 32 + 8 + 4 + 4 + 32 + 1 + 7 + 8 + 32 + 2 + 1 + 5 + METADATA_CAP;

    /// Number of chunks a blob of `blob_size` splits into at `chunk_size`.
    ///
    /// `blob_size` and `chunk_size` must be positive; callers validate
    /// against [`MAX_BLOB_SIZE`] and [`MAX_CHUNK_SIZE`] first.
    #[must_use]
    pub fn chunk_count_for(blob_size: u64, chunk_size: u32) -> u32 {
        blob_size.div_ceil(u64::from(chunk_size)) as u32
    }

    /// Expected `data_len` of chunk `chunk_index` under this geometry.
    ///
    /// Full `chunk_size` for all but the last chunk; the last carries the
    /// exact remainder, in `(0, chunk_size]`.
    #[must_use]
    pub fn expected_data_len(&self, chunk_index: u32) -> u32 {
        if chunk_index + 1 == self.chunk_count {
            let full = u64::from(self.chunk_size) * u64::from(self.chunk_count - 1);
            (self.blob_size - full) as u32
        } else {
            self.chunk_size
        }
    }

    /// Encode to account bytes; the metadata buffer is zero-padded.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::LEN);
        w.discriminator(DISCRIMINATOR);
        w.bytes(self.content_id.as_bytes());
        w.u64(self.blob_size);
        w.u32(self.chunk_size);
        w.u32(self.chunk_count);
        w.bytes(&self.sha256);
        w.u8(u8::from(self.finalized));
        w.pad(7);
        w.u64(self.created_slot);
        w.bytes(self.publisher.as_bytes());
        w.u16(self.metadata.len() as u16);
        w.u8(self.bump);
        w.pad(5);
        w.bytes(&self.metadata);
        w.pad(METADATA_CAP - self.metadata.len());
        w.finish(Self::LEN)
    }

    /// Decode from account bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        let mut r = Reader::new(bytes);
        r.discriminator(DISCRIMINATOR, "CartridgeManifest")?;
        let content_id = ContentId::from_bytes(r.array()?);
        let blob_size = r.u64()?;
        let chunk_size = r.u32()?;
        let chunk_count = r.u32()?;
        let sha256 = r.array()?;
        let finalized = r.u8()? != 0;
        r.pad(7)?;
        let created_slot = r.u64()?;
        let publisher = PublicKey::from_bytes(r.array()?);
        let metadata_len = r.u16()? as usize;
        let bump = r.u8()?;
        r.pad(5)?;

        if metadata_len > METADATA_CAP {
            return Err(LayoutError::LengthOutOfBounds {
                field: "metadata_len",
                len: metadata_len,
                max: METADATA_CAP,
            });
        }
        let metadata = r.bytes(metadata_len)?.to_vec();
        r.pad(METADATA_CAP - metadata_len)?;

        Ok(Self {
            content_id,
            blob_size,
            chunk_size,
            chunk_count,
            sha256,
            finalized,
            created_slot,
            publisher,
            metadata,
            bump,
        })
    }
}

// The bounds referenced above; a zero bound would break the geometry math.
const _: () = assert!(MAX_BLOB_SIZE > 0 && MAX_CHUNK_SIZE > 0);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;

    fn sample(metadata: Vec<u8>) -> CartridgeManifest {
        let content_id = ContentId::hash(b"hello");
        CartridgeManifest {
            content_id,
            blob_size: 5,
            chunk_size: 4,
            chunk_count: 2,
            sha256: content_id.to_bytes(),
            finalized: false,
            created_slot: 7,
            publisher: Keypair::from_secret(&[5; 32]).public_key(),
            metadata,
            bump: 253,
        }
    }

    #[test]
    fn roundtrip() {
        let manifest = sample(b"{\"title\":\"hello\"}".to_vec());
        let bytes = manifest.encode();
        assert_eq!(bytes.len(), CartridgeManifest::LEN);
        assert_eq!(CartridgeManifest::decode(&bytes).unwrap(), manifest);
        assert_eq!(CartridgeManifest::decode(&bytes).unwrap().encode(), bytes);
    }

    #[test]
    fn empty_metadata_decodes_to_empty_slice() {
        let bytes = sample(vec![]).encode();
        assert!(CartridgeManifest::decode(&bytes).unwrap().metadata.is_empty());
    }

    #[test]
    fn rejects_metadata_len_over_cap() {
        let mut bytes = sample(vec![]).encode();
        // metadata_len sits after disc(8)+id(32)+size(8)+chunk(4+4)+sha(32)
        // +finalized(1+7)+slot(8)+publisher(32).
        let offset = 8 + 32 + 8 + 4 + 4 + 32 + 8 + 8 + 32;
        bytes[offset..offset + 2].copy_from_slice(&(METADATA_CAP as u16 + 1).to_le_bytes());
        assert_eq!(
            CartridgeManifest::decode(&bytes),
            Err(LayoutError::LengthOutOfBounds {
                field: "metadata_len",
                len: METADATA_CAP + 1,
                max: METADATA_CAP,
            })
        );
    }

    #[test]
    fn chunk_geometry() {
        assert_eq!(CartridgeManifest::chunk_count_for(5, 4), 2);
        assert_eq!(CartridgeManifest::chunk_count_for(384, 128), 3);
        assert_eq!(CartridgeManifest::chunk_count_for(1, 1024), 1);

        let manifest = sample(vec![]);
        assert_eq!(manifest.expected_data_len(0), 4);
        assert_eq!(manifest.expected_data_len(1), 1);
    }
}
