//! Cartridge chunks: the fixed-size payload slices.

use crate::content_id::ContentId;

use super::{LayoutError, Reader, Writer};

pub(crate) const DISCRIMINATOR: &[u8; 8] = &[0x3b, 0x15, 0x6b, 0x50, 0x89, 0xcb, 0x99, 0xad];

/// Layout bytes preceding the data buffer.
const HEADER_LEN: usize = 8 + 32 + 4 + 4 + 1 + 1 + 6;

/// One per chunk index, at seed `("chunk", content_id, chunk_index_le)`.
///
/// The account's data buffer is `chunk_size` bytes; only the `data_len`
/// prefix is payload and the remainder stays zero. Once written a chunk is
/// immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeChunk {
    /// Content id of the owning cartridge.
    pub content_id: ContentId,
    /// Index of this chunk within the cartridge.
    pub chunk_index: u32,
    /// Payload bytes; `len() = data_len ≤ chunk_size`.
    pub data: Vec<u8>,
    /// Set after a successful write.
    pub written: bool,
    /// Derivation byte.
    pub bump: u8,
}

impl CartridgeChunk {
    /// Account length for a given manifest `chunk_size`.
    #[must_use]
    pub const fn len_for(chunk_size: u32) -> usize {
        HEADER_LEN + chunk_size as usize
    }

    /// Encode to account bytes for a buffer of `chunk_size`.
    ///
    /// The tail beyond `data` is zero-filled. `data.len()` must not exceed
    /// `chunk_size`; the program validates this before ever encoding.
    #[must_use]
    pub fn encode(&self, chunk_size: u32) -> Vec<u8> {
        let total = Self::len_for(chunk_size);
        let mut w = Writer::with_capacity(total);
        w.discriminator(DISCRIMINATOR);
        w.bytes(self.content_id.as_bytes());
        w.u32(self.chunk_index);
        w.u32(self.data.len() as u32);
        w.u8(u8::from(self.written));
        w.u8(self.bump);
        w.pad(6);
        w.bytes(&self.data);
        w.pad(chunk_size as usize - self.data.len());
        w.finish(total)
    }

    /// Decode from account bytes; the buffer size implies `chunk_size`.
    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        let mut r = Reader::new(bytes);
        r.discriminator(DISCRIMINATOR, "CartridgeChunk")?;
        let content_id = ContentId::from_bytes(r.array()?);
        let chunk_index = r.u32()?;
        let data_len = r.u32()? as usize;
        let written = r.u8()? != 0;
        let bump = r.u8()?;
        r.pad(6)?;

        let chunk_size = bytes.len().saturating_sub(HEADER_LEN);
        if data_len > chunk_size {
            return Err(LayoutError::LengthOutOfBounds {
                field: "data_len",
                len: data_len,
                max: chunk_size,
            });
        }
        let data = r.bytes(data_len)?.to_vec();
        // The rest of the buffer is opaque zero fill.

        Ok(Self {
            content_id,
            chunk_index,
            data,
            written,
            bump,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(data: &[u8]) -> CartridgeChunk {
        CartridgeChunk {
            content_id: ContentId::hash(b"hello"),
            chunk_index: 1,
            data: data.to_vec(),
            written: true,
            bump: 250,
        }
    }

    #[test]
    fn roundtrip_partial_buffer() {
        let chunk = sample(b"o");
        let bytes = chunk.encode(4);
        assert_eq!(bytes.len(), CartridgeChunk::len_for(4));
        assert_eq!(CartridgeChunk::decode(&bytes).unwrap(), chunk);
        assert_eq!(CartridgeChunk::decode(&bytes).unwrap().encode(4), bytes);
    }

    #[test]
    fn roundtrip_full_buffer() {
        let chunk = sample(b"hell");
        let bytes = chunk.encode(4);
        assert_eq!(CartridgeChunk::decode(&bytes).unwrap().data, b"hell");
    }

    #[test]
    fn rejects_data_len_over_buffer() {
        let mut bytes = sample(b"hell").encode(4);
        let offset = 8 + 32 + 4; // data_len
        bytes[offset..offset + 4].copy_from_slice(&5u32.to_le_bytes());
        assert_eq!(
            CartridgeChunk::decode(&bytes),
            Err(LayoutError::LengthOutOfBounds {
                field: "data_len",
                len: 5,
                max: 4,
            })
        );
    }

    #[test]
    fn zero_fill_beyond_payload() {
        let bytes = sample(b"o").encode(4);
        assert_eq!(&bytes[bytes.len() - 3..], &[0, 0, 0]);
    }
}
