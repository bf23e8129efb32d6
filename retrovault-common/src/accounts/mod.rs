//! Byte-exact layouts of the four on-ledger account families.
//!
//! Every record starts with an 8-byte discriminator (the first 8 bytes of
//! `SHA-256("account:<Name>")`) followed by fixed-offset fields; multi-byte
//! integers are little-endian and padding bytes are written as zero and
//! skipped on read. `decode` rejects short, discriminator-mismatched, or
//! out-of-bounds inputs with a [`LayoutError`].

mod catalog_page;
mod catalog_root;
mod chunk;
mod manifest;

pub use catalog_page::{CatalogEntry, CatalogPage};
pub use catalog_root::CatalogRoot;
pub use chunk::CartridgeChunk;
pub use manifest::CartridgeManifest;

/// Decoded bytes violate an account schema.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// The buffer is shorter than the record's minimum layout.
    #[error("account data too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum layout length for the record.
        expected: usize,
        /// Length of the buffer that was offered.
        actual: usize,
    },

    /// The 8-byte prefix does not match the expected record type.
    #[error("discriminator mismatch for {record}")]
    Discriminator {
        /// Name of the record type that was expected.
        record: &'static str,
    },

    /// A declared variable-length field exceeds its fixed bound.
    #[error("declared {field} length {len} exceeds bound {max}")]
    LengthOutOfBounds {
        /// Field whose declared length is out of bounds.
        field: &'static str,
        /// The declared length.
        len: usize,
        /// The layout's bound for that field.
        max: usize,
    },
}

/// Sequential little-endian reader over an account buffer.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LayoutError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(LayoutError::TooShort {
                expected: end,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn discriminator(
        &mut self,
        expected: &[u8; 8],
        record: &'static str,
    ) -> Result<(), LayoutError> {
        if self.buf.len() < 8 {
            return Err(LayoutError::TooShort {
                expected: 8,
                actual: self.buf.len(),
            });
        }
        if self.take(8)? != expected {
            return Err(LayoutError::Discriminator { record });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, LayoutError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, LayoutError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().expect("sized take");
        Ok(u16::from_le_bytes(bytes))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, LayoutError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("sized take");
        Ok(u32::from_le_bytes(bytes))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, LayoutError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("sized take");
        Ok(u64::from_le_bytes(bytes))
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], LayoutError> {
        Ok(self.take(N)?.try_into().expect("sized take"))
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], LayoutError> {
        self.take(n)
    }

    /// Skip declared padding without inspecting it.
    pub(crate) fn pad(&mut self, n: usize) -> Result<(), LayoutError> {
        self.take(n).map(|_| ())
    }
}

/// Append-only little-endian writer producing an account buffer.
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn discriminator(&mut self, disc: &[u8; 8]) {
        self.buf.extend_from_slice(disc);
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub(crate) fn pad(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    pub(crate) fn finish(self, expected_len: usize) -> Vec<u8> {
        debug_assert_eq!(self.buf.len(), expected_len, "layout length drifted");
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    // The discriminator constants are the first 8 bytes of
    // SHA-256("account:<Name>"); keep the literals honest.
    #[test]
    fn discriminators_match_their_derivation() {
        for (name, constant) in [
            ("CatalogRoot", super::catalog_root::DISCRIMINATOR),
            ("CatalogPage", super::catalog_page::DISCRIMINATOR),
            ("CartridgeManifest", super::manifest::DISCRIMINATOR),
            ("CartridgeChunk", super::chunk::DISCRIMINATOR),
        ] {
            let digest = Sha256::digest(format!("account:{name}"));
            assert_eq!(&digest[..8], constant, "discriminator for {name}");
        }
    }
}
