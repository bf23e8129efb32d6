//! The singleton catalog root.

use crate::keys::PublicKey;

use super::{LayoutError, Reader, Writer};

pub(crate) const DISCRIMINATOR: &[u8; 8] = &[0x07, 0x36, 0x63, 0x50, 0x15, 0xed, 0x06, 0x7c];

/// One per program deployment, at the constant seed `"catalog_root"`.
///
/// Invariants: `latest_page_index < page_count` whenever `page_count > 0`,
/// and `total_cartridges` equals the sum of `entry_count` across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRoot {
    /// Schema version, currently 1.
    pub version: u8,
    /// Public key authorized to add pages and rotate itself.
    pub admin: PublicKey,
    /// Monotonic count of finalized blobs.
    pub total_cartridges: u64,
    /// Number of existing pages.
    pub page_count: u32,
    /// Index of the currently appendable page.
    pub latest_page_index: u32,
    /// Derivation byte for this address.
    pub bump: u8,
}

impl CatalogRoot {
    /// Exact byte length of the account.
    pub const LEN: usize = 8 + 1 + 32 + 8 + 4 + 4 + 1;

    /// Current schema version.
    pub const VERSION: u8 = 1;

    /// Encode to account bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::LEN);
        w.discriminator(DISCRIMINATOR);
        w.u8(self.version);
        w.bytes(self.admin.as_bytes());
        w.u64(self.total_cartridges);
        w.u32(self.page_count);
        w.u32(self.latest_page_index);
        w.u8(self.bump);
        w.finish(Self::LEN)
    }

    /// Decode from account bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        let mut r = Reader::new(bytes);
        r.discriminator(DISCRIMINATOR, "CatalogRoot")?;
        Ok(Self {
            version: r.u8()?,
            admin: PublicKey::from_bytes(r.array()?),
            total_cartridges: r.u64()?,
            page_count: r.u32()?,
            latest_page_index: r.u32()?,
            bump: r.u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;

    fn sample() -> CatalogRoot {
        CatalogRoot {
            version: CatalogRoot::VERSION,
            admin: Keypair::from_secret(&[3; 32]).public_key(),
            total_cartridges: 17,
            page_count: 2,
            latest_page_index: 1,
            bump: 254,
        }
    }

    #[test]
    fn roundtrip() {
        let root = sample();
        let bytes = root.encode();
        assert_eq!(bytes.len(), CatalogRoot::LEN);
        assert_eq!(CatalogRoot::decode(&bytes).unwrap(), root);
        assert_eq!(CatalogRoot::decode(&bytes).unwrap().encode(), bytes);
    }

    #[test]
    fn rejects_short_input() {
        let bytes = sample().encode();
        assert!(matches!(
            CatalogRoot::decode(&bytes[..bytes.len() - 1]),
            Err(LayoutError::TooShort { .. })
        ));
    }

    #[test]
    fn rejects_wrong_discriminator() {
        let mut bytes = sample().encode();
        bytes[0] ^= 0xff;
        assert_eq!(
            CatalogRoot::decode(&bytes),
            Err(LayoutError::Discriminator {
                record: "CatalogRoot"
            })
        );
    }
}
