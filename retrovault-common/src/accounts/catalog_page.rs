//! Fixed-capacity catalog pages and their entries.

use crate::address::Address;
use crate::constants::{FLAG_RETIRED, PAGE_CAP};
use crate::content_id::ContentId;

use super::{LayoutError, Reader, Writer};

pub(crate) const DISCRIMINATOR: &[u8; 8] = &[0x37, 0x56, 0x08, 0x1d, 0xbf, 0x2e, 0x94, 0x0d];

/// Exact byte length of one catalog entry slot, trailing alignment included.
pub const ENTRY_LEN: usize = 32 + 32 + 8 + 32 + 8 + 1 + 7;

/// One finalized cartridge in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// SHA-256 of the blob; also the manifest seed.
    pub content_id: ContentId,
    /// Derived address of the associated manifest.
    pub manifest_address: Address,
    /// Size in bytes of the original blob.
    pub blob_size: u64,
    /// Redundant copy of the content id, guarding entry integrity.
    pub sha256: [u8; 32],
    /// Ledger slot at finalization.
    pub created_slot: u64,
    /// Bit 0: retired (hidden unless explicitly requested).
    pub flags: u8,
}

impl CatalogEntry {
    /// Whether the retired bit is set.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.flags & FLAG_RETIRED != 0
    }

    fn write(&self, w: &mut Writer) {
        w.bytes(self.content_id.as_bytes());
        w.bytes(self.manifest_address.as_bytes());
        w.u64(self.blob_size);
        w.bytes(&self.sha256);
        w.u64(self.created_slot);
        w.u8(self.flags);
        w.pad(7);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LayoutError> {
        let entry = Self {
            content_id: ContentId::from_bytes(r.array()?),
            manifest_address: Address::from_bytes(r.array()?),
            blob_size: r.u64()?,
            sha256: r.array()?,
            created_slot: r.u64()?,
            flags: r.u8()?,
        };
        r.pad(7)?;
        Ok(entry)
    }
}

/// A fixed-capacity, append-only array of catalog entries.
///
/// Slots `[entry_count, PAGE_CAP)` are uninitialised and ignored on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    /// Must equal the page's derivation seed.
    pub page_index: u32,
    /// Derivation byte.
    pub bump: u8,
    /// Populated entries, in append order; `len() ≤ PAGE_CAP`.
    pub entries: Vec<CatalogEntry>,
}

impl CatalogPage {
    /// Exact byte length of the account.
    pub const LEN: usize = 8 + 4 + 4 + 1 + 7 + PAGE_CAP * ENTRY_LEN;

    /// Number of populated entries.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Whether another entry still fits.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.entries.len() < PAGE_CAP
    }

    /// Encode to account bytes; unused slots are zero-filled.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::LEN);
        w.discriminator(DISCRIMINATOR);
        w.u32(self.page_index);
        w.u32(self.entry_count());
        w.u8(self.bump);
        w.pad(7);
        for entry in &self.entries {
            entry.write(&mut w);
        }
        w.pad((PAGE_CAP - self.entries.len()) * ENTRY_LEN);
        w.finish(Self::LEN)
    }

    /// Decode from account bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        let mut r = Reader::new(bytes);
        r.discriminator(DISCRIMINATOR, "CatalogPage")?;
        let page_index = r.u32()?;
        let entry_count = r.u32()? as usize;
        let bump = r.u8()?;
        r.pad(7)?;

        if entry_count > PAGE_CAP {
            return Err(LayoutError::LengthOutOfBounds {
                field: "entry_count",
                len: entry_count,
                max: PAGE_CAP,
            });
        }

        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            entries.push(CatalogEntry::read(&mut r)?);
        }
        r.pad((PAGE_CAP - entry_count) * ENTRY_LEN)?;

        Ok(Self {
            page_index,
            bump,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::manifest_address;

    fn entry(n: u8) -> CatalogEntry {
        let content_id = ContentId::hash(&[n]);
        CatalogEntry {
            content_id,
            manifest_address: manifest_address(&content_id).0,
            blob_size: 5,
            sha256: content_id.to_bytes(),
            created_slot: 42,
            flags: 0,
        }
    }

    #[test]
    fn roundtrip_partial_page() {
        let page = CatalogPage {
            page_index: 3,
            bump: 251,
            entries: vec![entry(1), entry(2)],
        };
        let bytes = page.encode();
        assert_eq!(bytes.len(), CatalogPage::LEN);
        assert_eq!(CatalogPage::decode(&bytes).unwrap(), page);
        assert_eq!(CatalogPage::decode(&bytes).unwrap().encode(), bytes);
    }

    #[test]
    fn roundtrip_empty_and_full_page() {
        let empty = CatalogPage {
            page_index: 0,
            bump: 255,
            entries: vec![],
        };
        assert_eq!(CatalogPage::decode(&empty.encode()).unwrap(), empty);
        assert!(empty.has_capacity());

        let full = CatalogPage {
            page_index: 0,
            bump: 255,
            entries: (0..PAGE_CAP as u8).map(entry).collect(),
        };
        assert_eq!(CatalogPage::decode(&full.encode()).unwrap(), full);
        assert!(!full.has_capacity());
    }

    #[test]
    fn rejects_entry_count_over_cap() {
        let mut bytes = CatalogPage {
            page_index: 0,
            bump: 255,
            entries: vec![],
        }
        .encode();
        bytes[12..16].copy_from_slice(&(PAGE_CAP as u32 + 1).to_le_bytes());
        assert_eq!(
            CatalogPage::decode(&bytes),
            Err(LayoutError::LengthOutOfBounds {
                field: "entry_count",
                len: PAGE_CAP + 1,
                max: PAGE_CAP,
            })
        );
    }

    #[test]
    fn retired_flag() {
        let mut e = entry(9);
        assert!(!e.is_retired());
        e.flags |= FLAG_RETIRED;
        assert!(e.is_retired());
    }
}
