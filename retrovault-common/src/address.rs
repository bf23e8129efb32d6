//! Deterministic account addresses.
//!
//! All on-ledger state is reached through addresses derived from a seed tag,
//! optional typed seeds, and the program id; no other index exists. The
//! derivation searches bumps from 255 downward and keeps the first candidate
//! that is not a valid ed25519 point, so derived addresses can never collide
//! with a signing key. The winning bump is stored in the account it derived.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::content_id::ContentId;

/// Domain separator appended to every derivation hash.
const DERIVE_MARKER: &[u8] = b"RetrovaultDerivedAddress";

/// The deployed program's identity. Deployment-dependent overrides must be
/// synchronised across program, client library, and any in-process decoder.
pub const PROGRAM_ID: Address = Address([
    0xdc, 0x9d, 0xb9, 0x46, 0x15, 0x8b, 0x88, 0xaa, 0x39, 0xd7, 0xf1, 0x62, 0x6d, 0xa2, 0xf0,
    0xe1, 0x1e, 0x07, 0xcb, 0xb7, 0x78, 0xf9, 0x1d, 0xea, 0xdc, 0x0f, 0xc2, 0xd7, 0xcf, 0x47,
    0xb1, 0xfb,
]);

/// A 32-byte account address, rendered base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Construct from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw address bytes.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Borrow the raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Error parsing a base58 address string.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid address: expected 32 bytes of base58")]
pub struct ParseAddressError;

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec().map_err(|_| ParseAddressError)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| ParseAddressError)?;
        Ok(Self(arr))
    }
}

/// Derive an address from seed parts under `program_id`.
///
/// Pure: equal inputs always yield the same `(address, bump)`.
#[must_use]
pub fn derive_address(seeds: &[&[u8]], program_id: &Address) -> (Address, u8) {
    for bump in (0..=255u8).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id.as_bytes());
        hasher.update(DERIVE_MARKER);
        let candidate: [u8; 32] = hasher.finalize().into();

        // A candidate that decodes as a curve point could be a signing key;
        // skip it and keep searching.
        if ed25519_dalek::VerifyingKey::from_bytes(&candidate).is_err() {
            return (Address(candidate), bump);
        }
    }
    unreachable!("bump search exhausted: no off-curve candidate in 256 tries")
}

/// Address of the singleton catalog root.
#[must_use]
pub fn catalog_root_address() -> (Address, u8) {
    derive_address(&[b"catalog_root"], &PROGRAM_ID)
}

/// Address of catalog page `page_index`.
#[must_use]
pub fn catalog_page_address(page_index: u32) -> (Address, u8) {
    derive_address(&[b"catalog_page", &page_index.to_le_bytes()], &PROGRAM_ID)
}

/// Address of the manifest for `content_id`.
#[must_use]
pub fn manifest_address(content_id: &ContentId) -> (Address, u8) {
    derive_address(&[b"manifest", content_id.as_bytes()], &PROGRAM_ID)
}

/// Address of chunk `chunk_index` of `content_id`.
#[must_use]
pub fn chunk_address(content_id: &ContentId, chunk_index: u32) -> (Address, u8) {
    derive_address(
        &[b"chunk", content_id.as_bytes(), &chunk_index.to_le_bytes()],
        &PROGRAM_ID,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let (a1, b1) = catalog_root_address();
        let (a2, b2) = catalog_root_address();
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
    }

    #[test]
    fn distinct_seeds_distinct_addresses() {
        let id = ContentId::hash(b"blob");
        let (manifest, _) = manifest_address(&id);
        let (chunk0, _) = chunk_address(&id, 0);
        let (chunk1, _) = chunk_address(&id, 1);
        let (page0, _) = catalog_page_address(0);
        let (page1, _) = catalog_page_address(1);

        assert_ne!(manifest, chunk0);
        assert_ne!(chunk0, chunk1);
        assert_ne!(page0, page1);
    }

    #[test]
    fn derived_addresses_are_off_curve() {
        let (address, _) = catalog_root_address();
        assert!(ed25519_dalek::VerifyingKey::from_bytes(address.as_bytes()).is_err());
    }

    #[test]
    fn base58_roundtrip() {
        let (address, _) = catalog_root_address();
        assert_eq!(address.to_string().parse::<Address>().unwrap(), address);
    }
}
