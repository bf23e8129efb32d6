//! Ed25519 keypairs and public keys with base58 rendering.

use core::fmt;
use core::str::FromStr;
use std::{io, path::Path};

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};

pub use ed25519_dalek::Signature;

/// Error parsing or using a key.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    /// The textual form did not decode to 32 bytes of base58.
    #[error("invalid public key string")]
    InvalidEncoding,
    /// The 32 bytes are not a valid ed25519 point.
    #[error("invalid ed25519 public key")]
    InvalidPoint,
    /// Signature verification failed.
    #[error("signature verification failed")]
    BadSignature,
    /// A keypair file could not be read or had the wrong shape.
    #[error("invalid keypair file: {0}")]
    KeypairFile(String),
}

/// An ed25519 signing keypair.
#[derive(Clone)]
pub struct Keypair(ed25519_dalek::SigningKey);

impl Keypair {
    /// Generate a random keypair.
    #[must_use]
    pub fn random() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Construct a [`Keypair`] from a 32-byte secret seed.
    #[must_use]
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(secret))
    }

    /// Export the secret seed bytes.
    #[must_use]
    pub fn secret(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Read a keypair from a JSON file holding the 64-byte
    /// `secret ‖ public` array.
    pub fn from_keypair_file(path: &Path) -> Result<Self, KeyError> {
        let file = std::fs::File::open(path)
            .map_err(|e: io::Error| KeyError::KeypairFile(e.to_string()))?;
        let bytes: Vec<u8> = serde_json::from_reader(file)
            .map_err(|e| KeyError::KeypairFile(e.to_string()))?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| KeyError::KeypairFile("expected 64 bytes".into()))?;
        ed25519_dalek::SigningKey::from_keypair_bytes(&arr)
            .map(Self)
            .map_err(|e| KeyError::KeypairFile(e.to_string()))
    }

    /// Persist this keypair as a JSON 64-byte array.
    pub fn write_keypair_file(&self, path: &Path) -> Result<(), KeyError> {
        let bytes = self.0.to_keypair_bytes().to_vec();
        let json = serde_json::to_string(&bytes)
            .map_err(|e| KeyError::KeypairFile(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| KeyError::KeypairFile(e.to_string()))
    }

    /// Return the [`PublicKey`] associated with this [`Keypair`].
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    /// Sign a message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.0.sign(message)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.public_key())
    }
}

/// A 32-byte ed25519 public key.
///
/// Stored and transported as raw bytes; point validity is only checked when
/// the key is actually used to verify a signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(pub(crate) [u8; 32]);

impl PublicKey {
    /// Construct from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Borrow the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify `signature` over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), KeyError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| KeyError::InvalidPoint)?;
        key.verify(message, signature)
            .map_err(|_| KeyError::BadSignature)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidEncoding)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidEncoding)?;
        Ok(Self(arr))
    }
}

impl From<ed25519_dalek::VerifyingKey> for PublicKey {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let keypair = Keypair::from_secret(&[7; 32]);
        let signature = keypair.sign(b"cartridge");
        keypair.public_key().verify(b"cartridge", &signature).unwrap();

        assert!(matches!(
            keypair.public_key().verify(b"tampered", &signature),
            Err(KeyError::BadSignature)
        ));
    }

    #[test]
    fn base58_roundtrip() {
        let public_key = Keypair::from_secret(&[1; 32]).public_key();
        let text = public_key.to_string();
        assert_eq!(text.parse::<PublicKey>().unwrap(), public_key);
    }

    #[test]
    fn keypair_file_roundtrip() {
        let dir = std::env::temp_dir().join("retrovault-keys-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("id.json");

        let keypair = Keypair::from_secret(&[9; 32]);
        keypair.write_keypair_file(&path).unwrap();
        let loaded = Keypair::from_keypair_file(&path).unwrap();
        assert_eq!(loaded.public_key(), keypair.public_key());
    }
}
