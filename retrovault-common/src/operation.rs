//! The six mutating operations and their signed wire envelope.
//!
//! Operations travel as a postcard-serialized payload wrapped in an
//! envelope carrying the signer's key and an ed25519 signature over the
//! payload bytes. The node refuses envelopes that do not verify; the base58
//! form of the signature doubles as the transaction id.

use serde::{Deserialize, Serialize};

use crate::content_id::ContentId;
use crate::keys::{KeyError, Keypair, PublicKey, Signature};

/// A state transition of the on-ledger program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create the singleton catalog root; the signer becomes admin.
    InitializeCatalog,
    /// Create the next empty catalog page. Admin only.
    CreateCatalogPage {
        /// Must equal the root's current `page_count`.
        page_index: u32,
    },
    /// Create a manifest, opening a content id for chunk writes.
    CreateManifest {
        /// SHA-256 of the blob being published.
        content_id: ContentId,
        /// Total size of the blob in bytes.
        blob_size: u64,
        /// Chunk size the blob will be split at.
        chunk_size: u32,
        /// Declared commitment; must equal `content_id`.
        declared_sha256: [u8; 32],
        /// Opaque metadata, at most `METADATA_CAP` bytes.
        metadata: Vec<u8>,
    },
    /// Write one chunk of an open cartridge.
    WriteChunk {
        /// Content id the chunk belongs to.
        content_id: ContentId,
        /// Index of the chunk being written.
        chunk_index: u32,
        /// Payload; full `chunk_size` or the exact last-chunk remainder.
        payload: Vec<u8>,
    },
    /// Seal a fully-written cartridge and append it to the catalog.
    FinalizeCartridge {
        /// Content id being finalized.
        content_id: ContentId,
        /// Must equal the root's `latest_page_index`.
        page_index: u32,
    },
    /// Rotate the catalog admin key. Admin only.
    UpdateAdmin {
        /// The key taking over.
        new_admin: PublicKey,
    },
}

impl Operation {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InitializeCatalog => "initialize_catalog",
            Operation::CreateCatalogPage { .. } => "create_catalog_page",
            Operation::CreateManifest { .. } => "create_manifest",
            Operation::WriteChunk { .. } => "write_chunk",
            Operation::FinalizeCartridge { .. } => "finalize_cartridge",
            Operation::UpdateAdmin { .. } => "update_admin",
        }
    }
}

/// A signed, transport-ready operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEnvelope {
    /// Postcard bytes of the [`Operation`].
    pub payload: Vec<u8>,
    /// The signing key, and the fee payer on the node.
    pub signer: PublicKey,
    /// Ed25519 signature over `payload`.
    pub signature: Signature,
}

/// Error producing or opening an [`OperationEnvelope`].
#[derive(thiserror::Error, Debug)]
pub enum EnvelopeError {
    /// The signature does not verify against the payload and signer.
    #[error("envelope signature invalid: {0}")]
    Signature(#[from] KeyError),
    /// Error parsing the binary representation.
    #[error(transparent)]
    Parsing(#[from] postcard::Error),
}

impl OperationEnvelope {
    /// Sign `operation` with `keypair`.
    #[must_use]
    pub fn sign(keypair: &Keypair, operation: &Operation) -> Self {
        let payload = postcard::to_allocvec(operation).expect("Operation::serialize");
        let signature = keypair.sign(&payload);
        Self {
            payload,
            signer: keypair.public_key(),
            signature,
        }
    }

    /// Verify the signature and decode the operation.
    pub fn open(&self) -> Result<Operation, EnvelopeError> {
        self.signer.verify(&self.payload, &self.signature)?;
        Ok(postcard::from_bytes(&self.payload)?)
    }

    /// Serialize the whole envelope to its canonical binary representation.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).expect("OperationEnvelope::serialize")
    }

    /// Deserialize an envelope from its canonical binary representation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// The transaction id: the base58 form of the signature.
    #[must_use]
    pub fn transaction_id(&self) -> String {
        bs58::encode(self.signature.to_bytes()).into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_open_roundtrip() {
        let keypair = Keypair::from_secret(&[11; 32]);
        let operation = Operation::CreateCatalogPage { page_index: 4 };

        let envelope = OperationEnvelope::sign(&keypair, &operation);
        assert_eq!(envelope.open().unwrap(), operation);

        let bytes = envelope.to_bytes();
        let parsed = OperationEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.open().unwrap(), operation);
        assert_eq!(parsed.transaction_id(), envelope.transaction_id());
    }

    #[test]
    fn tampered_payload_fails_to_open() {
        let keypair = Keypair::from_secret(&[12; 32]);
        let mut envelope =
            OperationEnvelope::sign(&keypair, &Operation::InitializeCatalog);
        envelope.payload.push(0);

        assert!(matches!(
            envelope.open(),
            Err(EnvelopeError::Signature(_))
        ));
    }

    #[test]
    fn wrong_signer_fails_to_open() {
        let keypair = Keypair::from_secret(&[13; 32]);
        let mut envelope =
            OperationEnvelope::sign(&keypair, &Operation::InitializeCatalog);
        envelope.signer = Keypair::from_secret(&[14; 32]).public_key();

        assert!(envelope.open().is_err());
    }
}
