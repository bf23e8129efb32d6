//! Types and structs in common between the Retrovault client, program and
//! node: account layouts, address derivation, content ids, keys, and signed
//! operation envelopes.
//!
//! Everything that must match byte-for-byte across implementations lives
//! here. The [`accounts`] module is the single authority on the on-ledger
//! account layouts; both the program and every client decoder go through it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod accounts;
pub mod address;
pub mod constants;
pub mod content_id;
pub mod keys;
pub mod operation;

pub use accounts::{
    CartridgeChunk, CartridgeManifest, CatalogEntry, CatalogPage, CatalogRoot, LayoutError,
};
pub use address::Address;
pub use content_id::ContentId;
pub use keys::{Keypair, PublicKey};
pub use operation::{Operation, OperationEnvelope};
