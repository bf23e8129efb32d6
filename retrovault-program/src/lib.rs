//! The Retrovault on-ledger program.
//!
//! Six operations connect four account families: a singleton
//! [`CatalogRoot`], fixed-capacity [`CatalogPage`]s, one
//! [`CartridgeManifest`] per content blob and one [`CartridgeChunk`] per
//! chunk index. Each operation validates, then mutates; the ledger runtime
//! is expected to stage writes and commit them only on success, so a failed
//! operation changes nothing.
//!
//! [`CatalogRoot`]: retrovault_common::CatalogRoot
//! [`CatalogPage`]: retrovault_common::CatalogPage
//! [`CartridgeManifest`]: retrovault_common::CartridgeManifest
//! [`CartridgeChunk`]: retrovault_common::CartridgeChunk

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod error;
mod processor;
mod store;

pub use error::ProgramError;
pub use processor::apply;
pub use store::{AccountStore, MemoryStore, Overlay};
