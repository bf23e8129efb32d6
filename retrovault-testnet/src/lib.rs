//! A local test ledger for Retrovault development.
//!
//! Runs the on-ledger program in-process behind the same JSON-RPC surface a
//! deployed node exposes, so the SDK, the CLI and the e2e suite exercise
//! the real wire path. [`Testnet`] boots a node, funds keys through the
//! faucet and hands out ready-made clients; everything is torn down on
//! drop.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod node;
mod testnet;

pub use node::{LedgerNode, NodeHandle, OPERATION_FEE};
pub use testnet::Testnet;
