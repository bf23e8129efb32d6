//! Retrovault SDK.
//!
//! Publishes and fetches content-addressed cartridges over ledger JSON-RPC:
//! chunk splitting, bounded-concurrency uploads and downloads with
//! rate-limited retries, endpoint failover, a persistent chunk cache, and
//! SHA-256 verification of every reconstruction against the on-ledger
//! commitment.
//!
//! The entry point is [`CartridgeClient`]:
//!
//! ```no_run
//! # async fn demo() -> retrovault::Result<()> {
//! use retrovault::{CartridgeClient, Network, PublishOptions};
//!
//! let client = CartridgeClient::builder()
//!     .network(Network::Devnet)
//!     .keypair(retrovault::Keypair::random())
//!     .build()?;
//!
//! let receipt = client
//!     .publish(b"cartridge bytes".to_vec(), PublishOptions::default())
//!     .await?;
//! let fetched = client.fetch(&receipt.content_id, Default::default()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cache;
mod client;
pub mod errors;
mod fetch;
pub mod progress;
mod publish;
pub mod transport;

pub use client::{CartridgeClient, ClientBuilder};
pub use errors::{ConflictError, Error, Result, TransportError};
pub use fetch::{FetchOptions, FetchedCartridge};
pub use progress::{FetchEvent, FetchProgress, PublishEvent, PublishProgress};
pub use publish::{PublishOptions, PublishOutcome, PublishReceipt};
pub use transport::{Endpoint, Network, RateLimiterConfig};

// Re-export the shared primitives callers hold in their hands.
pub use retrovault_common::{Address, ContentId, Keypair, PublicKey};
pub use tokio_util::sync::CancellationToken;
