//! The [`Testnet`] harness: a booted node plus funded clients.

use retrovault::{CartridgeClient, Keypair, Network, RateLimiterConfig};
use retrovault_common::Address;
use url::Url;

use crate::node::{LedgerNode, NodeHandle, OPERATION_FEE};

/// Enough for any test to never think about fees again.
const FAUCET_GRANT: u64 = OPERATION_FEE * 100_000;

/// A local ledger with an initialized catalog, funded keys on demand, and
/// ready-made SDK clients. Everything is cleaned up when dropped.
pub struct Testnet {
    handle: NodeHandle,
    admin: Keypair,
    temp_dirs: Vec<tempfile::TempDir>,
}

impl Testnet {
    /// Boot a node, initialize the catalog and create page 0.
    pub async fn start() -> anyhow::Result<Self> {
        let handle = LedgerNode::new().spawn().await?;
        let admin = Keypair::from_secret(&[0; 32]);

        let mut testnet = Self {
            handle,
            admin,
            temp_dirs: vec![],
        };

        testnet.fund(&fee_account(&testnet.admin.public_key()));
        let admin_client = testnet.client_for(testnet.admin.clone())?;
        admin_client.init_catalog().await?;
        admin_client.create_page(0).await?;

        Ok(testnet)
    }

    /// Boot a node without touching the ledger, for tests that exercise
    /// bootstrap themselves.
    pub async fn start_uninitialized() -> anyhow::Result<Self> {
        let handle = LedgerNode::new().spawn().await?;
        Ok(Self {
            handle,
            admin: Keypair::from_secret(&[0; 32]),
            temp_dirs: vec![],
        })
    }

    /// The node's RPC URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        self.handle.url()
    }

    /// The running node, for direct ledger inspection.
    #[must_use]
    pub fn node(&self) -> &LedgerNode {
        self.handle.node()
    }

    /// The catalog admin keypair.
    #[must_use]
    pub fn admin(&self) -> &Keypair {
        &self.admin
    }

    /// Credit an account straight from the faucet.
    pub fn fund(&self, address: &Address) {
        self.node().credit(address, FAUCET_GRANT);
    }

    /// A client signing as the catalog admin, without a cache.
    pub fn admin_client(&self) -> anyhow::Result<CartridgeClient> {
        self.client_for(self.admin.clone())
    }

    /// A cache-less client for `keypair`, funded.
    pub fn client_for(&self, keypair: Keypair) -> anyhow::Result<CartridgeClient> {
        self.fund(&fee_account(&keypair.public_key()));
        Ok(CartridgeClient::builder()
            .network(Network::Localnet)
            .url(self.url().clone())
            .keypair(keypair)
            .build()?)
    }

    /// A funded client with a fresh random keypair and a temp-dir cache.
    pub fn client(&mut self) -> anyhow::Result<CartridgeClient> {
        let keypair = Keypair::random();
        self.client_with_cache(keypair)
    }

    /// A funded client for `keypair` with its own temp-dir cache.
    pub fn client_with_cache(&mut self, keypair: Keypair) -> anyhow::Result<CartridgeClient> {
        self.fund(&fee_account(&keypair.public_key()));
        let dir = tempfile::tempdir()?;
        let client = CartridgeClient::builder()
            .network(Network::Localnet)
            .url(self.url().clone())
            .keypair(keypair)
            .cache_dir(dir.path().to_path_buf())
            .build()?;
        self.temp_dirs.push(dir);
        Ok(client)
    }

    /// A client whose endpoint list is `urls`, all treated as public so the
    /// rate limiter applies. For failover and rate-limit tests.
    pub fn client_with_endpoints(
        &self,
        urls: Vec<Url>,
        keypair: Keypair,
        limiter: RateLimiterConfig,
    ) -> anyhow::Result<CartridgeClient> {
        self.fund(&fee_account(&keypair.public_key()));
        let mut builder = CartridgeClient::builder()
            .network(Network::Localnet)
            .treat_urls_as_public(true)
            .rate_limiter(limiter)
            .keypair(keypair);
        for url in urls {
            builder = builder.url(url);
        }
        Ok(builder.build()?)
    }
}

/// The account a public key pays fees from.
fn fee_account(public_key: &retrovault::PublicKey) -> Address {
    Address::from_bytes(public_key.to_bytes())
}
