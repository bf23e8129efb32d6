//! The [`CartridgeClient`] facade and its builder.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use retrovault_common::accounts::{CartridgeManifest, CatalogEntry, CatalogPage, CatalogRoot};
use retrovault_common::address::{catalog_page_address, catalog_root_address, manifest_address};
use retrovault_common::{Address, ContentId, Keypair, LayoutError, Operation, OperationEnvelope, PublicKey};
use url::Url;

use crate::cache::ChunkCache;
use crate::errors::{Error, Result};
use crate::transport::{Endpoint, Network, RateLimiter, RateLimiterConfig, RpcPool};

/// Configures and builds a [`CartridgeClient`].
#[derive(Default)]
pub struct ClientBuilder {
    network: Network,
    urls: Vec<Url>,
    treat_urls_as_public: bool,
    keypair: Option<Keypair>,
    cache_dir: Option<PathBuf>,
    deny_list: HashSet<ContentId>,
    rate_limiter: Option<RateLimiterConfig>,
}

impl ClientBuilder {
    /// Target network; decides the default endpoint when no URL is given.
    #[must_use]
    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Add an endpoint. The first becomes the primary, the rest fallbacks.
    /// Endpoints are classified custom unless their host matches a
    /// recognized public prefix.
    #[must_use]
    pub fn url(mut self, url: Url) -> Self {
        self.urls.push(url);
        self
    }

    /// Force every explicitly added URL to be treated as public (and thus
    /// rate limited). Meant for tests that stand in for public endpoints.
    #[must_use]
    pub fn treat_urls_as_public(mut self, yes: bool) -> Self {
        self.treat_urls_as_public = yes;
        self
    }

    /// The keypair publishing and admin operations sign with.
    #[must_use]
    pub fn keypair(mut self, keypair: Keypair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    /// Directory for the persistent chunk cache. Without one the client
    /// runs cache-less, which only costs re-downloads.
    #[must_use]
    pub fn cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Refuse to publish these content ids.
    #[must_use]
    pub fn deny_list(mut self, ids: impl IntoIterator<Item = ContentId>) -> Self {
        self.deny_list.extend(ids);
        self
    }

    /// Override the public-endpoint window parameters.
    #[must_use]
    pub fn rate_limiter(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limiter = Some(config);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<CartridgeClient> {
        let endpoints: Vec<Endpoint> = if self.urls.is_empty() {
            vec![Endpoint::new(self.network.default_url())]
        } else if self.treat_urls_as_public {
            self.urls.into_iter().map(Endpoint::public).collect()
        } else {
            self.urls.into_iter().map(Endpoint::new).collect()
        };

        let limiter = Arc::new(RateLimiter::new(self.rate_limiter.unwrap_or_default()));
        let pool = RpcPool::new(endpoints, limiter)?;

        let cache = match self.cache_dir {
            Some(dir) => Some(ChunkCache::open(&dir)?),
            None => None,
        };

        Ok(CartridgeClient {
            pool,
            keypair: self.keypair,
            cache,
            deny_list: self.deny_list,
        })
    }
}

/// Client over the Retrovault ledger program: publish, fetch, and browse
/// the catalog.
#[derive(Debug, Clone)]
pub struct CartridgeClient {
    pub(crate) pool: RpcPool,
    pub(crate) keypair: Option<Keypair>,
    pub(crate) cache: Option<ChunkCache>,
    pub(crate) deny_list: HashSet<ContentId>,
}

impl CartridgeClient {
    /// Start configuring a client.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The underlying RPC pool, for slot/balance/airdrop queries.
    #[must_use]
    pub fn rpc(&self) -> &RpcPool {
        &self.pool
    }

    /// The configured signing keypair, if any.
    #[must_use]
    pub fn keypair(&self) -> Option<&Keypair> {
        self.keypair.as_ref()
    }

    /// The chunk cache, if one was configured.
    #[must_use]
    pub fn cache(&self) -> Option<&ChunkCache> {
        self.cache.as_ref()
    }

    pub(crate) fn require_keypair(&self) -> Result<&Keypair> {
        self.keypair.as_ref().ok_or_else(|| Error::Input {
            message: "no keypair configured; this operation must sign".to_string(),
        })
    }

    /// Submit one signed operation without retries.
    pub(crate) async fn submit(&self, keypair: &Keypair, operation: &Operation) -> Result<String> {
        let envelope = OperationEnvelope::sign(keypair, operation);
        self.pool.send_operation(&envelope).await
    }

    // === Catalog reads ===

    /// The catalog root, or `None` before `initialize_catalog`.
    pub async fn catalog_root(&self) -> Result<Option<CatalogRoot>> {
        let (address, _) = catalog_root_address();
        match self.pool.get_account(&address).await? {
            Some(account) => Ok(Some(decode_at(address, &account.data, CatalogRoot::decode)?)),
            None => Ok(None),
        }
    }

    /// Entries of one catalog page, or `None` if the page does not exist.
    /// Retired entries are filtered unless `include_retired`.
    pub async fn list_page(
        &self,
        page_index: u32,
        include_retired: bool,
    ) -> Result<Option<Vec<CatalogEntry>>> {
        let (address, _) = catalog_page_address(page_index);
        let Some(account) = self.pool.get_account(&address).await? else {
            return Ok(None);
        };
        let page = decode_at(address, &account.data, CatalogPage::decode)?;
        Ok(Some(filter_entries(page, include_retired)))
    }

    /// Every catalog entry across all pages, in append order.
    pub async fn list_all(&self, include_retired: bool) -> Result<Vec<CatalogEntry>> {
        let Some(root) = self.catalog_root().await? else {
            return Ok(vec![]);
        };
        let mut entries = Vec::with_capacity(root.total_cartridges as usize);
        for page_index in 0..root.page_count {
            if let Some(page_entries) = self.list_page(page_index, include_retired).await? {
                entries.extend(page_entries);
            }
        }
        Ok(entries)
    }

    /// The manifest for `content_id` and its derived address, or `None`.
    pub async fn manifest_info(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<(Address, CartridgeManifest)>> {
        let (address, _) = manifest_address(content_id);
        match self.pool.get_account(&address).await? {
            Some(account) => {
                let manifest = decode_at(address, &account.data, CartridgeManifest::decode)?;
                Ok(Some((address, manifest)))
            }
            None => Ok(None),
        }
    }

    // === Admin operations ===

    /// Create the singleton catalog root; the signer becomes admin.
    pub async fn init_catalog(&self) -> Result<String> {
        let keypair = self.require_keypair()?;
        self.submit(keypair, &Operation::InitializeCatalog).await
    }

    /// Create catalog page `page_index` (must equal the current page count).
    pub async fn create_page(&self, page_index: u32) -> Result<String> {
        let keypair = self.require_keypair()?;
        self.submit(keypair, &Operation::CreateCatalogPage { page_index })
            .await
    }

    /// Rotate the catalog admin key.
    pub async fn update_admin(&self, new_admin: PublicKey) -> Result<String> {
        let keypair = self.require_keypair()?;
        self.submit(keypair, &Operation::UpdateAdmin { new_admin })
            .await
    }
}

fn filter_entries(page: CatalogPage, include_retired: bool) -> Vec<CatalogEntry> {
    page.entries
        .into_iter()
        .filter(|entry| include_retired || !entry.is_retired())
        .collect()
}

/// Decode account bytes, attaching the offending address on failure.
pub(crate) fn decode_at<T>(
    address: Address,
    bytes: &[u8],
    decode: impl FnOnce(&[u8]) -> std::result::Result<T, LayoutError>,
) -> Result<T> {
    decode(bytes).map_err(|source| Error::Layout { address, source })
}
