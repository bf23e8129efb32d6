//! Endpoint classification and network presets.

use core::fmt;
use core::str::FromStr;

use url::Url;

/// Host prefixes of the recognized public RPC endpoints. Everything else is
/// a custom endpoint: no client-side rate limiting, no implicit fallback.
pub const PUBLIC_HOST_PREFIXES: &[&str] = &[
    "rpc.mainnet.retrovault",
    "rpc.devnet.retrovault",
    "rpc.testnet.retrovault",
];

/// The ledger cluster a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// The production cluster.
    Mainnet,
    /// The development cluster.
    #[default]
    Devnet,
    /// The staging cluster.
    Testnet,
    /// A node on this machine.
    Localnet,
}

impl Network {
    /// Default RPC endpoint of this network.
    #[must_use]
    pub fn default_url(&self) -> Url {
        let url = match self {
            Network::Mainnet => "https://rpc.mainnet.retrovault.net",
            Network::Devnet => "https://rpc.devnet.retrovault.net",
            Network::Testnet => "https://rpc.testnet.retrovault.net",
            Network::Localnet => "http://127.0.0.1:8899",
        };
        Url::parse(url).expect("static network url")
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Localnet => "localnet",
        })
    }
}

/// Error parsing a [`Network`] name.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown network {0:?}, expected mainnet|devnet|testnet|localnet")]
pub struct ParseNetworkError(String);

impl FromStr for Network {
    type Err = ParseNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "localnet" => Ok(Network::Localnet),
            other => Err(ParseNetworkError(other.to_string())),
        }
    }
}

/// How the transport treats an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// A recognized public endpoint; the shared rate limiter applies.
    Public,
    /// A user-provided endpoint; no client-side limiting.
    Custom,
}

/// One RPC endpoint in the pool.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    kind: EndpointKind,
}

impl Endpoint {
    /// Classify `url` by its host against [`PUBLIC_HOST_PREFIXES`].
    #[must_use]
    pub fn new(url: Url) -> Self {
        let kind = match url.host_str() {
            Some(host)
                if PUBLIC_HOST_PREFIXES
                    .iter()
                    .any(|prefix| host.starts_with(prefix)) =>
            {
                EndpointKind::Public
            }
            _ => EndpointKind::Custom,
        };
        Self { url, kind }
    }

    /// An endpoint treated as public regardless of its host.
    #[must_use]
    pub fn public(url: Url) -> Self {
        Self {
            url,
            kind: EndpointKind::Public,
        }
    }

    /// An endpoint treated as custom regardless of its host.
    #[must_use]
    pub fn custom(url: Url) -> Self {
        Self {
            url,
            kind: EndpointKind::Custom,
        }
    }

    /// The endpoint's URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The endpoint's classification.
    #[must_use]
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Whether the shared rate limiter applies.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.kind == EndpointKind::Public
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let public = Endpoint::new(Url::parse("https://rpc.devnet.retrovault.net").unwrap());
        assert_eq!(public.kind(), EndpointKind::Public);

        let custom = Endpoint::new(Url::parse("https://my-paid-rpc.example.com").unwrap());
        assert_eq!(custom.kind(), EndpointKind::Custom);

        let local = Endpoint::new(Url::parse("http://127.0.0.1:8899").unwrap());
        assert!(!local.is_public());
    }

    #[test]
    fn network_parse_display() {
        for name in ["mainnet", "devnet", "testnet", "localnet"] {
            assert_eq!(name.parse::<Network>().unwrap().to_string(), name);
        }
        assert!("betanet".parse::<Network>().is_err());
    }
}
