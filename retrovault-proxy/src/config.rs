//! Environment-driven configuration.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::nonzero;

/// Whose requests share a token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitMode {
    /// One bucket per client ip.
    #[default]
    PerIp,
    /// One bucket for everyone.
    Global,
    /// No limiting.
    None,
}

impl FromStr for LimitMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_ip" => Ok(LimitMode::PerIp),
            "global" => Ok(LimitMode::Global),
            "none" => Ok(LimitMode::None),
            other => anyhow::bail!("RATE_MODE {other:?} is not per_ip|global|none"),
        }
    }
}

/// What happens to a request that finds the bucket empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitBehavior {
    /// Hold the request until a token frees up (capped).
    #[default]
    Wait,
    /// Answer 429 with a Retry-After immediately.
    Immediate,
}

impl FromStr for LimitBehavior {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wait" => Ok(LimitBehavior::Wait),
            "immediate" => Ok(LimitBehavior::Immediate),
            other => anyhow::bail!("RATE_BEHAVIOR {other:?} is not wait|immediate"),
        }
    }
}

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream JSON-RPC endpoint requests are forwarded to.
    pub upstream: Url,
    /// Address the proxy listens on.
    pub listen: SocketAddr,
    /// Bucket keying.
    pub mode: LimitMode,
    /// Wait or answer immediately when limited.
    pub behavior: LimitBehavior,
    /// Tokens per window.
    pub capacity: NonZeroU32,
    /// Window width.
    pub window: Duration,
}

impl Config {
    /// Read configuration from the environment: `UPSTREAM_URL` (required),
    /// `LISTEN_ADDR` (default `0.0.0.0:8080`), `RATE_MODE` (default
    /// `per_ip`), `RATE_BEHAVIOR` (default `wait`).
    pub fn from_env() -> anyhow::Result<Self> {
        let upstream = std::env::var("UPSTREAM_URL")
            .map_err(|_| anyhow::anyhow!("UPSTREAM_URL must be set"))?
            .parse::<Url>()?;
        let listen = match std::env::var("LISTEN_ADDR") {
            Ok(addr) => addr.parse()?,
            Err(_) => "0.0.0.0:8080".parse()?,
        };
        let mode = match std::env::var("RATE_MODE") {
            Ok(mode) => mode.parse()?,
            Err(_) => LimitMode::default(),
        };
        let behavior = match std::env::var("RATE_BEHAVIOR") {
            Ok(behavior) => behavior.parse()?,
            Err(_) => LimitBehavior::default(),
        };

        Ok(Self {
            upstream,
            listen,
            mode,
            behavior,
            capacity: nonzero(40),
            window: Duration::from_secs(10),
        })
    }
}
