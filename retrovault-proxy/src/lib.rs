//! Rate-limited forward proxy in front of a paid RPC endpoint.
//!
//! Forwards JSON-RPC `POST /` to the configured upstream and exposes
//! `GET /health` and `GET /metrics`. Limiting is per client ip, global, or
//! off; a limited request either waits for a token (wait mode, default,
//! capped) or is answered immediately with `429`, a `Retry-After` header
//! and a JSON-RPC error envelope
//! `{code: -32005, data: {retry_after_seconds}}`.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use governor::clock::{Clock, QuantaClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use url::Url;

mod config;
pub use config::{Config, LimitBehavior, LimitMode};

/// JSON-RPC error code the proxy answers rate-limited requests with.
pub const ERROR_RATE_LIMITED: i64 = -32005;

/// Cap on how long wait mode may hold a request before giving up.
const WAIT_CAP: Duration = Duration::from_secs(10);

type KeyedLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, QuantaClock>;
type GlobalLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, QuantaClock>;

enum Limiter {
    PerIp(KeyedLimiter),
    Global(GlobalLimiter),
    None,
}

struct Metrics {
    registry: Registry,
    requests_total: IntCounter,
    rate_limited_total: IntCounter,
    upstream_errors_total: IntCounter,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let requests_total =
            IntCounter::new("proxy_requests_total", "Requests received on POST /")?;
        let rate_limited_total =
            IntCounter::new("proxy_rate_limited_total", "Requests answered with 429")?;
        let upstream_errors_total =
            IntCounter::new("proxy_upstream_errors_total", "Failed upstream forwards")?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(upstream_errors_total.clone()))?;
        Ok(Self {
            registry,
            requests_total,
            rate_limited_total,
            upstream_errors_total,
        })
    }
}

/// Shared proxy state.
pub struct AppState {
    upstream: Url,
    http: reqwest::Client,
    limiter: Limiter,
    behavior: LimitBehavior,
    clock: QuantaClock,
    metrics: Metrics,
}

impl AppState {
    /// Build state from a [`Config`].
    pub fn new(config: &Config) -> anyhow::Result<Arc<Self>> {
        let quota = Quota::with_period(config.window / config.capacity.get())
            .ok_or_else(|| anyhow::anyhow!("rate window must be positive"))?
            .allow_burst(config.capacity);

        let limiter = match config.mode {
            LimitMode::PerIp => Limiter::PerIp(RateLimiter::keyed(quota)),
            LimitMode::Global => Limiter::Global(RateLimiter::direct(quota)),
            LimitMode::None => Limiter::None,
        };

        Ok(Arc::new(Self {
            upstream: config.upstream.clone(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            limiter,
            behavior: config.behavior,
            clock: QuantaClock::default(),
            metrics: Metrics::new().map_err(|e| anyhow::anyhow!("metrics: {e}"))?,
        }))
    }
}

/// The proxy router. CORS is open and `Retry-After` is exposed so browser
/// clients can see the back-off hint.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::RETRY_AFTER]);

    Router::new()
        .route("/", post(forward))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(error) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
        tracing::error!(%error, "metrics encoding failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}

async fn forward(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.requests_total.inc();

    let client_ip = client_ip(&headers).unwrap_or_else(|| peer.ip());
    if let Some(retry_after) = acquire(&state, client_ip).await {
        state.metrics.rate_limited_total.inc();
        tracing::debug!(%client_ip, ?retry_after, "rate limited");
        return rate_limited_response(&body, retry_after);
    }

    match state
        .http
        .post(state.upstream.clone())
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.to_vec())
        .send()
        .await
    {
        Ok(upstream) => {
            let status = upstream.status();
            let bytes = upstream.bytes().await.unwrap_or_default();
            (
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                [(header::CONTENT_TYPE, "application/json")],
                bytes,
            )
                .into_response()
        }
        Err(error) => {
            state.metrics.upstream_errors_total.inc();
            tracing::warn!(%error, "upstream forward failed");
            (
                StatusCode::BAD_GATEWAY,
                [(header::CONTENT_TYPE, "application/json")],
                json!({
                    "jsonrpc": "2.0",
                    "id": request_id(&body),
                    "error": { "code": -32000, "message": format!("upstream unreachable: {error}") },
                })
                .to_string(),
            )
                .into_response()
        }
    }
}

/// Try to obtain a token. `None` means go ahead; `Some(d)` means answer 429
/// with that Retry-After.
async fn acquire(state: &AppState, client_ip: IpAddr) -> Option<Duration> {
    match (&state.limiter, state.behavior) {
        (Limiter::None, _) => None,
        (Limiter::PerIp(limiter), LimitBehavior::Wait) => {
            match tokio::time::timeout(WAIT_CAP, limiter.until_key_ready(&client_ip)).await {
                Ok(()) => None,
                Err(_) => Some(WAIT_CAP),
            }
        }
        (Limiter::Global(limiter), LimitBehavior::Wait) => {
            match tokio::time::timeout(WAIT_CAP, limiter.until_ready()).await {
                Ok(()) => None,
                Err(_) => Some(WAIT_CAP),
            }
        }
        (Limiter::PerIp(limiter), LimitBehavior::Immediate) => match limiter.check_key(&client_ip)
        {
            Ok(()) => None,
            Err(not_until) => Some(not_until.wait_time_from(state.clock.now())),
        },
        (Limiter::Global(limiter), LimitBehavior::Immediate) => match limiter.check() {
            Ok(()) => None,
            Err(not_until) => Some(not_until.wait_time_from(state.clock.now())),
        },
    }
}

fn rate_limited_response(body: &Bytes, retry_after: Duration) -> Response {
    let seconds = retry_after.as_secs().max(1);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (header::RETRY_AFTER, seconds.to_string()),
            (header::CONTENT_TYPE, "application/json".to_string()),
        ],
        json!({
            "jsonrpc": "2.0",
            "id": request_id(body),
            "error": {
                "code": ERROR_RATE_LIMITED,
                "message": "rate limit exceeded",
                "data": { "retry_after_seconds": seconds },
            },
        })
        .to_string(),
    )
        .into_response()
}

/// Echo the JSON-RPC id of the refused request when the body parses.
fn request_id(body: &Bytes) -> Value {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .unwrap_or(Value::Null)
}

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// `x-forwarded-for`, then `x-real-ip`; the socket peer is the fallback.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|s| s.split(',').find_map(|s| s.trim().parse::<IpAddr>().ok()))
        .or_else(|| {
            headers
                .get(X_REAL_IP)
                .and_then(|hv| hv.to_str().ok())
                .and_then(|s| s.parse::<IpAddr>().ok())
        })
}

/// Keep the capacity type in one place for config parsing.
pub(crate) fn nonzero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).expect("capacity must be non-zero")
}
