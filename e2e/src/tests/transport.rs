use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use retrovault::{Keypair, RateLimiterConfig};
use retrovault_testnet::Testnet;
use tokio::net::TcpListener;
use url::Url;

use super::utils::init_tracing;

/// An endpoint that refuses every connection: bind, grab the port, drop.
async fn dead_endpoint() -> Url {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// An endpoint that answers every request with 429 + Retry-After.
async fn always_limited_endpoint(retry_after_secs: u64) -> Url {
    async fn limited(retry_after: u64) -> impl IntoResponse {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            "slow down",
        )
    }
    let app = Router::new().route("/", post(move || limited(retry_after_secs)));
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

#[tokio::test]
async fn failover_skips_dead_endpoints() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let client = testnet
        .client_with_endpoints(
            vec![dead_endpoint().await, testnet.url().clone()],
            Keypair::random(),
            RateLimiterConfig::default(),
        )
        .unwrap();

    // Every call rotates through the dead endpoint and still succeeds.
    let blob = b"failover survives".to_vec();
    let receipt = client.publish(blob.clone(), Default::default()).await.unwrap();
    let fetched = client
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.bytes, blob);
}

#[tokio::test]
async fn rate_limited_endpoint_delays_then_fails_over() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let limited = always_limited_endpoint(1).await;
    let client = testnet
        .client_with_endpoints(
            vec![limited, testnet.url().clone()],
            Keypair::random(),
            RateLimiterConfig::default(),
        )
        .unwrap();

    let start = Instant::now();
    client.rpc().get_slot().await.unwrap();
    // The first attempt hit the limited endpoint, honoured its Retry-After
    // pause, then the fallback answered.
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn sliding_window_paces_requests() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let client = testnet
        .client_with_endpoints(
            vec![testnet.url().clone()],
            Keypair::random(),
            RateLimiterConfig {
                capacity: 2,
                window: Duration::from_millis(400),
            },
        )
        .unwrap();

    // Five calls at capacity 2 per 400 ms cannot finish before ~800 ms.
    let start = Instant::now();
    for _ in 0..5 {
        client.rpc().get_slot().await.unwrap();
    }
    assert!(start.elapsed() >= Duration::from_millis(700));
}

#[tokio::test]
async fn all_endpoints_failing_surfaces_transport_error() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let client = testnet
        .client_with_endpoints(
            vec![dead_endpoint().await, dead_endpoint().await],
            Keypair::random(),
            RateLimiterConfig::default(),
        )
        .unwrap();

    let error = client.rpc().get_slot().await.unwrap_err();
    assert!(matches!(error, retrovault::Error::Transport(_)));
}
