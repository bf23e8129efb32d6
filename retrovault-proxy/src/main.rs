use std::net::SocketAddr;

use anyhow::Result;
use retrovault_proxy::{build_app, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "retrovault_proxy=info".to_string()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        upstream = %config.upstream,
        listen = %config.listen,
        mode = ?config.mode,
        behavior = ?config.behavior,
        "proxy starting"
    );

    let state = AppState::new(&config)?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
