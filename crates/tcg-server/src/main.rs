use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tcg_api::AppStateInner;
use tcg_core::RateLimiter;
use tcg_core::ratelimit::run_sweep_loop;
use tcg_store::SqliteTree;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tcg=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("TCG_DB_PATH").unwrap_or_else(|_| "vrctcg.db".into());
    let host = std::env::var("TCG_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TCG_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let window_ms: u64 = std::env::var("TCG_RATE_WINDOW_MS")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;
    let sweep_secs: u64 = std::env::var("TCG_SWEEP_SECS")
        .unwrap_or_else(|_| "60".into())
        .parse()?;

    // Backing store; unreachable store is fatal here, not retried
    let store = Arc::new(SqliteTree::open(&PathBuf::from(&db_path))?);

    // Shared state
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(window_ms)));
    tokio::spawn(run_sweep_loop(limiter.clone(), sweep_secs));

    let state = Arc::new(AppStateInner::new(store, limiter));

    let app = tcg_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("VRCTCG server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
