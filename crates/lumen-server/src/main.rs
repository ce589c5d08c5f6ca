use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use lumen_server::app::build_app;
use lumen_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging; level via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lumen=info".parse()?),
        )
        .json()
        .init();

    let config = lumen_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&config.data_dir)?;
    let db = lumen_duckdb::DuckDbBackend::open(&config.database_path())?;

    let addr = format!("0.0.0.0:{}", config.port);
    let port = config.port;
    let state = Arc::new(AppState::new(db, config));
    let app = build_app(Arc::clone(&state));

    info!(port, "lumen listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;
    Ok(())
}
