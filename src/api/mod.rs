//! HTTP front for the live CCTV passenger-count file.

pub mod counts;
pub mod health;

use axum::{Router, routing::get};
use std::path::PathBuf;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use counts::CountsState;

pub fn router(counts_file: PathBuf) -> Router {
    let state = CountsState { counts_file };

    let api = Router::new()
        .route("/busstop-counts", get(counts::busstop_counts))
        .route("/passenger_counts", get(counts::passenger_counts))
        .with_state(state.clone())
        .nest("/health", health::router(state));

    Router::new()
        .route("/", get(root))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds `bind` and serves until the process is stopped.
pub async fn serve(bind: &str, counts_file: PathBuf) -> anyhow::Result<()> {
    info!(counts_file = %counts_file.display(), "Serving passenger counts");
    let app = router(counts_file);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> &'static str {
    "Peak Dispatch API"
}
