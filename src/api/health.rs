use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::counts::CountsState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Whether the live count file currently exists
    pub counts_file_present: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<CountsState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        counts_file_present: state.counts_file.is_file(),
    })
}

pub fn router(state: CountsState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_health_reports_missing_file() {
        let state = CountsState {
            counts_file: PathBuf::from("/nonexistent/counts.csv"),
        };
        let Json(body) = health_check(State(state)).await;
        assert!(body.healthy);
        assert!(!body.counts_file_present);
    }
}
