//! Health check endpoint
//!
//! Simple health endpoint for Kubernetes liveness and readiness checks.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Number of scrape targets currently registered
    pub targets: usize,
}

/// Health check handler
///
/// Returns 200 OK as long as the server is running. Zero targets is not
/// treated as unhealthy since a freshly started proxy may not have seen any
/// pods yet.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let targets = state.registry().len().await;

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            targets,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{EventSink, SCRAPE_ANNOTATION, WorkloadInstance};
    use crate::handlers::test_support;

    #[tokio::test]
    async fn test_health_handler_returns_ok() {
        let (status, Json(body)) = handler(State(test_support::state())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "OK");
        assert_eq!(body.targets, 0);
    }

    #[tokio::test]
    async fn test_health_handler_counts_targets() {
        let state = test_support::state();
        for (name, address) in [("a", "10.0.0.1"), ("b", "10.0.0.2")] {
            let pod = WorkloadInstance::new(name, "default", address)
                .with_annotation(SCRAPE_ANNOTATION, "true");
            state.registry().upsert(&pod).await;
        }

        let (_, Json(body)) = handler(State(state)).await;
        assert_eq!(body.targets, 2);
    }

    #[test]
    fn test_health_response_shape() {
        let json = serde_json::to_value(HealthResponse {
            status: "OK",
            targets: 3,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": "OK", "targets": 3}));
    }
}
