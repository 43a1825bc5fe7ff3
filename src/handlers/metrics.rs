//! Self-metrics endpoint
//!
//! Exposes the proxy's own metrics in Prometheus text format on
//! `/proxy/metrics`, apart from the aggregated target payload.

use axum::{extract::State, http::StatusCode};

use crate::handlers::AppState;

/// Self-metrics handler
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if encoding fails
pub async fn handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics().gather() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather self-metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {}", e),
            )
        }
    }
}
