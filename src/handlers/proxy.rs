//! Aggregated scrape endpoint
//!
//! `GET /metrics` scrapes every known target and returns the combined text.

use axum::{extract::State, http::StatusCode, http::header};

use crate::handlers::AppState;
use crate::scrape::ScrapeContext;

/// Content type of the aggregated exposition payload
pub const CONTENT_TYPE: &str = "text/plain";

/// Aggregation handler
///
/// Always answers `200 OK`; unreachable targets show up as `up ... 0` lines
/// instead of failing the request. If the client disconnects the handler
/// future is dropped, which aborts the scrapes still in flight.
pub async fn handler(
    State(state): State<AppState>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let ctx = ScrapeContext::with_timeout(state.config().scrape.timeout);
    let body = aggregate(&state, &ctx).await;
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

/// Snapshot the registry, scrape it under `ctx` and join the blobs with `\n`
pub async fn aggregate(state: &AppState, ctx: &ScrapeContext) -> String {
    let targets = state.registry().snapshot().await;
    state.metrics().record_aggregation();

    tracing::debug!(targets = targets.len(), "Aggregating scrape targets");

    state.aggregator().run(ctx, targets).await.join("\n")
}
