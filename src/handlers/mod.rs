//! HTTP request handlers and router assembly

use crate::config::Config;
use crate::discovery::InstanceRegistry;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::scrape::{Aggregator, ReqwestTransport};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub mod health;
pub mod metrics;
pub mod proxy;

/// Application state shared across all handlers
///
/// All fields are Arc'd (or Arc-backed) for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    registry: Arc<InstanceRegistry>,
    aggregator: Aggregator,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Assemble state from already-built components
    pub fn new(
        config: Arc<Config>,
        registry: Arc<InstanceRegistry>,
        aggregator: Aggregator,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            registry,
            aggregator,
            metrics,
        }
    }

    /// Build state with an empty registry, fresh self-metrics and a reqwest transport
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if metric registration or HTTP client
    /// construction fails.
    pub fn from_config(config: Arc<Config>) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("failed to register self-metrics: {}", e))
        })?);
        let transport = ReqwestTransport::new()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        let aggregator = Aggregator::new(Arc::new(transport), metrics.clone());

        Ok(Self::new(
            config,
            Arc::new(InstanceRegistry::with_metrics(metrics.clone())),
            aggregator,
            metrics,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the target registry, also handed to the watcher
    pub fn registry(&self) -> Arc<InstanceRegistry> {
        self.registry.clone()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

/// Build the HTTP router
///
/// Requests are bounded at twice the scrape timeout so a stuck aggregation can
/// never hold a connection open indefinitely.
pub fn router(state: AppState) -> Router {
    let request_timeout = state.config().scrape.timeout.saturating_mul(2);

    Router::new()
        .route("/metrics", get(proxy::handler))
        .route("/health", get(health::handler))
        .route("/proxy/metrics", get(metrics::handler))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}
