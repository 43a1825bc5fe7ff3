//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use metrics_k8s_proxy::config::{Config, Overrides};
use metrics_k8s_proxy::discovery::{
    InstanceRegistry, PATH_ANNOTATION, PORT_ANNOTATION, SCRAPE_ANNOTATION, WorkloadInstance,
};
use metrics_k8s_proxy::handlers::AppState;
use metrics_k8s_proxy::metrics::Metrics;
use metrics_k8s_proxy::scrape::{
    Aggregator, HttpTransport, ReqwestTransport, ScrapeError, TransportResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Port pods advertise in tests; rewritten to the mock server's port
pub const POD_PORT: &str = "15020";

/// Transport that sends requests for a pod address to a local mock server
///
/// Pods get distinct addresses like `10.0.0.1` while the scrape itself hits a
/// `wiremock` server on loopback.
pub struct RewritingTransport {
    inner: ReqwestTransport,
    upstreams: HashMap<String, String>,
}

impl RewritingTransport {
    pub fn new(upstreams: HashMap<String, String>) -> Self {
        Self {
            inner: ReqwestTransport::new().expect("should build reqwest client"),
            upstreams,
        }
    }
}

#[async_trait]
impl HttpTransport for RewritingTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, ScrapeError> {
        let rewritten = self
            .upstreams
            .iter()
            .find_map(|(address, upstream)| {
                let prefix = format!("http://{}:{}", address, POD_PORT);
                url.strip_prefix(&prefix)
                    .map(|rest| format!("{}{}", upstream, rest))
            })
            .unwrap_or_else(|| url.to_string());
        self.inner.get(&rewritten).await
    }
}

pub fn config(timeout: Duration) -> Arc<Config> {
    let overrides = Overrides {
        label_selector: Some("app=ztunnel".to_string()),
        scrape_timeout: Some(timeout),
        ..Default::default()
    };
    Arc::new(Config::load(None, overrides).expect("test config should be valid"))
}

/// App state whose pod addresses resolve to the given mock server URIs
pub fn state(timeout: Duration, upstreams: HashMap<String, String>) -> AppState {
    let metrics = Arc::new(Metrics::new().expect("should create metrics"));
    let aggregator = Aggregator::new(
        Arc::new(RewritingTransport::new(upstreams)),
        metrics.clone(),
    );
    AppState::new(
        config(timeout),
        Arc::new(InstanceRegistry::with_metrics(metrics.clone())),
        aggregator,
        metrics,
    )
}

/// A pod opted into scraping on [`POD_PORT`] at `/stats/prometheus`
pub fn scrapeable_pod(name: &str, namespace: &str, address: &str) -> WorkloadInstance {
    WorkloadInstance::new(name, namespace, address)
        .with_annotation(SCRAPE_ANNOTATION, "true")
        .with_annotation(PORT_ANNOTATION, POD_PORT)
        .with_annotation(PATH_ANNOTATION, "/stats/prometheus")
}

pub fn up_line(name: &str, namespace: &str, value: u8) -> String {
    format!(
        "up{{k8s_pod_name=\"{}\",k8s_namespace=\"{}\"}} {}",
        name, namespace, value
    )
}
