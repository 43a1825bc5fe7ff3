//! Scrape target discovery
//!
//! Keeps the set of pods eligible for scraping in sync with the cluster.
//! The [`InstanceRegistry`] owns the live map and is fed by the
//! [`watch::Watcher`] through the [`EventSink`] capability.

pub mod selector;
pub mod watch;

pub use selector::LabelSelector;
pub use watch::{EventStream, InstanceSource, KubePodSource, WatchError, Watcher};

use crate::metrics::Metrics;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Annotation that opts a pod into scraping; must equal [`SCRAPE_ENABLED`]
pub const SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";
/// Annotation overriding the scrape port
pub const PORT_ANNOTATION: &str = "prometheus.io/port";
/// Annotation overriding the scrape path
pub const PATH_ANNOTATION: &str = "prometheus.io/path";

/// The only value of [`SCRAPE_ANNOTATION`] that enables scraping
pub const SCRAPE_ENABLED: &str = "true";
/// Port used when the pod does not declare one
pub const DEFAULT_PORT: &str = "80";
/// Path used when the pod does not declare one
pub const DEFAULT_PATH: &str = "/metrics";

/// A watched workload instance, as reported by the cluster
///
/// `address` may be empty while the pod is still being scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadInstance {
    pub name: String,
    pub namespace: String,
    pub address: String,
    pub annotations: BTreeMap<String, String>,
}

impl WorkloadInstance {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            address: address.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// One pod eligible for scraping
///
/// Fields are private; instances only come out of [`ScrapeTarget::from_instance`]
/// or registry snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    address: String,
    port: String,
    path: String,
    name: String,
    namespace: String,
}

impl ScrapeTarget {
    /// Derive a scrape target from a workload instance
    ///
    /// Returns `None` unless the scrape annotation is exactly `"true"` and the
    /// instance has an address.
    pub fn from_instance(instance: &WorkloadInstance) -> Option<Self> {
        if instance.annotations.get(SCRAPE_ANNOTATION).map(String::as_str) != Some(SCRAPE_ENABLED) {
            return None;
        }
        if instance.address.is_empty() {
            return None;
        }

        Some(Self {
            address: instance.address.clone(),
            port: instance
                .annotation(PORT_ANNOTATION)
                .unwrap_or(DEFAULT_PORT)
                .to_string(),
            path: instance
                .annotation(PATH_ANNOTATION)
                .unwrap_or(DEFAULT_PATH)
                .to_string(),
            name: instance.name.clone(),
            namespace: instance.namespace.clone(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Pod name, used only for label injection
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pod namespace, used only for label injection
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// URL scraped for this target: `http://<address>:<port><path>`
    ///
    /// IPv6 addresses are bracketed.
    pub fn url(&self) -> String {
        let host = match self.address.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]", self.address),
            _ => self.address.clone(),
        };
        format!("http://{}:{}{}", host, self.port, self.path)
    }
}

/// Receiver of registry mutations decoded from the watch stream
///
/// [`InstanceRegistry`] is the production sink; tests plug in recorders.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Insert or replace the target for this instance, if it is eligible
    async fn upsert(&self, instance: &WorkloadInstance);

    /// Drop the target registered under `address`, if any
    async fn remove(&self, address: &str);

    /// Replace every target with those derived from a complete re-list
    ///
    /// Targets missing from `instances` are dropped.
    async fn replace_all(&self, instances: &[WorkloadInstance]);
}

/// A decoded watch notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    Added(WorkloadInstance),
    Modified(WorkloadInstance),
    Deleted(WorkloadInstance),
    Bookmark,
    /// Error notification sent by the API server inside the stream
    Error(String),
    /// A full re-list begins; the following `InitApply` events make up the
    /// complete set of matching pods
    InitStarted,
    /// One pod of the re-list in progress
    InitApply(WorkloadInstance),
    /// The re-list is complete
    InitDone,
}

impl InstanceEvent {
    /// Short lowercase name, used for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            InstanceEvent::Added(_) => "added",
            InstanceEvent::Modified(_) => "modified",
            InstanceEvent::Deleted(_) => "deleted",
            InstanceEvent::Bookmark => "bookmark",
            InstanceEvent::Error(_) => "error",
            InstanceEvent::InitStarted => "init",
            InstanceEvent::InitApply(_) => "init_apply",
            InstanceEvent::InitDone => "init_done",
        }
    }

    /// Whether the event shows the subscription is healthy
    ///
    /// In-stream errors do not count, so a server that only answers with an
    /// error still gets the reconnect delay.
    pub fn is_progress(&self) -> bool {
        !matches!(self, InstanceEvent::Error(_))
    }
}

/// Apply one watch event to a sink
///
/// `Added`/`Modified` upsert, `Deleted` removes by address, `Bookmark` is ignored
/// and `Error` is only logged. Re-list markers are ignored here and a lone
/// `InitApply` upserts; [`Watcher`] buffers re-lists into
/// [`EventSink::replace_all`] instead.
pub async fn dispatch(sink: &dyn EventSink, event: InstanceEvent) {
    match event {
        InstanceEvent::Added(instance)
        | InstanceEvent::Modified(instance)
        | InstanceEvent::InitApply(instance) => {
            sink.upsert(&instance).await;
        }
        InstanceEvent::Deleted(instance) => {
            sink.remove(&instance.address).await;
        }
        InstanceEvent::Bookmark | InstanceEvent::InitStarted | InstanceEvent::InitDone => {}
        InstanceEvent::Error(message) => {
            tracing::warn!(error = %message, "Error event received from pod watch");
        }
    }
}

/// Live map of scrape targets keyed by pod address
///
/// Writers and readers share one lock; readers only ever get copies, so an
/// aggregation in flight never sees a half-applied update.
#[derive(Default)]
pub struct InstanceRegistry {
    targets: RwLock<HashMap<String, ScrapeTarget>>,
    metrics: Option<Arc<Metrics>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that keeps the `metrics_proxy_targets` gauge at its size
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            targets: RwLock::default(),
            metrics: Some(metrics),
        }
    }

    /// Independent copy of the current targets
    pub async fn snapshot(&self) -> HashMap<String, ScrapeTarget> {
        self.targets.read().await.clone()
    }

    /// Number of registered targets
    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }

    /// Publish the size while the write guard is still held
    fn publish_size(&self, targets: &HashMap<String, ScrapeTarget>) {
        if let Some(metrics) = &self.metrics {
            metrics.set_targets(targets.len());
        }
    }
}

#[async_trait]
impl EventSink for InstanceRegistry {
    async fn upsert(&self, instance: &WorkloadInstance) {
        let Some(target) = ScrapeTarget::from_instance(instance) else {
            tracing::trace!(
                pod = %instance.name,
                namespace = %instance.namespace,
                "Pod is not eligible for scraping"
            );
            return;
        };

        let address = target.address.clone();
        {
            let mut targets = self.targets.write().await;
            targets.insert(address.clone(), target);
            self.publish_size(&targets);
        }

        tracing::info!(
            pod = %instance.name,
            namespace = %instance.namespace,
            address = %address,
            "Updated scrape target"
        );
    }

    async fn remove(&self, address: &str) {
        if address.is_empty() {
            return;
        }

        let mut targets = self.targets.write().await;
        if let Some(target) = targets.remove(address) {
            self.publish_size(&targets);
            tracing::info!(
                pod = %target.name,
                namespace = %target.namespace,
                address = %address,
                "Deleted scrape target"
            );
        }
    }

    async fn replace_all(&self, instances: &[WorkloadInstance]) {
        let fresh: HashMap<String, ScrapeTarget> = instances
            .iter()
            .filter_map(ScrapeTarget::from_instance)
            .map(|target| (target.address.clone(), target))
            .collect();

        let mut targets = self.targets.write().await;
        let pruned = targets
            .keys()
            .filter(|address| !fresh.contains_key(*address))
            .count();
        *targets = fresh;
        self.publish_size(&targets);

        tracing::info!(
            targets = targets.len(),
            pruned,
            "Resynchronized scrape targets from pod re-list"
        );
    }
}
