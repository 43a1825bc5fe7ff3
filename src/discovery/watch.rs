//! Pod watch loop
//!
//! Subscribes to pod events through an [`InstanceSource`], feeds them into an
//! [`EventSink`] and re-subscribes whenever the stream ends or fails. The loop
//! only stops when its shutdown token is cancelled.
//!
//! Every (re)connect to the API server starts with a full re-list, which is
//! applied to the sink as one atomic replacement so pods deleted while the
//! stream was down do not linger.

use super::{EventSink, InstanceEvent, LabelSelector, WorkloadInstance, dispatch};
use crate::metrics::Metrics;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::runtime::{WatchStreamExt, watcher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Server-side watch timeout; the runtime watcher resumes from the last seen
/// resource version after it expires
const WATCH_TIMEOUT_SECONDS: u32 = 290;

/// Errors surfaced by a watch subscription
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("pod watch stream error: {0}")]
    Stream(#[source] watcher::Error),

    #[error("malformed watch event: {0}")]
    Malformed(String),
}

/// Stream of decoded watch events for one subscription
pub type EventStream = BoxStream<'static, Result<InstanceEvent, WatchError>>;

/// Cluster capability used by the watch loop
#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// Open a watch on pods matching `selector`, in `namespace` or cluster-wide
    async fn subscribe(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<EventStream, WatchError>;
}

/// [`InstanceSource`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubePodSource {
    client: kube::Client,
}

impl KubePodSource {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InstanceSource for KubePodSource {
    async fn subscribe(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<EventStream, WatchError> {
        let api: Api<Pod> = match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        let config = watcher::Config::default()
            .labels(&selector.to_string())
            .timeout(WATCH_TIMEOUT_SECONDS);

        // The runtime watcher tracks resource versions and re-lists on desync;
        // each re-list arrives as Init, InitApply..., InitDone.
        Ok(watcher(api, config)
            .default_backoff()
            .map(|item| match item {
                Ok(event) => decode_event(event),
                Err(err) => Err(WatchError::Stream(err)),
            })
            .boxed())
    }
}

impl TryFrom<Pod> for WorkloadInstance {
    type Error = WatchError;

    fn try_from(pod: Pod) -> Result<Self, Self::Error> {
        let metadata = pod.metadata;
        let name = metadata
            .name
            .ok_or_else(|| WatchError::Malformed("pod without metadata.name".to_string()))?;

        Ok(Self {
            name,
            namespace: metadata.namespace.unwrap_or_default(),
            address: pod.status.and_then(|status| status.pod_ip).unwrap_or_default(),
            annotations: metadata.annotations.unwrap_or_default(),
        })
    }
}

/// Translate a runtime watcher event
///
/// The runtime watcher does not tell creations from updates, so `Apply`
/// becomes `Modified`; both upsert.
pub fn decode_event(event: watcher::Event<Pod>) -> Result<InstanceEvent, WatchError> {
    Ok(match event {
        watcher::Event::Apply(pod) => InstanceEvent::Modified(pod.try_into()?),
        watcher::Event::Delete(pod) => InstanceEvent::Deleted(pod.try_into()?),
        watcher::Event::Init => InstanceEvent::InitStarted,
        watcher::Event::InitApply(pod) => InstanceEvent::InitApply(pod.try_into()?),
        watcher::Event::InitDone => InstanceEvent::InitDone,
    })
}

/// Supervised watch loop keeping an [`EventSink`] in sync with the cluster
pub struct Watcher {
    source: Arc<dyn InstanceSource>,
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    namespace: Option<String>,
    selector: LabelSelector,
    reconnect_delay: Duration,
}

impl Watcher {
    /// Create a watcher
    ///
    /// An empty `namespace` watches all namespaces.
    pub fn new(
        source: Arc<dyn InstanceSource>,
        sink: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
        namespace: Option<String>,
        selector: LabelSelector,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            metrics,
            namespace: namespace.filter(|ns| !ns.is_empty()),
            selector,
            reconnect_delay,
        }
    }

    /// Spawn the watch loop on the runtime
    ///
    /// Also spawns a monitor that logs if the loop panics. The returned handle
    /// completes once the loop has exited.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let handle = tokio::spawn(self.run(shutdown));

        tokio::spawn(async move {
            if let Err(e) = handle.await {
                metrics.watch_task_failure();
                tracing::error!(
                    error = %e,
                    "Pod watch task panicked. Scrape targets will no longer be \
                    updated until the process restarts."
                );
            }
        })
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            namespace = self.namespace.as_deref().unwrap_or("<all>"),
            selector = %self.selector,
            "Starting pod watch"
        );

        loop {
            let subscription = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.source.subscribe(self.namespace.as_deref(), &self.selector) => result,
            };

            let received_events = match subscription {
                Ok(stream) => match self.consume(stream, &shutdown).await {
                    Some(received) => received,
                    None => break,
                },
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to establish pod watch");
                    false
                }
            };

            self.metrics.watch_restart();

            // A stream that ends after delivering events is the server-side
            // timeout; anything else waits before hammering the API server again.
            if !received_events {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.reconnect_delay) => {}
                }
            }
            tracing::debug!("Re-subscribing to pod watch");
        }

        tracing::info!("Pod watch stopped");
    }

    /// Drain one subscription
    ///
    /// Returns `None` on shutdown, otherwise whether the stream made any
    /// progress before it ended. A re-list cut short by the stream ending is
    /// discarded.
    async fn consume(&self, mut stream: EventStream, shutdown: &CancellationToken) -> Option<bool> {
        let mut received = false;
        let mut relist: Option<Vec<WorkloadInstance>> = None;

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return None,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    received |= event.is_progress();
                    self.metrics.watch_event(event.kind());
                    match event {
                        InstanceEvent::InitStarted => relist = Some(Vec::new()),
                        InstanceEvent::InitApply(instance) => match relist.as_mut() {
                            Some(pending) => pending.push(instance),
                            None => self.sink.upsert(&instance).await,
                        },
                        InstanceEvent::InitDone => {
                            if let Some(instances) = relist.take() {
                                self.sink.replace_all(&instances).await;
                            }
                        }
                        event => dispatch(self.sink.as_ref(), event).await,
                    }
                }
                Some(Err(WatchError::Malformed(reason))) => {
                    received = true;
                    self.metrics.watch_event("malformed");
                    tracing::warn!(reason = %reason, "Dropping malformed pod watch event");
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "Pod watch stream reported an error");
                }
                None => {
                    if relist.is_some() {
                        tracing::warn!("Pod watch stream ended during a re-list; discarding it");
                    }
                    tracing::debug!(received_events = received, "Pod watch stream ended");
                    return Some(received);
                }
            }
        }
    }
}
