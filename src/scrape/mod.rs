//! Scatter-gather scraping
//!
//! [`Aggregator::run`] scrapes every target of a registry snapshot in parallel,
//! annotates the payloads and returns one text blob per dispatched target.
//! All tasks of one run share a [`ScrapeContext`] deadline, so the whole call
//! is bounded by that deadline rather than by the slowest target.

pub mod exposition;
pub mod transport;

pub use exposition::{Liveness, append_liveness, inject_identity, liveness_line};
pub use transport::{HttpTransport, ReqwestTransport, ScrapeError, TransportResponse};

use crate::discovery::ScrapeTarget;
use crate::metrics::{Metrics, ScrapeOutcome};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation shared by every scrape of one request
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl ScrapeContext {
    /// Context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel every scrape bound to this context
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the deadline passed or the context was cancelled
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Run `call` until it finishes, the deadline passes or the context is cancelled
    async fn bound<T, F>(&self, url: &str, call: F) -> Result<T, ScrapeError>
    where
        F: Future<Output = Result<T, ScrapeError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScrapeError::Cancelled { url: url.to_string() }),
            result = tokio::time::timeout_at(self.deadline, call) => match result {
                Ok(result) => result,
                Err(_) => Err(ScrapeError::Timeout { url: url.to_string() }),
            },
        }
    }
}

/// Fans scrapes out to all targets and gathers the annotated results
#[derive(Clone)]
pub struct Aggregator {
    transport: Arc<dyn HttpTransport>,
    metrics: Arc<Metrics>,
}

impl Aggregator {
    pub fn new(transport: Arc<dyn HttpTransport>, metrics: Arc<Metrics>) -> Self {
        Self { transport, metrics }
    }

    /// Scrape every target concurrently and wait for all of them
    ///
    /// Results come back in completion order and must be treated as unordered.
    /// Targets found already expired at dispatch contribute nothing; every other
    /// target contributes exactly one blob ending in its `up` line.
    ///
    /// Dropping the returned future aborts the in-flight scrapes.
    pub async fn run(
        &self,
        ctx: &ScrapeContext,
        targets: HashMap<String, ScrapeTarget>,
    ) -> Vec<String> {
        let mut tasks = JoinSet::new();

        for target in targets.into_values() {
            let aggregator = self.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move { aggregator.scrape(&ctx, &target).await });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(text)) => results.push(text),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Scrape task failed; target omitted from response");
                }
            }
        }

        results
    }

    /// Scrape a single target
    ///
    /// Returns `None` when the context was already done before the request
    /// could be issued.
    pub async fn scrape(&self, ctx: &ScrapeContext, target: &ScrapeTarget) -> Option<String> {
        if ctx.is_done() {
            tracing::debug!(
                pod = %target.name(),
                address = %target.address(),
                "Skipping scrape, request context already done"
            );
            self.metrics.record_scrape(ScrapeOutcome::Skipped, None);
            return None;
        }

        let url = target.url();
        let started = Instant::now();
        let result = ctx
            .bound(&url, self.transport.get(&url))
            .await
            .and_then(|response| {
                if response.is_success() {
                    Ok(response.body)
                } else {
                    Err(ScrapeError::Status {
                        url: url.clone(),
                        status: response.status,
                    })
                }
            });
        let elapsed = started.elapsed();

        match result {
            Ok(body) => {
                tracing::debug!(
                    pod = %target.name(),
                    url = %url,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Scrape succeeded"
                );
                self.metrics.record_scrape(ScrapeOutcome::Success, Some(elapsed));
                let annotated = inject_identity(&body, target.name(), target.namespace());
                Some(append_liveness(
                    &annotated,
                    target.name(),
                    target.namespace(),
                    Liveness::Up,
                ))
            }
            Err(err) => {
                tracing::warn!(
                    pod = %target.name(),
                    namespace = %target.namespace(),
                    error = %err,
                    "Scrape failed"
                );
                self.metrics.record_scrape(ScrapeOutcome::Failure, Some(elapsed));
                Some(append_liveness(
                    "",
                    target.name(),
                    target.namespace(),
                    Liveness::Down,
                ))
            }
        }
    }
}
