//! Prometheus self-metrics for the proxy
//!
//! This module tracks how the proxy itself behaves:
//! - Per-target scrape outcomes and latency
//! - Inbound aggregation requests and the current target count
//! - Pod watch events and re-subscriptions
//!
//! These are served on `/proxy/metrics`, separate from the aggregated
//! `/metrics` payload so they never mix with scraped series.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Result of one target scrape, used as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// Target answered 2xx with a readable body
    Success,
    /// Transport, status, body or deadline failure
    Failure,
    /// Request context was already done before the target was dispatched
    Skipped,
}

impl ScrapeOutcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeOutcome::Success => "success",
            ScrapeOutcome::Failure => "failure",
            ScrapeOutcome::Skipped => "skipped",
        }
    }
}

/// Metrics collector for the proxy
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    scrapes_total: IntCounterVec,
    scrape_duration: Histogram,
    aggregations_total: IntCounter,
    targets: IntGauge,
    watch_events: IntCounterVec,
    watch_restarts: IntCounter,
    watch_task_failures: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 3 outcomes
        let scrapes_total = IntCounterVec::new(
            Opts::new(
                "metrics_proxy_scrapes_total",
                "Total number of target scrapes by outcome",
            ),
            &["outcome"],
        )?;

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "metrics_proxy_scrape_duration_seconds",
                "Latency of individual target scrapes in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        let aggregations_total = IntCounter::with_opts(Opts::new(
            "metrics_proxy_aggregations_total",
            "Total number of inbound aggregation requests",
        ))?;

        let targets = IntGauge::with_opts(Opts::new(
            "metrics_proxy_targets",
            "Number of scrape targets currently registered",
        ))?;

        // Cardinality: added, modified, deleted, bookmark, error, init, init_apply,
        // init_done, malformed
        let watch_events = IntCounterVec::new(
            Opts::new(
                "metrics_proxy_watch_events_total",
                "Total number of pod watch events by type",
            ),
            &["event"],
        )?;

        let watch_restarts = IntCounter::with_opts(Opts::new(
            "metrics_proxy_watch_restarts_total",
            "Total number of pod watch re-subscriptions",
        ))?;

        // Alert on ANY increment: discovery has stopped
        let watch_task_failures = IntCounter::with_opts(Opts::new(
            "metrics_proxy_watch_task_failures_total",
            "Total number of pod watch task panics. Scrape targets stop updating after one.",
        ))?;

        registry.register(Box::new(scrapes_total.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(aggregations_total.clone()))?;
        registry.register(Box::new(targets.clone()))?;
        registry.register(Box::new(watch_events.clone()))?;
        registry.register(Box::new(watch_restarts.clone()))?;
        registry.register(Box::new(watch_task_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            scrapes_total,
            scrape_duration,
            aggregations_total,
            targets,
            watch_events,
            watch_restarts,
            watch_task_failures,
        })
    }

    /// Record the outcome of one target scrape
    ///
    /// `elapsed` is only observed for scrapes that were actually dispatched.
    pub fn record_scrape(&self, outcome: ScrapeOutcome, elapsed: Option<Duration>) {
        self.scrapes_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        if let Some(elapsed) = elapsed {
            self.scrape_duration.observe(elapsed.as_secs_f64());
        }
    }

    /// Record one inbound aggregation request
    pub fn record_aggregation(&self) {
        self.aggregations_total.inc();
    }

    /// Set the current number of registered scrape targets
    pub fn set_targets(&self, targets: usize) {
        self.targets.set(i64::try_from(targets).unwrap_or(i64::MAX));
    }

    /// Current value of the targets gauge
    pub fn targets(&self) -> i64 {
        self.targets.get()
    }

    /// Record a decoded (or dropped) pod watch event
    pub fn watch_event(&self, kind: &str) {
        self.watch_events.with_label_values(&[kind]).inc();
    }

    /// Record a pod watch re-subscription
    pub fn watch_restart(&self) {
        self.watch_restarts.inc();
    }

    /// Record a panic of the pod watch task
    pub fn watch_task_failure(&self) {
        self.watch_task_failures.inc();
    }

    /// Number of scrapes recorded with the given outcome
    pub fn scrape_count(&self, outcome: ScrapeOutcome) -> u64 {
        self.scrapes_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Number of pod watch re-subscriptions so far
    pub fn watch_restart_count(&self) -> u64 {
        self.watch_restarts.get()
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_registers_all() {
        let metrics = Metrics::new().expect("should create metrics");
        metrics.record_scrape(ScrapeOutcome::Success, Some(Duration::from_millis(20)));
        metrics.record_aggregation();
        metrics.set_targets(3);
        metrics.watch_event("added");
        metrics.watch_restart();

        let output = metrics.gather().expect("should gather");
        assert!(output.contains("metrics_proxy_scrapes_total{outcome=\"success\"} 1"));
        assert!(output.contains("metrics_proxy_scrape_duration_seconds_count 1"));
        assert!(output.contains("metrics_proxy_aggregations_total 1"));
        assert!(output.contains("metrics_proxy_targets 3"));
        assert!(output.contains("metrics_proxy_watch_events_total{event=\"added\"} 1"));
        assert!(output.contains("metrics_proxy_watch_restarts_total 1"));
    }

    #[test]
    fn test_skipped_scrape_does_not_observe_duration() {
        let metrics = Metrics::new().unwrap();
        metrics.record_scrape(ScrapeOutcome::Skipped, None);

        assert_eq!(metrics.scrape_count(ScrapeOutcome::Skipped), 1);
        let output = metrics.gather().unwrap();
        assert!(output.contains("metrics_proxy_scrape_duration_seconds_count 0"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ScrapeOutcome::Success.as_str(), "success");
        assert_eq!(ScrapeOutcome::Failure.as_str(), "failure");
        assert_eq!(ScrapeOutcome::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_independent_instances_do_not_share_state() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.watch_restart();
        assert_eq!(first.watch_restart_count(), 1);
        assert_eq!(second.watch_restart_count(), 0);
    }
}
