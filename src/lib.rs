//! metrics-k8s-proxy - aggregating Prometheus scrape proxy for Kubernetes
//!
//! Watches pods matching a label selector, keeps a registry of those annotated
//! for scraping, and on each inbound scrape fans out to all of them in
//! parallel, returning their pod-labelled payloads plus an `up` series per pod.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod scrape;
pub mod telemetry;
