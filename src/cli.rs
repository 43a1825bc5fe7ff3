//! Command-line interface for the metrics proxy
//!
//! Every runtime flag can also be set through its environment variable, which
//! is how the sidecar is normally configured inside a pod manifest.

use crate::config::Overrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Aggregating Prometheus scrape proxy for Kubernetes pods
#[derive(Parser, Debug)]
#[command(name = "metrics-k8s-proxy")]
#[command(version)]
#[command(about = "Aggregating Prometheus scrape proxy for Kubernetes pods")]
#[command(
    long_about = "metrics-k8s-proxy watches pods matching a label selector, scrapes every \
    pod annotated with prometheus.io/scrape=true in parallel and serves the combined, \
    pod-labelled exposition text from a single /metrics endpoint."
)]
pub struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(short, long, global = true, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Pod label selector, e.g. "app=ztunnel,tier=proxy"
    #[arg(long, env = "POD_LABEL_SELECTOR")]
    pub label_selector: Option<String>,

    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Scrape timeout shared by all targets, e.g. "9s" or "1500ms"
    #[arg(long, env = "SCRAPE_TIMEOUT", value_parser = humantime::parse_duration)]
    pub scrape_timeout: Option<Duration>,

    /// Address to bind the HTTP server to
    #[arg(long, env = "LISTEN_HOST")]
    pub host: Option<String>,

    /// Port to serve /metrics on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Flag and environment values to layer over the file configuration
    pub fn overrides(&self) -> Overrides {
        Overrides {
            label_selector: self.label_selector.clone(),
            namespace: self.namespace.clone(),
            scrape_timeout: self.scrape_timeout,
            host: self.host.clone(),
            port: self.port,
            log_level: self.log_level.clone(),
        }
    }
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# metrics-k8s-proxy Configuration
# ================================
#
# Every value below can be overridden by a flag or environment variable:
#   POD_LABEL_SELECTOR, WATCH_NAMESPACE, SCRAPE_TIMEOUT, LISTEN_HOST, PORT, LOG_LEVEL

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces)
host = "0.0.0.0"

# Port serving /metrics, /health and /proxy/metrics
port = 15090

# ─────────────────────────────────────────────────────────────────────────────
# POD DISCOVERY
# ─────────────────────────────────────────────────────────────────────────────
#
# Pods matching the selector are scraped when annotated with:
#   prometheus.io/scrape: "true"
#   prometheus.io/port:   "15020"     (default "80")
#   prometheus.io/path:   "/metrics"  (default "/metrics")

[discovery]
# Equality-only selector, comma separated
label_selector = "app=ztunnel"

# Namespace to watch; leave empty to watch all namespaces
namespace = ""

# Pause before re-subscribing after a failed or empty watch
reconnect_delay = "5s"

# ─────────────────────────────────────────────────────────────────────────────
# SCRAPING
# ─────────────────────────────────────────────────────────────────────────────

[scrape]
# Deadline for one aggregation, shared by all targets (max 5m)
timeout = "9s"

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"
"#
}
