//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initialize tracing subscriber for structured logging
///
/// Only the first call per process has any effect.
///
/// `RUST_LOG` takes precedence when set; otherwise the crate logs at
/// `default_level` and tower-http request spans at info.
///
/// # Examples
///
/// ```no_run
/// metrics_k8s_proxy::telemetry::init("info");
/// tracing::info!("Proxy started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

/// Filter directives used when `RUST_LOG` is unset
pub fn default_directives(level: &str) -> String {
    format!("metrics_k8s_proxy={},tower_http=info", level)
}
