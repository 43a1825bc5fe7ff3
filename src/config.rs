//! Configuration management for the metrics proxy
//!
//! Settings come from built-in defaults, an optional TOML file, then
//! command-line flags and environment variables (highest precedence).

use crate::discovery::LabelSelector;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Longest accepted per-scrape timeout
pub const MAX_SCRAPE_TIMEOUT: Duration = Duration::from_secs(300);

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Socket address to bind; `host` must be an IP literal
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip = self.host.parse::<IpAddr>().map_err(|_| {
            AppError::Config(format!(
                "invalid server.host '{}': expected an IP address such as 0.0.0.0 or ::",
                self.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    15090
}

/// Pod discovery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Equality-only selector, e.g. `app=ztunnel,tier=proxy`
    #[serde(default)]
    pub label_selector: String,
    /// Namespace to watch; unset or empty watches all namespaces
    #[serde(default)]
    pub namespace: Option<String>,
    /// Pause before re-subscribing after a failed or empty watch
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            label_selector: String::new(),
            namespace: None,
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

impl DiscoveryConfig {
    /// Parsed form of `label_selector`
    pub fn label_selector(&self) -> LabelSelector {
        LabelSelector::parse(&self.label_selector)
    }

    /// Namespace to watch, `None` meaning all namespaces
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

/// Scrape configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeConfig {
    /// Budget for one aggregation, shared by all targets
    ///
    /// The default stays under common 10s external polling intervals.
    #[serde(default = "default_scrape_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout: default_scrape_timeout(),
        }
    }
}

fn default_scrape_timeout() -> Duration {
    Duration::from_secs(9)
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line or through the environment
///
/// Each `Some` replaces the corresponding file/default value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub label_selector: Option<String>,
    pub namespace: Option<String>,
    pub scrape_timeout: Option<Duration>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Build the effective configuration
    ///
    /// Reads `path` when given (without validating it on its own, since the
    /// selector may come from the environment), applies `overrides` and
    /// validates the result.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => {
                let path_display = path.display().to_string();
                let content = std::fs::read_to_string(path).map_err(|source| {
                    AppError::ConfigFileRead {
                        path: path_display.clone(),
                        source,
                    }
                })?;
                toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                    path: path_display,
                    source,
                })?
            }
            None => Self::default(),
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line/environment overrides in place
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(selector) = overrides.label_selector {
            self.discovery.label_selector = selector;
        }
        if let Some(namespace) = overrides.namespace {
            self.discovery.namespace = Some(namespace);
        }
        if let Some(timeout) = overrides.scrape_timeout {
            self.scrape.timeout = timeout;
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.observability.log_level = log_level;
        }
    }

    /// Validate configuration after parsing
    pub fn validate(&self) -> AppResult<()> {
        self.server.socket_addr()?;

        if self.discovery.label_selector.trim().is_empty() {
            return Err(AppError::Config(
                "a pod label selector is required (set POD_LABEL_SELECTOR or \
                discovery.label_selector, e.g. \"app=ztunnel\")"
                    .to_string(),
            ));
        }

        if self.discovery.label_selector().is_empty() {
            return Err(AppError::Config(format!(
                "invalid label selector '{}': expected key=value[,key=value...]",
                self.discovery.label_selector
            )));
        }

        if self.scrape.timeout.is_zero() {
            return Err(AppError::Config(
                "scrape timeout must be greater than 0".to_string(),
            ));
        }

        if self.scrape.timeout > MAX_SCRAPE_TIMEOUT {
            return Err(AppError::Config(format!(
                "scrape timeout cannot exceed {}, got {}",
                humantime::format_duration(MAX_SCRAPE_TIMEOUT),
                humantime::format_duration(self.scrape.timeout)
            )));
        }

        if self.discovery.reconnect_delay.is_zero() {
            return Err(AppError::Config(
                "discovery.reconnect_delay must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
