//! Configuration schema definitions.
//!
//! This module defines the configuration structure for the client and the
//! command-line tool. All types derive Serde traits for deserialization from
//! config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root of a settings file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Remote host, headers, pool size and timeouts.
    pub client: ClientConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Metrics exporter settings.
    pub metrics: MetricsConfig,
}

/// Client configuration for a single remote host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote host name, also sent as the `host` header.
    pub host: String,

    /// Remote TCP port.
    pub port: u16,

    /// Value of the `user-agent` header.
    pub user_agent: String,

    /// Value of the `accept` header.
    pub accept: String,

    /// Maximum number of idle endpoints kept for reuse.
    pub max_open_endpoints: usize,

    /// Per-transaction timeout in milliseconds.
    pub timeout_ms: u64,

    /// Connection establishment timeout in milliseconds. 0 means no timeout.
    pub connect_timeout_ms: u64,

    /// Largest response body buffered before the response is rejected.
    pub max_response_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 80,
            user_agent: concat!("pooled-http/", env!("CARGO_PKG_VERSION")).to_string(),
            accept: "*/*".to_string(),
            max_open_endpoints: 10,
            timeout_ms: 30_000,
            connect_timeout_ms: 0,
            max_response_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    /// Configuration for `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn with_max_open_endpoints(mut self, max: usize) -> Self {
        self.max_open_endpoints = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    /// Per-transaction timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect timeout, if one is configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "pooled_http=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the exporter.
    pub enabled: bool,

    /// Scrape endpoint address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9100".to_string(),
        }
    }
}
