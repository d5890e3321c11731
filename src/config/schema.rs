//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration for the public HTTP side.
    pub listener: ListenerConfig,

    /// Core relay settings (root domain, heartbeat).
    pub relay: RelaySection,

    /// HTTP surface settings (introspection paths, index fallback).
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Core relay settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySection {
    /// Base domain; allocated tunnel names are subdomains of it.
    pub root: String,

    /// Heartbeat interval for the per-session ping task, in seconds.
    pub ping_interval_secs: u64,

    /// Log registry insert/update/remove events at info level.
    pub verbose: bool,
}

impl RelaySection {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            root: "localhost".to_string(),
            ping_interval_secs: 5,
            verbose: false,
        }
    }
}

/// HTTP surface settings for requests addressed to the root domain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Path serving the JSON records snapshot; None disables it.
    pub records_path: Option<String>,

    /// Path serving alias CRUD; None disables it.
    pub alias_path: Option<String>,

    /// Upstream URL that root-domain requests with no path-routing match
    /// are proxied to; None means a plain 404.
    pub index: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            records_path: Some("/api/records".to_string()),
            alias_path: Some("/api/alias".to_string()),
            index: None,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics exporter.
    pub metrics_enabled: bool,

    /// Bind address for the metrics exporter.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
