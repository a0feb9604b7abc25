//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shadow proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the shadow proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend whose responses are returned to callers.
    pub primary: BackendConfig,

    /// Backend receiving mirrored traffic.
    pub shadow: BackendConfig,

    /// Mirroring and comparison settings.
    pub mirror: MirrorConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            primary: BackendConfig::new("primary", "http://127.0.0.1:3000"),
            shadow: BackendConfig::new("shadow", "http://127.0.0.1:3001"),
            mirror: MirrorConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
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

/// One backend. A section that is present must carry a `url`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Identifier used in logs.
    #[serde(default)]
    pub name: String,

    /// Base URL (e.g., "http://127.0.0.1:3000" or "http://svc:80/prefix").
    pub url: String,
}

impl BackendConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Mirroring configuration. Reloadable without restart.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Largest request or response body buffered, in bytes.
    pub max_body_bytes: usize,

    /// Header names excluded from comparison.
    pub ignore_headers: Vec<String>,

    /// Answer callers only after the shadow exchange finished.
    pub wait_for_shadow: bool,

    /// Upper bound on background comparisons in flight.
    pub max_pending_diffs: usize,

    /// Media types compared as JSON.
    pub json_media_types: Vec<String>,

    /// Media types compared as XML.
    pub xml_media_types: Vec<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            ignore_headers: vec!["date".to_string(), "x-request-id".to_string()],
            wait_for_shadow: true,
            max_pending_diffs: 1024,
            json_media_types: vec!["application/json".to_string()],
            xml_media_types: vec!["application/xml".to_string(), "text/xml".to_string()],
        }
    }
}

/// Timeout configuration for backend exchanges.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for one backend exchange, body included, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Leading request path segments kept in the `path` metric label; 0 keeps the full path.
    pub metrics_path_segments: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            metrics_path_segments: 1,
        }
    }
}
