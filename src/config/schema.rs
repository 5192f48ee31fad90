//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::fault::kind::PLATFORM_PREFIXES;
use crate::fault::chain::DEFAULT_MAX_DEPTH;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Fault resolution settings.
    pub faults: FaultsConfig,

    /// Traffic recording settings.
    pub traffic: TrafficConfig,

    /// Upstream the relay forwards to.
    pub upstream: UpstreamConfig,

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

/// Fault resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FaultsConfig {
    /// Explicit statuses by failure type name (full path or simple name).
    pub statuses: BTreeMap<String, u16>,

    /// Type path prefixes treated as platform failures.
    pub platform_prefixes: Vec<String>,

    /// Maximum number of cause chain nodes visited.
    pub max_chain_depth: usize,

    /// Log every failure reaching the boundary.
    pub log_faults: bool,
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            statuses: BTreeMap::new(),
            platform_prefixes: PLATFORM_PREFIXES.iter().map(|p| p.to_string()).collect(),
            max_chain_depth: DEFAULT_MAX_DEPTH,
            log_faults: true,
        }
    }
}

/// How captured bodies are rendered.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    #[default]
    AsIs,
    Json,
    Xml,
}

/// Traffic recording configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Record calls at all.
    pub enabled: bool,

    /// Level of traffic log events (trace, debug, info, warn, error).
    pub level: String,

    pub log_request_headers: bool,
    pub log_request_body: bool,
    pub log_response_headers: bool,
    pub log_response_body: bool,

    pub body_format: BodyFormat,

    /// Fold bodies onto one line.
    pub one_line: bool,

    /// Indent unit when bodies are re-laid out.
    pub indent: String,

    /// Cut string literals longer than this (0 = never).
    pub cut_string_literals: usize,

    /// Headers whose values are masked.
    pub redact_headers: Vec<String>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            log_request_headers: true,
            log_request_body: true,
            log_response_headers: true,
            log_response_body: true,
            body_format: BodyFormat::AsIs,
            one_line: false,
            indent: "  ".to_string(),
            cut_string_literals: 0,
            redact_headers: vec!["authorization".to_string(), "cookie".to_string()],
        }
    }
}

impl TrafficConfig {
    /// Configured level, `debug` when unknown.
    pub fn tracing_level(&self) -> Level {
        self.level.parse().unwrap_or(Level::DEBUG)
    }

    pub fn redacted_header_names(&self) -> Vec<HeaderName> {
        self.redact_headers
            .iter()
            .filter_map(|name| HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()).ok())
            .collect()
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL relayed calls are joined to (e.g., "http://127.0.0.1:3000/api/").
    pub base_url: Option<String>,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
