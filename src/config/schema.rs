//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the endpoint
//! host. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::exchange::DEFAULT_DRAIN_LIMIT;
use crate::features::{AddressingFeature, MtomFeature};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WsgateConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Exchange lifecycle settings.
    pub exchange: ExchangeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Endpoints served by this host.
    pub endpoints: Vec<EndpointConfig>,

    /// Handler chain rules.
    pub handler_chains: Vec<HandlerChainConfig>,

    /// References to external services.
    pub service_refs: Vec<ServiceRefConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Exchange lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Unread request bytes discarded when an exchange closes early.
    pub drain_limit_bytes: usize,

    /// Responses larger than this are sent chunked.
    pub chunk_threshold_bytes: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            drain_limit_bytes: DEFAULT_DRAIN_LIMIT,
            chunk_threshold_bytes: 64 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One served endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Request path the endpoint is mounted on (e.g., "/quotes").
    pub path: String,

    /// Qualified service name, `{namespace}local`.
    pub service: String,

    /// Qualified port name, `{namespace}local`.
    pub port: String,

    /// Binding token (`##SOAP11_HTTP`, ...) or binding URI.
    #[serde(default = "default_binding")]
    pub binding: String,

    /// No response message is sent back.
    #[serde(default)]
    pub one_way: bool,

    #[serde(default)]
    pub mtom: Option<MtomFeature>,

    #[serde(default)]
    pub addressing: Option<AddressingFeature>,
}

fn default_binding() -> String {
    "##SOAP11_HTTP".to_string()
}

/// A handler chain rule.
///
/// A rule applies to every port matching all of its conditions; a rule
/// without conditions applies everywhere.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerChainConfig {
    /// Rule identifier for logging.
    pub name: String,

    /// `{namespace}local` pattern, `*` wildcard allowed at the end.
    #[serde(default)]
    pub service_name_pattern: Option<String>,

    #[serde(default)]
    pub port_name_pattern: Option<String>,

    #[serde(default)]
    pub protocol_bindings: Vec<String>,

    /// Handler references in pipeline order (`name` or `name:arg`).
    pub handlers: Vec<String>,
}

/// A declared external service reference.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServiceRefConfig {
    pub name: String,

    #[serde(default)]
    pub type_name: Option<String>,

    #[serde(default)]
    pub mapped_name: Option<String>,

    #[serde(default)]
    pub wsdl_location: Option<String>,

    #[serde(default)]
    pub value: Option<String>,
}
