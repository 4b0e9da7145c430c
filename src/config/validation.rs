//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check endpoint paths and qualified names
//! - Check binding ids and name patterns of handler chain rules
//! - Validate value ranges (drain limit > 0, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WsgateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::WsgateConfig;
use crate::resolver::matcher::NamePattern;
use crate::resolver::{binding_id, QName};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("endpoint path '{0}' must start with '/' and contain no '{{', '}}' or '*'")]
    InvalidPath(String),

    #[error("endpoint path '{0}' is reserved")]
    ReservedPath(String),

    #[error("endpoint path '{0}' is declared more than once")]
    DuplicatePath(String),

    #[error("{context}: invalid qualified name '{value}'")]
    InvalidName { context: String, value: String },

    #[error("{context}: invalid name pattern '{value}'")]
    InvalidPattern { context: String, value: String },

    #[error("{context}: unknown binding '{value}'")]
    UnknownBinding { context: String, value: String },

    #[error("handler chain '{0}' has no handlers")]
    EmptyHandlerList(String),

    #[error("exchange.drain_limit_bytes must be greater than 0")]
    ZeroDrainLimit,

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,
}

/// Paths served by the host itself.
const RESERVED_PATHS: &[&str] = &["/health"];

/// Run every semantic check and collect the failures.
pub fn validate_config(config: &WsgateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.exchange.drain_limit_bytes == 0 {
        errors.push(ValidationError::ZeroDrainLimit);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let mut paths = HashSet::new();
    for endpoint in &config.endpoints {
        let context = format!("endpoint '{}'", endpoint.path);
        if !endpoint.path.starts_with('/') || endpoint.path.contains(['{', '}', '*']) {
            errors.push(ValidationError::InvalidPath(endpoint.path.clone()));
        } else if RESERVED_PATHS.contains(&endpoint.path.trim_end_matches('/')) {
            errors.push(ValidationError::ReservedPath(endpoint.path.clone()));
        } else if !paths.insert(endpoint.path.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicatePath(endpoint.path.clone()));
        }
        for name in [&endpoint.service, &endpoint.port] {
            if name.parse::<QName>().is_err() {
                errors.push(ValidationError::InvalidName {
                    context: context.clone(),
                    value: name.clone(),
                });
            }
        }
        if binding_id(&endpoint.binding).is_none() {
            errors.push(ValidationError::UnknownBinding {
                context,
                value: endpoint.binding.clone(),
            });
        }
    }

    for rule in &config.handler_chains {
        let context = format!("handler chain '{}'", rule.name);
        if rule.handlers.is_empty() {
            errors.push(ValidationError::EmptyHandlerList(rule.name.clone()));
        }
        let patterns = [&rule.service_name_pattern, &rule.port_name_pattern];
        for pattern in patterns.into_iter().flatten() {
            if NamePattern::parse(pattern).is_err() {
                errors.push(ValidationError::InvalidPattern {
                    context: context.clone(),
                    value: pattern.clone(),
                });
            }
        }
        for binding in &rule.protocol_bindings {
            if binding_id(binding).is_none() {
                errors.push(ValidationError::UnknownBinding {
                    context: context.clone(),
                    value: binding.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
