//! Port matching logic for handler chain rules.
//!
//! # Responsibilities
//! - Match service and port names against `{namespace}local` patterns
//! - Match binding ids against a list
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - `*` alone matches any name
//! - A trailing `*` on the local part is a prefix wildcard
//! - A pattern without `{namespace}` matches the local part in any namespace
//! - Empty condition = always matches (wildcard)

use super::port::{binding_id, PortInfo, QName};
use super::ResolveError;

/// Trait for matching ports against conditions.
pub trait PortMatcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the port matches this condition.
    fn matches(&self, port: &PortInfo) -> bool;
}

/// Pattern over a qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    Any,
    Name {
        namespace: Option<String>,
        local: String,
        prefix: bool,
    },
}

impl NamePattern {
    pub fn parse(pattern: &str) -> Result<Self, ResolveError> {
        let pattern = pattern.trim();
        if pattern == "*" {
            return Ok(NamePattern::Any);
        }
        let invalid = || ResolveError::InvalidPattern(pattern.to_string());
        let (namespace, local) = match pattern.strip_prefix('{') {
            Some(rest) => {
                let (ns, local) = rest.split_once('}').ok_or_else(invalid)?;
                (Some(ns.to_string()), local)
            }
            None => (None, pattern),
        };
        let (local, prefix) = match local.strip_suffix('*') {
            Some(stem) => (stem, true),
            None => (local, false),
        };
        if local.contains(['*', '{', '}']) || (local.is_empty() && !prefix) {
            return Err(invalid());
        }
        Ok(NamePattern::Name {
            namespace,
            local: local.to_string(),
            prefix,
        })
    }

    pub fn matches(&self, name: &QName) -> bool {
        match self {
            NamePattern::Any => true,
            NamePattern::Name {
                namespace,
                local,
                prefix,
            } => {
                let ns_ok = namespace
                    .as_deref()
                    .map(|ns| ns == name.namespace())
                    .unwrap_or(true);
                let local_ok = if *prefix {
                    name.local_part().starts_with(local.as_str())
                } else {
                    name.local_part() == local
                };
                ns_ok && local_ok
            }
        }
    }
}

/// Matches the service name.
#[derive(Debug, Clone)]
pub struct ServiceNameMatcher {
    pattern: NamePattern,
}

impl ServiceNameMatcher {
    pub fn new(pattern: NamePattern) -> Self {
        Self { pattern }
    }
}

impl PortMatcher for ServiceNameMatcher {
    fn matches(&self, port: &PortInfo) -> bool {
        self.pattern.matches(&port.service_name)
    }
}

/// Matches the port name.
#[derive(Debug, Clone)]
pub struct PortNameMatcher {
    pattern: NamePattern,
}

impl PortNameMatcher {
    pub fn new(pattern: NamePattern) -> Self {
        Self { pattern }
    }
}

impl PortMatcher for PortNameMatcher {
    fn matches(&self, port: &PortInfo) -> bool {
        self.pattern.matches(&port.port_name)
    }
}

/// Matches any of a list of binding ids.
#[derive(Debug, Clone)]
pub struct BindingMatcher {
    bindings: Vec<&'static str>,
}

impl BindingMatcher {
    /// Build from binding tokens or URIs; unknown ones are rejected.
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Result<Self, ResolveError> {
        let bindings = tokens
            .iter()
            .map(|t| {
                binding_id(t.as_ref()).ok_or_else(|| ResolveError::UnknownBinding(t.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bindings })
    }
}

impl PortMatcher for BindingMatcher {
    fn matches(&self, port: &PortInfo) -> bool {
        self.bindings.iter().any(|b| *b == port.binding_id)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn PortMatcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn PortMatcher>>) -> Self {
        Self { matchers }
    }
}

impl PortMatcher for AndMatcher {
    fn matches(&self, port: &PortInfo) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(port))
    }
}
