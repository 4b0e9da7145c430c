//! References to external services, declared in configuration.
//!
//! # Design Decisions
//! - References are plain values built with a builder and validated once
//! - The registry is resolved at startup and shared read-only; handlers and
//!   operations reach it through the message context

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::config::ServiceRefConfig;

#[derive(Debug, Error)]
pub enum ServiceRefError {
    #[error("service reference name must not be empty")]
    EmptyName,

    #[error("service reference '{name}' has an invalid wsdl location: {source}")]
    InvalidWsdlLocation {
        name: String,
        #[source]
        source: url::ParseError,
    },

    #[error("duplicate service reference '{0}'")]
    Duplicate(String),
}

/// A declared dependency on a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
    name: String,
    type_name: Option<String>,
    mapped_name: Option<String>,
    wsdl_location: Option<Url>,
    value: Option<String>,
}

impl ServiceRef {
    pub fn builder(name: impl Into<String>) -> ServiceRefBuilder {
        ServiceRefBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the resource being referenced.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Product-specific name the reference maps to.
    pub fn mapped_name(&self) -> Option<&str> {
        self.mapped_name.as_deref()
    }

    pub fn wsdl_location(&self) -> Option<&Url> {
        self.wsdl_location.as_ref()
    }

    /// Service type of the reference, when different from `type_name`.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct ServiceRefBuilder {
    name: String,
    type_name: Option<String>,
    mapped_name: Option<String>,
    wsdl_location: Option<String>,
    value: Option<String>,
}

impl ServiceRefBuilder {
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn mapped_name(mut self, mapped_name: impl Into<String>) -> Self {
        self.mapped_name = Some(mapped_name.into());
        self
    }

    pub fn wsdl_location(mut self, location: impl Into<String>) -> Self {
        self.wsdl_location = Some(location.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn build(self) -> Result<ServiceRef, ServiceRefError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceRefError::EmptyName);
        }
        let wsdl_location = match self.wsdl_location.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(location) => Some(Url::parse(location).map_err(|source| {
                ServiceRefError::InvalidWsdlLocation {
                    name: name.clone(),
                    source,
                }
            })?),
        };
        Ok(ServiceRef {
            name,
            type_name: non_empty(self.type_name),
            mapped_name: non_empty(self.mapped_name),
            wsdl_location,
            value: non_empty(self.value),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Service references by name.
#[derive(Debug, Clone, Default)]
pub struct ServiceRefRegistry {
    refs: Arc<BTreeMap<String, ServiceRef>>,
}

impl ServiceRefRegistry {
    pub fn new(refs: Vec<ServiceRef>) -> Result<Self, ServiceRefError> {
        let mut map = BTreeMap::new();
        for service_ref in refs {
            let name = service_ref.name().to_string();
            if map.insert(name.clone(), service_ref).is_some() {
                return Err(ServiceRefError::Duplicate(name));
            }
        }
        Ok(Self { refs: Arc::new(map) })
    }

    /// Build and register every configured reference.
    pub fn from_config(configs: &[ServiceRefConfig]) -> Result<Self, ServiceRefError> {
        let refs = configs
            .iter()
            .map(|c| {
                let mut builder = ServiceRef::builder(&c.name);
                if let Some(t) = &c.type_name {
                    builder = builder.type_name(t);
                }
                if let Some(m) = &c.mapped_name {
                    builder = builder.mapped_name(m);
                }
                if let Some(w) = &c.wsdl_location {
                    builder = builder.wsdl_location(w);
                }
                if let Some(v) = &c.value {
                    builder = builder.value(v);
                }
                builder.build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(refs)
    }

    pub fn get(&self, name: &str) -> Option<&ServiceRef> {
        self.refs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.refs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
