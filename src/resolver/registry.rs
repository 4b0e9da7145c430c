//! Rule-based handler chain registry.
//!
//! # Responsibilities
//! - Hold named handler factories
//! - Hold chain rules (port conditions + ordered handler names)
//! - Resolve and cache one chain per port
//!
//! # Design Decisions
//! - Every matching rule contributes its handlers, in rule order
//! - Handlers are instantiated once per port and then reused for the
//!   lifetime of the registry
//! - The cache is a `DashMap`; the first resolution of a port builds its
//!   chain while holding that entry, so factories run once per port

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::matcher::{
    AndMatcher, BindingMatcher, NamePattern, PortMatcher, PortNameMatcher, ServiceNameMatcher,
};
use super::{HandlerResolver, PortInfo, ResolveError};
use crate::config::HandlerChainConfig;
use crate::handler::{Handler, HandlerChain};

/// Creates a handler instance. Receives the argument after `:` in a
/// handler reference such as `payload-limit:65536`.
pub type HandlerFactory =
    Arc<dyn Fn(Option<&str>) -> Result<Arc<dyn Handler>, String> + Send + Sync>;

/// Handler name plus optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRef {
    pub name: String,
    pub arg: Option<String>,
}

impl HandlerRef {
    pub fn parse(reference: &str) -> Self {
        match reference.split_once(':') {
            Some((name, arg)) => Self {
                name: name.trim().to_string(),
                arg: Some(arg.trim().to_string()),
            },
            None => Self {
                name: reference.trim().to_string(),
                arg: None,
            },
        }
    }
}

/// A compiled chain rule.
#[derive(Debug)]
pub struct ChainRule {
    pub name: String,
    matcher: AndMatcher,
    handlers: Vec<HandlerRef>,
}

impl ChainRule {
    pub fn new(name: impl Into<String>, matcher: AndMatcher, handlers: Vec<HandlerRef>) -> Self {
        Self {
            name: name.into(),
            matcher,
            handlers,
        }
    }

    /// Compile a rule from its configuration.
    pub fn from_config(config: &HandlerChainConfig) -> Result<Self, ResolveError> {
        let mut matchers: Vec<Box<dyn PortMatcher>> = Vec::new();
        if let Some(pattern) = &config.service_name_pattern {
            matchers.push(Box::new(ServiceNameMatcher::new(NamePattern::parse(pattern)?)));
        }
        if let Some(pattern) = &config.port_name_pattern {
            matchers.push(Box::new(PortNameMatcher::new(NamePattern::parse(pattern)?)));
        }
        if !config.protocol_bindings.is_empty() {
            matchers.push(Box::new(BindingMatcher::new(&config.protocol_bindings)?));
        }
        let handlers = config.handlers.iter().map(|h| HandlerRef::parse(h)).collect();
        Ok(Self::new(config.name.clone(), AndMatcher::new(matchers), handlers))
    }

    pub fn matches(&self, port: &PortInfo) -> bool {
        self.matcher.matches(port)
    }
}

/// Handler resolver driven by named factories and rules.
#[derive(Default)]
pub struct ChainRegistry {
    factories: HashMap<String, HandlerFactory>,
    rules: Vec<ChainRule>,
    cache: DashMap<PortInfo, HandlerChain>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Option<&str>) -> Result<Arc<dyn Handler>, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self.cache.clear();
    }

    pub fn add_rule(&mut self, rule: ChainRule) {
        self.rules.push(rule);
        self.cache.clear();
    }

    /// Compile and add every configured rule.
    pub fn add_rules(&mut self, configs: &[HandlerChainConfig]) -> Result<(), ResolveError> {
        for config in configs {
            self.add_rule(ChainRule::from_config(config)?);
        }
        Ok(())
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn build(&self, port: &PortInfo) -> Result<HandlerChain, ResolveError> {
        let mut handlers = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(port)) {
            for reference in &rule.handlers {
                let factory =
                    self.factories
                        .get(&reference.name)
                        .ok_or_else(|| ResolveError::UnknownHandler {
                            handler: reference.name.clone(),
                            rule: rule.name.clone(),
                        })?;
                let handler = factory(reference.arg.as_deref()).map_err(|reason| {
                    ResolveError::Factory {
                        handler: reference.name.clone(),
                        reason,
                    }
                })?;
                handlers.push(handler);
            }
        }
        Ok(HandlerChain::new(handlers))
    }
}

impl HandlerResolver for ChainRegistry {
    fn handler_chain(&self, port: &PortInfo) -> Result<HandlerChain, ResolveError> {
        if let Some(chain) = self.cache.get(port) {
            return Ok(chain.clone());
        }

        let chain = self.cache.entry(port.clone()).or_try_insert_with(|| {
            let chain = self.build(port)?;
            tracing::debug!(
                port = %port,
                handlers = ?chain.names(),
                "Resolved handler chain"
            );
            Ok::<_, ResolveError>(chain)
        })?;
        Ok(chain.clone())
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ChainRegistry")
            .field("factories", &names)
            .field("rules", &self.rules)
            .field("cached_ports", &self.cache.len())
            .finish()
    }
}
