//! Handler chain resolution.
//!
//! # Data Flow
//! ```text
//! Endpoint (service, port, binding)
//!     → PortInfo
//!     → HandlerResolver::handler_chain
//!         → rules matched (AND of conditions)
//!         → factories instantiate handlers
//!         → chain cached per port
//! ```

pub mod matcher;
pub mod port;
pub mod registry;

pub use port::{binding_id, PortInfo, QName, SOAP11_HTTP_BINDING, SOAP12_HTTP_BINDING, XML_HTTP_BINDING};
pub use registry::{ChainRegistry, ChainRule, HandlerFactory, HandlerRef};

use thiserror::Error;

use crate::handler::HandlerChain;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid qualified name: {0}")]
    InvalidName(String),

    #[error("invalid name pattern: {0}")]
    InvalidPattern(String),

    #[error("unknown protocol binding: {0}")]
    UnknownBinding(String),

    #[error("handler '{handler}' referenced by rule '{rule}' is not registered")]
    UnknownHandler { handler: String, rule: String },

    #[error("handler '{handler}' could not be created: {reason}")]
    Factory { handler: String, reason: String },
}

/// Supplies the handler chain for a port.
pub trait HandlerResolver: Send + Sync {
    fn handler_chain(&self, port: &PortInfo) -> Result<HandlerChain, ResolveError>;
}

impl<F> HandlerResolver for F
where
    F: Fn(&PortInfo) -> HandlerChain + Send + Sync,
{
    fn handler_chain(&self, port: &PortInfo) -> Result<HandlerChain, ResolveError> {
        Ok(self(port))
    }
}
