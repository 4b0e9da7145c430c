//! wsgate: HTTP message exchanges and handler chains for web-service endpoints.

// Core subsystems
pub mod endpoint;
pub mod exchange;
pub mod handler;
pub mod http;
pub mod resolver;

// Endpoint configuration
pub mod config;
pub mod features;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::WsgateConfig;
pub use endpoint::{Endpoint, Operation};
pub use exchange::{Exchange, ExchangeError};
pub use handler::{Handler, HandlerChain, HandlerError, MessageContext};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resolver::{ChainRegistry, HandlerResolver, PortInfo};
