//! Endpoints: a port, its resolved handler chain and an operation.
//!
//! # Data Flow
//! ```text
//! Exchange
//!     → read request body
//!     → MessageContext (payload, standard properties, capabilities)
//!     → HandlerChain::invoke(operation)
//!     → dispatch: 200 message | 202 one-way | 500 fault or failure
//!     → send headers, write body, close exchange
//! ```
//!
//! # Design Decisions
//! - The chain is resolved once when the endpoint is built
//! - `serve` is blocking; the HTTP host runs it off the async runtime
//! - A status set on the context by a handler overrides the default

pub mod handlers;
pub mod operation;

pub use operation::{Echo, Operation};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use bytes::Bytes;

use crate::config::EndpointConfig;
use crate::exchange::{Exchange, ExchangeError, ExchangeId, Principal, ResponseLength};
use crate::features::{Features, ServiceRefRegistry};
use crate::handler::context::{HTTP_REQUEST_METHOD, PATH_INFO, QUERY_STRING, WSDL_PORT, WSDL_SERVICE};
use crate::handler::{ChainOutcome, Dispatch, HandlerChain, MessageContext, MessagePattern, Scope};
use crate::observability::metrics;
use crate::resolver::{binding_id, HandlerResolver, PortInfo, QName, ResolveError};

/// Size of the pieces a chunked response is written in.
const CHUNK_SIZE: usize = 16 * 1024;

/// HTTP request details, exposed to handlers as a context capability.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub exchange_id: ExchangeId,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub scheme: String,
    pub remote_addr: SocketAddr,
    pub principal: Option<Principal>,
    pub cipher_suite: Option<String>,
}

impl RequestInfo {
    fn from_exchange(exchange: &Exchange) -> Self {
        Self {
            exchange_id: exchange.id(),
            method: exchange.request_method().clone(),
            uri: exchange.request_uri().clone(),
            headers: exchange.request_headers().clone(),
            scheme: exchange.scheme().to_string(),
            remote_addr: exchange.remote_addr(),
            principal: exchange.user_principal().cloned(),
            cipher_suite: exchange.attributes().cipher_suite().map(str::to_string),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }
}

/// The endpoint a message context belongs to, exposed as a capability.
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub path: String,
    pub port: PortInfo,
}

/// A served port.
pub struct Endpoint {
    path: String,
    port: PortInfo,
    chain: HandlerChain,
    operation: Arc<dyn Operation>,
    pattern: MessagePattern,
    features: Features,
    service_refs: ServiceRefRegistry,
    chunk_threshold: usize,
}

impl Endpoint {
    pub fn builder(path: impl Into<String>, port: PortInfo) -> EndpointBuilder {
        EndpointBuilder {
            path: path.into(),
            port,
            operation: Arc::new(Echo),
            pattern: MessagePattern::RequestResponse,
            features: Features::default(),
            service_refs: ServiceRefRegistry::default(),
            chunk_threshold: usize::MAX,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn port(&self) -> &PortInfo {
        &self.port
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    pub fn pattern(&self) -> MessagePattern {
        self.pattern
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Whether `path` addresses this endpoint (exactly or below it).
    pub fn matches_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.path.ends_with('/'),
            None => false,
        }
    }

    /// Process one exchange to completion. Returns the status sent.
    pub fn serve(&self, exchange: Exchange) -> Result<StatusCode, ExchangeError> {
        let start = Instant::now();
        let span = tracing::info_span!(
            "exchange",
            exchange_id = %exchange.id(),
            endpoint = %self.path,
        );
        let _guard = span.enter();

        let mut ctx = match self.message_context(&exchange) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(error = %e, "Request could not be read");
                let _ = exchange.close();
                return Err(e);
            }
        };
        let outcome = self
            .chain
            .invoke(&mut ctx, self.pattern, |ctx| self.operation.invoke(ctx));
        self.record_outcome(&outcome);

        let result = self.respond(&exchange, &ctx, outcome);
        let closed = exchange.close();
        match (result, closed) {
            (Ok(status), Ok(())) => {
                metrics::record_exchange(&self.path, status.as_u16(), start);
                tracing::debug!(status = status.as_u16(), "Exchange completed");
                Ok(status)
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                tracing::warn!(error = %e, "Exchange failed");
                Err(e)
            }
        }
    }

    fn message_context(&self, exchange: &Exchange) -> Result<MessageContext, ExchangeError> {
        let body = exchange.request_body();
        let payload = body.read_bytes()?;
        body.close();

        let uri = exchange.request_uri();
        let mut ctx = MessageContext::new(payload);
        ctx.set_scoped_property(HTTP_REQUEST_METHOD, exchange.request_method().as_str(), Scope::Application);
        let path_info = uri
            .path()
            .strip_prefix(self.path.as_str())
            .unwrap_or_default();
        ctx.set_scoped_property(PATH_INFO, path_info, Scope::Application);
        if let Some(query) = uri.query() {
            ctx.set_scoped_property(QUERY_STRING, query, Scope::Application);
        }
        ctx.set_scoped_property(WSDL_SERVICE, self.port.service_name.to_string(), Scope::Application);
        ctx.set_scoped_property(WSDL_PORT, self.port.port_name.to_string(), Scope::Application);

        let extensions = ctx.extensions_mut();
        extensions.insert(RequestInfo::from_exchange(exchange));
        extensions.insert(EndpointInfo {
            path: self.path.clone(),
            port: self.port.clone(),
        });
        extensions.insert(self.features);
        if let Some(mtom) = self.features.mtom {
            extensions.insert(mtom);
        }
        if let Some(addressing) = self.features.addressing {
            extensions.insert(addressing);
        }
        extensions.insert(self.service_refs.clone());
        Ok(ctx)
    }

    fn record_outcome(&self, outcome: &ChainOutcome) {
        match &outcome.dispatch {
            Dispatch::Fault(fault) => {
                tracing::info!(fault = %fault, "Dispatching fault");
                metrics::record_handler_fault(&self.path);
            }
            Dispatch::Failure(failure) => {
                tracing::error!(handler = %failure.handler, error = %failure.error, "Handler chain failed");
                metrics::record_handler_fault(&self.path);
            }
            Dispatch::Message | Dispatch::Nothing => {}
        }
        for failure in &outcome.close_failures {
            tracing::warn!(handler = %failure.handler, error = %failure.error, "Handler close failed");
        }
        metrics::record_close_failures(&self.path, outcome.close_failures.len());
    }

    fn respond(
        &self,
        exchange: &Exchange,
        ctx: &MessageContext,
        outcome: ChainOutcome,
    ) -> Result<StatusCode, ExchangeError> {
        let (default_status, body, content_type) = match outcome.dispatch {
            Dispatch::Message => {
                let content_type = exchange
                    .request_headers()
                    .get(header::CONTENT_TYPE)
                    .cloned()
                    .unwrap_or(HeaderValue::from_static("application/octet-stream"));
                (StatusCode::OK, ctx.payload().clone(), content_type)
            }
            Dispatch::Nothing => (StatusCode::ACCEPTED, Bytes::new(), text_plain()),
            Dispatch::Fault(fault) => {
                let mut text = fault.to_string();
                if let Some(detail) = &fault.detail {
                    text.push('\n');
                    text.push_str(detail);
                }
                text.push('\n');
                (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(text), text_plain())
            }
            Dispatch::Failure(failure) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from(format!("Server: handler '{}' failed\n", failure.handler)),
                text_plain(),
            ),
        };
        let status = ctx.response_code().unwrap_or(default_status.as_u16());

        exchange.with_response_headers(|headers| {
            for (name, value) in ctx.response_headers() {
                headers.append(name, value.clone());
            }
            if !body.is_empty() && !headers.contains_key(header::CONTENT_TYPE) {
                headers.insert(header::CONTENT_TYPE, content_type);
            }
        })?;

        let length = if body.is_empty() {
            ResponseLength::Empty
        } else if body.len() > self.chunk_threshold {
            ResponseLength::Chunked
        } else {
            ResponseLength::Fixed(body.len() as u64)
        };
        exchange.send_response_headers(status, length)?;

        if !body.is_empty() {
            let sink = exchange.response_body()?;
            let pieces: Vec<&[u8]> = match length {
                ResponseLength::Chunked => body.chunks(CHUNK_SIZE).collect(),
                _ => vec![&body[..]],
            };
            for piece in pieces {
                match sink.write_bytes(piece) {
                    // HEAD request or a status without body
                    Err(ExchangeError::BodyNotPermitted) => break,
                    other => {
                        other?;
                    }
                }
            }
        }

        exchange
            .response_code()
            .ok_or(ExchangeError::HeadersNotSent)
    }
}

fn text_plain() -> HeaderValue {
    HeaderValue::from_static("text/plain; charset=utf-8")
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path)
            .field("port", &self.port)
            .field("chain", &self.chain)
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// Builder for [`Endpoint`]; the handler chain is resolved by `build`.
pub struct EndpointBuilder {
    path: String,
    port: PortInfo,
    operation: Arc<dyn Operation>,
    pattern: MessagePattern,
    features: Features,
    service_refs: ServiceRefRegistry,
    chunk_threshold: usize,
}

impl EndpointBuilder {
    /// Start from an endpoint's configuration.
    pub fn from_config(config: &EndpointConfig) -> Result<Self, ResolveError> {
        let service: QName = config.service.parse()?;
        let port: QName = config.port.parse()?;
        let binding = binding_id(&config.binding)
            .ok_or_else(|| ResolveError::UnknownBinding(config.binding.clone()))?;
        let pattern = if config.one_way {
            MessagePattern::OneWay
        } else {
            MessagePattern::RequestResponse
        };
        Ok(Endpoint::builder(config.path.clone(), PortInfo::new(service, port, binding))
            .pattern(pattern)
            .features(Features {
                mtom: config.mtom,
                addressing: config.addressing,
            }))
    }

    pub fn operation(mut self, operation: impl Operation + 'static) -> Self {
        self.operation = Arc::new(operation);
        self
    }

    pub fn shared_operation(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operation = operation;
        self
    }

    pub fn pattern(mut self, pattern: MessagePattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn service_refs(mut self, refs: ServiceRefRegistry) -> Self {
        self.service_refs = refs;
        self
    }

    /// Responses with more bytes than this are sent chunked.
    pub fn chunk_threshold(mut self, threshold: usize) -> Self {
        self.chunk_threshold = threshold;
        self
    }

    pub fn build(self, resolver: &dyn HandlerResolver) -> Result<Endpoint, ResolveError> {
        let chain = resolver.handler_chain(&self.port)?;
        tracing::info!(
            path = %self.path,
            port = %self.port,
            handlers = ?chain.names(),
            "Endpoint ready"
        );
        Ok(Endpoint {
            path: self.path,
            port: self.port,
            chain,
            operation: self.operation,
            pattern: self.pattern,
            features: self.features,
            service_refs: self.service_refs,
            chunk_threshold: self.chunk_threshold,
        })
    }
}
