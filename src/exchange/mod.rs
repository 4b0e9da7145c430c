//! HTTP message exchange subsystem.
//!
//! # Lifecycle
//! ```text
//! listener creates Exchange
//!     → Created            (method, URI, headers readable)
//!     → HeadersInspected   (request headers looked at; informational)
//!     → ResponseHeadersSent  send_response_headers(status, length)
//!     → ResponseBodyWritten  first write to the response body
//!     → Closed             response body closed (closes the request body too)
//! ```
//!
//! # Design Decisions
//! - One shared state behind a mutex; body handles are cheap clones of it,
//!   so repeated accessor calls address the same channel
//! - Every call after `Closed` is either a no-op (close) or an explicit
//!   "closed" error
//! - An exchange that is dropped without being closed aborts its transport

pub mod attributes;
pub mod body;
pub mod error;
pub mod transport;

pub use attributes::{Attributes, PeerCertificate, Principal, TlsInfo};
pub use body::{RequestBody, ResponseBody};
pub use error::ExchangeError;
pub use transport::{RecordingTransport, ResponseHead, ResponseTransport, Transmission};

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use bytes::Bytes;
use uuid::Uuid;

use crate::observability::metrics;

/// Unread request bytes discarded when the request body is closed early.
/// Anything beyond this makes the connection unusable for further exchanges.
pub const DEFAULT_DRAIN_LIMIT: usize = 64 * 1024;

/// Unique identifier for an exchange, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ex-{}", self.0)
    }
}

/// Lifecycle state of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Created,
    HeadersInspected,
    ResponseHeadersSent,
    ResponseBodyWritten,
    Closed,
}

/// Response length directive.
///
/// The raw form used by `send_response_headers` maps as: `> 0` fixed,
/// `0` chunked, `<= -1` no body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    /// Exactly this many bytes must be written.
    Fixed(u64),
    /// Any number of bytes, terminated by closing the body.
    Chunked,
    /// No body may be written.
    Empty,
}

impl ResponseLength {
    pub fn from_raw(len: i64) -> Self {
        match len {
            l if l > 0 => ResponseLength::Fixed(l as u64),
            0 => ResponseLength::Chunked,
            _ => ResponseLength::Empty,
        }
    }
}

impl From<i64> for ResponseLength {
    fn from(len: i64) -> Self {
        ResponseLength::from_raw(len)
    }
}

impl From<i32> for ResponseLength {
    fn from(len: i32) -> Self {
        ResponseLength::from_raw(i64::from(len))
    }
}

pub(crate) struct RequestChannel {
    pub(crate) remaining: Bytes,
    pub(crate) closed: bool,
}

pub(crate) struct ResponseChannel {
    pub(crate) length: Option<ResponseLength>,
    pub(crate) written: u64,
    pub(crate) closed: bool,
}

/// Mutable state shared by the exchange and its body handles.
pub(crate) struct Inner {
    pub(crate) id: ExchangeId,
    pub(crate) state: ExchangeState,
    pub(crate) status: Option<StatusCode>,
    pub(crate) response_headers: HeaderMap,
    pub(crate) request: RequestChannel,
    pub(crate) response: ResponseChannel,
    pub(crate) aborted: bool,
    pub(crate) reusable: bool,
    pub(crate) drain_limit: usize,
    pub(crate) transport: Box<dyn ResponseTransport>,
}

impl Inner {
    /// Abort the exchange once; later calls are no-ops.
    pub(crate) fn abort(&mut self, reason: &'static str) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.reusable = false;
        self.transport.abort(reason);
        tracing::warn!(exchange_id = %self.id, reason, "Exchange aborted");
        metrics::record_exchange_abort(reason);
    }

    pub(crate) fn close_request(&mut self) {
        if self.request.closed {
            return;
        }
        let unread = self.request.remaining.len();
        if unread > self.drain_limit {
            self.reusable = false;
            tracing::debug!(
                exchange_id = %self.id,
                unread,
                drain_limit = self.drain_limit,
                "Request body closed with unread data beyond drain limit"
            );
        }
        self.request.remaining = Bytes::new();
        self.request.closed = true;
    }

    pub(crate) fn close_response(&mut self) -> Result<(), ExchangeError> {
        if self.response.closed {
            return Ok(());
        }
        self.response.closed = true;
        self.close_request();
        self.state = ExchangeState::Closed;

        if self.aborted {
            return Ok(());
        }
        let length = self.response.length;
        match length {
            None => {
                tracing::warn!(exchange_id = %self.id, "Exchange closed before response headers were sent");
                self.abort("closed without response");
                Ok(())
            }
            Some(ResponseLength::Fixed(declared)) if self.response.written < declared => {
                let written = self.response.written;
                self.abort("short write");
                Err(ExchangeError::ShortWrite { declared, written })
            }
            Some(_) => self.transport.finish().map_err(|e| {
                self.abort("transport failure");
                ExchangeError::Transport(e)
            }),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.response.closed && !self.aborted {
            tracing::warn!(exchange_id = %self.id, "Exchange dropped without being closed");
            self.abort("dropped");
        }
    }
}

pub(crate) fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One HTTP request/response cycle.
pub struct Exchange {
    id: ExchangeId,
    method: Method,
    uri: Uri,
    version: Version,
    request_headers: HeaderMap,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    scheme: String,
    context_path: String,
    attributes: Attributes,
    principal: Option<Principal>,
    shared: Arc<Mutex<Inner>>,
}

impl Exchange {
    /// Start building an exchange for the given request line.
    pub fn builder(method: Method, uri: Uri) -> ExchangeBuilder {
        ExchangeBuilder::new(method, uri)
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn request_method(&self) -> &Method {
        &self.method
    }

    pub fn request_uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers; lookups are case-insensitive.
    pub fn request_headers(&self) -> &HeaderMap {
        let mut inner = lock(&self.shared);
        if inner.state == ExchangeState::Created {
            inner.state = ExchangeState::HeadersInspected;
        }
        &self.request_headers
    }

    /// First value of a request header, if present and valid text.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Protocol string such as `HTTP/1.1`.
    pub fn protocol(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "HTTP/1.1",
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Path of the endpoint context that received this exchange.
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Typed attribute lookup; `None` when unset.
    pub fn attribute<T: std::any::Any>(&self, name: &str) -> Option<&T> {
        self.attributes.get(name)
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.names()
    }

    pub fn user_principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// False when no user is authenticated.
    pub fn is_user_in_role(&self, role: &str) -> bool {
        self.principal
            .as_ref()
            .map(|p| p.has_role(role))
            .unwrap_or(false)
    }

    pub fn state(&self) -> ExchangeState {
        lock(&self.shared).state
    }

    /// Status code, once `send_response_headers` has been called.
    pub fn response_code(&self) -> Option<StatusCode> {
        lock(&self.shared).status
    }

    pub fn is_aborted(&self) -> bool {
        lock(&self.shared).aborted
    }

    /// Whether the underlying connection may carry another exchange.
    pub fn is_connection_reusable(&self) -> bool {
        lock(&self.shared).reusable
    }

    /// Snapshot of the response headers.
    pub fn response_headers(&self) -> HeaderMap {
        lock(&self.shared).response_headers.clone()
    }

    /// Mutate response headers in place. Fails once the response has started.
    pub fn with_response_headers<R>(
        &self,
        f: impl FnOnce(&mut HeaderMap) -> R,
    ) -> Result<R, ExchangeError> {
        let mut inner = lock(&self.shared);
        if inner.status.is_some() {
            return Err(ExchangeError::HeadersAlreadySent);
        }
        if inner.response.closed {
            return Err(ExchangeError::ResponseClosed);
        }
        if inner.aborted {
            return Err(ExchangeError::Aborted);
        }
        Ok(f(&mut inner.response_headers))
    }

    /// Append a response header value, keeping existing values.
    pub fn add_response_header(&self, name: &str, value: &str) -> Result<(), ExchangeError> {
        let (name, value) = parse_header(name, value)?;
        self.with_response_headers(|h| {
            h.append(name, value);
        })
    }

    /// Replace all values of a response header.
    pub fn set_response_header(&self, name: &str, value: &str) -> Result<(), ExchangeError> {
        let (name, value) = parse_header(name, value)?;
        self.with_response_headers(|h| {
            h.insert(name, value);
        })
    }

    /// Send the status line and headers. May be called once.
    ///
    /// Sets `content-length` or `transfer-encoding` from `length` unless the
    /// caller already set `content-length`. A `HEAD` request, or a status
    /// that forbids a body, never carries one.
    pub fn send_response_headers(
        &self,
        status: u16,
        length: impl Into<ResponseLength>,
    ) -> Result<(), ExchangeError> {
        let length = length.into();
        let mut inner = lock(&self.shared);
        if inner.status.is_some() {
            return Err(ExchangeError::HeadersAlreadySent);
        }
        if inner.response.closed {
            return Err(ExchangeError::ResponseClosed);
        }
        if inner.aborted {
            return Err(ExchangeError::Aborted);
        }
        let status = StatusCode::from_u16(status).map_err(|_| ExchangeError::InvalidStatus(status))?;

        let bodiless_status = status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;
        let effective = if self.method == Method::HEAD || bodiless_status {
            ResponseLength::Empty
        } else {
            length
        };

        if !inner.response_headers.contains_key(header::CONTENT_LENGTH) && !bodiless_status {
            match (length, effective) {
                (ResponseLength::Fixed(n), _) => {
                    inner.response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(n));
                }
                (ResponseLength::Chunked, ResponseLength::Chunked) => {
                    inner
                        .response_headers
                        .insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                }
                (ResponseLength::Empty, _) => {
                    inner.response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
                }
                _ => {}
            }
        }

        let head = ResponseHead {
            status,
            headers: inner.response_headers.clone(),
            length: effective,
        };
        if let Err(e) = inner.transport.send_head(head) {
            inner.abort("transport failure");
            return Err(ExchangeError::Transport(e));
        }

        inner.status = Some(status);
        inner.response.length = Some(effective);
        inner.state = ExchangeState::ResponseHeadersSent;

        tracing::debug!(
            exchange_id = %inner.id,
            status = status.as_u16(),
            length = ?effective,
            "Response headers sent"
        );
        Ok(())
    }

    /// Handle to the request body. Repeated calls address the same channel.
    pub fn request_body(&self) -> RequestBody {
        RequestBody::new(Arc::clone(&self.shared))
    }

    /// Handle to the response body. Requires the response headers to be sent;
    /// asking earlier is a usage violation that aborts the exchange.
    pub fn response_body(&self) -> Result<ResponseBody, ExchangeError> {
        let mut inner = lock(&self.shared);
        if inner.response.closed {
            return Err(ExchangeError::ResponseClosed);
        }
        if inner.response.length.is_none() {
            inner.abort("headers not sent");
            return Err(ExchangeError::HeadersNotSent);
        }
        drop(inner);
        Ok(ResponseBody::new(Arc::clone(&self.shared)))
    }

    /// End the exchange: drain and close the request body, then close the
    /// response body. Safe to call more than once.
    pub fn close(&self) -> Result<(), ExchangeError> {
        let mut inner = lock(&self.shared);
        inner.close_request();
        inner.close_response()
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("state", &self.state())
            .finish()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ExchangeError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ExchangeError::InvalidHeader(name.to_string()))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| ExchangeError::InvalidHeader(name.to_string()))?;
    Ok((name, value))
}

/// Builder used by listeners to create an [`Exchange`].
pub struct ExchangeBuilder {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    scheme: String,
    context_path: String,
    attributes: Attributes,
    principal: Option<Principal>,
    drain_limit: usize,
}

impl ExchangeBuilder {
    fn new(method: Method, uri: Uri) -> Self {
        let unspecified = SocketAddr::from(([0, 0, 0, 0], 0));
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: unspecified,
            local_addr: unspecified,
            scheme: "http".to_string(),
            context_path: "/".to_string(),
            attributes: Attributes::new(),
            principal: None,
            drain_limit: DEFAULT_DRAIN_LIMIT,
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append a request header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Ok((name, value)) = parse_header(name, value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn addresses(mut self, remote: SocketAddr, local: SocketAddr) -> Self {
        self.remote_addr = remote;
        self.local_addr = local;
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into();
        self
    }

    pub fn attribute<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        self.attributes.insert(name, value);
        self
    }

    /// Expose TLS session details and switch the scheme to `https`.
    pub fn tls(mut self, tls: &TlsInfo) -> Self {
        self.attributes.apply_tls(tls);
        self.scheme = "https".to_string();
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn drain_limit(mut self, limit: usize) -> Self {
        self.drain_limit = limit;
        self
    }

    pub fn build(self, transport: impl ResponseTransport + 'static) -> Exchange {
        let id = ExchangeId::new();
        let inner = Inner {
            id,
            state: ExchangeState::Created,
            status: None,
            response_headers: HeaderMap::new(),
            request: RequestChannel {
                remaining: self.body,
                closed: false,
            },
            response: ResponseChannel {
                length: None,
                written: 0,
                closed: false,
            },
            aborted: false,
            reusable: true,
            drain_limit: self.drain_limit,
            transport: Box::new(transport),
        };
        Exchange {
            id,
            method: self.method,
            uri: self.uri,
            version: self.version,
            request_headers: self.headers,
            remote_addr: self.remote_addr,
            local_addr: self.local_addr,
            scheme: self.scheme,
            context_path: self.context_path,
            attributes: self.attributes,
            principal: self.principal,
            shared: Arc::new(Mutex::new(inner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn exchange() -> (Exchange, RecordingTransport) {
        exchange_with(Method::POST, Bytes::from_static(b"request payload"))
    }

    fn exchange_with(method: Method, body: Bytes) -> (Exchange, RecordingTransport) {
        let transport = RecordingTransport::new();
        let ex = Exchange::builder(method, Uri::from_static("/services/echo?wsdl"))
            .header("Content-Type", "text/xml")
            .header("Accept", "text/xml")
            .header("Accept", "application/soap+xml")
            .body(body)
            .build(transport.clone());
        (ex, transport)
    }

    #[test]
    fn response_length_from_raw() {
        assert_eq!(ResponseLength::from_raw(10), ResponseLength::Fixed(10));
        assert_eq!(ResponseLength::from_raw(0), ResponseLength::Chunked);
        assert_eq!(ResponseLength::from_raw(-1), ResponseLength::Empty);
        assert_eq!(ResponseLength::from_raw(-42), ResponseLength::Empty);
    }

    #[test]
    fn request_metadata_is_readable_immediately() {
        let (ex, _) = exchange();
        assert_eq!(ex.state(), ExchangeState::Created);
        assert_eq!(*ex.request_method(), Method::POST);
        assert_eq!(ex.request_uri().path(), "/services/echo");
        assert_eq!(ex.protocol(), "HTTP/1.1");
        assert_eq!(ex.scheme(), "http");
        assert!(ex.response_code().is_none());

        assert_eq!(ex.request_header("content-type"), Some("text/xml"));
        assert_eq!(ex.request_header("CONTENT-TYPE"), Some("text/xml"));
        assert_eq!(ex.state(), ExchangeState::HeadersInspected);

        let accept: Vec<_> = ex.request_headers().get_all("accept").iter().collect();
        assert_eq!(accept, vec!["text/xml", "application/soap+xml"]);
        assert!(ex.request_header("x-missing").is_none());
    }

    #[test]
    fn response_headers_are_case_insensitive() {
        let (ex, _) = exchange();
        ex.set_response_header("Content-Type", "text/xml; charset=utf-8").unwrap();
        ex.add_response_header("X-Trace", "a").unwrap();
        ex.add_response_header("x-trace", "b").unwrap();

        let headers = ex.response_headers();
        assert_eq!(headers.get("content-type").unwrap(), "text/xml; charset=utf-8");
        assert_eq!(headers.get_all("X-TRACE").iter().count(), 2);
    }

    #[test]
    fn headers_frozen_after_send() {
        let (ex, _) = exchange();
        ex.send_response_headers(200, -1).unwrap();

        assert!(matches!(
            ex.set_response_header("x-late", "1"),
            Err(ExchangeError::HeadersAlreadySent)
        ));
        assert!(matches!(
            ex.send_response_headers(500, -1),
            Err(ExchangeError::HeadersAlreadySent)
        ));
        assert_eq!(ex.response_code(), Some(StatusCode::OK));
    }

    #[test]
    fn response_body_before_headers_aborts() {
        let (ex, transport) = exchange();
        assert!(matches!(ex.response_body(), Err(ExchangeError::HeadersNotSent)));
        assert!(ex.is_aborted());
        assert!(!ex.is_connection_reusable());
        assert_eq!(
            transport.transmission().aborted.as_deref(),
            Some("headers not sent")
        );
        assert!(matches!(
            ex.send_response_headers(200, -1),
            Err(ExchangeError::Aborted)
        ));
        ex.close().unwrap();
        assert_eq!(ex.state(), ExchangeState::Closed);
    }

    #[test]
    fn header_mutation_after_close_fails() {
        let (ex, _) = exchange();
        ex.close().unwrap();
        assert_eq!(ex.state(), ExchangeState::Closed);
        assert!(matches!(
            ex.set_response_header("x-late", "1"),
            Err(ExchangeError::ResponseClosed)
        ));
        assert!(matches!(
            ex.add_response_header("x-late", "1"),
            Err(ExchangeError::ResponseClosed)
        ));
        assert!(ex.response_headers().is_empty());
    }

    #[test]
    fn invalid_status_rejected() {
        let (ex, _) = exchange();
        assert!(matches!(
            ex.send_response_headers(42, -1),
            Err(ExchangeError::InvalidStatus(42))
        ));
        assert!(ex.response_code().is_none());
    }

    #[test]
    fn fixed_length_exact_write_succeeds() {
        let (ex, transport) = exchange();
        ex.send_response_headers(200, 5).unwrap();
        let mut body = ex.response_body().unwrap();
        body.write_all(b"hello").unwrap();
        assert_eq!(ex.state(), ExchangeState::ResponseBodyWritten);
        body.close().unwrap();

        assert_eq!(ex.state(), ExchangeState::Closed);
        assert!(ex.is_connection_reusable());
        let rec = transport.transmission();
        assert!(rec.finished);
        assert!(rec.aborted.is_none());
        assert_eq!(&rec.body()[..], b"hello");
        assert_eq!(rec.head.unwrap().headers.get("content-length").unwrap(), "5");
    }

    #[test]
    fn fixed_length_overflow_fails_at_write() {
        let (ex, transport) = exchange();
        ex.send_response_headers(200, 5).unwrap();
        let body = ex.response_body().unwrap();
        body.write_bytes(b"hel").unwrap();

        let err = body.write_bytes(b"lo!").unwrap_err();
        assert!(matches!(err, ExchangeError::LengthExceeded { declared: 5, attempted: 6 }));
        assert!(ex.is_aborted());
        assert!(!ex.is_connection_reusable());
        assert!(transport.transmission().aborted.is_some());

        assert!(matches!(body.write_bytes(b"x"), Err(ExchangeError::Aborted)));
        ex.close().unwrap();
        assert_eq!(ex.state(), ExchangeState::Closed);
    }

    #[test]
    fn fixed_length_short_write_fails_at_close() {
        let (ex, transport) = exchange();
        ex.send_response_headers(200, 5).unwrap();
        let body = ex.response_body().unwrap();
        body.write_bytes(b"hell").unwrap();

        let err = body.close().unwrap_err();
        assert!(matches!(err, ExchangeError::ShortWrite { declared: 5, written: 4 }));
        assert!(ex.is_aborted());
        assert!(!ex.is_connection_reusable());
        assert!(!transport.transmission().finished);

        // Already closed: later closes are no-ops.
        ex.close().unwrap();
        body.close().unwrap();
    }

    #[test]
    fn chunked_accepts_any_number_of_writes() {
        for writes in [0usize, 1, 7] {
            let (ex, transport) = exchange();
            ex.send_response_headers(200, 0).unwrap();
            let body = ex.response_body().unwrap();
            for _ in 0..writes {
                body.write_bytes(b"chunk").unwrap();
            }
            ex.close().unwrap();

            let rec = transport.transmission();
            assert!(rec.is_chunked());
            assert!(rec.finished);
            assert_eq!(rec.body().len(), writes * 5);
            assert_eq!(
                rec.head.unwrap().headers.get("transfer-encoding").unwrap(),
                "chunked"
            );
        }
    }

    #[test]
    fn no_body_mode_rejects_writes_and_closes_cleanly() {
        let (ex, transport) = exchange();
        ex.send_response_headers(204, -1).unwrap();
        let body = ex.response_body().unwrap();

        assert!(matches!(body.write_bytes(b"nope"), Err(ExchangeError::BodyNotPermitted)));
        assert_eq!(body.write_bytes(b"").unwrap(), 0);
        assert!(!ex.is_aborted());
        body.close().unwrap();

        let rec = transport.transmission();
        assert!(rec.finished);
        assert!(rec.body().is_empty());
    }

    #[test]
    fn no_body_mode_advertises_zero_length() {
        let (ex, transport) = exchange();
        ex.send_response_headers(202, -1).unwrap();
        ex.close().unwrap();
        let head = transport.transmission().head.unwrap();
        assert_eq!(head.length, ResponseLength::Empty);
        assert_eq!(head.headers.get("content-length").unwrap(), "0");
    }

    #[test]
    fn head_request_never_carries_a_body() {
        let (ex, transport) = exchange_with(Method::HEAD, Bytes::new());
        ex.send_response_headers(200, 42).unwrap();
        let body = ex.response_body().unwrap();
        assert!(matches!(body.write_bytes(b"x"), Err(ExchangeError::BodyNotPermitted)));
        ex.close().unwrap();

        let rec = transport.transmission();
        let head = rec.head.unwrap();
        assert_eq!(head.length, ResponseLength::Empty);
        assert_eq!(head.headers.get("content-length").unwrap(), "42");
        assert!(rec.finished);
    }

    #[test]
    fn caller_content_length_is_kept() {
        let (ex, transport) = exchange();
        ex.set_response_header("Content-Length", "3").unwrap();
        ex.send_response_headers(200, 3).unwrap();
        ex.response_body().unwrap().write_bytes(b"abc").unwrap();
        ex.close().unwrap();
        let head = transport.transmission().head.unwrap();
        assert_eq!(head.headers.get_all("content-length").iter().count(), 1);
    }

    #[test]
    fn body_accessors_share_one_channel() {
        let (ex, transport) = exchange();
        ex.send_response_headers(200, 0).unwrap();
        let first = ex.response_body().unwrap();
        let second = ex.response_body().unwrap();
        first.write_bytes(b"ab").unwrap();
        second.write_bytes(b"cd").unwrap();
        assert_eq!(first.written(), 4);
        ex.close().unwrap();
        assert_eq!(&transport.transmission().body()[..], b"abcd");

        let (ex, _) = exchange();
        let mut r1 = ex.request_body();
        let mut r2 = ex.request_body();
        let mut buf = [0u8; 7];
        r1.read_exact(&mut buf).unwrap();
        let mut rest = String::new();
        r2.read_to_string(&mut rest).unwrap();
        assert_eq!(&buf, b"request");
        assert_eq!(rest, " payload");
    }

    #[test]
    fn closing_response_closes_request() {
        let (ex, _) = exchange();
        ex.send_response_headers(200, -1).unwrap();
        ex.response_body().unwrap().close().unwrap();

        let req = ex.request_body();
        assert!(req.is_closed());
        assert!(matches!(req.read_bytes(), Err(ExchangeError::RequestClosed)));
        assert_eq!(ex.state(), ExchangeState::Closed);

        // A second close is a no-op.
        ex.close().unwrap();
        ex.close().unwrap();
    }

    #[test]
    fn request_body_cannot_be_reopened() {
        let (ex, _) = exchange();
        let req = ex.request_body();
        req.close();
        assert!(ex.request_body().is_closed());
        assert!(matches!(ex.request_body().read_bytes(), Err(ExchangeError::RequestClosed)));
        assert_ne!(ex.state(), ExchangeState::Closed);
    }

    #[test]
    fn early_close_within_drain_limit_keeps_connection() {
        let (ex, _) = exchange();
        let mut req = ex.request_body();
        let mut buf = [0u8; 3];
        req.read_exact(&mut buf).unwrap();
        req.close();
        ex.send_response_headers(200, -1).unwrap();
        ex.close().unwrap();
        assert!(ex.is_connection_reusable());
    }

    #[test]
    fn early_close_beyond_drain_limit_spoils_connection() {
        let transport = RecordingTransport::new();
        let ex = Exchange::builder(Method::POST, Uri::from_static("/"))
            .body(vec![0u8; 128])
            .drain_limit(16)
            .build(transport);
        ex.send_response_headers(200, -1).unwrap();
        ex.close().unwrap();
        assert!(!ex.is_connection_reusable());
        assert!(!ex.is_aborted());
    }

    #[test]
    fn close_without_response_aborts() {
        let (ex, transport) = exchange();
        ex.close().unwrap();
        assert!(ex.is_aborted());
        assert_eq!(ex.state(), ExchangeState::Closed);
        assert!(transport.transmission().aborted.is_some());
        assert!(matches!(
            ex.send_response_headers(200, -1),
            Err(ExchangeError::ResponseClosed)
        ));
    }

    #[test]
    fn operations_after_close_fail_explicitly() {
        let (ex, _) = exchange();
        ex.send_response_headers(200, 0).unwrap();
        let body = ex.response_body().unwrap();
        ex.close().unwrap();
        assert!(matches!(body.write_bytes(b"late"), Err(ExchangeError::ResponseClosed)));
        assert!(matches!(ex.request_body().read_bytes(), Err(ExchangeError::RequestClosed)));
    }

    #[test]
    fn dropping_unclosed_exchange_aborts_transport() {
        let (ex, transport) = exchange();
        ex.send_response_headers(200, 0).unwrap();
        drop(ex);
        assert_eq!(transport.transmission().aborted.as_deref(), Some("dropped"));
    }

    #[test]
    fn principal_and_roles() {
        let (ex, _) = exchange();
        assert!(ex.user_principal().is_none());
        assert!(!ex.is_user_in_role("admin"));

        let ex = Exchange::builder(Method::GET, Uri::from_static("/"))
            .principal(Principal::new("alice").with_role("admin"))
            .build(RecordingTransport::new());
        assert_eq!(ex.user_principal().unwrap().name(), "alice");
        assert!(ex.is_user_in_role("admin"));
        assert!(!ex.is_user_in_role("guest"));
    }

    #[test]
    fn tls_attributes_visible_on_exchange() {
        let tls = TlsInfo {
            cipher_suite: "TLS_AES_256_GCM_SHA384".into(),
            key_size: 256,
            peer_certificates: vec![PeerCertificate::from_der(vec![1, 2, 3])],
        };
        let ex = Exchange::builder(Method::GET, Uri::from_static("/"))
            .tls(&tls)
            .build(RecordingTransport::new());

        assert_eq!(ex.scheme(), "https");
        assert_eq!(
            ex.attribute::<String>(attributes::REQUEST_CIPHER_SUITE).map(String::as_str),
            Some("TLS_AES_256_GCM_SHA384")
        );
        assert_eq!(ex.attribute::<u32>(attributes::REQUEST_KEY_SIZE), Some(&256));
        assert_eq!(ex.attributes().peer_certificates().unwrap().len(), 1);
        assert!(ex.attribute::<String>("wsgate.unset").is_none());
        assert_eq!(ex.attribute_names().len(), 3);
    }
}
