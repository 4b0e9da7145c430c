//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) and echo it on the response
//! - Turn an axum request into an [`Exchange`]
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A client-supplied `x-request-id` is kept
//! - The body is collected before the exchange is built; the size limit
//!   layer bounds it

use std::net::SocketAddr;

use axum::http::{request::Parts, HeaderName};
use bytes::Bytes;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

use crate::exchange::{Exchange, ResponseTransport};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

fn request_id_header() -> HeaderName {
    HeaderName::from_static(X_REQUEST_ID)
}

/// Layer assigning a request ID to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(request_id_header(), MakeRequestUuid)
}

/// Layer copying the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(request_id_header())
}

/// Access the request ID of a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl RequestIdExt for Parts {
    fn request_id(&self) -> Option<&str> {
        self.extensions
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
    }
}

/// Connection details the server knows about a request.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
}

/// Build the exchange for a request addressed to the endpoint at
/// `context_path`.
pub fn build_exchange(
    parts: Parts,
    body: Bytes,
    conn: ConnectionInfo,
    context_path: &str,
    drain_limit: usize,
    transport: impl ResponseTransport + 'static,
) -> Exchange {
    let mut builder = Exchange::builder(parts.method.clone(), parts.uri.clone())
        .version(parts.version)
        .addresses(conn.remote_addr, conn.local_addr)
        .context_path(context_path)
        .drain_limit(drain_limit)
        .body(body);
    if let Some(id) = parts.request_id() {
        builder = builder.attribute(X_REQUEST_ID, id.to_string());
    }
    builder.headers(parts.headers).build(transport)
}
