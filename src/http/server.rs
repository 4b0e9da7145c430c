//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with one route per endpoint plus `/health`
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Bind server to listener
//! - Run each exchange on the blocking pool and stream its response

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::WsgateConfig;
use crate::endpoint::{Endpoint, EndpointBuilder, Operation};
use crate::features::{ServiceRefError, ServiceRefRegistry};
use crate::http::request::{
    build_exchange, propagate_request_id_layer, set_request_id_layer, ConnectionInfo,
};
use crate::http::response;
use crate::lifecycle::shutdown;
use crate::resolver::{HandlerResolver, ResolveError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("endpoint setup failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("service reference setup failed: {0}")]
    ServiceRef(#[from] ServiceRefError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub endpoints: Arc<[Arc<Endpoint>]>,
    pub local_addr: SocketAddr,
    pub drain_limit: usize,
    pub max_body_size: usize,
}

/// HTTP host for a set of endpoints.
pub struct HttpServer {
    config: WsgateConfig,
    endpoints: Arc<[Arc<Endpoint>]>,
}

impl HttpServer {
    /// Create a server for already built endpoints.
    pub fn new(config: WsgateConfig, endpoints: Vec<Endpoint>) -> Self {
        Self {
            config,
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build every configured endpoint with `operation`, resolving chains
    /// through `resolver`.
    pub fn from_config(
        config: WsgateConfig,
        resolver: &dyn HandlerResolver,
        operation: Arc<dyn Operation>,
    ) -> Result<Self, ServerError> {
        let service_refs = ServiceRefRegistry::from_config(&config.service_refs)?;
        let endpoints = config
            .endpoints
            .iter()
            .map(|ep| {
                EndpointBuilder::from_config(ep)?
                    .shared_operation(Arc::clone(&operation))
                    .service_refs(service_refs.clone())
                    .chunk_threshold(config.exchange.chunk_threshold_bytes)
                    .build(resolver)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(config, endpoints))
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self, local_addr: SocketAddr) -> Router {
        let state = AppState {
            endpoints: Arc::clone(&self.endpoints),
            local_addr,
            drain_limit: self.config.exchange.drain_limit_bytes,
            max_body_size: self.config.listener.max_body_size,
        };

        let mut router = Router::new().route("/health", get(health_handler));
        for endpoint in self.endpoints.iter() {
            let handler = {
                let endpoint = Arc::clone(endpoint);
                move |State(state): State<AppState>,
                      ConnectInfo(remote): ConnectInfo<SocketAddr>,
                      request: Request<Body>| {
                    serve_endpoint(state, Arc::clone(&endpoint), remote, request)
                }
            };
            let base = endpoint.path().trim_end_matches('/');
            if base.is_empty() {
                router = router.fallback(handler);
            } else {
                router = router
                    .route(base, any(handler.clone()))
                    .route(&format!("{base}/{{*rest}}"), any(handler));
            }
        }

        // Outermost first: the request id exists before tracing starts.
        let middleware = ServiceBuilder::new()
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.timeouts.request_secs,
            )))
            .map_response(IntoResponse::into_response)
            .layer(RequestBodyLimitLayer::new(self.config.listener.max_body_size));

        router.with_state(state).layer(middleware)
    }

    /// Run the server until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            endpoints = self.endpoints.len(),
            "HTTP server starting"
        );

        let app = self
            .build_router(addr)
            .into_make_service_with_connect_info::<SocketAddr>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "endpoints": state.endpoints.iter().map(|e| e.path()).collect::<Vec<_>>(),
    }))
}

/// Turn one request into an exchange and serve it on the blocking pool.
async fn serve_endpoint(
    state: AppState,
    endpoint: Arc<Endpoint>,
    remote: SocketAddr,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let (transport, pending) = response::channel();
    let conn = ConnectionInfo {
        remote_addr: remote,
        local_addr: state.local_addr,
    };
    let exchange = build_exchange(
        parts,
        body,
        conn,
        endpoint.path(),
        state.drain_limit,
        transport,
    );

    let task = tokio::task::spawn_blocking(move || endpoint.serve(exchange));
    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Endpoint task panicked");
        }
    });

    pending.into_response().await
}
