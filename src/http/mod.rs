//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, route per endpoint)
//!     → request.rs (request ID, body collected, Exchange built)
//!     → Endpoint::serve on the blocking pool
//!     → response.rs (head + body streamed back through channels)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::{ChannelTransport, PendingResponse};
pub use server::{HttpServer, ServerError};
