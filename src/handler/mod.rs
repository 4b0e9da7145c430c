//! Handler (interceptor) subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → handler 1 .. N   handle_message (pipeline order)
//!     → endpoint operation
//!     → handler N .. 1   handle_message (reverse order)
//!     → close N .. 1     (reverse order of entry)
//!
//! on protocol fault at handler k:
//!     → handler k-1 .. 1 handle_fault
//! ```
//!
//! # Design Decisions
//! - Handlers are shared by every exchange of an endpoint, so callbacks take `&self`
//! - Returning `false` is a policy signal, not an error
//! - Protocol faults are recoverable and switch to fault processing;
//!   runtime failures abort the chain outright

pub mod chain;
pub mod context;
pub mod fault;

pub use chain::{ChainOutcome, CloseFailure, Dispatch, HandlerChain, HandlerFailure, MessagePattern};
pub use context::{HandlerContext, MessageContext, Scope};
pub use fault::{Fault, FaultCode};

use thiserror::Error;

/// Boxed error type for unrecoverable failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised from a handler callback or an endpoint operation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Recoverable message-level fault; switches the chain to fault processing.
    #[error("protocol fault: {0}")]
    Protocol(Fault),

    /// Unrecoverable failure; aborts the chain.
    #[error("runtime failure: {0}")]
    Runtime(#[source] BoxError),
}

impl HandlerError {
    pub fn runtime(err: impl Into<BoxError>) -> Self {
        HandlerError::Runtime(err.into())
    }
}

impl From<Fault> for HandlerError {
    fn from(fault: Fault) -> Self {
        HandlerError::Protocol(fault)
    }
}

/// An interceptor invoked around message processing.
///
/// `C` is the context kind the handler understands. A handler instance lives
/// as long as the endpoint that resolved it and is called concurrently for
/// different exchanges.
pub trait Handler<C: HandlerContext = MessageContext>: Send + Sync {
    /// Name used in logs and close-failure reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Normal processing. `Ok(false)` blocks further processing.
    fn handle_message(&self, ctx: &mut C) -> Result<bool, HandlerError>;

    /// Fault processing. `Ok(false)` stops fault propagation.
    fn handle_fault(&self, _ctx: &mut C) -> Result<bool, HandlerError> {
        Ok(true)
    }

    /// Called once after the exchange concludes, for every entered handler.
    fn close(&self, _ctx: &mut C) -> Result<(), HandlerError> {
        Ok(())
    }
}
