//! Endpoint operations.

use crate::handler::{HandlerError, MessageContext};

/// The application logic behind an endpoint.
///
/// Runs after every inbound handler let the message through. The response
/// is whatever payload the context holds when the operation returns.
pub trait Operation: Send + Sync {
    fn invoke(&self, ctx: &mut MessageContext) -> Result<(), HandlerError>;
}

impl<F> Operation for F
where
    F: Fn(&mut MessageContext) -> Result<(), HandlerError> + Send + Sync,
{
    fn invoke(&self, ctx: &mut MessageContext) -> Result<(), HandlerError> {
        self(ctx)
    }
}

/// Returns the request payload unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Operation for Echo {
    fn invoke(&self, _ctx: &mut MessageContext) -> Result<(), HandlerError> {
        Ok(())
    }
}
