//! Handler chain processing.
//!
//! # Responsibilities
//! - Walk handlers in pipeline order inbound and reverse order outbound
//! - Reverse direction when a handler blocks a request-response exchange
//! - Switch to fault processing on protocol faults
//! - Abort on runtime failures
//! - Close every entered handler exactly once, in reverse order of entry
//!
//! # Design Decisions
//! - The handler list is resolved once and shared as `Arc<[_]>`; invoking
//!   the chain never locks
//! - A handler counts as entered once a callback returned (with a result
//!   or a protocol fault); a callback that fails with a runtime error is not
//!   entered by that call
//! - Close failures are logged and reported in the outcome, never re-raised

use std::sync::Arc;

use super::{BoxError, Fault, Handler, HandlerContext, HandlerError, MessageContext};

/// Message exchange pattern of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePattern {
    /// A response message (or fault) goes back to the caller.
    RequestResponse,
    /// No response message; processing stops where it is blocked.
    OneWay,
}

/// What the runtime dispatches once the chain has run.
#[derive(Debug)]
pub enum Dispatch {
    /// The (possibly rewritten) message in the context.
    Message,
    /// A fault message.
    Fault(Fault),
    /// An unrecoverable failure.
    Failure(HandlerFailure),
    /// Nothing: a one-way exchange.
    Nothing,
}

/// An unrecoverable failure and where it came from.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: BoxError,
}

/// A `close` callback that failed.
#[derive(Debug)]
pub struct CloseFailure {
    pub handler: String,
    pub error: HandlerError,
}

/// Result of one chain invocation.
#[derive(Debug)]
pub struct ChainOutcome {
    pub dispatch: Dispatch,
    pub operation_invoked: bool,
    pub close_failures: Vec<CloseFailure>,
}

/// Ordered, immutable list of handlers for one endpoint.
pub struct HandlerChain<C: HandlerContext = MessageContext> {
    handlers: Arc<[Arc<dyn Handler<C>>]>,
}

impl<C: HandlerContext> Clone for HandlerChain<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<C: HandlerContext> Default for HandlerChain<C> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<C: HandlerContext> std::fmt::Debug for HandlerChain<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<C: HandlerContext> HandlerChain<C> {
    pub fn new(handlers: Vec<Arc<dyn Handler<C>>>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handlers(&self) -> &[Arc<dyn Handler<C>>] {
        &self.handlers
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run the chain around `operation` for one inbound message.
    ///
    /// The operation runs only if every inbound `handle_message` returned
    /// `true`. A runtime error from the operation is turned into a `Server`
    /// fault.
    pub fn invoke<F>(&self, ctx: &mut C, pattern: MessagePattern, operation: F) -> ChainOutcome
    where
        F: FnOnce(&mut C) -> Result<(), HandlerError>,
    {
        let n = self.handlers.len();
        let mut run = Invocation::new(&self.handlers);
        let mut operation_invoked = false;

        ctx.message_mut().set_outbound(false);
        let dispatch = match run.message_pass(ctx, 0..n) {
            Pass::Completed => {
                operation_invoked = true;
                match operation(ctx) {
                    Ok(()) if pattern == MessagePattern::OneWay => Dispatch::Nothing,
                    Ok(()) => {
                        ctx.message_mut().set_outbound(true);
                        let pass = run.message_pass(ctx, (0..n).rev());
                        run.after_reverse_pass(ctx, pass)
                    }
                    Err(err) => {
                        let fault = match err {
                            HandlerError::Protocol(fault) => fault,
                            HandlerError::Runtime(e) => {
                                tracing::warn!(error = %e, "Endpoint operation failed");
                                Fault::server(e.to_string())
                            }
                        };
                        ctx.message_mut().set_fault(Some(fault.clone()));
                        if pattern == MessagePattern::OneWay {
                            Dispatch::Fault(fault)
                        } else {
                            ctx.message_mut().set_outbound(true);
                            run.fault_walk(ctx, fault, (0..n).rev())
                        }
                    }
                }
            }
            Pass::Blocked(k) => {
                tracing::debug!(handler = run.name(k), "Handler blocked inbound processing");
                if pattern == MessagePattern::OneWay {
                    Dispatch::Nothing
                } else {
                    ctx.message_mut().set_outbound(true);
                    match ctx.message().fault().cloned() {
                        Some(fault) => run.fault_walk(ctx, fault, (0..k).rev()),
                        None => {
                            let pass = run.message_pass(ctx, (0..k).rev());
                            run.after_reverse_pass(ctx, pass)
                        }
                    }
                }
            }
            Pass::Protocol(k, fault) => {
                tracing::debug!(handler = run.name(k), fault = %fault, "Handler raised protocol fault");
                ctx.message_mut().set_fault(Some(fault.clone()));
                if pattern == MessagePattern::OneWay {
                    Dispatch::Fault(fault)
                } else {
                    ctx.message_mut().set_outbound(true);
                    run.fault_walk(ctx, fault, (0..k).rev())
                }
            }
            Pass::Runtime(k, error) => run.failure(k, error),
        };

        let close_failures = run.close_all(ctx);
        ChainOutcome {
            dispatch,
            operation_invoked,
            close_failures,
        }
    }
}

/// How a pass over some handlers ended.
enum Pass {
    Completed,
    Blocked(usize),
    Protocol(usize, Fault),
    Runtime(usize, BoxError),
}

/// Book-keeping for one chain invocation.
struct Invocation<'a, C: HandlerContext> {
    handlers: &'a [Arc<dyn Handler<C>>],
    entered: Vec<bool>,
    entry_order: Vec<usize>,
}

impl<'a, C: HandlerContext> Invocation<'a, C> {
    fn new(handlers: &'a [Arc<dyn Handler<C>>]) -> Self {
        Self {
            handlers,
            entered: vec![false; handlers.len()],
            entry_order: Vec::with_capacity(handlers.len()),
        }
    }

    fn name(&self, index: usize) -> &'a str {
        self.handlers[index].name()
    }

    fn mark_entered(&mut self, index: usize) {
        if !self.entered[index] {
            self.entered[index] = true;
            self.entry_order.push(index);
        }
    }

    fn record(&mut self, index: usize, result: Result<bool, HandlerError>) -> Option<Pass> {
        match result {
            Ok(true) => {
                self.mark_entered(index);
                None
            }
            Ok(false) => {
                self.mark_entered(index);
                Some(Pass::Blocked(index))
            }
            Err(HandlerError::Protocol(fault)) => {
                self.mark_entered(index);
                Some(Pass::Protocol(index, fault))
            }
            Err(HandlerError::Runtime(error)) => Some(Pass::Runtime(index, error)),
        }
    }

    fn message_pass(&mut self, ctx: &mut C, order: impl Iterator<Item = usize>) -> Pass {
        for i in order {
            let result = self.handlers[i].handle_message(ctx);
            if let Some(end) = self.record(i, result) {
                return end;
            }
        }
        Pass::Completed
    }

    fn fault_pass(&mut self, ctx: &mut C, order: impl Iterator<Item = usize>) -> Pass {
        for i in order {
            let result = self.handlers[i].handle_fault(ctx);
            if let Some(end) = self.record(i, result) {
                return end;
            }
        }
        Pass::Completed
    }

    /// Dispatch after a pass travelling back towards the caller.
    fn after_reverse_pass(&mut self, ctx: &mut C, pass: Pass) -> Dispatch {
        match pass {
            Pass::Completed | Pass::Blocked(_) => Dispatch::Message,
            Pass::Protocol(i, fault) => self.fault_walk(ctx, fault, (0..i).rev()),
            Pass::Runtime(i, error) => self.failure(i, error),
        }
    }

    /// Fault processing over `order`; the fault is dispatched however it ends.
    fn fault_walk(
        &mut self,
        ctx: &mut C,
        fault: Fault,
        order: impl Iterator<Item = usize>,
    ) -> Dispatch {
        ctx.message_mut().set_fault(Some(fault.clone()));
        match self.fault_pass(ctx, order) {
            Pass::Completed | Pass::Blocked(_) => {
                Dispatch::Fault(ctx.message().fault().cloned().unwrap_or(fault))
            }
            Pass::Protocol(_, replaced) => {
                ctx.message_mut().set_fault(Some(replaced.clone()));
                Dispatch::Fault(replaced)
            }
            Pass::Runtime(i, error) => self.failure(i, error),
        }
    }

    fn failure(&self, index: usize, error: BoxError) -> Dispatch {
        let handler = self.name(index).to_string();
        tracing::warn!(handler = %handler, error = %error, "Handler failed; aborting chain");
        Dispatch::Failure(HandlerFailure { handler, error })
    }

    fn close_all(&self, ctx: &mut C) -> Vec<CloseFailure> {
        let mut failures = Vec::new();
        for &i in self.entry_order.iter().rev() {
            if let Err(error) = self.handlers[i].close(ctx) {
                let handler = self.name(i).to_string();
                tracing::warn!(handler = %handler, error = %error, "Handler close failed");
                failures.push(CloseFailure { handler, error });
            }
        }
        failures
    }
}
