//! Handlers shipped with the host, referenced by name from configuration.
//!
//! | name | argument | effect |
//! |---|---|---|
//! | `logging` | - | logs every message, fault and close |
//! | `payload-limit` | max bytes | `Client` fault for larger inbound payloads |
//! | `require-https` | - | `Client` fault (403) unless the request came over TLS |
//! | `require-role` | role | `Client` fault (403) unless the principal has the role |

use std::sync::Arc;

use crate::handler::{Fault, Handler, HandlerError, MessageContext};
use crate::resolver::ChainRegistry;

use super::RequestInfo;

/// Register every built-in handler factory.
pub fn register_builtin_handlers(registry: &mut ChainRegistry) {
    registry.register("logging", |_| Ok(Arc::new(LoggingHandler) as Arc<dyn Handler>));
    registry.register("payload-limit", |arg| {
        let max = arg
            .ok_or("expected a byte count, e.g. payload-limit:65536")?
            .parse::<usize>()
            .map_err(|e| format!("invalid byte count: {e}"))?;
        Ok(Arc::new(PayloadLimitHandler::new(max)) as Arc<dyn Handler>)
    });
    registry.register("require-https", |_| {
        Ok(Arc::new(RequireHttpsHandler) as Arc<dyn Handler>)
    });
    registry.register("require-role", |arg| {
        let role = arg.filter(|r| !r.is_empty()).ok_or("expected a role, e.g. require-role:admin")?;
        Ok(Arc::new(RequireRoleHandler::new(role)) as Arc<dyn Handler>)
    });
}

fn exchange_id(ctx: &MessageContext) -> String {
    ctx.capability::<RequestInfo>()
        .map(|info| info.exchange_id.to_string())
        .unwrap_or_default()
}

/// Logs message traffic through the chain.
#[derive(Debug, Default)]
pub struct LoggingHandler;

impl Handler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    fn handle_message(&self, ctx: &mut MessageContext) -> Result<bool, HandlerError> {
        tracing::info!(
            exchange_id = %exchange_id(ctx),
            direction = if ctx.is_outbound() { "outbound" } else { "inbound" },
            payload_bytes = ctx.payload().len(),
            "Message"
        );
        Ok(true)
    }

    fn handle_fault(&self, ctx: &mut MessageContext) -> Result<bool, HandlerError> {
        if let Some(fault) = ctx.fault() {
            tracing::info!(exchange_id = %exchange_id(ctx), fault = %fault, "Fault");
        }
        Ok(true)
    }

    fn close(&self, ctx: &mut MessageContext) -> Result<(), HandlerError> {
        tracing::trace!(exchange_id = %exchange_id(ctx), "Closed");
        Ok(())
    }
}

/// Rejects inbound payloads above a size.
#[derive(Debug)]
pub struct PayloadLimitHandler {
    max_bytes: usize,
}

impl PayloadLimitHandler {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Handler for PayloadLimitHandler {
    fn name(&self) -> &str {
        "payload-limit"
    }

    fn handle_message(&self, ctx: &mut MessageContext) -> Result<bool, HandlerError> {
        let len = ctx.payload().len();
        if !ctx.is_outbound() && len > self.max_bytes {
            ctx.set_response_code(413);
            return Err(Fault::client("payload too large")
                .with_detail(format!("{len} bytes, limit {}", self.max_bytes))
                .into());
        }
        Ok(true)
    }
}

/// Only lets requests received over TLS through.
#[derive(Debug, Default)]
pub struct RequireHttpsHandler;

impl Handler for RequireHttpsHandler {
    fn name(&self) -> &str {
        "require-https"
    }

    fn handle_message(&self, ctx: &mut MessageContext) -> Result<bool, HandlerError> {
        if ctx.is_outbound() {
            return Ok(true);
        }
        let secure = ctx
            .capability::<RequestInfo>()
            .map(RequestInfo::is_secure)
            .unwrap_or(false);
        if !secure {
            ctx.set_response_code(403);
            return Err(Fault::client("secure transport required").into());
        }
        Ok(true)
    }
}

/// Only lets principals with a role through.
#[derive(Debug)]
pub struct RequireRoleHandler {
    role: String,
}

impl RequireRoleHandler {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl Handler for RequireRoleHandler {
    fn name(&self) -> &str {
        "require-role"
    }

    fn handle_message(&self, ctx: &mut MessageContext) -> Result<bool, HandlerError> {
        if ctx.is_outbound() {
            return Ok(true);
        }
        let allowed = ctx
            .capability::<RequestInfo>()
            .and_then(|info| info.principal.as_ref())
            .map(|p| p.has_role(&self.role))
            .unwrap_or(false);
        if !allowed {
            ctx.set_response_code(403);
            return Err(Fault::client(format!("role '{}' required", self.role)).into());
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{HandlerResolver, PortInfo, SOAP11_HTTP_BINDING};
    use crate::config::HandlerChainConfig;

    fn port() -> PortInfo {
        PortInfo::new(
            "{urn:t}Svc".parse().unwrap(),
            "{urn:t}Port".parse().unwrap(),
            SOAP11_HTTP_BINDING,
        )
    }

    fn resolve(handlers: &[&str]) -> Result<crate::handler::HandlerChain, crate::resolver::ResolveError> {
        let mut registry = ChainRegistry::new();
        register_builtin_handlers(&mut registry);
        registry.add_rules(&[HandlerChainConfig {
            name: "builtin".into(),
            service_name_pattern: None,
            port_name_pattern: None,
            protocol_bindings: vec![],
            handlers: handlers.iter().map(|h| h.to_string()).collect(),
        }])?;
        registry.handler_chain(&port())
    }

    #[test]
    fn builtins_resolve_by_name() {
        let chain = resolve(&["logging", "payload-limit:10", "require-role:admin"]).unwrap();
        assert_eq!(chain.names(), vec!["logging", "payload-limit", "require-role"]);
    }

    #[test]
    fn builtin_arguments_are_checked() {
        assert!(resolve(&["payload-limit"]).is_err());
        assert!(resolve(&["payload-limit:lots"]).is_err());
        assert!(resolve(&["require-role"]).is_err());
    }

    #[test]
    fn payload_limit_faults_large_inbound() {
        let handler = PayloadLimitHandler::new(4);
        let mut small = MessageContext::new("abcd");
        assert!(handler.handle_message(&mut small).unwrap());

        let mut large = MessageContext::new("abcde");
        let err = handler.handle_message(&mut large).unwrap_err();
        assert!(matches!(err, HandlerError::Protocol(ref f) if f.reason == "payload too large"));
        assert_eq!(large.response_code(), Some(413));

        large.set_outbound(true);
        assert!(handler.handle_message(&mut large).unwrap());
    }

    #[test]
    fn require_https_without_request_info_faults() {
        let mut ctx = MessageContext::new("x");
        assert!(RequireHttpsHandler.handle_message(&mut ctx).is_err());
        assert_eq!(ctx.response_code(), Some(403));
    }
}
