//! Message contexts handed to handlers.
//!
//! # Design Decisions
//! - `MessageContext` carries everything the chain itself needs: direction,
//!   payload, scoped properties, the current fault
//! - Richer context kinds compose a `MessageContext` and implement
//!   [`HandlerContext`]; there is no context hierarchy
//! - Optional capabilities (HTTP request info, enabled features, server
//!   specific state) are type-keyed extensions queried with `capability`

use std::collections::HashMap;

use axum::http::{Extensions, HeaderMap};
use bytes::Bytes;
use serde_json::Value;

use super::Fault;

/// Standard property: HTTP request method of the inbound request.
pub const HTTP_REQUEST_METHOD: &str = "wsgate.http.request_method";
/// Standard property: request path below the endpoint path.
pub const PATH_INFO: &str = "wsgate.http.path_info";
/// Standard property: raw query string, if any.
pub const QUERY_STRING: &str = "wsgate.http.query_string";
/// Standard property: qualified service name of the endpoint.
pub const WSDL_SERVICE: &str = "wsgate.wsdl.service";
/// Standard property: qualified port name of the endpoint.
pub const WSDL_PORT: &str = "wsgate.wsdl.port";

/// Visibility of a context property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Visible to handlers and to the endpoint operation.
    Application,
    /// Visible to handlers only.
    Handler,
}

/// Per-message state shared by the handlers of one chain invocation.
#[derive(Debug, Default)]
pub struct MessageContext {
    outbound: bool,
    payload: Bytes,
    properties: HashMap<String, (Scope, Value)>,
    fault: Option<Fault>,
    response_code: Option<u16>,
    response_headers: HeaderMap,
    extensions: Extensions,
}

impl MessageContext {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// True while the message travels away from the endpoint.
    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn set_outbound(&mut self, outbound: bool) {
        self.outbound = outbound;
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).map(|(_, v)| v)
    }

    /// Set a property. New properties get `Handler` scope; an existing
    /// property keeps its scope.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.properties.get_mut(&name) {
            Some(entry) => entry.1 = value,
            None => {
                self.properties.insert(name, (Scope::Handler, value));
            }
        }
    }

    /// Set a property with an explicit scope.
    pub fn set_scoped_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        scope: Scope,
    ) {
        self.properties.insert(name.into(), (scope, value.into()));
    }

    pub fn scope(&self, name: &str) -> Option<Scope> {
        self.properties.get(name).map(|(s, _)| *s)
    }

    /// Change the scope of an existing property. Returns false if unset.
    pub fn set_scope(&mut self, name: &str, scope: Scope) -> bool {
        match self.properties.get_mut(name) {
            Some(entry) => {
                entry.0 = scope;
                true
            }
            None => false,
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name).map(|(_, v)| v)
    }

    /// Properties visible to the endpoint operation.
    pub fn application_properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties
            .iter()
            .filter(|(_, (scope, _))| *scope == Scope::Application)
            .map(|(k, (_, v))| (k.as_str(), v))
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn set_fault(&mut self, fault: Option<Fault>) {
        self.fault = fault;
    }

    /// HTTP status requested for the response, overriding the default.
    pub fn response_code(&self) -> Option<u16> {
        self.response_code
    }

    pub fn set_response_code(&mut self, code: u16) {
        self.response_code = Some(code);
    }

    /// Extra headers to put on the HTTP response.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// Query an optional capability attached to this context.
    pub fn capability<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// A context kind a handler chain can run over.
///
/// Implemented by `MessageContext` itself and by any richer context that
/// embeds one.
pub trait HandlerContext: Send + 'static {
    fn message(&self) -> &MessageContext;
    fn message_mut(&mut self) -> &mut MessageContext;
}

impl HandlerContext for MessageContext {
    fn message(&self) -> &MessageContext {
        self
    }

    fn message_mut(&mut self) -> &mut MessageContext {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_default_to_handler_scope() {
        let mut ctx = MessageContext::new("payload");
        ctx.set_property("audit.user", "alice");
        assert_eq!(ctx.scope("audit.user"), Some(Scope::Handler));
        assert_eq!(ctx.application_properties().count(), 0);

        assert!(ctx.set_scope("audit.user", Scope::Application));
        ctx.set_property("audit.user", "bob");
        assert_eq!(ctx.scope("audit.user"), Some(Scope::Application));
        let visible: Vec<_> = ctx.application_properties().collect();
        assert_eq!(visible, vec![("audit.user", &json!("bob"))]);

        assert!(!ctx.set_scope("missing", Scope::Application));
        assert_eq!(ctx.remove_property("audit.user"), Some(json!("bob")));
        assert!(ctx.property("audit.user").is_none());
    }

    #[test]
    fn capabilities_are_type_keyed() {
        #[derive(Debug, Clone, PartialEq)]
        struct Tenant(&'static str);

        let mut ctx = MessageContext::default();
        assert!(ctx.capability::<Tenant>().is_none());
        ctx.extensions_mut().insert(Tenant("acme"));
        assert_eq!(ctx.capability::<Tenant>(), Some(&Tenant("acme")));
    }
}
