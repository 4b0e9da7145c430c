//! Port identity used as the chain resolution key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ResolveError;

/// SOAP 1.1 over HTTP.
pub const SOAP11_HTTP_BINDING: &str = "http://schemas.xmlsoap.org/wsdl/soap/http";
/// SOAP 1.2 over HTTP.
pub const SOAP12_HTTP_BINDING: &str = "http://www.w3.org/2003/05/soap/bindings/HTTP/";
/// Plain XML over HTTP.
pub const XML_HTTP_BINDING: &str = "http://www.w3.org/2004/08/wsdl/http";

/// Expand a binding token (`##SOAP11_HTTP`, ...) or accept a known binding URI.
pub fn binding_id(token: &str) -> Option<&'static str> {
    match token {
        "##SOAP11_HTTP" | SOAP11_HTTP_BINDING => Some(SOAP11_HTTP_BINDING),
        "##SOAP12_HTTP" | SOAP12_HTTP_BINDING => Some(SOAP12_HTTP_BINDING),
        "##XML_HTTP" | XML_HTTP_BINDING => Some(XML_HTTP_BINDING),
        _ => None,
    }
}

/// Namespace-qualified name, written `{namespace}local`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QName {
    namespace: String,
    local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_part(&self) -> &str {
        &self.local
    }
}

impl FromStr for QName {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ResolveError::InvalidName(s.to_string());
        let (namespace, local) = match s.strip_prefix('{') {
            Some(rest) => rest.split_once('}').ok_or_else(invalid)?,
            None => ("", s),
        };
        if local.is_empty() || local.contains(['{', '}']) {
            return Err(invalid());
        }
        Ok(QName::new(namespace, local))
    }
}

impl TryFrom<String> for QName {
    type Error = ResolveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<QName> for String {
    fn from(name: QName) -> Self {
        name.to_string()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// The port a handler chain is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortInfo {
    pub service_name: QName,
    pub port_name: QName,
    pub binding_id: String,
}

impl PortInfo {
    pub fn new(service_name: QName, port_name: QName, binding_id: impl Into<String>) -> Self {
        Self {
            service_name,
            port_name,
            binding_id: binding_id.into(),
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.service_name, self.port_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_and_bare_names() {
        let q: QName = "{urn:stock}QuoteService".parse().unwrap();
        assert_eq!(q.namespace(), "urn:stock");
        assert_eq!(q.local_part(), "QuoteService");
        assert_eq!(q.to_string(), "{urn:stock}QuoteService");

        let bare: QName = "Echo".parse().unwrap();
        assert_eq!(bare.namespace(), "");
        assert_eq!(bare.to_string(), "Echo");
    }

    #[test]
    fn rejects_malformed_names() {
        assert!("{urn:stock".parse::<QName>().is_err());
        assert!("{urn:stock}".parse::<QName>().is_err());
        assert!("".parse::<QName>().is_err());
        assert!("a}b".parse::<QName>().is_err());
    }

    #[test]
    fn binding_tokens_expand() {
        assert_eq!(binding_id("##SOAP11_HTTP"), Some(SOAP11_HTTP_BINDING));
        assert_eq!(binding_id(SOAP12_HTTP_BINDING), Some(SOAP12_HTTP_BINDING));
        assert_eq!(binding_id("##CORBA"), None);
    }
}
