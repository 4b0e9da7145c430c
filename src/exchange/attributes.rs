//! Out-of-band exchange attributes set by the hosting environment.
//!
//! # Responsibilities
//! - Store named values of arbitrary type alongside an exchange
//! - Expose the well-known TLS attributes with typed accessors
//! - Carry the authenticated principal and its roles
//!
//! # Design Decisions
//! - Keys are namespaced strings; values are type-erased and queried by type
//! - Missing keys (or a type mismatch) yield `None`, never an error

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Cipher suite negotiated for an HTTPS request. Type: `String`.
pub const REQUEST_CIPHER_SUITE: &str = "wsgate.request.cipher_suite";

/// Bit size of the negotiated cipher algorithm. Type: `u32`.
pub const REQUEST_KEY_SIZE: &str = "wsgate.request.key_size";

/// Peer certificate chain. Type: `Vec<PeerCertificate>`.
///
/// Ascending order of trust: the client certificate comes first, followed by
/// the certificate that authenticated it, and so on.
pub const REQUEST_PEER_CERTIFICATES: &str = "wsgate.request.peer_certificates";

/// A DER-encoded peer certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate(Bytes);

impl PeerCertificate {
    pub fn from_der(der: impl Into<Bytes>) -> Self {
        Self(der.into())
    }

    pub fn der(&self) -> &[u8] {
        &self.0
    }
}

/// TLS session details reported by the listener for an HTTPS request.
#[derive(Debug, Clone, Default)]
pub struct TlsInfo {
    pub cipher_suite: String,
    pub key_size: u32,
    pub peer_certificates: Vec<PeerCertificate>,
}

/// String-keyed bag of type-erased values.
#[derive(Clone, Default)]
pub struct Attributes {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `name`, replacing any previous value.
    pub fn insert<T>(&mut self, name: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values.insert(name.into(), Arc::new(value));
    }

    /// Typed lookup. Returns `None` if the key is unset or holds another type.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    /// Untyped lookup.
    pub fn get_raw(&self, name: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.values.get(name).map(|v| v.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.values.remove(name).is_some()
    }

    /// All attribute names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Expose a TLS session through the well-known attribute keys.
    pub fn apply_tls(&mut self, tls: &TlsInfo) {
        self.insert(REQUEST_CIPHER_SUITE, tls.cipher_suite.clone());
        self.insert(REQUEST_KEY_SIZE, tls.key_size);
        if !tls.peer_certificates.is_empty() {
            self.insert(REQUEST_PEER_CERTIFICATES, tls.peer_certificates.clone());
        }
    }

    pub fn cipher_suite(&self) -> Option<&str> {
        self.get::<String>(REQUEST_CIPHER_SUITE).map(String::as_str)
    }

    pub fn key_size(&self) -> Option<u32> {
        self.get::<u32>(REQUEST_KEY_SIZE).copied()
    }

    pub fn peer_certificates(&self) -> Option<&[PeerCertificate]> {
        self.get::<Vec<PeerCertificate>>(REQUEST_PEER_CERTIFICATES)
            .map(Vec::as_slice)
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// The authenticated user behind an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
    roles: BTreeSet<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
