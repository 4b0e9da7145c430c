//! Endpoint features and service references.
//!
//! Features are read from configuration and exposed to handlers as context
//! extensions. Nothing here touches the wire format.

pub mod addressing;
pub mod mtom;
pub mod service_ref;

pub use addressing::{AddressingFeature, AddressingResponses};
pub use mtom::MtomFeature;
pub use service_ref::{ServiceRef, ServiceRefBuilder, ServiceRefError, ServiceRefRegistry};

/// A named, switchable endpoint feature.
pub trait WebServiceFeature {
    fn id(&self) -> &'static str;
    fn is_enabled(&self) -> bool;
}

/// The features configured for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub mtom: Option<MtomFeature>,
    pub addressing: Option<AddressingFeature>,
}

impl Features {
    /// Ids of the enabled features.
    pub fn enabled_ids(&self) -> Vec<&'static str> {
        let mut ids = Vec::new();
        if let Some(f) = self.mtom.filter(|f| f.is_enabled()) {
            ids.push(f.id());
        }
        if let Some(f) = self.addressing.filter(|f| f.is_enabled()) {
            ids.push(f.id());
        }
        ids
    }
}
