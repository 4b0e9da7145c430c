use serde::{Deserialize, Serialize};

use super::WebServiceFeature;

/// Optimized binary transmission for an endpoint.
///
/// Payloads smaller than `threshold` bytes are sent inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MtomFeature {
    pub enabled: bool,
    pub threshold: u32,
}

impl MtomFeature {
    pub const ID: &'static str = "http://www.w3.org/2004/08/soap/features/http-optimization";

    pub fn new(enabled: bool, threshold: u32) -> Self {
        Self { enabled, threshold }
    }

    /// Whether a payload of `len` bytes should be sent as an attachment.
    pub fn applies_to(&self, len: usize) -> bool {
        self.enabled && len >= self.threshold as usize
    }
}

impl Default for MtomFeature {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0,
        }
    }
}

impl WebServiceFeature for MtomFeature {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
