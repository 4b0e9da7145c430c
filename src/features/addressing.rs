use serde::{Deserialize, Serialize};

use super::WebServiceFeature;

/// Which reply addresses an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingResponses {
    /// Anonymous and non-anonymous reply addresses.
    #[default]
    All,
    /// Only the anonymous reply address (responses on the same connection).
    Anonymous,
    /// Only non-anonymous reply addresses.
    NonAnonymous,
}

/// Message addressing for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingFeature {
    pub enabled: bool,
    /// Messages without addressing headers are rejected.
    pub required: bool,
    pub responses: AddressingResponses,
}

impl AddressingFeature {
    pub const ID: &'static str = "http://www.w3.org/2005/08/addressing/module";

    /// Whether a reply to `reply_to` is acceptable. `None` is the anonymous
    /// address.
    pub fn accepts_reply_to(&self, reply_to: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        let anonymous = reply_to.map(is_anonymous).unwrap_or(true);
        match self.responses {
            AddressingResponses::All => true,
            AddressingResponses::Anonymous => anonymous,
            AddressingResponses::NonAnonymous => !anonymous,
        }
    }
}

impl Default for AddressingFeature {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            responses: AddressingResponses::All,
        }
    }
}

impl WebServiceFeature for AddressingFeature {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

const ANONYMOUS: &str = "http://www.w3.org/2005/08/addressing/anonymous";

fn is_anonymous(address: &str) -> bool {
    address == ANONYMOUS
}
