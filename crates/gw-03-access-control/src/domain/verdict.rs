use serde::{Deserialize, Serialize};

/// Body sent if a verdict cannot be serialized; a failure never grants.
const DENIED_BODY: &str = "{\n  \"granted\": false\n}";

/// The authority's decision for one access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessVerdict {
    pub granted: bool,
}

impl AccessVerdict {
    pub fn granted() -> Self {
        Self { granted: true }
    }

    /// Used for every local or upstream failure.
    pub fn denied() -> Self {
        Self { granted: false }
    }

    /// Human-readable JSON body sent back to the device.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| DENIED_BODY.to_string())
    }
}

/// What to do when the request payload cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPayloadPolicy {
    /// Route to the default endpoint and let the authority decide.
    #[default]
    Forward,
    /// Deny without contacting the authority.
    Deny,
}
