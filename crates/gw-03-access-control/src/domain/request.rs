//! Access requests as sent by devices, and the routing decision on them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::PayloadError;

/// Where the role attribute lives in the request payload.
pub const ROLE_POINTER: &str = "/UAT/RL";

/// The one role value that routes to the visitor authority.
pub const VISITOR_ROLE: &str = "Visitor";

/// Upstream sub-endpoint an access request is forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    #[default]
    Employee,
    Visitor,
}

impl Endpoint {
    /// Case-sensitive: only `"Visitor"` selects the visitor endpoint.
    pub fn for_role(role: &str) -> Self {
        if role == VISITOR_ROLE {
            Endpoint::Visitor
        } else {
            Endpoint::Employee
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Employee => "employee",
            Endpoint::Visitor => "visitor",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    pub role: String,
    /// Top-level members of the payload object.
    pub attributes: Map<String, Value>,
}

impl AccessRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        if payload.is_empty() {
            return Err(PayloadError::Empty);
        }
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| PayloadError::Json(e.to_string()))?;

        let role = match value.pointer(ROLE_POINTER) {
            Some(Value::String(role)) => role.clone(),
            Some(_) => return Err(PayloadError::RoleNotString),
            None if value.is_object() => return Err(PayloadError::MissingRole),
            None => return Err(PayloadError::NotAnObject),
        };
        match value {
            Value::Object(attributes) => Ok(Self { role, attributes }),
            _ => Err(PayloadError::NotAnObject),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::for_role(&self.role)
    }
}
