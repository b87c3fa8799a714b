use thiserror::Error;

/// Why a request payload could not be read as an access request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("role attribute is missing")]
    MissingRole,

    #[error("role attribute is not a string")]
    RoleNotString,
}

/// Failure talking to the upstream access authority.
///
/// Every variant is treated the same by the access control resource:
/// the device is denied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("upstream did not answer in time")]
    Timeout,

    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream answered with status {0}")]
    Status(u16),

    #[error("upstream verdict could not be decoded: {0}")]
    Decode(String),

    #[error("upstream transport error: {0}")]
    Transport(String),
}
