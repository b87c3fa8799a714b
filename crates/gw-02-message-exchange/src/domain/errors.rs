//! Message layer errors.

use thiserror::Error;

/// Message format errors (RFC 7252 §3). A confirmable message that fails
/// to decode is answered with Reset; anything else is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("message too short: {0} bytes")]
    TooShort(usize),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid token length {0}")]
    InvalidTokenLength(usize),
    #[error("reserved code {0:#04x}")]
    ReservedCode(u8),
    #[error("empty message carries token, options or payload")]
    EmptyMessageNotEmpty,
    #[error("payload marker followed by empty payload")]
    EmptyPayloadAfterMarker,
    #[error("reserved option nibble 15")]
    ReservedOptionNibble,
    #[error("option number overflow")]
    OptionNumberOverflow,
    #[error("option {0} value too long")]
    OptionTooLong(u16),
    #[error("truncated {0}")]
    Truncated(&'static str),
}

/// A confirmable send that never got confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("no acknowledgement after {attempts} transmissions")]
    Timeout { attempts: u32 },
    #[error("peer rejected the message with Reset")]
    Reset,
    #[error("secure session closed")]
    SessionClosed,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("message could not be encoded: {0}")]
    Encode(#[from] CodecError),
}
