//! # Message Exchange Subsystem
//!
//! CoAP (RFC 7252) request/response layer carried inside a secure session.
//!
//! ## Architecture
//!
//! - **Domain Layer:** message model, binary codec, duplicate detection,
//!   transmission parameters
//! - **Ports Layer:** [`RequestHandler`] (resources), [`MessageSink`]
//!   (secure transport)
//! - **Service Layer:** [`MessageExchange`]
//!
//! ## Reliability
//!
//! - Confirmable requests are acknowledged piggy-backed, or with an empty
//!   ACK followed by a separate confirmable response when the handler is slow
//! - Duplicates within `EXCHANGE_LIFETIME` replay the first response and
//!   never reach the handler twice
//! - Outbound confirmable messages back off exponentially until ACK or RST

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    content_format, option, CoapOption, Code, CodecError, DedupCache, DedupStatus, DeliveryError,
    ExchangeConfig, Message, MessageType, Method, MAX_ACK_TIMEOUT, MAX_RETRANSMIT_LIMIT,
};
pub use ports::{MessageSink, RequestHandler};
pub use service::MessageExchange;
