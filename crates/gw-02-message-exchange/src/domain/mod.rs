//! Domain Layer - message model, codec, deduplication and timers.

pub mod codec;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod message;

pub use codec::{decode, encode, peek_header};
pub use config::{ExchangeConfig, MAX_ACK_TIMEOUT, MAX_RETRANSMIT_LIMIT};
pub use dedup::{DedupCache, DedupStatus};
pub use errors::{CodecError, DeliveryError};
pub use message::{content_format, option, Code, CoapOption, Message, MessageType, Method};
