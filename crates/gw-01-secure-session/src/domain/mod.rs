//! Domain Layer - DTLS PSK protocol logic with no I/O
//!
//! - Wire primitives, records and the anti-replay window
//! - Handshake message codec and key schedule
//! - Cipher-suite model with the PSK-only filter
//! - Session value objects and engine tuning

pub mod alert;
pub mod cipher_suite;
pub mod errors;
pub mod handshake;
pub mod keys;
pub mod psk;
pub mod record;
pub mod value_objects;
pub mod wire;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use cipher_suite::{CipherSuite, KeyExchangeAlgorithm, PskCipherSuites, UnknownCipherSuite};
pub use errors::{DecodeError, HandshakeError, KeyStoreError, SessionError};
pub use keys::Role;
pub use psk::{PskEntry, PskIdentity};
pub use record::{ContentType, ReplayWindow};
pub use value_objects::{CloseReason, EngineConfig, SessionId, SessionState};
