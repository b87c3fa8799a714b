//! # Secure Session Subsystem
//!
//! Server side of a DTLS 1.2 style channel authenticated with pre-shared
//! keys (RFC 4279 PSK key exchange, RFC 6347 record layer).
//!
//! ## Architecture
//!
//! - **Domain Layer:** records, handshake codec, key schedule, cipher-suite
//!   allow-list, anti-replay window
//! - **Ports Layer:** [`SecureTransport`] (inbound), [`PskKeyStore`] and
//!   [`TimeSource`] (outbound)
//! - **Service Layer:** [`SessionEngine`], one mutex-guarded
//!   [`SecureSession`] per peer address in a concurrent table
//! - **Adapters Layer:** in-memory key store, system clock
//!
//! ## Security
//!
//! - Only plain-PSK suites are ever negotiated, whatever is configured
//! - Stateless cookie exchange before any per-peer state is allocated
//! - A failed handshake closes only that peer's session
//! - Replayed records are dropped; repeated decrypt failures close the session
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gw_01_secure_session::{
//!     EngineConfig, InMemoryPskStore, PskEntry, SessionEngine, SystemTimeSource,
//! };
//!
//! let store = InMemoryPskStore::with_entries([
//!     PskEntry::new("Client_identity", "secretPSK").unwrap(),
//! ])
//! .unwrap();
//! let engine = SessionEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(store),
//!     Arc::new(SystemTimeSource),
//! );
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

/// Test doubles and the client-role handshake driver.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{InMemoryPskStore, SystemTimeSource};
pub use domain::{
    AlertDescription, CipherSuite, CloseReason, DecodeError, EngineConfig, HandshakeError,
    KeyExchangeAlgorithm, KeyStoreError, PskCipherSuites, PskEntry, PskIdentity, SessionError,
    SessionId, SessionState, UnknownCipherSuite,
};
pub use ports::{Delivered, EngineOutput, PskKeyStore, SecureTransport, SessionEvent, TimeSource};
pub use service::{SecureSession, SessionEngine};
