//! # Driven Ports (Outbound SPI)
//!
//! What the engine requires from its host.

use std::time::Instant;

use shared_crypto::SecretKey;

use crate::domain::KeyStoreError;

/// PSK identity → secret lookup.
///
/// # Thread Safety
///
/// Looked up concurrently by handshakes from many peers; implementations
/// must support concurrent reads.
pub trait PskKeyStore: Send + Sync {
    /// Secret for `identity`, or `KeyStoreError::NotFound`.
    fn lookup(&self, identity: &[u8]) -> Result<SecretKey, KeyStoreError>;
}

/// Monotonic clock, injectable for timeout tests.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}
