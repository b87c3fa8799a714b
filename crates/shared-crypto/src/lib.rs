//! # Shared Crypto - Record-Layer Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | AES-GCM, ChaCha20-Poly1305 | DTLS record protection |
//! | `prf` | TLS 1.2 PRF (HMAC-SHA256/384) | Master secret, key block, Finished |
//! | `hashing` | SHA-256/384, HMAC-SHA256 | Handshake transcript, cookies |
//!
//! ## Security Properties
//!
//! - Key material is zeroized on drop (`SecretKey`)
//! - MAC/verify_data comparisons are constant-time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod prf;
pub mod symmetric;

// Re-exports
pub use errors::CryptoError;
pub use hashing::{constant_time_eq, hmac_sha256, PrfHash, TranscriptHasher};
pub use prf::prf;
pub use symmetric::{AeadAlgorithm, RecordCipher, SecretKey, TAG_LEN};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
