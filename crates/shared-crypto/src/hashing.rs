//! # Hashing
//!
//! SHA-2 transcript hashing and HMAC helpers used by the handshake.
//!
//! The handshake transcript is hashed with the suite's PRF hash, so the
//! hasher is an enum over SHA-256 and SHA-384 rather than a generic.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384};
use subtle::ConstantTimeEq;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Hash function used by a cipher suite's PRF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrfHash {
    /// SHA-256 (all suites except the AES-256-GCM one)
    Sha256,
    /// SHA-384
    Sha384,
}

impl PrfHash {
    /// Digest output length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            PrfHash::Sha256 => 32,
            PrfHash::Sha384 => 48,
        }
    }
}

/// Running hash over handshake messages.
#[derive(Clone)]
pub enum TranscriptHasher {
    /// SHA-256 transcript
    Sha256(Sha256),
    /// SHA-384 transcript
    Sha384(Sha384),
}

impl TranscriptHasher {
    /// Create a transcript hasher for the given PRF hash.
    pub fn new(hash: PrfHash) -> Self {
        match hash {
            PrfHash::Sha256 => TranscriptHasher::Sha256(Sha256::new()),
            PrfHash::Sha384 => TranscriptHasher::Sha384(Sha384::new()),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        match self {
            TranscriptHasher::Sha256(h) => h.update(data),
            TranscriptHasher::Sha384(h) => h.update(data),
        }
        self
    }

    /// Hash of everything fed so far. The hasher stays usable.
    pub fn current(&self) -> Vec<u8> {
        match self {
            TranscriptHasher::Sha256(h) => h.clone().finalize().to_vec(),
            TranscriptHasher::Sha384(h) => h.clone().finalize().to_vec(),
        }
    }
}

/// HMAC-SHA256 (one-shot) over multiple inputs.
pub fn hmac_sha256(key: &[u8], inputs: &[&[u8]]) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    for input in inputs {
        mac.update(input);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time byte comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
