//! # Pre-Shared Keys
//!
//! Identity/secret pairs and the RFC 4279 premaster secret.

use std::fmt;

use shared_crypto::SecretKey;

use super::errors::KeyStoreError;

/// Longest identity accepted from configuration or the wire.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Longest secret accepted (RFC 4279 recommends supporting 64 bytes).
pub const MAX_SECRET_LEN: usize = 64;

/// PSK identity as sent in ClientKeyExchange.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PskIdentity(Vec<u8>);

impl PskIdentity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyStoreError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(KeyStoreError::Invalid("empty identity"));
        }
        if bytes.len() > MAX_IDENTITY_LEN {
            return Err(KeyStoreError::Invalid("identity too long"));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PskIdentity({})", self)
    }
}

impl fmt::Display for PskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// One provisioned credential. Immutable once created.
#[derive(Debug, Clone)]
pub struct PskEntry {
    identity: PskIdentity,
    secret: SecretKey,
}

impl PskEntry {
    pub fn new(identity: impl Into<Vec<u8>>, secret: impl Into<Vec<u8>>) -> Result<Self, KeyStoreError> {
        let identity = PskIdentity::new(identity)?;
        let secret = secret.into();
        if secret.is_empty() || secret.len() > MAX_SECRET_LEN {
            return Err(KeyStoreError::Invalid("secret length"));
        }
        Ok(Self {
            identity,
            secret: SecretKey::from_bytes(secret),
        })
    }

    pub fn identity(&self) -> &PskIdentity {
        &self.identity
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

/// `uint16 N || N zero bytes || uint16 N || psk` (RFC 4279 §2).
pub fn premaster_secret(psk: &[u8]) -> SecretKey {
    let n = psk.len();
    let mut out = Vec::with_capacity(4 + 2 * n);
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.resize(2 + n, 0);
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.extend_from_slice(psk);
    SecretKey::from_bytes(out)
}
