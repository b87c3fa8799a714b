//! # Record Protection
//!
//! AEAD ciphers for DTLS 1.2 application records: AES-128-GCM, AES-256-GCM
//! (RFC 5288) and ChaCha20-Poly1305 (RFC 7905).
//!
//! ## Nonce Construction
//!
//! - **GCM**: `nonce = implicit_iv(4) || explicit(8)`, the explicit part is
//!   the record's `epoch || sequence` and travels in front of the ciphertext.
//! - **ChaCha20-Poly1305**: `nonce = iv(12) XOR (0^4 || epoch || sequence)`,
//!   nothing is sent on the wire.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305,
};
use zeroize::Zeroize;

use crate::CryptoError;

/// AEAD tag length for every supported algorithm.
pub const TAG_LEN: usize = 16;

/// Variable-length secret bytes, wiped on drop.
#[derive(Clone, Zeroize, PartialEq, Eq)]
#[zeroize(drop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Generate `len` random bytes.
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no key material is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([REDACTED; {}])", self.0.len())
    }
}

/// Bulk cipher selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AeadAlgorithm {
    /// AES-128-GCM
    Aes128Gcm,
    /// AES-256-GCM
    Aes256Gcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    /// Write key length.
    pub fn key_len(self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm => 16,
            AeadAlgorithm::Aes256Gcm | AeadAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    /// Implicit (fixed) IV length taken from the key block.
    pub fn fixed_iv_len(self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm | AeadAlgorithm::Aes256Gcm => 4,
            AeadAlgorithm::ChaCha20Poly1305 => 12,
        }
    }

    /// Explicit nonce bytes carried in each record.
    pub fn explicit_nonce_len(self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm | AeadAlgorithm::Aes256Gcm => 8,
            AeadAlgorithm::ChaCha20Poly1305 => 0,
        }
    }

    /// Bytes added to a plaintext fragment by sealing.
    pub fn overhead(self) -> usize {
        self.explicit_nonce_len() + TAG_LEN
    }
}

enum CipherImpl {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

/// One direction of record protection (a write key + IV).
pub struct RecordCipher {
    algorithm: AeadAlgorithm,
    cipher: CipherImpl,
    iv: SecretKey,
}

impl RecordCipher {
    /// Create a cipher from key block material.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeyLength` / `InvalidIvLength` on size mismatch.
    pub fn new(algorithm: AeadAlgorithm, key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != algorithm.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: algorithm.key_len(),
                actual: key.len(),
            });
        }
        if iv.len() != algorithm.fixed_iv_len() {
            return Err(CryptoError::InvalidIvLength {
                expected: algorithm.fixed_iv_len(),
                actual: iv.len(),
            });
        }

        let bad_key = |_| CryptoError::InvalidKeyLength {
            expected: algorithm.key_len(),
            actual: key.len(),
        };
        let cipher = match algorithm {
            AeadAlgorithm::Aes128Gcm => {
                CipherImpl::Aes128(Box::new(Aes128Gcm::new_from_slice(key).map_err(bad_key)?))
            }
            AeadAlgorithm::Aes256Gcm => {
                CipherImpl::Aes256(Box::new(Aes256Gcm::new_from_slice(key).map_err(bad_key)?))
            }
            AeadAlgorithm::ChaCha20Poly1305 => CipherImpl::ChaCha(Box::new(
                ChaCha20Poly1305::new_from_slice(key).map_err(bad_key)?,
            )),
        };

        Ok(Self {
            algorithm,
            cipher,
            iv: SecretKey::from_bytes(iv),
        })
    }

    /// The bulk algorithm.
    pub fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    fn nonce(&self, epoch_seq: u64, explicit: Option<&[u8]>) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        match self.algorithm {
            AeadAlgorithm::Aes128Gcm | AeadAlgorithm::Aes256Gcm => {
                nonce[..4].copy_from_slice(self.iv.as_bytes());
                match explicit {
                    Some(e) => nonce[4..].copy_from_slice(e),
                    None => nonce[4..].copy_from_slice(&epoch_seq.to_be_bytes()),
                }
            }
            AeadAlgorithm::ChaCha20Poly1305 => {
                nonce.copy_from_slice(self.iv.as_bytes());
                for (n, s) in nonce[4..].iter_mut().zip(epoch_seq.to_be_bytes()) {
                    *n ^= s;
                }
            }
        }
        nonce
    }

    /// Seal a record fragment.
    ///
    /// `epoch_seq` is `epoch << 48 | sequence_number`. For GCM the returned
    /// fragment starts with the 8-byte explicit nonce.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the AEAD rejects the input.
    pub fn seal(&self, epoch_seq: u64, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.nonce(epoch_seq, None);
        let payload = Payload { msg: plaintext, aad };
        let nonce = GenericArray::from_slice(&nonce);

        let sealed = match &self.cipher {
            CipherImpl::Aes128(c) => c.encrypt(nonce, payload),
            CipherImpl::Aes256(c) => c.encrypt(nonce, payload),
            CipherImpl::ChaCha(c) => c.encrypt(nonce, payload),
        }
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(self.algorithm.explicit_nonce_len() + sealed.len());
        if self.algorithm.explicit_nonce_len() > 0 {
            out.extend_from_slice(&epoch_seq.to_be_bytes());
        }
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open a record fragment produced by [`RecordCipher::seal`].
    ///
    /// # Errors
    ///
    /// Returns `CiphertextTooShort` if the fragment cannot hold nonce + tag,
    /// and `DecryptionFailed` on any authentication failure.
    pub fn open(&self, epoch_seq: u64, aad: &[u8], fragment: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if fragment.len() < self.algorithm.overhead() {
            return Err(CryptoError::CiphertextTooShort(fragment.len()));
        }

        let explicit_len = self.algorithm.explicit_nonce_len();
        let (explicit, ciphertext) = fragment.split_at(explicit_len);
        let explicit = (explicit_len > 0).then_some(explicit);

        let nonce = self.nonce(epoch_seq, explicit);
        let payload = Payload { msg: ciphertext, aad };
        let nonce = GenericArray::from_slice(&nonce);

        match &self.cipher {
            CipherImpl::Aes128(c) => c.decrypt(nonce, payload),
            CipherImpl::Aes256(c) => c.decrypt(nonce, payload),
            CipherImpl::ChaCha(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCipher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(alg: AeadAlgorithm) -> RecordCipher {
        let key = SecretKey::generate(alg.key_len());
        let iv = SecretKey::generate(alg.fixed_iv_len());
        RecordCipher::new(alg, key.as_bytes(), iv.as_bytes()).unwrap()
    }

    const ALL: [AeadAlgorithm; 3] = [
        AeadAlgorithm::Aes128Gcm,
        AeadAlgorithm::Aes256Gcm,
        AeadAlgorithm::ChaCha20Poly1305,
    ];

    #[test]
    fn test_seal_open_each_algorithm() {
        for alg in ALL {
            let c = cipher(alg);
            let sealed = c.seal(1 << 48 | 7, b"aad", b"Hello, gateway!").unwrap();
            assert_eq!(sealed.len(), 15 + alg.overhead());
            let opened = c.open(1 << 48 | 7, b"aad", &sealed).unwrap();
            assert_eq!(opened, b"Hello, gateway!");
        }
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        for alg in ALL {
            let c = cipher(alg);
            let mut sealed = c.seal(3, b"aad", b"secret").unwrap();
            let last = sealed.len() - 1;
            sealed[last] ^= 0xFF;
            assert_eq!(c.open(3, b"aad", &sealed), Err(CryptoError::DecryptionFailed));
        }
    }

    #[test]
    fn test_wrong_aad_fails() {
        let c = cipher(AeadAlgorithm::Aes128Gcm);
        let sealed = c.seal(3, b"aad-1", b"secret").unwrap();
        assert!(c.open(3, b"aad-2", &sealed).is_err());
    }

    #[test]
    fn test_chacha_sequence_is_bound() {
        let c = cipher(AeadAlgorithm::ChaCha20Poly1305);
        let sealed = c.seal(5, b"", b"secret").unwrap();
        assert!(c.open(6, b"", &sealed).is_err());
    }

    #[test]
    fn test_short_fragment_rejected() {
        let c = cipher(AeadAlgorithm::Aes256Gcm);
        assert_eq!(
            c.open(0, b"", &[0u8; 10]),
            Err(CryptoError::CiphertextTooShort(10))
        );
    }

    #[test]
    fn test_bad_key_length_rejected() {
        let err = RecordCipher::new(AeadAlgorithm::Aes128Gcm, &[0u8; 32], &[0u8; 4]).unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 16,
                actual: 32
            }
        );
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let key = SecretKey::from_bytes(b"secretPSK".to_vec());
        assert!(!format!("{:?}", key).contains("secret"));
    }
}
