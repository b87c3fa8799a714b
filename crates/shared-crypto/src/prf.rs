//! # TLS 1.2 PRF
//!
//! `PRF(secret, label, seed) = P_hash(secret, label || seed)` (RFC 5246 §5).
//!
//! ```text
//! A(0) = label || seed
//! A(i) = HMAC(secret, A(i-1))
//! P_hash = HMAC(secret, A(1) || label || seed) || HMAC(secret, A(2) || label || seed) || ...
//! ```

use hmac::digest::core_api::BlockSizeUser;
use hmac::digest::Digest;
use hmac::{Mac, SimpleHmac};
use sha2::{Sha256, Sha384};

use crate::hashing::PrfHash;
use crate::CryptoError;

/// Expand `secret` into `out_len` bytes bound to `label` and `seed`.
///
/// # Errors
///
/// Returns `CryptoError::InvalidInput` if the HMAC cannot be keyed.
pub fn prf(
    hash: PrfHash,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    out_len: usize,
) -> Result<Vec<u8>, CryptoError> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);

    match hash {
        PrfHash::Sha256 => p_hash::<Sha256>(secret, &label_seed, out_len),
        PrfHash::Sha384 => p_hash::<Sha384>(secret, &label_seed, out_len),
    }
}

fn p_hash<D>(secret: &[u8], seed: &[u8], out_len: usize) -> Result<Vec<u8>, CryptoError>
where
    D: Digest + BlockSizeUser,
{
    let keyed = || {
        <SimpleHmac<D> as Mac>::new_from_slice(secret)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    };

    let mut out = Vec::with_capacity(out_len);
    let mut a = seed.to_vec();

    while out.len() < out_len {
        let mut mac = keyed()?;
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();

        let mut mac = keyed()?;
        mac.update(&a);
        mac.update(seed);
        let block = mac.finalize().into_bytes();

        let take = (out_len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hmac_sha256;

    #[test]
    fn test_prf_output_length() {
        for len in [0, 1, 12, 32, 48, 100] {
            let out = prf(PrfHash::Sha256, b"secret", b"label", b"seed", len).unwrap();
            assert_eq!(out.len(), len);
        }
    }

    #[test]
    fn test_prf_first_block_matches_definition() {
        let secret = b"some secret";
        let label_seed = b"master secretSEED";
        let a1 = hmac_sha256(secret, &[label_seed]).unwrap();
        let block1 = hmac_sha256(secret, &[&a1, label_seed]).unwrap();

        let out = prf(PrfHash::Sha256, secret, b"master secret", b"SEED", 32).unwrap();
        assert_eq!(out, block1.to_vec());
    }

    #[test]
    fn test_prf_is_prefix_stable() {
        let short = prf(PrfHash::Sha384, b"k", b"key expansion", b"s", 20).unwrap();
        let long = prf(PrfHash::Sha384, b"k", b"key expansion", b"s", 100).unwrap();
        assert_eq!(&long[..20], &short[..]);
    }

    #[test]
    fn test_prf_label_separates_outputs() {
        let a = prf(PrfHash::Sha256, b"k", b"client finished", b"h", 12).unwrap();
        let b = prf(PrfHash::Sha256, b"k", b"server finished", b"h", 12).unwrap();
        assert_ne!(a, b);
    }
}
