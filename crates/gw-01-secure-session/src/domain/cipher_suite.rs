//! # Cipher Suites
//!
//! The engine only ever negotiates suites whose key exchange is plain PSK.
//! Configuration may still list certificate and ECDHE suites (the default
//! "strong encryption" preference list does); [`PskCipherSuites::filter`]
//! drops them once at startup and [`PskCipherSuites::select`] re-checks the
//! key exchange on every handshake.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared_crypto::{AeadAlgorithm, PrfHash};

/// Key exchange family of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchangeAlgorithm {
    /// Pre-shared key only (RFC 4279)
    Psk,
    /// Ephemeral ECDH authenticated by PSK (RFC 5489)
    EcdhePsk,
    /// Ephemeral ECDH with ECDSA certificates
    EcdheEcdsa,
    /// Ephemeral ECDH with RSA certificates
    EcdheRsa,
}

/// Known cipher suites with their IANA code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    #[serde(rename = "TLS_PSK_WITH_AES_128_GCM_SHA256")]
    PskWithAes128GcmSha256,
    #[serde(rename = "TLS_PSK_WITH_AES_256_GCM_SHA384")]
    PskWithAes256GcmSha384,
    #[serde(rename = "TLS_PSK_WITH_CHACHA20_POLY1305_SHA256")]
    PskWithChacha20Poly1305Sha256,
    #[serde(rename = "TLS_ECDHE_PSK_WITH_AES_128_GCM_SHA256")]
    EcdhePskWithAes128GcmSha256,
    #[serde(rename = "TLS_ECDHE_PSK_WITH_CHACHA20_POLY1305_SHA256")]
    EcdhePskWithChacha20Poly1305Sha256,
    #[serde(rename = "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256")]
    EcdheEcdsaWithAes128GcmSha256,
    #[serde(rename = "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384")]
    EcdheEcdsaWithAes256GcmSha384,
    #[serde(rename = "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256")]
    EcdheEcdsaWithChacha20Poly1305Sha256,
    #[serde(rename = "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256")]
    EcdheRsaWithAes128GcmSha256,
}

impl CipherSuite {
    /// Every known suite.
    pub const ALL: [CipherSuite; 9] = [
        CipherSuite::PskWithAes128GcmSha256,
        CipherSuite::PskWithAes256GcmSha384,
        CipherSuite::PskWithChacha20Poly1305Sha256,
        CipherSuite::EcdhePskWithAes128GcmSha256,
        CipherSuite::EcdhePskWithChacha20Poly1305Sha256,
        CipherSuite::EcdheEcdsaWithAes128GcmSha256,
        CipherSuite::EcdheEcdsaWithAes256GcmSha384,
        CipherSuite::EcdheEcdsaWithChacha20Poly1305Sha256,
        CipherSuite::EcdheRsaWithAes128GcmSha256,
    ];

    /// Default preselection: AEAD-only suites, strongest first. Mixes PSK
    /// and non-PSK suites; the engine filters it down to PSK.
    pub const STRONG_ENCRYPTION_PREFERENCE: [CipherSuite; 8] = [
        CipherSuite::EcdheEcdsaWithAes256GcmSha384,
        CipherSuite::EcdheEcdsaWithChacha20Poly1305Sha256,
        CipherSuite::EcdheEcdsaWithAes128GcmSha256,
        CipherSuite::EcdhePskWithChacha20Poly1305Sha256,
        CipherSuite::EcdhePskWithAes128GcmSha256,
        CipherSuite::PskWithAes256GcmSha384,
        CipherSuite::PskWithChacha20Poly1305Sha256,
        CipherSuite::PskWithAes128GcmSha256,
    ];

    /// IANA code point.
    pub fn code(self) -> u16 {
        match self {
            CipherSuite::PskWithAes128GcmSha256 => 0x00A8,
            CipherSuite::PskWithAes256GcmSha384 => 0x00A9,
            CipherSuite::PskWithChacha20Poly1305Sha256 => 0xCCAB,
            CipherSuite::EcdhePskWithAes128GcmSha256 => 0xD001,
            CipherSuite::EcdhePskWithChacha20Poly1305Sha256 => 0xCCAC,
            CipherSuite::EcdheEcdsaWithAes128GcmSha256 => 0xC02B,
            CipherSuite::EcdheEcdsaWithAes256GcmSha384 => 0xC02C,
            CipherSuite::EcdheEcdsaWithChacha20Poly1305Sha256 => 0xCCA9,
            CipherSuite::EcdheRsaWithAes128GcmSha256 => 0xC02F,
        }
    }

    /// Look up a suite by code point.
    pub fn from_code(code: u16) -> Option<CipherSuite> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// IANA name, e.g. `TLS_PSK_WITH_AES_128_GCM_SHA256`.
    pub fn name(self) -> &'static str {
        match self {
            CipherSuite::PskWithAes128GcmSha256 => "TLS_PSK_WITH_AES_128_GCM_SHA256",
            CipherSuite::PskWithAes256GcmSha384 => "TLS_PSK_WITH_AES_256_GCM_SHA384",
            CipherSuite::PskWithChacha20Poly1305Sha256 => "TLS_PSK_WITH_CHACHA20_POLY1305_SHA256",
            CipherSuite::EcdhePskWithAes128GcmSha256 => "TLS_ECDHE_PSK_WITH_AES_128_GCM_SHA256",
            CipherSuite::EcdhePskWithChacha20Poly1305Sha256 => {
                "TLS_ECDHE_PSK_WITH_CHACHA20_POLY1305_SHA256"
            }
            CipherSuite::EcdheEcdsaWithAes128GcmSha256 => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
            CipherSuite::EcdheEcdsaWithAes256GcmSha384 => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
            CipherSuite::EcdheEcdsaWithChacha20Poly1305Sha256 => {
                "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256"
            }
            CipherSuite::EcdheRsaWithAes128GcmSha256 => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        }
    }

    pub fn key_exchange(self) -> KeyExchangeAlgorithm {
        match self {
            CipherSuite::PskWithAes128GcmSha256
            | CipherSuite::PskWithAes256GcmSha384
            | CipherSuite::PskWithChacha20Poly1305Sha256 => KeyExchangeAlgorithm::Psk,
            CipherSuite::EcdhePskWithAes128GcmSha256
            | CipherSuite::EcdhePskWithChacha20Poly1305Sha256 => KeyExchangeAlgorithm::EcdhePsk,
            CipherSuite::EcdheEcdsaWithAes128GcmSha256
            | CipherSuite::EcdheEcdsaWithAes256GcmSha384
            | CipherSuite::EcdheEcdsaWithChacha20Poly1305Sha256 => KeyExchangeAlgorithm::EcdheEcdsa,
            CipherSuite::EcdheRsaWithAes128GcmSha256 => KeyExchangeAlgorithm::EcdheRsa,
        }
    }

    pub fn aead(self) -> AeadAlgorithm {
        match self {
            CipherSuite::PskWithAes128GcmSha256
            | CipherSuite::EcdhePskWithAes128GcmSha256
            | CipherSuite::EcdheEcdsaWithAes128GcmSha256
            | CipherSuite::EcdheRsaWithAes128GcmSha256 => AeadAlgorithm::Aes128Gcm,
            CipherSuite::PskWithAes256GcmSha384 | CipherSuite::EcdheEcdsaWithAes256GcmSha384 => {
                AeadAlgorithm::Aes256Gcm
            }
            CipherSuite::PskWithChacha20Poly1305Sha256
            | CipherSuite::EcdhePskWithChacha20Poly1305Sha256
            | CipherSuite::EcdheEcdsaWithChacha20Poly1305Sha256 => AeadAlgorithm::ChaCha20Poly1305,
        }
    }

    pub fn prf_hash(self) -> PrfHash {
        match self {
            CipherSuite::PskWithAes256GcmSha384 | CipherSuite::EcdheEcdsaWithAes256GcmSha384 => {
                PrfHash::Sha384
            }
            _ => PrfHash::Sha256,
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognised suite name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cipher suite: {0}")]
pub struct UnknownCipherSuite(pub String);

impl FromStr for CipherSuite {
    type Err = UnknownCipherSuite;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|suite| suite.name() == s)
            .ok_or_else(|| UnknownCipherSuite(s.to_string()))
    }
}

/// Ordered, de-duplicated allow-list holding only PSK suites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskCipherSuites(Vec<CipherSuite>);

impl PskCipherSuites {
    /// Keep the PSK suites of `configured`, preserving preference order.
    pub fn filter(configured: &[CipherSuite]) -> Self {
        let mut kept: Vec<CipherSuite> = Vec::with_capacity(configured.len());
        for suite in configured {
            if suite.key_exchange() == KeyExchangeAlgorithm::Psk && !kept.contains(suite) {
                kept.push(*suite);
            }
        }
        Self(kept)
    }

    pub fn as_slice(&self) -> &[CipherSuite] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First suite in server preference order that the client offered.
    pub fn select(&self, offered: &[u16]) -> Option<CipherSuite> {
        self.0
            .iter()
            .copied()
            .filter(|s| s.key_exchange() == KeyExchangeAlgorithm::Psk)
            .find(|s| offered.contains(&s.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_preference_filters_to_psk_only() {
        let filtered = PskCipherSuites::filter(&CipherSuite::STRONG_ENCRYPTION_PREFERENCE);
        assert_eq!(
            filtered.as_slice(),
            &[
                CipherSuite::PskWithAes256GcmSha384,
                CipherSuite::PskWithChacha20Poly1305Sha256,
                CipherSuite::PskWithAes128GcmSha256,
            ]
        );
    }

    #[test]
    fn test_ecdhe_psk_is_not_plain_psk() {
        let filtered = PskCipherSuites::filter(&[CipherSuite::EcdhePskWithAes128GcmSha256]);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_select_uses_server_preference() {
        let suites = PskCipherSuites::filter(&[
            CipherSuite::PskWithChacha20Poly1305Sha256,
            CipherSuite::PskWithAes128GcmSha256,
        ]);
        let offered = [0x00A8, 0xCCAB];
        assert_eq!(
            suites.select(&offered),
            Some(CipherSuite::PskWithChacha20Poly1305Sha256)
        );
    }

    #[test]
    fn test_select_refuses_certificate_only_offer() {
        let suites = PskCipherSuites::filter(&CipherSuite::ALL);
        let offered = [0xC02B, 0xC02F];
        assert_eq!(suites.select(&offered), None);
    }

    #[test]
    fn test_name_round_trip() {
        for suite in CipherSuite::ALL {
            assert_eq!(suite.name().parse::<CipherSuite>(), Ok(suite));
            assert_eq!(CipherSuite::from_code(suite.code()), Some(suite));
        }
        assert!("TLS_NULL_WITH_NULL_NULL".parse::<CipherSuite>().is_err());
    }

    fn any_suite() -> impl Strategy<Value = CipherSuite> {
        (0..CipherSuite::ALL.len()).prop_map(|i| CipherSuite::ALL[i])
    }

    proptest! {
        #[test]
        fn prop_filtered_set_contains_only_psk(configured in proptest::collection::vec(any_suite(), 0..20)) {
            let filtered = PskCipherSuites::filter(&configured);
            prop_assert!(filtered
                .as_slice()
                .iter()
                .all(|s| s.key_exchange() == KeyExchangeAlgorithm::Psk));
        }

        #[test]
        fn prop_selected_suite_is_psk_and_offered(
            configured in proptest::collection::vec(any_suite(), 0..20),
            offered in proptest::collection::vec(any_suite(), 0..20),
        ) {
            let filtered = PskCipherSuites::filter(&configured);
            let codes: Vec<u16> = offered.iter().map(|s| s.code()).collect();
            if let Some(chosen) = filtered.select(&codes) {
                prop_assert_eq!(chosen.key_exchange(), KeyExchangeAlgorithm::Psk);
                prop_assert!(offered.contains(&chosen));
            }
        }
    }
}
