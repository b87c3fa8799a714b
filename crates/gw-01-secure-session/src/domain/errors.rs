//! Domain Errors for the Secure Session Engine

use shared_crypto::CryptoError;
use thiserror::Error;

use super::alert::AlertDescription;

/// Wire decoding failures (records, handshake bodies, alerts).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer ended early
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the field required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },
    /// Unknown record content type
    #[error("unknown content type {0}")]
    UnknownContentType(u8),
    /// Record version is not DTLS 1.0/1.2
    #[error("unsupported record version {0:#06x}")]
    UnsupportedVersion(u16),
    /// Unknown handshake message type
    #[error("unknown handshake type {0}")]
    UnknownHandshakeType(u8),
    /// Handshake message split across records
    #[error("fragmented handshake messages are not supported")]
    Fragmented,
    /// Structurally invalid field
    #[error("malformed {0}")]
    Malformed(&'static str),
}

/// Fatal handshake failures. Each one closes the affected session only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Message could not be parsed
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Message arrived in the wrong state
    #[error("unexpected {message} in state {state}")]
    UnexpectedMessage {
        /// What arrived
        message: &'static str,
        /// Where we were
        state: &'static str,
    },
    /// Client offered no suite in the PSK allow-list
    #[error("no common PSK cipher suite")]
    NoCommonCipherSuite,
    /// PSK identity not in the key store
    #[error("unknown PSK identity")]
    UnknownPskIdentity,
    /// Client Finished could not be decrypted (wrong secret)
    #[error("client Finished failed authentication")]
    FinishedDecryptFailed,
    /// Finished verify_data did not match the transcript
    #[error("Finished verify_data mismatch")]
    FinishedMismatch,
    /// Peer sent a fatal alert
    #[error("peer alert: {0:?}")]
    PeerAlert(AlertDescription),
    /// Key derivation or record protection failed
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

impl HandshakeError {
    /// Alert sent to the peer before the session is dropped.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            HandshakeError::Decode(_) => Some(AlertDescription::DecodeError),
            HandshakeError::UnexpectedMessage { .. } => Some(AlertDescription::UnexpectedMessage),
            HandshakeError::NoCommonCipherSuite => Some(AlertDescription::HandshakeFailure),
            HandshakeError::UnknownPskIdentity => Some(AlertDescription::UnknownPskIdentity),
            HandshakeError::FinishedDecryptFailed | HandshakeError::FinishedMismatch => {
                Some(AlertDescription::DecryptError)
            }
            HandshakeError::Crypto(_) => Some(AlertDescription::InternalError),
            HandshakeError::PeerAlert(_) => None,
        }
    }
}

/// Errors surfaced to callers of an established session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No session for this peer
    #[error("no session for peer")]
    UnknownPeer,
    /// Session closed or replaced since the request was delivered
    #[error("session closed")]
    SessionClosed,
    /// Handshake still running
    #[error("session not established")]
    NotEstablished,
    /// Record decryption failed
    #[error("record authentication failed")]
    AuthenticationFailure,
    /// Record protection failed
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

/// Key store lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyStoreError {
    /// Identity not provisioned
    #[error("PSK identity not found")]
    NotFound,
    /// Identity already provisioned (entries are immutable)
    #[error("PSK identity already present")]
    DuplicateIdentity,
    /// Identity or secret outside allowed bounds
    #[error("invalid PSK entry: {0}")]
    Invalid(&'static str),
}
