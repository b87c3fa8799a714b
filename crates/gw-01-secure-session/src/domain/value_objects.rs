//! Session identifiers, lifecycle states and engine tuning.

use std::fmt;
use std::time::Duration;

use super::alert::AlertDescription;
use super::cipher_suite::{CipherSuite, PskCipherSuites};

/// Generation id of a session. A re-handshake from the same address gets a
/// new id, so work started for the old session can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-peer lifecycle.
///
/// `Idle -> HandshakeInProgress -> Established -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No record exists for the peer.
    Idle,
    HandshakeInProgress,
    Established,
    Closed,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::HandshakeInProgress => "HandshakeInProgress",
            SessionState::Established => "Established",
            SessionState::Closed => "Closed",
        }
    }
}

/// Why a session left the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Fatal handshake error; the alert we sent (or received).
    HandshakeFailed(AlertDescription),
    HandshakeTimeout,
    IdleTimeout,
    /// close_notify or fatal alert from an established peer.
    PeerClosed,
    /// Decrypt-failure threshold reached.
    DecryptFailures,
    /// New handshake from the same address.
    Replaced,
    /// Closed locally (`close(peer)` or shutdown).
    Local,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::HandshakeFailed(alert) => write!(f, "handshake failed ({:?})", alert),
            CloseReason::HandshakeTimeout => f.write_str("handshake timeout"),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
            CloseReason::PeerClosed => f.write_str("closed by peer"),
            CloseReason::DecryptFailures => f.write_str("too many decrypt failures"),
            CloseReason::Replaced => f.write_str("replaced by new handshake"),
            CloseReason::Local => f.write_str("closed locally"),
        }
    }
}

/// Engine tuning, built from the runtime configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// PSK-only suites in server preference order.
    pub cipher_suites: PskCipherSuites,
    pub handshake_timeout: Duration,
    pub idle_timeout: Duration,
    /// Consecutive decrypt failures tolerated; one more closes an
    /// established session. An authenticated record resets the count.
    pub max_decrypt_failures: u32,
    pub max_sessions: usize,
    /// Answer cookie-less ClientHellos with HelloVerifyRequest.
    pub hello_verify_request: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cipher_suites: PskCipherSuites::filter(&CipherSuite::STRONG_ENCRYPTION_PREFERENCE),
            handshake_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(1800),
            max_decrypt_failures: 16,
            max_sessions: 10_000,
            hello_verify_request: true,
        }
    }
}

impl EngineConfig {
    /// Create a config suitable for testing (small limits, short timeouts)
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            max_decrypt_failures: 3,
            max_sessions: 8,
            ..Self::default()
        }
    }
}
