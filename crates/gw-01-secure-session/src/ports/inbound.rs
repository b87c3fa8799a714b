//! # Driving Ports (Inbound API)
//!
//! What the secure session engine exposes to the datagram listener.

use std::net::SocketAddr;

use crate::domain::{CipherSuite, CloseReason, PskIdentity, SessionError, SessionId, SessionState};

/// Lifecycle notifications produced while handling a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established {
        peer: SocketAddr,
        id: SessionId,
        suite: CipherSuite,
        identity: PskIdentity,
    },
    Closed {
        peer: SocketAddr,
        id: SessionId,
        reason: CloseReason,
    },
}

/// Application data surfaced from one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Session the data arrived on; pass it back to `encrypt`.
    pub session: SessionId,
    pub payloads: Vec<Vec<u8>>,
}

/// Result of feeding one datagram to the engine.
#[derive(Debug, Default)]
pub struct EngineOutput {
    /// Datagrams to send back to the peer, in order.
    pub replies: Vec<Vec<u8>>,
    pub delivered: Option<Delivered>,
    pub events: Vec<SessionEvent>,
}

impl EngineOutput {
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty() && self.delivered.is_none() && self.events.is_empty()
    }
}

/// Server-side secure transport over an unreliable datagram socket.
pub trait SecureTransport: Send + Sync {
    /// Feed one received datagram. Never fails: bad input is dropped or
    /// closes only the affected session.
    fn handle_datagram(&self, peer: SocketAddr, datagram: &[u8]) -> EngineOutput;

    /// Protect application data for `peer`.
    ///
    /// Fails with `SessionClosed` if `session` is no longer the peer's
    /// current established session.
    fn encrypt(
        &self,
        peer: SocketAddr,
        session: SessionId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SessionError>;

    /// Close the peer's session; returns a close_notify datagram to send.
    fn close(&self, peer: SocketAddr) -> Option<Vec<u8>>;

    /// Drop timed-out sessions.
    fn sweep(&self) -> Vec<(SocketAddr, CloseReason)>;

    fn state(&self, peer: SocketAddr) -> SessionState;

    fn session_count(&self) -> usize;
}
