//! Sends exchange-layer messages through the peer's secure session.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use gw_01_secure_session::{SecureTransport, SessionError, SessionEngine, SessionId};
use gw_02_message_exchange::{DeliveryError, MessageSink};
use tokio::net::UdpSocket;
use tracing::trace;

pub struct SecureSink {
    socket: Arc<UdpSocket>,
    engine: Arc<SessionEngine>,
}

impl SecureSink {
    pub fn new(socket: Arc<UdpSocket>, engine: Arc<SessionEngine>) -> Self {
        Self { socket, engine }
    }
}

#[async_trait]
impl MessageSink for SecureSink {
    async fn send(
        &self,
        peer: SocketAddr,
        session: SessionId,
        datagram: Vec<u8>,
    ) -> Result<(), DeliveryError> {
        // A response for a session that has since closed is discarded here.
        let record = self
            .engine
            .encrypt(peer, session, &datagram)
            .map_err(|err| match err {
                SessionError::SessionClosed | SessionError::UnknownPeer => {
                    DeliveryError::SessionClosed
                }
                other => DeliveryError::Transport(other.to_string()),
            })?;

        self.socket
            .send_to(&record, peer)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        trace!(%peer, %session, bytes = record.len(), "record sent");
        Ok(())
    }
}
