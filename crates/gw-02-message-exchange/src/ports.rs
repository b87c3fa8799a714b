//! # Ports
//!
//! - [`RequestHandler`] (driven): turns a request into a response; the
//!   resource dispatcher implements it.
//! - [`MessageSink`] (driven): protects and sends an encoded message over
//!   the peer's secure session.

use std::net::SocketAddr;

use async_trait::async_trait;
use gw_01_secure_session::SessionId;

use crate::domain::{DeliveryError, Message};

#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response for `request`.
    ///
    /// The returned message carries code, options and payload; the
    /// exchange layer assigns type, message id and token. Returning a
    /// `Reset` asks for the request to be rejected.
    async fn handle(&self, peer: SocketAddr, request: Message) -> Message;
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send `datagram` to `peer` over `session`.
    ///
    /// Fails with `SessionClosed` if that session is gone.
    async fn send(
        &self,
        peer: SocketAddr,
        session: SessionId,
        datagram: Vec<u8>,
    ) -> Result<(), DeliveryError>;
}
