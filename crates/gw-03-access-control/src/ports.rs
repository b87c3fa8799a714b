//! # Ports
//!
//! - [`Resource`] (driving): one addressable resource; the dispatcher calls
//!   the method matching the request code.
//! - [`AccessAuthority`] (driven): the upstream decision service.

use std::net::SocketAddr;

use async_trait::async_trait;
use gw_02_message_exchange::{Code, Message};

use crate::domain::{AccessVerdict, Endpoint, UpstreamError};

/// Unimplemented methods answer 4.05 Method Not Allowed.
#[async_trait]
pub trait Resource: Send + Sync {
    async fn handle_get(&self, _peer: SocketAddr, _request: &Message) -> Message {
        Message::response(Code::METHOD_NOT_ALLOWED)
    }

    async fn handle_post(&self, _peer: SocketAddr, _request: &Message) -> Message {
        Message::response(Code::METHOD_NOT_ALLOWED)
    }

    async fn handle_put(&self, _peer: SocketAddr, _request: &Message) -> Message {
        Message::response(Code::METHOD_NOT_ALLOWED)
    }

    async fn handle_delete(&self, _peer: SocketAddr, _request: &Message) -> Message {
        Message::response(Code::METHOD_NOT_ALLOWED)
    }
}

#[async_trait]
pub trait AccessAuthority: Send + Sync {
    /// Ask the authority behind `endpoint` to decide on `payload`.
    ///
    /// Never retried by the caller.
    async fn request(&self, endpoint: Endpoint, payload: &str)
        -> Result<AccessVerdict, UpstreamError>;
}
