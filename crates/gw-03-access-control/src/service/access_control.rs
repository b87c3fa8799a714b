//! The `accessControl` resource.
//!
//! POST only. Reads the role from the payload, forwards the raw payload to
//! the matching upstream endpoint, and always answers 2.05 with a JSON
//! verdict. Payload and upstream failures become `{"granted": false}`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use gw_02_message_exchange::{content_format, Code, Message};
use tracing::{debug, info, warn};

use crate::domain::{AccessRequest, AccessVerdict, Endpoint, MalformedPayloadPolicy};
use crate::ports::{AccessAuthority, Resource};

pub const ACCESS_CONTROL_PATH: &str = "accessControl";

pub struct AccessControlResource {
    authority: Arc<dyn AccessAuthority>,
    policy: MalformedPayloadPolicy,
}

impl AccessControlResource {
    pub fn new(authority: Arc<dyn AccessAuthority>, policy: MalformedPayloadPolicy) -> Self {
        Self { authority, policy }
    }

    pub fn policy(&self) -> MalformedPayloadPolicy {
        self.policy
    }

    /// Decide on one request payload. Makes at most one upstream call.
    pub async fn decide(&self, payload: &[u8]) -> AccessVerdict {
        let endpoint = match AccessRequest::parse(payload) {
            Ok(request) => request.endpoint(),
            Err(err) => match self.policy {
                MalformedPayloadPolicy::Deny => {
                    debug!(error = %err, "malformed access request denied");
                    return AccessVerdict::denied();
                }
                MalformedPayloadPolicy::Forward => {
                    debug!(error = %err, "malformed access request, using default endpoint");
                    Endpoint::default()
                }
            },
        };

        let raw = String::from_utf8_lossy(payload);
        match self.authority.request(endpoint, &raw).await {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(%endpoint, error = %err, "upstream failed, denying");
                AccessVerdict::denied()
            }
        }
    }
}

#[async_trait]
impl Resource for AccessControlResource {
    async fn handle_post(&self, peer: SocketAddr, request: &Message) -> Message {
        let verdict = self.decide(&request.payload).await;
        info!(%peer, granted = verdict.granted, "access decision");

        Message::response(Code::CONTENT)
            .with_content_format(content_format::APPLICATION_JSON)
            .with_payload(verdict.to_pretty_json())
    }
}
