//! Message Exchange - request/response semantics over one secure channel.
//!
//! Inbound:
//! - ACK/RST complete the matching in-flight confirmable send
//! - an empty CON ("ping") is answered with RST
//! - requests are deduplicated, dispatched, and answered piggy-backed
//!   (CON), as a separate CON after an empty ACK (slow handler), or as NON
//!
//! Outbound confirmable messages are retransmitted with exponential backoff
//! until acknowledged, reset, or out of attempts.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use gw_01_secure_session::SessionId;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, error, trace, warn};

use crate::domain::{
    codec, Code, DedupCache, DedupStatus, DeliveryError, ExchangeConfig, Message, MessageType,
};
use crate::ports::{MessageSink, RequestHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Ack,
    Reset,
}

pub struct MessageExchange {
    config: ExchangeConfig,
    handler: Arc<dyn RequestHandler>,
    sink: Arc<dyn MessageSink>,
    dedup: DedupCache,
    in_flight: DashMap<(SocketAddr, u16), oneshot::Sender<Confirmation>>,
    next_mid: AtomicU16,
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

impl MessageExchange {
    pub fn new(
        config: ExchangeConfig,
        handler: Arc<dyn RequestHandler>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            dedup: DedupCache::new(config.exchange_lifetime),
            config,
            handler,
            sink,
            in_flight: DashMap::new(),
            next_mid: AtomicU16::new(rand::random()),
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Fresh message id for messages we originate.
    pub fn next_message_id(&self) -> u16 {
        self.next_mid.fetch_add(1, Ordering::Relaxed)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Drop dedup state and pending sends of a peer whose session ended.
    pub fn forget_peer(&self, peer: SocketAddr) {
        self.dedup.forget_peer(peer);
        // Dropping the senders wakes the waiting transmit loops.
        self.in_flight.retain(|(p, _), _| *p != peer);
    }

    pub fn purge_expired(&self) -> usize {
        self.dedup.purge_expired(now())
    }

    /// Handle one decrypted datagram from `peer`.
    pub async fn on_datagram(&self, peer: SocketAddr, session: SessionId, bytes: &[u8]) {
        let msg = match codec::decode(bytes) {
            Ok(msg) => msg,
            Err(err) => {
                match codec::peek_header(bytes) {
                    Some((MessageType::Confirmable, mid)) => {
                        debug!(%peer, mid, error = %err, "malformed confirmable message, rejecting");
                        self.send_quietly(peer, session, &Message::reset(mid, Code::EMPTY))
                            .await;
                    }
                    _ => debug!(%peer, error = %err, "malformed message dropped"),
                }
                return;
            }
        };
        debug!(%peer, "<== {}", msg);

        match msg.message_type {
            MessageType::Acknowledgement | MessageType::Reset => self.on_confirmation(peer, &msg),
            MessageType::Confirmable if msg.is_empty() => {
                self.send_quietly(peer, session, &Message::reset(msg.message_id, Code::EMPTY))
                    .await;
            }
            _ if msg.is_request() => self.on_request(peer, session, msg).await,
            MessageType::Confirmable => {
                // We never send requests, so a confirmable response is unexpected.
                self.send_quietly(peer, session, &Message::reset(msg.message_id, Code::EMPTY))
                    .await;
            }
            MessageType::NonConfirmable => trace!(%peer, "unexpected NON response ignored"),
        }
    }

    fn on_confirmation(&self, peer: SocketAddr, msg: &Message) {
        let confirmation = match msg.message_type {
            MessageType::Reset => Confirmation::Reset,
            _ => Confirmation::Ack,
        };
        match self.in_flight.remove(&(peer, msg.message_id)) {
            Some((_, waiter)) => {
                let _ = waiter.send(confirmation);
            }
            None => trace!(%peer, mid = msg.message_id, "confirmation for nothing in flight"),
        }
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    async fn on_request(&self, peer: SocketAddr, session: SessionId, request: Message) {
        let mid = request.message_id;
        match self.dedup.begin(peer, mid, now()) {
            DedupStatus::New => {}
            DedupStatus::InProgress => {
                debug!(%peer, mid, "duplicate of exchange in progress dropped");
                return;
            }
            DedupStatus::Completed(cached) => {
                debug!(%peer, mid, "duplicate request, replaying response");
                if let Err(err) = self.sink.send(peer, session, cached).await {
                    debug!(%peer, error = %err, "cached response not sent");
                }
                return;
            }
        }

        if let Some(number) = request.unknown_critical_option() {
            debug!(%peer, mid, option = number, "unknown critical option");
            let reply = self.reply_to(&request, Message::response(Code::BAD_OPTION));
            self.finish(peer, session, mid, reply).await;
            return;
        }

        let handler = Arc::clone(&self.handler);
        let dispatched = request.clone();
        let mut task = tokio::spawn(async move { handler.handle(peer, dispatched).await });

        if request.message_type != MessageType::Confirmable {
            let response = handler_result(task.await);
            let reply = self.reply_to(&request, response);
            self.finish(peer, session, mid, reply).await;
            return;
        }

        match tokio::time::timeout(self.config.piggyback_timeout, &mut task).await {
            Ok(joined) => {
                let reply = self.reply_to(&request, handler_result(joined));
                self.finish(peer, session, mid, reply).await;
            }
            Err(_) => {
                debug!(%peer, mid, "handler still running, acknowledging now");
                self.finish(peer, session, mid, Message::empty_ack(mid)).await;

                let mut separate = handler_result(task.await);
                separate.message_type = MessageType::Confirmable;
                separate.message_id = self.next_message_id();
                separate.token = request.token.clone();
                if let Err(err) = self.send_confirmable(peer, session, separate).await {
                    warn!(%peer, error = %err, "separate response not delivered");
                }
            }
        }
    }

    /// Address a handler response to `request`.
    fn reply_to(&self, request: &Message, mut response: Message) -> Message {
        response.token = request.token.clone();
        match (request.message_type, response.message_type) {
            (_, MessageType::Reset) => response.message_id = request.message_id,
            (MessageType::Confirmable, _) => {
                response.message_type = MessageType::Acknowledgement;
                response.message_id = request.message_id;
            }
            _ => {
                response.message_type = MessageType::NonConfirmable;
                response.message_id = self.next_message_id();
            }
        }
        response
    }

    /// Cache `reply` for duplicates of `mid`, then send it.
    async fn finish(&self, peer: SocketAddr, session: SessionId, mid: u16, reply: Message) {
        let bytes = match codec::encode(&reply) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(%peer, error = %err, "response could not be encoded");
                return;
            }
        };
        self.dedup.complete(peer, mid, bytes.clone());
        debug!(%peer, "==> {}", reply);
        if let Err(err) = self.sink.send(peer, session, bytes).await {
            debug!(%peer, error = %err, "response not sent");
        }
    }

    async fn send_quietly(&self, peer: SocketAddr, session: SessionId, msg: &Message) {
        debug!(%peer, "==> {}", msg);
        let result = match codec::encode(msg) {
            Ok(bytes) => self.sink.send(peer, session, bytes).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = result {
            debug!(%peer, error = %err, "message not sent");
        }
    }

    // =========================================================================
    // CONFIRMABLE SENDS
    // =========================================================================

    /// Send `msg` as a confirmable message and wait for its ACK.
    pub async fn send_confirmable(
        &self,
        peer: SocketAddr,
        session: SessionId,
        msg: Message,
    ) -> Result<(), DeliveryError> {
        let bytes = codec::encode(&msg)?;
        let key = (peer, msg.message_id);
        let (tx, mut rx) = oneshot::channel();
        self.in_flight.insert(key, tx);

        let result = self.transmit(peer, session, &msg, bytes, &mut rx).await;
        self.in_flight.remove(&key);
        result
    }

    async fn transmit(
        &self,
        peer: SocketAddr,
        session: SessionId,
        msg: &Message,
        bytes: Vec<u8>,
        rx: &mut oneshot::Receiver<Confirmation>,
    ) -> Result<(), DeliveryError> {
        let schedule = self.config.retransmission_schedule();
        let attempts = schedule.len() as u32;

        for (attempt, wait) in schedule.into_iter().enumerate() {
            if attempt == 0 {
                debug!(%peer, "==> {}", msg);
            } else {
                debug!(%peer, mid = msg.message_id, attempt, "retransmitting");
            }
            self.sink.send(peer, session, bytes.clone()).await?;

            match tokio::time::timeout(wait, &mut *rx).await {
                Ok(Ok(Confirmation::Ack)) => return Ok(()),
                Ok(Ok(Confirmation::Reset)) => return Err(DeliveryError::Reset),
                Ok(Err(_)) => return Err(DeliveryError::SessionClosed),
                Err(_) => continue,
            }
        }
        Err(DeliveryError::Timeout { attempts })
    }
}

fn handler_result(joined: Result<Message, JoinError>) -> Message {
    joined.unwrap_or_else(|err| {
        error!(error = %err, "request handler failed");
        Message::response(Code::INTERNAL_SERVER_ERROR)
    })
}
