//! Exchange tests run on paused tokio time, so retransmission and
//! piggyback timers elapse instantly and deterministically.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gw_01_secure_session::SessionId;
use tokio::sync::mpsc;

use super::MessageExchange;
use crate::domain::{
    codec, option, CoapOption, Code, DeliveryError, ExchangeConfig, Message, MessageType, Method,
};
use crate::ports::{MessageSink, RequestHandler};

// =============================================================================
// TEST DOUBLES
// =============================================================================

struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(
        &self,
        _peer: SocketAddr,
        _session: SessionId,
        datagram: Vec<u8>,
    ) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeliveryError::SessionClosed);
        }
        let _ = self.tx.send(datagram);
        Ok(())
    }
}

struct ScriptedHandler {
    calls: AtomicUsize,
    delay: Duration,
    response: Message,
    panics: bool,
}

impl ScriptedHandler {
    fn replying(response: Message) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            response,
            panics: false,
        }
    }

    fn content() -> Self {
        Self::replying(Message::response(Code::CONTENT).with_payload("granted"))
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::content()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestHandler for ScriptedHandler {
    async fn handle(&self, _peer: SocketAddr, _request: Message) -> Message {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics {
            panic!("handler blew up");
        }
        self.response.clone()
    }
}

struct Harness {
    exchange: Arc<MessageExchange>,
    handler: Arc<ScriptedHandler>,
    sink: Arc<ChannelSink>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Harness {
    fn new(handler: ScriptedHandler) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Arc::new(handler);
        let sink = Arc::new(ChannelSink {
            tx,
            closed: AtomicBool::new(false),
        });
        let exchange = Arc::new(MessageExchange::new(
            ExchangeConfig::for_testing(),
            handler.clone(),
            sink.clone(),
        ));
        Self {
            exchange,
            handler,
            sink,
            rx,
        }
    }

    async fn deliver(&self, msg: &Message) {
        let bytes = codec::encode(msg).unwrap();
        self.exchange.on_datagram(peer(), SESSION, &bytes).await;
    }

    async fn next(&mut self) -> Message {
        let bytes = self.rx.recv().await.unwrap();
        codec::decode(&bytes).unwrap()
    }

    fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(bytes) = self.rx.try_recv() {
            out.push(codec::decode(&bytes).unwrap());
        }
        out
    }
}

const SESSION: SessionId = SessionId(1);

fn peer() -> SocketAddr {
    SocketAddr::from(([192, 168, 1, 20], 40000))
}

fn post(message_type: MessageType, mid: u16) -> Message {
    Message::request(message_type, Method::Post, mid, "accessControl")
        .with_token(vec![0xab, 0xcd])
        .with_payload(r#"{"UAT":{"RL":"Visitor"}}"#)
}

// =============================================================================
// PIGGY-BACKED AND NON RESPONSES
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_confirmable_request_gets_piggybacked_ack() {
    let mut h = Harness::new(ScriptedHandler::content());
    h.deliver(&post(MessageType::Confirmable, 0x1000)).await;

    let sent = h.drain();
    assert_eq!(sent.len(), 1);
    let reply = &sent[0];
    assert_eq!(reply.message_type, MessageType::Acknowledgement);
    assert_eq!(reply.message_id, 0x1000);
    assert_eq!(reply.token, vec![0xab, 0xcd]);
    assert_eq!(reply.code, Code::CONTENT);
    assert_eq!(reply.payload, b"granted");
}

#[tokio::test(start_paused = true)]
async fn test_non_request_gets_non_response_with_token() {
    let mut h = Harness::new(ScriptedHandler::content());
    h.deliver(&post(MessageType::NonConfirmable, 0x2000)).await;

    let reply = h.next().await;
    assert_eq!(reply.message_type, MessageType::NonConfirmable);
    assert_eq!(reply.token, vec![0xab, 0xcd]);
    assert_eq!(reply.code, Code::CONTENT);
}

#[tokio::test(start_paused = true)]
async fn test_handler_reset_keeps_request_id_and_code() {
    let mut h = Harness::new(ScriptedHandler::replying(Message::reset(0, Code::NOT_FOUND)));
    h.deliver(&post(MessageType::Confirmable, 0x0042)).await;

    let reply = h.next().await;
    assert_eq!(reply.message_type, MessageType::Reset);
    assert_eq!(reply.message_id, 0x0042);
    assert_eq!(reply.code, Code::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_yields_internal_server_error() {
    let mut h = Harness::new(ScriptedHandler {
        panics: true,
        ..ScriptedHandler::content()
    });
    h.deliver(&post(MessageType::Confirmable, 7)).await;

    let reply = h.next().await;
    assert_eq!(reply.message_type, MessageType::Acknowledgement);
    assert_eq!(reply.code, Code::INTERNAL_SERVER_ERROR);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_critical_option_is_rejected_without_dispatch() {
    let mut h = Harness::new(ScriptedHandler::content());
    let mut request = post(MessageType::Confirmable, 9);
    request.add_option(CoapOption::new(9, b"x".to_vec()));
    h.deliver(&request).await;

    let reply = h.next().await;
    assert_eq!(reply.code, Code::BAD_OPTION);
    assert_eq!(reply.message_id, 9);
    assert_eq!(h.handler.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_elective_option_is_ignored() {
    let mut h = Harness::new(ScriptedHandler::content());
    let mut request = post(MessageType::Confirmable, 10);
    request.add_option(CoapOption::new(2048, b"x".to_vec()));
    assert!(!option::is_critical(2048));
    h.deliver(&request).await;

    assert_eq!(h.next().await.code, Code::CONTENT);
    assert_eq!(h.handler.calls(), 1);
}

// =============================================================================
// DEDUPLICATION
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_after_completion_replays_cached_response() {
    let mut h = Harness::new(ScriptedHandler::content());
    let request = post(MessageType::Confirmable, 0x0102);
    h.deliver(&request).await;
    h.deliver(&request).await;

    let sent = h.drain();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
    assert_eq!(h.handler.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_while_in_progress_is_dropped() {
    let mut h = Harness::new(ScriptedHandler::slow(Duration::from_millis(50)));
    let request = post(MessageType::Confirmable, 0x0103);

    tokio::join!(h.deliver(&request), h.deliver(&request));

    assert_eq!(h.drain().len(), 1);
    assert_eq!(h.handler.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_same_message_id_from_new_session_is_fresh_after_forget() {
    let mut h = Harness::new(ScriptedHandler::content());
    let request = post(MessageType::Confirmable, 5);
    h.deliver(&request).await;
    h.exchange.forget_peer(peer());
    h.deliver(&request).await;

    assert_eq!(h.drain().len(), 2);
    assert_eq!(h.handler.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_purge_expired_after_exchange_lifetime() {
    let h = Harness::new(ScriptedHandler::content());
    h.deliver(&post(MessageType::Confirmable, 1)).await;
    assert_eq!(h.exchange.purge_expired(), 0);

    tokio::time::advance(ExchangeConfig::for_testing().exchange_lifetime).await;
    assert_eq!(h.exchange.purge_expired(), 1);
}

// =============================================================================
// SEPARATE RESPONSES AND RETRANSMISSION
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_handler_gets_empty_ack_then_separate_response() {
    let mut h = Harness::new(ScriptedHandler::slow(Duration::from_secs(1)));
    let request = post(MessageType::Confirmable, 0x0200);

    let exchange = h.exchange.clone();
    let bytes = codec::encode(&request).unwrap();
    let task = tokio::spawn(async move { exchange.on_datagram(peer(), SESSION, &bytes).await });

    let ack = h.next().await;
    assert_eq!(ack.message_type, MessageType::Acknowledgement);
    assert!(ack.is_empty());
    assert_eq!(ack.message_id, 0x0200);

    let separate = h.next().await;
    assert_eq!(separate.message_type, MessageType::Confirmable);
    assert_eq!(separate.code, Code::CONTENT);
    assert_eq!(separate.token, request.token);
    assert_eq!(h.exchange.in_flight_count(), 1);

    h.deliver(&Message::empty_ack(separate.message_id)).await;
    task.await.unwrap();

    assert!(h.drain().is_empty());
    assert_eq!(h.exchange.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_of_slow_request_replays_empty_ack() {
    let mut h = Harness::new(ScriptedHandler::slow(Duration::from_secs(1)));
    let request = post(MessageType::Confirmable, 0x0201);

    let exchange = h.exchange.clone();
    let bytes = codec::encode(&request).unwrap();
    let task = tokio::spawn(async move { exchange.on_datagram(peer(), SESSION, &bytes).await });

    let ack = h.next().await;
    h.deliver(&request).await;
    assert_eq!(h.next().await, ack);

    let separate = h.next().await;
    h.deliver(&Message::empty_ack(separate.message_id)).await;
    task.await.unwrap();
    assert_eq!(h.handler.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_separate_response_is_retransmitted_then_abandoned() {
    let mut h = Harness::new(ScriptedHandler::slow(Duration::from_secs(1)));
    h.deliver(&post(MessageType::Confirmable, 0x0300)).await;

    let sent = h.drain();
    let max_retransmit = ExchangeConfig::for_testing().max_retransmit as usize;
    // Empty ACK plus the original transmission and every retransmission.
    assert_eq!(sent.len(), 1 + 1 + max_retransmit);
    let copies = &sent[1..];
    assert!(copies.iter().all(|m| m == &copies[0]));
    assert_eq!(h.exchange.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_stops_retransmission() {
    let mut h = Harness::new(ScriptedHandler::content());
    let msg = Message::new(MessageType::Confirmable, Code::CONTENT, 0x0400).with_token(vec![1]);

    let exchange = h.exchange.clone();
    let pending = msg.clone();
    let task =
        tokio::spawn(async move { exchange.send_confirmable(peer(), SESSION, pending).await });

    assert_eq!(h.next().await, msg);
    h.deliver(&Message::reset(0x0400, Code::EMPTY)).await;

    assert!(matches!(task.await.unwrap(), Err(DeliveryError::Reset)));
    assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retransmission_exhaustion_reports_attempts() {
    let h = Harness::new(ScriptedHandler::content());
    let msg = Message::new(MessageType::Confirmable, Code::CONTENT, 0x0500);

    let result = h.exchange.send_confirmable(peer(), SESSION, msg).await;
    assert!(matches!(result, Err(DeliveryError::Timeout { attempts: 3 })));
}

#[tokio::test(start_paused = true)]
async fn test_forgetting_peer_abandons_pending_send() {
    let mut h = Harness::new(ScriptedHandler::content());
    let msg = Message::new(MessageType::Confirmable, Code::CONTENT, 0x0600);

    let exchange = h.exchange.clone();
    let task = tokio::spawn(async move { exchange.send_confirmable(peer(), SESSION, msg).await });

    h.next().await;
    h.exchange.forget_peer(peer());
    assert!(matches!(
        task.await.unwrap(),
        Err(DeliveryError::SessionClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_send_on_closed_session_fails_fast() {
    let h = Harness::new(ScriptedHandler::content());
    h.sink.closed.store(true, Ordering::SeqCst);
    let msg = Message::new(MessageType::Confirmable, Code::CONTENT, 0x0700);

    let result = h.exchange.send_confirmable(peer(), SESSION, msg).await;
    assert!(matches!(result, Err(DeliveryError::SessionClosed)));
    assert_eq!(h.exchange.in_flight_count(), 0);
}

// =============================================================================
// EMPTY AND MALFORMED MESSAGES
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_ping_is_answered_with_reset() {
    let mut h = Harness::new(ScriptedHandler::content());
    h.deliver(&Message::new(MessageType::Confirmable, Code::EMPTY, 0x0800))
        .await;

    let reply = h.next().await;
    assert_eq!(reply.message_type, MessageType::Reset);
    assert_eq!(reply.message_id, 0x0800);
    assert_eq!(h.handler.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_confirmable_is_reset() {
    let mut h = Harness::new(ScriptedHandler::content());
    // CON POST, mid 0x0900, option delta nibble 15 without payload marker
    let bytes = [0x40, 0x02, 0x09, 0x00, 0xf1];
    h.exchange.on_datagram(peer(), SESSION, &bytes).await;

    let reply = h.next().await;
    assert_eq!(reply.message_type, MessageType::Reset);
    assert_eq!(reply.message_id, 0x0900);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_non_confirmable_is_dropped() {
    let mut h = Harness::new(ScriptedHandler::content());
    let bytes = [0x50, 0x02, 0x09, 0x01, 0xf1];
    h.exchange.on_datagram(peer(), SESSION, &bytes).await;
    h.exchange.on_datagram(peer(), SESSION, &[0x40]).await;

    assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stray_ack_is_ignored() {
    let mut h = Harness::new(ScriptedHandler::content());
    h.deliver(&Message::empty_ack(0x0a00)).await;
    assert!(h.drain().is_empty());
}
