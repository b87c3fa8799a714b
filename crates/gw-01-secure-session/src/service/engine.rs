//! Session Engine - the per-peer session table.
//!
//! Flow for one datagram:
//! 1. Split into records (garbage is dropped).
//! 2. A ClientHello is answered statelessly with HelloVerifyRequest until it
//!    carries a cookie from the current or previous rotation window; then
//!    a session is created, or replaced when the hello is a fresh one.
//! 3. Anything else goes to the peer's session under its mutex.
//! 4. Closed sessions are removed from the table, but only if the table
//!    still holds that same session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use shared_crypto::{constant_time_eq, hmac_sha256, SecretKey};
use tracing::{debug, info, trace, warn};

use crate::domain::alert::{Alert, AlertDescription};
use crate::domain::handshake::{
    ClientHello, HandshakeBody, HandshakeMessage, HelloVerifyRequest,
};
use crate::domain::record::{encode_record, parse_datagram, ContentType, Record, DTLS_1_0};
use crate::domain::value_objects::{CloseReason, EngineConfig, SessionId, SessionState};
use crate::domain::SessionError;
use crate::ports::inbound::{Delivered, EngineOutput, SecureTransport, SessionEvent};
use crate::ports::outbound::{PskKeyStore, TimeSource};

use super::session::{ProcessLimits, SecureSession};

const COOKIE_SECRET_LEN: usize = 32;

/// A cookie stays valid for the current and the previous rotation window.
const COOKIE_ROTATION: Duration = Duration::from_secs(30);

type SessionHandle = Arc<Mutex<SecureSession>>;

pub struct SessionEngine {
    config: EngineConfig,
    sessions: DashMap<SocketAddr, SessionHandle>,
    store: Arc<dyn PskKeyStore>,
    time: Arc<dyn TimeSource>,
    cookie_secret: SecretKey,
    started: Instant,
    next_id: AtomicU64,
}

impl SessionEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn PskKeyStore>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let started = time.now();
        Self {
            config,
            sessions: DashMap::new(),
            store,
            time,
            cookie_secret: SecretKey::generate(COOKIE_SECRET_LEN),
            started,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close every session, returning the close_notify datagrams to send.
    pub fn close_all(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        let peers: Vec<SocketAddr> = self.sessions.iter().map(|e| *e.key()).collect();
        peers
            .into_iter()
            .filter_map(|peer| self.close(peer).map(|d| (peer, d)))
            .collect()
    }

    fn cookie_window(&self) -> u64 {
        let elapsed = self.time.now().saturating_duration_since(self.started);
        elapsed.as_secs() / COOKIE_ROTATION.as_secs()
    }

    fn cookie(&self, window: u64, peer: SocketAddr, client_random: &[u8; 32]) -> Option<[u8; 32]> {
        let window = window.to_be_bytes();
        let peer = peer.to_string();
        hmac_sha256(
            self.cookie_secret.as_bytes(),
            &[window.as_slice(), peer.as_bytes(), client_random.as_slice()],
        )
        .ok()
    }

    /// Accepts cookies minted in the current or the previous window.
    fn cookie_is_valid(&self, window: u64, peer: SocketAddr, hello: &ClientHello) -> bool {
        if hello.cookie.is_empty() {
            return false;
        }
        let previous = window.checked_sub(1);
        [Some(window), previous]
            .into_iter()
            .flatten()
            .filter_map(|w| self.cookie(w, peer, &hello.random))
            .any(|expected| constant_time_eq(&expected, &hello.cookie))
    }

    fn session(&self, peer: &SocketAddr) -> Option<SessionHandle> {
        // Clone out so the shard lock is released before the session lock.
        self.sessions.get(peer).map(|e| Arc::clone(e.value()))
    }

    fn remove_if_current(&self, peer: &SocketAddr, handle: &SessionHandle) {
        self.sessions
            .remove_if(peer, |_, current| Arc::ptr_eq(current, handle));
    }

    // =========================================================================
    // CLIENT HELLO
    // =========================================================================

    fn on_client_hello(
        &self,
        peer: SocketAddr,
        record: &Record<'_>,
        message_seq: u16,
        hello: &ClientHello,
        raw: &[u8],
    ) -> EngineOutput {
        let mut out = EngineOutput::default();

        // The same hello again never replaces a session: resend the flight
        // while the handshake runs, ignore it once established.
        if let Some(handle) = self.session(&peer) {
            let session = handle.lock();
            if session.client_random() == &hello.random {
                match session.state() {
                    SessionState::HandshakeInProgress => {
                        trace!(%peer, "retransmitted ClientHello");
                        out.replies.push(session.last_flight().to_vec());
                    }
                    state => {
                        debug!(
                            %peer,
                            session = %session.id(),
                            state = state.name(),
                            "duplicate ClientHello dropped"
                        );
                    }
                }
                return out;
            }
        }

        if self.config.hello_verify_request {
            let window = self.cookie_window();
            if !self.cookie_is_valid(window, peer, hello) {
                let Some(cookie) = self.cookie(window, peer, &hello.random) else {
                    return out;
                };
                trace!(%peer, "sending HelloVerifyRequest");
                let hvr = HandshakeMessage::new(
                    message_seq,
                    HandshakeBody::HelloVerifyRequest(HelloVerifyRequest {
                        version: DTLS_1_0,
                        cookie: cookie.to_vec(),
                    }),
                );
                out.replies.push(encode_record(
                    ContentType::Handshake,
                    0,
                    record.sequence,
                    &hvr.encode(),
                ));
                return out;
            }
        }

        if !hello.compression_methods.contains(&0) {
            debug!(%peer, "ClientHello without null compression");
            out.replies.push(fatal_alert(AlertDescription::HandshakeFailure));
            return out;
        }

        let Some(suite) = self.config.cipher_suites.select(&hello.cipher_suites) else {
            info!(%peer, "handshake rejected: no common PSK cipher suite");
            out.replies.push(fatal_alert(AlertDescription::HandshakeFailure));
            return out;
        };

        let existing = self.session(&peer);
        if existing.is_none() && self.sessions.len() >= self.config.max_sessions {
            warn!(%peer, limit = self.config.max_sessions, "session table full, handshake dropped");
            return out;
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = self.time.now();
        let (session, flight) =
            SecureSession::start(id, peer, suite, hello, message_seq, raw, now);
        let replaced = self.sessions.insert(peer, Arc::new(Mutex::new(session)));

        if let Some(old) = replaced {
            let old_id = old.lock().id();
            info!(%peer, old = %old_id, new = %id, "session replaced by new handshake");
            out.events.push(SessionEvent::Closed {
                peer,
                id: old_id,
                reason: CloseReason::Replaced,
            });
        }
        info!(%peer, session = %id, %suite, "handshake started");
        out.replies.push(flight);
        out
    }

    /// First message if the datagram opens with a plaintext ClientHello.
    fn leading_client_hello<'a>(
        records: &[Record<'a>],
    ) -> Option<(u16, ClientHello, &'a [u8])> {
        let first = records.first()?;
        if first.epoch != 0 || first.content_type != ContentType::Handshake {
            return None;
        }
        let messages = HandshakeMessage::decode_all(first.fragment).ok()?;
        let (msg, raw) = messages.into_iter().next()?;
        match msg.body {
            HandshakeBody::ClientHello(hello) => Some((msg.message_seq, hello, raw)),
            _ => None,
        }
    }
}

fn fatal_alert(description: AlertDescription) -> Vec<u8> {
    encode_record(ContentType::Alert, 0, 0, &Alert::fatal(description).encode())
}

impl SecureTransport for SessionEngine {
    fn handle_datagram(&self, peer: SocketAddr, datagram: &[u8]) -> EngineOutput {
        let records = match parse_datagram(datagram) {
            Ok(records) => records,
            Err(err) => {
                debug!(%peer, error = %err, len = datagram.len(), "undecodable datagram dropped");
                return EngineOutput::default();
            }
        };

        if let Some((message_seq, hello, raw)) = Self::leading_client_hello(&records) {
            return self.on_client_hello(peer, &records[0], message_seq, &hello, raw);
        }

        let Some(handle) = self.session(&peer) else {
            trace!(%peer, "datagram for unknown peer dropped");
            return EngineOutput::default();
        };

        let limits = ProcessLimits {
            max_decrypt_failures: self.config.max_decrypt_failures,
        };
        let (step, id, suite, identity) = {
            let mut session = handle.lock();
            let step = session.process(&records, self.store.as_ref(), self.time.now(), limits);
            (step, session.id(), session.suite(), session.identity().cloned())
        };

        let mut out = EngineOutput {
            replies: step.replies,
            ..EngineOutput::default()
        };

        if step.established {
            if let Some(identity) = identity {
                info!(%peer, session = %id, %suite, %identity, "session established");
                out.events.push(SessionEvent::Established {
                    peer,
                    id,
                    suite,
                    identity,
                });
            }
        }
        if !step.delivered.is_empty() {
            out.delivered = Some(Delivered {
                session: id,
                payloads: step.delivered,
            });
        }
        if let Some(reason) = step.closed {
            self.remove_if_current(&peer, &handle);
            info!(%peer, session = %id, %reason, "session closed");
            out.events.push(SessionEvent::Closed { peer, id, reason });
        }
        out
    }

    fn encrypt(
        &self,
        peer: SocketAddr,
        session: SessionId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let handle = self.session(&peer).ok_or(SessionError::SessionClosed)?;
        let mut current = handle.lock();
        if current.id() != session {
            return Err(SessionError::SessionClosed);
        }
        current.encrypt(plaintext)
    }

    fn close(&self, peer: SocketAddr) -> Option<Vec<u8>> {
        let (_, handle) = self.sessions.remove(&peer)?;
        let mut session = handle.lock();
        info!(%peer, session = %session.id(), reason = %CloseReason::Local, "session closed");
        session.close_notify()
    }

    fn sweep(&self) -> Vec<(SocketAddr, CloseReason)> {
        let now = self.time.now();
        let handles: Vec<(SocketAddr, SessionHandle)> = self
            .sessions
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        let mut closed = Vec::new();
        for (peer, handle) in handles {
            let expired = {
                let session = handle.lock();
                session
                    .expired(now, self.config.handshake_timeout, self.config.idle_timeout)
                    .map(|reason| (session.id(), reason))
            };
            if let Some((id, reason)) = expired {
                self.remove_if_current(&peer, &handle);
                info!(%peer, session = %id, %reason, "session closed");
                closed.push((peer, reason));
            }
        }
        closed
    }

    fn state(&self, peer: SocketAddr) -> SessionState {
        self.session(&peer)
            .map(|handle| handle.lock().state())
            .unwrap_or(SessionState::Idle)
    }

    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
