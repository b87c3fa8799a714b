//! # Per-Peer Server Session
//!
//! Drives one peer from the cookie-verified ClientHello to `Established`
//! and protects application data afterwards. Owned by the engine behind a
//! mutex; every method runs with exclusive access.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use shared_crypto::{constant_time_eq, SecretKey, TranscriptHasher};
use tracing::{debug, trace};

use crate::domain::alert::{Alert, AlertDescription, AlertLevel};
use crate::domain::cipher_suite::CipherSuite;
use crate::domain::errors::{HandshakeError, SessionError};
use crate::domain::handshake::{server_hello, ClientHello, HandshakeBody, HandshakeMessage};
use crate::domain::keys::{master_secret, verify_data, Role, SessionKeys};
use crate::domain::psk::{premaster_secret, PskIdentity};
use crate::domain::record::{
    additional_data, encode_record, epoch_seq, ContentType, Record, ReplayWindow,
};
use crate::domain::value_objects::{CloseReason, SessionId, SessionState};
use crate::ports::outbound::PskKeyStore;

/// What one datagram did to the session.
#[derive(Debug, Default)]
pub struct SessionStep {
    pub replies: Vec<Vec<u8>>,
    pub delivered: Vec<Vec<u8>>,
    /// Set when the handshake completed during this datagram.
    pub established: bool,
    /// Set when the session must be removed.
    pub closed: Option<CloseReason>,
}

/// Limits applied while processing records.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    pub max_decrypt_failures: u32,
}

pub struct SecureSession {
    id: SessionId,
    peer: SocketAddr,
    suite: CipherSuite,
    state: SessionState,

    client_random: [u8; 32],
    server_random: [u8; 32],
    transcript: TranscriptHasher,
    master: Option<SecretKey>,
    keys: Option<SessionKeys>,
    identity: Option<PskIdentity>,

    read_epoch: u16,
    write_epoch: u16,
    write_seq: [u64; 2],
    replay: [ReplayWindow; 2],
    next_send_msg_seq: u16,
    next_receive_msg_seq: u16,

    decrypt_failures: u32,
    last_flight: Vec<u8>,
    created_at: Instant,
    last_activity: Instant,
}

impl std::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("suite", &self.suite)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl SecureSession {
    /// Accept a cookie-verified ClientHello and build the
    /// ServerHello + ServerHelloDone flight.
    pub fn start(
        id: SessionId,
        peer: SocketAddr,
        suite: CipherSuite,
        hello: &ClientHello,
        hello_message_seq: u16,
        hello_raw: &[u8],
        now: Instant,
    ) -> (Self, Vec<u8>) {
        let mut session = Self {
            id,
            peer,
            suite,
            state: SessionState::HandshakeInProgress,
            client_random: hello.random,
            server_random: rand::random(),
            transcript: TranscriptHasher::new(suite.prf_hash()),
            master: None,
            keys: None,
            identity: None,
            read_epoch: 0,
            write_epoch: 0,
            write_seq: [0, 0],
            replay: [ReplayWindow::new(), ReplayWindow::new()],
            next_send_msg_seq: hello_message_seq,
            next_receive_msg_seq: hello_message_seq.wrapping_add(1),
            decrypt_failures: 0,
            last_flight: Vec::new(),
            created_at: now,
            last_activity: now,
        };
        session.transcript.update(hello_raw);

        let session_id: [u8; 32] = rand::random();
        let hello = session.next_message(server_hello(
            session.server_random,
            session_id.to_vec(),
            suite.code(),
        ));
        let done = session.next_message(HandshakeBody::ServerHelloDone);

        let mut flight = Vec::new();
        for msg in [hello, done] {
            let encoded = msg.encode();
            session.transcript.update(&encoded);
            flight.extend(session.plaintext_record(ContentType::Handshake, &encoded));
        }
        session.last_flight = flight.clone();
        (session, flight)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn identity(&self) -> Option<&PskIdentity> {
        self.identity.as_ref()
    }

    pub fn client_random(&self) -> &[u8; 32] {
        &self.client_random
    }

    pub fn decrypt_failures(&self) -> u32 {
        self.decrypt_failures
    }

    /// The flight we would resend on a client retransmission.
    pub fn last_flight(&self) -> &[u8] {
        &self.last_flight
    }

    /// Timeout check used by the sweeper.
    pub fn expired(
        &self,
        now: Instant,
        handshake_timeout: Duration,
        idle_timeout: Duration,
    ) -> Option<CloseReason> {
        match self.state {
            SessionState::HandshakeInProgress
                if now.saturating_duration_since(self.created_at) > handshake_timeout =>
            {
                Some(CloseReason::HandshakeTimeout)
            }
            SessionState::Established
                if now.saturating_duration_since(self.last_activity) > idle_timeout =>
            {
                Some(CloseReason::IdleTimeout)
            }
            _ => None,
        }
    }

    /// Process every record of one datagram.
    pub fn process(
        &mut self,
        records: &[Record<'_>],
        store: &dyn PskKeyStore,
        now: Instant,
        limits: ProcessLimits,
    ) -> SessionStep {
        let mut step = SessionStep::default();
        let mut resend = false;

        for record in records {
            if step.closed.is_some() {
                break;
            }
            let result = self.process_record(record, store, now, limits, &mut step, &mut resend);
            if let Err(err) = result {
                match self.state {
                    SessionState::HandshakeInProgress => {
                        debug!(peer = %self.peer, session = %self.id, error = %err, "handshake failed");
                        let description = err.alert();
                        if let Some(alert) = description {
                            if let Ok(datagram) = self.alert_record(Alert::fatal(alert)) {
                                step.replies.push(datagram);
                            }
                        }
                        let reported = match err {
                            HandshakeError::PeerAlert(d) => d,
                            _ => description.unwrap_or(AlertDescription::InternalError),
                        };
                        self.state = SessionState::Closed;
                        step.closed = Some(CloseReason::HandshakeFailed(reported));
                    }
                    _ => {
                        debug!(peer = %self.peer, session = %self.id, error = %err, "record dropped");
                    }
                }
            }
        }

        if resend && step.closed.is_none() && !self.last_flight.is_empty() {
            trace!(peer = %self.peer, "retransmitting last flight");
            step.replies.insert(0, self.last_flight.clone());
        }
        step
    }

    fn process_record(
        &mut self,
        record: &Record<'_>,
        store: &dyn PskKeyStore,
        now: Instant,
        limits: ProcessLimits,
        step: &mut SessionStep,
        resend: &mut bool,
    ) -> Result<(), HandshakeError> {
        match record.epoch {
            0 => self.process_plaintext(record, store, resend, step),
            1 => self.process_protected(record, now, limits, step, resend),
            other => {
                trace!(peer = %self.peer, epoch = other, "record from unknown epoch dropped");
                Ok(())
            }
        }
    }

    // =========================================================================
    // EPOCH 0 (PLAINTEXT)
    // =========================================================================

    fn process_plaintext(
        &mut self,
        record: &Record<'_>,
        store: &dyn PskKeyStore,
        resend: &mut bool,
        step: &mut SessionStep,
    ) -> Result<(), HandshakeError> {
        match record.content_type {
            ContentType::Handshake => {
                if self.state != SessionState::HandshakeInProgress {
                    // Client missed our final flight and repeated its own.
                    *resend = true;
                    return Ok(());
                }
                for (msg, raw) in HandshakeMessage::decode_all(record.fragment)? {
                    self.on_plaintext_handshake(msg, raw, store, resend)?;
                }
                Ok(())
            }
            ContentType::ChangeCipherSpec => {
                if self.state != SessionState::HandshakeInProgress {
                    return Ok(());
                }
                if record.fragment != [1u8].as_slice() {
                    return Err(crate::domain::DecodeError::Malformed("change_cipher_spec").into());
                }
                if self.keys.is_none() {
                    return Err(self.unexpected("ChangeCipherSpec"));
                }
                self.read_epoch = 1;
                Ok(())
            }
            ContentType::Alert => {
                // Unauthenticated alerts cannot tear down an established session.
                if self.state != SessionState::HandshakeInProgress {
                    return Ok(());
                }
                let alert = Alert::decode(record.fragment)?;
                if alert.is_terminal() {
                    self.state = SessionState::Closed;
                    step.closed = Some(CloseReason::HandshakeFailed(alert.description));
                }
                Ok(())
            }
            ContentType::ApplicationData => {
                trace!(peer = %self.peer, "plaintext application data dropped");
                Ok(())
            }
        }
    }

    fn on_plaintext_handshake(
        &mut self,
        msg: HandshakeMessage,
        raw: &[u8],
        store: &dyn PskKeyStore,
        resend: &mut bool,
    ) -> Result<(), HandshakeError> {
        if msg.message_seq < self.next_receive_msg_seq {
            *resend = true;
            return Ok(());
        }
        if msg.message_seq > self.next_receive_msg_seq {
            trace!(peer = %self.peer, seq = msg.message_seq, "future handshake message dropped");
            return Ok(());
        }

        match msg.body {
            HandshakeBody::ClientKeyExchange { identity } if self.keys.is_none() => {
                let secret = store
                    .lookup(&identity)
                    .map_err(|_| HandshakeError::UnknownPskIdentity)?;
                let identity =
                    PskIdentity::new(identity).map_err(|_| HandshakeError::UnknownPskIdentity)?;

                let premaster = premaster_secret(secret.as_bytes());
                let master = master_secret(
                    self.suite,
                    &premaster,
                    &self.client_random,
                    &self.server_random,
                )?;
                self.keys = Some(SessionKeys::derive(
                    self.suite,
                    &master,
                    &self.client_random,
                    &self.server_random,
                    Role::Server,
                )?);
                self.master = Some(master);
                self.identity = Some(identity);
                self.transcript.update(raw);
                self.next_receive_msg_seq = self.next_receive_msg_seq.wrapping_add(1);
                Ok(())
            }
            other => Err(self.unexpected(other.name())),
        }
    }

    // =========================================================================
    // EPOCH 1 (PROTECTED)
    // =========================================================================

    fn process_protected(
        &mut self,
        record: &Record<'_>,
        now: Instant,
        limits: ProcessLimits,
        step: &mut SessionStep,
        resend: &mut bool,
    ) -> Result<(), HandshakeError> {
        if self.read_epoch < 1 {
            trace!(peer = %self.peer, "epoch 1 record before ChangeCipherSpec dropped");
            return Ok(());
        }
        if !self.replay[1].is_fresh(record.sequence) {
            trace!(peer = %self.peer, seq = record.sequence, "replayed record dropped");
            return Ok(());
        }

        let plaintext = match self.open(record) {
            Ok(plaintext) => plaintext,
            Err(_) if self.state == SessionState::HandshakeInProgress => {
                return Err(HandshakeError::FinishedDecryptFailed);
            }
            Err(_) => {
                self.decrypt_failures += 1;
                debug!(
                    peer = %self.peer,
                    session = %self.id,
                    failures = self.decrypt_failures,
                    "record failed authentication"
                );
                if self.decrypt_failures > limits.max_decrypt_failures {
                    self.state = SessionState::Closed;
                    step.closed = Some(CloseReason::DecryptFailures);
                }
                return Ok(());
            }
        };
        self.replay[1].mark(record.sequence);
        self.decrypt_failures = 0;

        match (record.content_type, self.state) {
            (ContentType::Handshake, SessionState::HandshakeInProgress) => {
                let messages = HandshakeMessage::decode_all(&plaintext)?;
                for (msg, raw) in messages {
                    self.on_client_finished(msg, raw, step)?;
                }
                self.last_activity = now;
                Ok(())
            }
            (ContentType::Handshake, SessionState::Established) => {
                *resend = true;
                Ok(())
            }
            (ContentType::ApplicationData, SessionState::Established) => {
                self.last_activity = now;
                step.delivered.push(plaintext);
                Ok(())
            }
            (ContentType::Alert, state) => {
                let alert = Alert::decode(&plaintext)?;
                if alert.description == AlertDescription::CloseNotify {
                    if let Ok(reply) = self.alert_record(Alert::close_notify()) {
                        step.replies.push(reply);
                    }
                }
                if alert.is_terminal() {
                    step.closed = Some(match state {
                        SessionState::HandshakeInProgress => {
                            CloseReason::HandshakeFailed(alert.description)
                        }
                        _ => CloseReason::PeerClosed,
                    });
                    self.state = SessionState::Closed;
                } else if alert.level == AlertLevel::Warning {
                    trace!(peer = %self.peer, alert = ?alert.description, "warning alert ignored");
                }
                Ok(())
            }
            (content_type, state) => {
                trace!(peer = %self.peer, ?content_type, state = state.name(), "record ignored");
                Ok(())
            }
        }
    }

    fn on_client_finished(
        &mut self,
        msg: HandshakeMessage,
        raw: &[u8],
        step: &mut SessionStep,
    ) -> Result<(), HandshakeError> {
        let received = match msg.body {
            HandshakeBody::Finished { verify_data } => verify_data,
            other => return Err(self.unexpected(other.name())),
        };
        if msg.message_seq != self.next_receive_msg_seq {
            return Err(self.unexpected("Finished"));
        }
        let master = self
            .master
            .clone()
            .ok_or_else(|| self.unexpected("Finished"))?;

        let expected = verify_data(self.suite, &master, Role::Client, &self.transcript.current())?;
        if !constant_time_eq(&expected, &received) {
            return Err(HandshakeError::FinishedMismatch);
        }
        self.transcript.update(raw);
        self.next_receive_msg_seq = self.next_receive_msg_seq.wrapping_add(1);

        let ours = verify_data(self.suite, &master, Role::Server, &self.transcript.current())?;
        let finished = self
            .next_message(HandshakeBody::Finished { verify_data: ours })
            .encode();

        let mut flight = self.plaintext_record(ContentType::ChangeCipherSpec, &[1]);
        self.write_epoch = 1;
        flight.extend(self.protected_record(ContentType::Handshake, &finished)?);

        self.transcript.update(&finished);
        self.state = SessionState::Established;
        self.last_flight = flight.clone();
        step.replies.push(flight);
        step.established = true;
        Ok(())
    }

    // =========================================================================
    // RECORD PROTECTION
    // =========================================================================

    /// Protect application data. Only valid once established.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        match self.state {
            SessionState::Established => self
                .protected_record(ContentType::ApplicationData, plaintext)
                .map_err(SessionError::from),
            SessionState::Closed => Err(SessionError::SessionClosed),
            _ => Err(SessionError::NotEstablished),
        }
    }

    /// close_notify for a locally initiated close.
    pub fn close_notify(&mut self) -> Option<Vec<u8>> {
        let datagram = self.alert_record(Alert::close_notify()).ok();
        self.state = SessionState::Closed;
        datagram
    }

    fn open(&self, record: &Record<'_>) -> Result<Vec<u8>, SessionError> {
        let keys = self.keys.as_ref().ok_or(SessionError::NotEstablished)?;
        let overhead = keys.read.algorithm().overhead();
        let plaintext_len = record
            .fragment
            .len()
            .checked_sub(overhead)
            .ok_or(SessionError::AuthenticationFailure)?;
        let aad = additional_data(record.epoch_seq(), record.content_type, plaintext_len);
        keys.read
            .open(record.epoch_seq(), &aad, record.fragment)
            .map_err(|_| SessionError::AuthenticationFailure)
    }

    fn alert_record(&mut self, alert: Alert) -> Result<Vec<u8>, SessionError> {
        let body = alert.encode();
        if self.write_epoch == 0 {
            Ok(self.plaintext_record(ContentType::Alert, &body))
        } else {
            self.protected_record(ContentType::Alert, &body)
                .map_err(SessionError::from)
        }
    }

    fn plaintext_record(&mut self, content_type: ContentType, fragment: &[u8]) -> Vec<u8> {
        let seq = self.write_seq[0];
        self.write_seq[0] += 1;
        encode_record(content_type, 0, seq, fragment)
    }

    fn protected_record(
        &mut self,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, shared_crypto::CryptoError> {
        let keys = self.keys.as_ref().ok_or_else(|| {
            shared_crypto::CryptoError::InvalidInput("no write keys".to_string())
        })?;
        let seq = self.write_seq[1];
        let nonce_seq = epoch_seq(1, seq);
        let aad = additional_data(nonce_seq, content_type, plaintext.len());
        let fragment = keys.write.seal(nonce_seq, &aad, plaintext)?;
        self.write_seq[1] += 1;
        Ok(encode_record(content_type, 1, seq, &fragment))
    }

    fn next_message(&mut self, body: HandshakeBody) -> HandshakeMessage {
        let msg = HandshakeMessage::new(self.next_send_msg_seq, body);
        self.next_send_msg_seq = self.next_send_msg_seq.wrapping_add(1);
        msg
    }

    fn unexpected(&self, message: &'static str) -> HandshakeError {
        HandshakeError::UnexpectedMessage {
            message,
            state: self.state.name(),
        }
    }
}
