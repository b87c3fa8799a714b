//! Client-role PSK handshake driver, used to exercise the server engine
//! in tests. Not hardened: no retransmission timers and no replay window.

use shared_crypto::{constant_time_eq, SecretKey, TranscriptHasher};

use crate::domain::alert::{Alert, AlertDescription};
use crate::domain::cipher_suite::{CipherSuite, PskCipherSuites};
use crate::domain::errors::HandshakeError;
use crate::domain::handshake::{ClientHello, HandshakeBody, HandshakeMessage};
use crate::domain::keys::{master_secret, verify_data, Role, SessionKeys};
use crate::domain::psk::premaster_secret;
use crate::domain::record::{
    additional_data, encode_record, epoch_seq, parse_datagram, ContentType, Record, DTLS_1_2,
};

/// What the client made of one server datagram.
#[derive(Debug, Default)]
pub struct ClientStep {
    /// Datagram the client wants to send next.
    pub reply: Option<Vec<u8>>,
    pub established: bool,
    pub data: Vec<Vec<u8>>,
    pub alert: Option<AlertDescription>,
}

pub struct PskClient {
    identity: Vec<u8>,
    secret: Vec<u8>,
    offered: Vec<CipherSuite>,
    random: [u8; 32],
    cookie: Vec<u8>,
    next_message_seq: u16,
    last_hello: Vec<u8>,

    suite: Option<CipherSuite>,
    server_random: [u8; 32],
    transcript: Option<TranscriptHasher>,
    master: Option<SecretKey>,
    keys: Option<SessionKeys>,
    write_seq: [u64; 2],
    established: bool,
}

impl PskClient {
    /// Client offering every PSK suite of the default preference list.
    pub fn new(identity: impl Into<Vec<u8>>, secret: impl Into<Vec<u8>>) -> Self {
        let offered = PskCipherSuites::filter(&CipherSuite::STRONG_ENCRYPTION_PREFERENCE);
        Self::with_suites(identity, secret, offered.as_slice().to_vec())
    }

    pub fn with_suites(
        identity: impl Into<Vec<u8>>,
        secret: impl Into<Vec<u8>>,
        offered: Vec<CipherSuite>,
    ) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
            offered,
            random: rand::random(),
            cookie: Vec::new(),
            next_message_seq: 0,
            last_hello: Vec::new(),
            suite: None,
            server_random: [0u8; 32],
            transcript: None,
            master: None,
            keys: None,
            write_seq: [0, 0],
            established: false,
        }
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn suite(&self) -> Option<CipherSuite> {
        self.suite
    }

    /// ClientHello datagram carrying the current cookie (empty at first).
    pub fn client_hello(&mut self) -> Vec<u8> {
        let msg = self.next_message(HandshakeBody::ClientHello(ClientHello {
            version: DTLS_1_2,
            random: self.random,
            session_id: Vec::new(),
            cookie: self.cookie.clone(),
            cipher_suites: self.offered.iter().map(|s| s.code()).collect(),
            compression_methods: vec![0],
            extensions: Vec::new(),
        }));
        self.last_hello = msg.encode();
        let hello = self.last_hello.clone();
        self.plaintext_record(ContentType::Handshake, &hello)
    }

    /// Feed a datagram received from the server.
    pub fn handle(&mut self, datagram: &[u8]) -> Result<ClientStep, HandshakeError> {
        let mut step = ClientStep::default();
        for record in parse_datagram(datagram)? {
            match (record.epoch, record.content_type) {
                (0, ContentType::Handshake) => {
                    for (msg, raw) in HandshakeMessage::decode_all(record.fragment)? {
                        self.on_plaintext_handshake(msg, raw, &mut step)?;
                    }
                }
                (0, ContentType::Alert) => {
                    step.alert = Some(Alert::decode(record.fragment)?.description);
                }
                (1, _) => self.on_protected(&record, &mut step)?,
                _ => {}
            }
        }
        Ok(step)
    }

    /// Application data record for the server.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        self.protected_record(ContentType::ApplicationData, plaintext)
    }

    pub fn close_notify(&mut self) -> Result<Vec<u8>, HandshakeError> {
        self.protected_record(ContentType::Alert, &Alert::close_notify().encode())
    }

    fn on_plaintext_handshake(
        &mut self,
        msg: HandshakeMessage,
        raw: &[u8],
        step: &mut ClientStep,
    ) -> Result<(), HandshakeError> {
        match msg.body {
            HandshakeBody::HelloVerifyRequest(hvr) => {
                self.cookie = hvr.cookie;
                step.reply = Some(self.client_hello());
            }
            HandshakeBody::ServerHello(hello) if self.transcript.is_none() => {
                let suite = CipherSuite::from_code(hello.cipher_suite)
                    .ok_or(HandshakeError::NoCommonCipherSuite)?;
                let mut transcript = TranscriptHasher::new(suite.prf_hash());
                transcript.update(&self.last_hello).update(raw);
                self.transcript = Some(transcript);
                self.suite = Some(suite);
                self.server_random = hello.random;
            }
            HandshakeBody::ServerHelloDone if self.keys.is_none() => {
                if let Some(transcript) = self.transcript.as_mut() {
                    transcript.update(raw);
                }
                step.reply = Some(self.key_exchange_flight()?);
            }
            _ => {}
        }
        Ok(())
    }

    fn key_exchange_flight(&mut self) -> Result<Vec<u8>, HandshakeError> {
        let suite = self.suite.ok_or(HandshakeError::UnexpectedMessage {
            message: "ServerHelloDone",
            state: "AwaitingServerHello",
        })?;

        let premaster = premaster_secret(&self.secret);
        let master = master_secret(suite, &premaster, &self.random, &self.server_random)?;
        self.keys = Some(SessionKeys::derive(
            suite,
            &master,
            &self.random,
            &self.server_random,
            Role::Client,
        )?);

        let cke = self
            .next_message(HandshakeBody::ClientKeyExchange {
                identity: self.identity.clone(),
            })
            .encode();
        let mut flight = self.plaintext_record(ContentType::Handshake, &cke);
        flight.extend(self.plaintext_record(ContentType::ChangeCipherSpec, &[1]));

        let transcript = self.transcript.as_mut().ok_or(HandshakeError::UnexpectedMessage {
            message: "ServerHelloDone",
            state: "AwaitingServerHello",
        })?;
        transcript.update(&cke);
        let ours = verify_data(suite, &master, Role::Client, &transcript.current())?;
        let finished = self
            .next_message(HandshakeBody::Finished { verify_data: ours })
            .encode();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.update(&finished);
        }
        flight.extend(self.protected_record(ContentType::Handshake, &finished)?);

        self.master = Some(master);
        Ok(flight)
    }

    fn on_protected(&mut self, record: &Record<'_>, step: &mut ClientStep) -> Result<(), HandshakeError> {
        let keys = self.keys.as_ref().ok_or(HandshakeError::FinishedDecryptFailed)?;
        let plaintext_len = record
            .fragment
            .len()
            .checked_sub(keys.read.algorithm().overhead())
            .ok_or(HandshakeError::FinishedDecryptFailed)?;
        let aad = additional_data(record.epoch_seq(), record.content_type, plaintext_len);
        let plaintext = keys
            .read
            .open(record.epoch_seq(), &aad, record.fragment)
            .map_err(|_| HandshakeError::FinishedDecryptFailed)?;

        match record.content_type {
            ContentType::Handshake if !self.established => {
                for (msg, _) in HandshakeMessage::decode_all(&plaintext)? {
                    let HandshakeBody::Finished { verify_data: received } = msg.body else {
                        continue;
                    };
                    let (suite, master, transcript) =
                        match (self.suite, self.master.as_ref(), self.transcript.as_ref()) {
                            (Some(s), Some(m), Some(t)) => (s, m, t),
                            _ => return Err(HandshakeError::FinishedMismatch),
                        };
                    let expected = verify_data(suite, master, Role::Server, &transcript.current())?;
                    if !constant_time_eq(&expected, &received) {
                        return Err(HandshakeError::FinishedMismatch);
                    }
                    self.established = true;
                    step.established = true;
                }
            }
            ContentType::ApplicationData => step.data.push(plaintext),
            ContentType::Alert => step.alert = Some(Alert::decode(&plaintext)?.description),
            _ => {}
        }
        Ok(())
    }

    fn next_message(&mut self, body: HandshakeBody) -> HandshakeMessage {
        let msg = HandshakeMessage::new(self.next_message_seq, body);
        self.next_message_seq = self.next_message_seq.wrapping_add(1);
        msg
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
    ) -> Result<Vec<u8>, HandshakeError> {
        let keys = self.keys.as_ref().ok_or(HandshakeError::UnexpectedMessage {
            message: "ApplicationData",
            state: "NoKeys",
        })?;
        let seq = self.write_seq[1];
        let nonce_seq = epoch_seq(1, seq);
        let aad = additional_data(nonce_seq, content_type, plaintext.len());
        let fragment = keys.write.seal(nonce_seq, &aad, plaintext)?;
        self.write_seq[1] += 1;
        Ok(encode_record(content_type, 1, seq, &fragment))
    }
}
