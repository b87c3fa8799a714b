//! # Handshake Messages
//!
//! DTLS handshake framing (RFC 6347 §4.2.2) and the bodies used by the PSK
//! key exchange:
//!
//! ```text
//! Client                                   Server
//! ClientHello             -------->
//!                         <--------        HelloVerifyRequest (cookie)
//! ClientHello (cookie)    -------->
//!                                          ServerHello
//!                         <--------        ServerHelloDone
//! ClientKeyExchange (psk identity)
//! [ChangeCipherSpec]
//! Finished                -------->
//!                                          [ChangeCipherSpec]
//!                         <--------        Finished
//! Application Data        <------->        Application Data
//! ```
//!
//! Fragmented messages are rejected: constrained clients send each flight
//! in one datagram.

use super::errors::DecodeError;
use super::record::DTLS_1_2;
use super::wire::{Reader, Writer};

/// Handshake header size (type, length, message_seq, offset, fragment length).
pub const HANDSHAKE_HEADER_LEN: usize = 12;
/// verify_data length for every supported suite.
pub const VERIFY_DATA_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    HelloVerifyRequest = 3,
    ServerHelloDone = 14,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl TryFrom<u8> for HandshakeType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(HandshakeType::ClientHello),
            2 => Ok(HandshakeType::ServerHello),
            3 => Ok(HandshakeType::HelloVerifyRequest),
            14 => Ok(HandshakeType::ServerHelloDone),
            16 => Ok(HandshakeType::ClientKeyExchange),
            20 => Ok(HandshakeType::Finished),
            other => Err(DecodeError::UnknownHandshakeType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    /// Raw extensions block, ignored by the server.
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub version: u16,
    pub cookie: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub compression_method: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeBody {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloVerifyRequest(HelloVerifyRequest),
    ServerHelloDone,
    /// PSK identity (RFC 4279 §2)
    ClientKeyExchange { identity: Vec<u8> },
    Finished { verify_data: Vec<u8> },
}

impl HandshakeBody {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakeBody::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeBody::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeBody::HelloVerifyRequest(_) => HandshakeType::HelloVerifyRequest,
            HandshakeBody::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeBody::ClientKeyExchange { .. } => HandshakeType::ClientKeyExchange,
            HandshakeBody::Finished { .. } => HandshakeType::Finished,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HandshakeBody::ClientHello(_) => "ClientHello",
            HandshakeBody::ServerHello(_) => "ServerHello",
            HandshakeBody::HelloVerifyRequest(_) => "HelloVerifyRequest",
            HandshakeBody::ServerHelloDone => "ServerHelloDone",
            HandshakeBody::ClientKeyExchange { .. } => "ClientKeyExchange",
            HandshakeBody::Finished { .. } => "Finished",
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            HandshakeBody::ClientHello(h) => {
                w.u16(h.version)
                    .bytes(&h.random)
                    .vec8(&h.session_id)
                    .vec8(&h.cookie)
                    .u16((h.cipher_suites.len() * 2) as u16);
                for suite in &h.cipher_suites {
                    w.u16(*suite);
                }
                w.vec8(&h.compression_methods);
                if !h.extensions.is_empty() {
                    w.vec16(&h.extensions);
                }
            }
            HandshakeBody::ServerHello(h) => {
                w.u16(h.version)
                    .bytes(&h.random)
                    .vec8(&h.session_id)
                    .u16(h.cipher_suite)
                    .u8(h.compression_method);
            }
            HandshakeBody::HelloVerifyRequest(h) => {
                w.u16(h.version).vec8(&h.cookie);
            }
            HandshakeBody::ServerHelloDone => {}
            HandshakeBody::ClientKeyExchange { identity } => {
                w.vec16(identity);
            }
            HandshakeBody::Finished { verify_data } => {
                w.bytes(verify_data);
            }
        }
        w.into_inner()
    }

    fn decode_body(msg_type: HandshakeType, body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(body);
        let parsed = match msg_type {
            HandshakeType::ClientHello => {
                let version = r.u16()?;
                let random = r.array::<32>()?;
                let session_id = r.vec8()?.to_vec();
                if session_id.len() > 32 {
                    return Err(DecodeError::Malformed("session id"));
                }
                let cookie = r.vec8()?.to_vec();
                let suites = r.vec16()?;
                if suites.len() % 2 != 0 {
                    return Err(DecodeError::Malformed("cipher suite list"));
                }
                let cipher_suites = suites
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                let compression_methods = r.vec8()?.to_vec();
                let extensions = if r.remaining() > 0 {
                    r.vec16()?.to_vec()
                } else {
                    Vec::new()
                };
                HandshakeBody::ClientHello(ClientHello {
                    version,
                    random,
                    session_id,
                    cookie,
                    cipher_suites,
                    compression_methods,
                    extensions,
                })
            }
            HandshakeType::ServerHello => {
                let version = r.u16()?;
                let random = r.array::<32>()?;
                let session_id = r.vec8()?.to_vec();
                let cipher_suite = r.u16()?;
                let compression_method = r.u8()?;
                // extensions, if any, are ignored
                r.rest();
                HandshakeBody::ServerHello(ServerHello {
                    version,
                    random,
                    session_id,
                    cipher_suite,
                    compression_method,
                })
            }
            HandshakeType::HelloVerifyRequest => {
                let version = r.u16()?;
                let cookie = r.vec8()?.to_vec();
                HandshakeBody::HelloVerifyRequest(HelloVerifyRequest { version, cookie })
            }
            HandshakeType::ServerHelloDone => HandshakeBody::ServerHelloDone,
            HandshakeType::ClientKeyExchange => HandshakeBody::ClientKeyExchange {
                identity: r.vec16()?.to_vec(),
            },
            HandshakeType::Finished => HandshakeBody::Finished {
                verify_data: r.rest().to_vec(),
            },
        };

        if r.remaining() != 0 {
            return Err(DecodeError::Malformed("trailing bytes in handshake body"));
        }
        Ok(parsed)
    }
}

/// A complete handshake message plus its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub message_seq: u16,
    pub body: HandshakeBody,
}

impl HandshakeMessage {
    pub fn new(message_seq: u16, body: HandshakeBody) -> Self {
        Self { message_seq, body }
    }

    /// Header + body, exactly the bytes fed into the transcript hash.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.encode_body();
        let mut w = Writer::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
        w.u8(self.body.handshake_type() as u8)
            .u24(body.len() as u32)
            .u16(self.message_seq)
            .u24(0)
            .u24(body.len() as u32)
            .bytes(&body);
        w.into_inner()
    }

    /// Decode every message in a plaintext handshake fragment.
    ///
    /// Returns each message with its raw encoding (for the transcript).
    pub fn decode_all(fragment: &[u8]) -> Result<Vec<(HandshakeMessage, &[u8])>, DecodeError> {
        let mut r = Reader::new(fragment);
        let mut out = Vec::new();

        while r.remaining() > 0 {
            let start = r.position();
            let msg_type = HandshakeType::try_from(r.u8()?)?;
            let length = r.u24()?;
            let message_seq = r.u16()?;
            let fragment_offset = r.u24()?;
            let fragment_length = r.u24()?;
            if fragment_offset != 0 || fragment_length != length {
                return Err(DecodeError::Fragmented);
            }
            let body = r.bytes(length as usize)?;
            let raw = &fragment[start..r.position()];
            let body = HandshakeBody::decode_body(msg_type, body)?;
            out.push((HandshakeMessage { message_seq, body }, raw));
        }

        if out.is_empty() {
            return Err(DecodeError::Malformed("empty handshake fragment"));
        }
        Ok(out)
    }
}

/// ServerHello advertising `suite` with a fresh random and session id.
pub fn server_hello(random: [u8; 32], session_id: Vec<u8>, suite: u16) -> HandshakeBody {
    HandshakeBody::ServerHello(ServerHello {
        version: DTLS_1_2,
        random,
        session_id,
        cipher_suite: suite,
        compression_method: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hello(cookie: Vec<u8>) -> ClientHello {
        ClientHello {
            version: DTLS_1_2,
            random: [7u8; 32],
            session_id: Vec::new(),
            cookie,
            cipher_suites: vec![0x00A8, 0xC02B],
            compression_methods: vec![0],
            extensions: vec![0x00, 0x17, 0x00, 0x00],
        }
    }

    #[test]
    fn test_client_hello_decodes_with_extensions() {
        let msg = HandshakeMessage::new(1, HandshakeBody::ClientHello(sample_hello(vec![1, 2, 3])));
        let bytes = msg.encode();

        let decoded = HandshakeMessage::decode_all(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, msg);
        assert_eq!(decoded[0].1, &bytes[..]);
    }

    #[test]
    fn test_flight_with_two_messages() {
        let mut flight = HandshakeMessage::new(
            1,
            server_hello([9u8; 32], vec![1u8; 32], 0x00A8),
        )
        .encode();
        flight.extend(HandshakeMessage::new(2, HandshakeBody::ServerHelloDone).encode());

        let decoded = HandshakeMessage::decode_all(&flight).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].0.body, HandshakeBody::ServerHelloDone);
        assert_eq!(decoded[1].0.message_seq, 2);
        assert_eq!(decoded[1].1.len(), HANDSHAKE_HEADER_LEN);
    }

    #[test]
    fn test_fragmented_message_rejected() {
        let mut bytes = HandshakeMessage::new(
            3,
            HandshakeBody::ClientKeyExchange {
                identity: b"Client_identity".to_vec(),
            },
        )
        .encode();
        // fragment_offset = 1
        bytes[8] = 1;
        assert_eq!(
            HandshakeMessage::decode_all(&bytes).unwrap_err(),
            DecodeError::Fragmented
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let msg = HandshakeMessage::new(0, HandshakeBody::ServerHelloDone).encode();
        let mut bytes = msg.clone();
        // claim a 1-byte body on a message that must be empty
        bytes[3] = 1;
        bytes[11] = 1;
        bytes.push(0xAA);
        assert!(HandshakeMessage::decode_all(&bytes).is_err());
    }

    #[test]
    fn test_odd_suite_list_rejected() {
        let mut w = Writer::new();
        w.u16(DTLS_1_2).bytes(&[0u8; 32]).vec8(&[]).vec8(&[]).vec16(&[0x00]).vec8(&[0]);
        let body = w.into_inner();
        assert_eq!(
            HandshakeBody::decode_body(HandshakeType::ClientHello, &body).unwrap_err(),
            DecodeError::Malformed("cipher suite list")
        );
    }
}
