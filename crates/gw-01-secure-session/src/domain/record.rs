//! # DTLS Record Layer
//!
//! ```text
//! +------+---------+-------+-----------------+--------+----------+
//! | type | version | epoch | sequence number | length | fragment |
//! |  u8  |   u16   |  u16  |       u48       |  u16   |  length  |
//! +------+---------+-------+-----------------+--------+----------+
//! ```
//!
//! A datagram carries one or more records back to back.

use super::errors::DecodeError;
use super::wire::{Reader, Writer};

/// DTLS 1.2 on the wire.
pub const DTLS_1_2: u16 = 0xFEFD;
/// DTLS 1.0, still used by some clients for the first ClientHello record.
pub const DTLS_1_0: u16 = 0xFEFF;
/// Fixed record header size.
pub const RECORD_HEADER_LEN: usize = 13;
/// Largest sequence number representable in 48 bits.
pub const MAX_SEQUENCE: u64 = (1 << 48) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl TryFrom<u8> for ContentType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            other => Err(DecodeError::UnknownContentType(other)),
        }
    }
}

/// A parsed record borrowing its fragment from the datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    pub content_type: ContentType,
    pub version: u16,
    pub epoch: u16,
    pub sequence: u64,
    pub fragment: &'a [u8],
}

impl<'a> Record<'a> {
    /// `epoch << 48 | sequence`, the value used for nonces and AAD.
    pub fn epoch_seq(&self) -> u64 {
        epoch_seq(self.epoch, self.sequence)
    }
}

pub fn epoch_seq(epoch: u16, sequence: u64) -> u64 {
    (u64::from(epoch) << 48) | (sequence & MAX_SEQUENCE)
}

/// Split a datagram into records.
pub fn parse_datagram(datagram: &[u8]) -> Result<Vec<Record<'_>>, DecodeError> {
    let mut reader = Reader::new(datagram);
    let mut records = Vec::new();

    while reader.remaining() > 0 {
        let content_type = ContentType::try_from(reader.u8()?)?;
        let version = reader.u16()?;
        if version != DTLS_1_2 && version != DTLS_1_0 {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let epoch = reader.u16()?;
        let sequence = reader.u48()?;
        let fragment = reader.vec16()?;
        records.push(Record {
            content_type,
            version,
            epoch,
            sequence,
            fragment,
        });
    }

    if records.is_empty() {
        return Err(DecodeError::Truncated {
            needed: RECORD_HEADER_LEN,
            available: 0,
        });
    }
    Ok(records)
}

/// Encode one record (fragment already protected if epoch > 0).
pub fn encode_record(content_type: ContentType, epoch: u16, sequence: u64, fragment: &[u8]) -> Vec<u8> {
    let mut w = Writer::with_capacity(RECORD_HEADER_LEN + fragment.len());
    w.u8(content_type as u8)
        .u16(DTLS_1_2)
        .u16(epoch)
        .u48(sequence)
        .vec16(fragment);
    w.into_inner()
}

/// Additional data for AEAD records:
/// `epoch || seq || type || version || plaintext length`.
pub fn additional_data(epoch_seq: u64, content_type: ContentType, plaintext_len: usize) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&epoch_seq.to_be_bytes());
    aad[8] = content_type as u8;
    aad[9..11].copy_from_slice(&DTLS_1_2.to_be_bytes());
    aad[11..13].copy_from_slice(&(plaintext_len as u16).to_be_bytes());
    aad
}

/// Sliding anti-replay window (RFC 6347 §4.1.2.6), 64 records wide.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    latest: Option<u64>,
    bitmap: u64,
}

impl ReplayWindow {
    pub const WIDTH: u64 = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// True if `seq` is new and inside the window. Does not record it.
    pub fn is_fresh(&self, seq: u64) -> bool {
        match self.latest {
            None => true,
            Some(latest) if seq > latest => true,
            Some(latest) => {
                let offset = latest - seq;
                offset < Self::WIDTH && self.bitmap & (1 << offset) == 0
            }
        }
    }

    /// Record `seq` as received. Only call after the record authenticated.
    pub fn mark(&mut self, seq: u64) {
        match self.latest {
            None => {
                self.latest = Some(seq);
                self.bitmap = 1;
            }
            Some(latest) if seq > latest => {
                let shift = seq - latest;
                self.bitmap = if shift >= Self::WIDTH {
                    1
                } else {
                    (self.bitmap << shift) | 1
                };
                self.latest = Some(seq);
            }
            Some(latest) => {
                let offset = latest - seq;
                if offset < Self::WIDTH {
                    self.bitmap |= 1 << offset;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_records() {
        let mut datagram = encode_record(ContentType::Handshake, 0, 1, b"abc");
        datagram.extend(encode_record(ContentType::ChangeCipherSpec, 0, 2, &[1]));

        let records = parse_datagram(&datagram).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content_type, ContentType::Handshake);
        assert_eq!(records[0].fragment, b"abc");
        assert_eq!(records[1].sequence, 2);
        assert_eq!(records[1].fragment, &[1]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_datagram(&[]).is_err());
        assert_eq!(
            parse_datagram(&[99, 0xFE, 0xFD]).unwrap_err(),
            DecodeError::UnknownContentType(99)
        );
        let mut bad_version = encode_record(ContentType::Alert, 0, 0, &[1, 0]);
        bad_version[1] = 0x03;
        bad_version[2] = 0x03;
        assert_eq!(
            parse_datagram(&bad_version).unwrap_err(),
            DecodeError::UnsupportedVersion(0x0303)
        );
    }

    #[test]
    fn test_parse_rejects_truncated_fragment() {
        let mut datagram = encode_record(ContentType::ApplicationData, 1, 0, b"hello");
        datagram.truncate(datagram.len() - 2);
        assert!(matches!(
            parse_datagram(&datagram),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_epoch_seq_packing() {
        assert_eq!(epoch_seq(1, 5), (1u64 << 48) | 5);
        let aad = additional_data(epoch_seq(1, 5), ContentType::ApplicationData, 300);
        assert_eq!(&aad[..2], &[0, 1]);
        assert_eq!(aad[8], 23);
        assert_eq!(&aad[11..], &300u16.to_be_bytes());
    }

    #[test]
    fn test_replay_window_rejects_duplicates() {
        let mut w = ReplayWindow::new();
        assert!(w.is_fresh(0));
        w.mark(0);
        assert!(!w.is_fresh(0));
        assert!(w.is_fresh(1));
        w.mark(5);
        assert!(w.is_fresh(3));
        w.mark(3);
        assert!(!w.is_fresh(3));
        assert!(!w.is_fresh(5));
    }

    #[test]
    fn test_replay_window_drops_too_old() {
        let mut w = ReplayWindow::new();
        w.mark(100);
        assert!(w.is_fresh(100 - 63));
        assert!(!w.is_fresh(100 - 64));
        w.mark(1000);
        assert!(!w.is_fresh(100));
        assert!(w.is_fresh(999));
    }
}
