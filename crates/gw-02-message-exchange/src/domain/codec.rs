//! # Wire Codec
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```
//!
//! Option deltas and lengths use the 13 (+1 byte) and 14 (+2 bytes)
//! extended forms; nibble 15 is reserved for the payload marker.

use super::errors::CodecError;
use super::message::{Code, CoapOption, Message, MessageType};

pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 4;
pub const MAX_TOKEN_LEN: usize = 8;
const PAYLOAD_MARKER: u8 = 0xFF;

/// Type and message id of a datagram whose header is intact, even if the
/// rest is not. Used to reset malformed confirmable messages.
pub fn peek_header(bytes: &[u8]) -> Option<(MessageType, u16)> {
    if bytes.len() < HEADER_LEN || bytes[0] >> 6 != VERSION {
        return None;
    }
    let message_type = MessageType::from_bits(bytes[0] >> 4);
    Some((message_type, u16::from_be_bytes([bytes[2], bytes[3]])))
}

pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    if msg.token.len() > MAX_TOKEN_LEN {
        return Err(CodecError::InvalidTokenLength(msg.token.len()));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + msg.token.len() + msg.payload.len() + 16);
    out.push((VERSION << 6) | ((msg.message_type as u8) << 4) | msg.token.len() as u8);
    out.push(msg.code.0);
    out.extend_from_slice(&msg.message_id.to_be_bytes());
    out.extend_from_slice(&msg.token);

    let mut sorted: Vec<&CoapOption> = msg.options.iter().collect();
    sorted.sort_by_key(|o| o.number);

    let mut previous = 0u16;
    for opt in sorted {
        let delta = opt.number - previous;
        let length = opt.value.len();
        if length > usize::from(u16::MAX) + 269 {
            return Err(CodecError::OptionTooLong(opt.number));
        }
        let (delta_nibble, delta_ext) = nibble(u32::from(delta));
        let (length_nibble, length_ext) = nibble(length as u32);
        out.push((delta_nibble << 4) | length_nibble);
        out.extend_from_slice(&delta_ext);
        out.extend_from_slice(&length_ext);
        out.extend_from_slice(&opt.value);
        previous = opt.number;
    }

    if !msg.payload.is_empty() {
        out.push(PAYLOAD_MARKER);
        out.extend_from_slice(&msg.payload);
    }
    Ok(out)
}

fn nibble(value: u32) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, ((value - 269) as u16).to_be_bytes().to_vec()),
    }
}

pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TooShort(bytes.len()));
    }
    let version = bytes[0] >> 6;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let message_type = MessageType::from_bits(bytes[0] >> 4);
    let token_len = usize::from(bytes[0] & 0x0F);
    if token_len > MAX_TOKEN_LEN {
        return Err(CodecError::InvalidTokenLength(token_len));
    }
    let code = Code(bytes[1]);
    let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);

    if code.is_empty() {
        // Empty messages are exactly the 4-byte header.
        if token_len != 0 || bytes.len() != HEADER_LEN {
            return Err(CodecError::EmptyMessageNotEmpty);
        }
        return Ok(Message::new(message_type, code, message_id));
    }
    if code.class() == 1 || code.class() > 5 {
        return Err(CodecError::ReservedCode(code.0));
    }

    let rest = &bytes[HEADER_LEN..];
    if rest.len() < token_len {
        return Err(CodecError::Truncated("token"));
    }
    let (token, mut rest) = rest.split_at(token_len);

    let mut options = Vec::new();
    let mut number = 0u32;
    let mut payload = Vec::new();

    while let Some((&first, tail)) = rest.split_first() {
        if first == PAYLOAD_MARKER {
            if tail.is_empty() {
                return Err(CodecError::EmptyPayloadAfterMarker);
            }
            payload = tail.to_vec();
            break;
        }
        rest = tail;
        let delta = extended(first >> 4, &mut rest)?;
        let length = extended(first & 0x0F, &mut rest)? as usize;
        number += delta;
        if number > u32::from(u16::MAX) {
            return Err(CodecError::OptionNumberOverflow);
        }
        if rest.len() < length {
            return Err(CodecError::Truncated("option value"));
        }
        let (value, tail) = rest.split_at(length);
        options.push(CoapOption::new(number as u16, value));
        rest = tail;
    }

    Ok(Message {
        message_type,
        code,
        message_id,
        token: token.to_vec(),
        options,
        payload,
    })
}

fn extended(nibble: u8, rest: &mut &[u8]) -> Result<u32, CodecError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            let (&b, tail) = rest.split_first().ok_or(CodecError::Truncated("option header"))?;
            *rest = tail;
            Ok(u32::from(b) + 13)
        }
        14 => {
            if rest.len() < 2 {
                return Err(CodecError::Truncated("option header"));
            }
            let v = u16::from_be_bytes([rest[0], rest[1]]);
            *rest = &rest[2..];
            Ok(u32::from(v) + 269)
        }
        _ => Err(CodecError::ReservedOptionNibble),
    }
}
