//! # Messages
//!
//! Constrained-application messages (RFC 7252 §3): type, code, message id,
//! token, options and payload.

use std::fmt;

/// Message type (2 bits on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl MessageType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }

    pub fn abbrev(self) -> &'static str {
        match self {
            MessageType::Confirmable => "CON",
            MessageType::NonConfirmable => "NON",
            MessageType::Acknowledgement => "ACK",
            MessageType::Reset => "RST",
        }
    }
}

/// Request method or response code, `c.dd`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code::new(0, 0);

    pub const GET: Code = Code::new(0, 1);
    pub const POST: Code = Code::new(0, 2);
    pub const PUT: Code = Code::new(0, 3);
    pub const DELETE: Code = Code::new(0, 4);

    pub const CREATED: Code = Code::new(2, 1);
    pub const DELETED: Code = Code::new(2, 2);
    pub const VALID: Code = Code::new(2, 3);
    pub const CHANGED: Code = Code::new(2, 4);
    pub const CONTENT: Code = Code::new(2, 5);

    pub const BAD_REQUEST: Code = Code::new(4, 0);
    pub const UNAUTHORIZED: Code = Code::new(4, 1);
    pub const BAD_OPTION: Code = Code::new(4, 2);
    pub const NOT_FOUND: Code = Code::new(4, 4);
    pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);

    pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
    pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);
    pub const GATEWAY_TIMEOUT: Code = Code::new(5, 4);

    pub const fn new(class: u8, detail: u8) -> Self {
        Code((class << 5) | (detail & 0x1F))
    }

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    pub fn is_response(self) -> bool {
        matches!(self.class(), 2..=5)
    }

    pub fn method(self) -> Option<Method> {
        match self {
            Code::GET => Some(Method::Get),
            Code::POST => Some(Method::Post),
            Code::PUT => Some(Method::Put),
            Code::DELETE => Some(Method::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = self.method() {
            return write!(f, "{:?}", method);
        }
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({})", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for Code {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Code::GET,
            Method::Post => Code::POST,
            Method::Put => Code::PUT,
            Method::Delete => Code::DELETE,
        }
    }
}

/// Registered option numbers.
pub mod option {
    pub const IF_MATCH: u16 = 1;
    pub const URI_HOST: u16 = 3;
    pub const ETAG: u16 = 4;
    pub const IF_NONE_MATCH: u16 = 5;
    pub const OBSERVE: u16 = 6;
    pub const URI_PORT: u16 = 7;
    pub const LOCATION_PATH: u16 = 8;
    pub const URI_PATH: u16 = 11;
    pub const CONTENT_FORMAT: u16 = 12;
    pub const MAX_AGE: u16 = 14;
    pub const URI_QUERY: u16 = 15;
    pub const ACCEPT: u16 = 17;
    pub const LOCATION_QUERY: u16 = 20;
    pub const BLOCK2: u16 = 23;
    pub const BLOCK1: u16 = 27;
    pub const SIZE2: u16 = 28;
    pub const PROXY_URI: u16 = 35;
    pub const PROXY_SCHEME: u16 = 39;
    pub const SIZE1: u16 = 60;

    pub const KNOWN: [u16; 19] = [
        IF_MATCH,
        URI_HOST,
        ETAG,
        IF_NONE_MATCH,
        OBSERVE,
        URI_PORT,
        LOCATION_PATH,
        URI_PATH,
        CONTENT_FORMAT,
        MAX_AGE,
        URI_QUERY,
        ACCEPT,
        LOCATION_QUERY,
        BLOCK2,
        BLOCK1,
        SIZE2,
        PROXY_URI,
        PROXY_SCHEME,
        SIZE1,
    ];

    /// Odd option numbers are critical.
    pub fn is_critical(number: u16) -> bool {
        number & 1 == 1
    }

    pub fn is_known(number: u16) -> bool {
        KNOWN.contains(&number)
    }
}

/// Content-Format identifiers used by the gateway.
pub mod content_format {
    pub const TEXT_PLAIN: u16 = 0;
    pub const APPLICATION_JSON: u16 = 50;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

impl CoapOption {
    pub fn new(number: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            value: value.into(),
        }
    }

    /// uint option with the shortest big-endian encoding (0 → empty).
    pub fn uint(number: u16, value: u32) -> Self {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Self::new(number, bytes[skip..].to_vec())
    }

    pub fn as_uint(&self) -> Option<u32> {
        if self.value.len() > 4 {
            return None;
        }
        Some(self.value.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Kept sorted by option number (stable for repeated options).
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(message_type: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            message_type,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Request for `path` ("a/b" → two Uri-Path options).
    pub fn request(message_type: MessageType, method: Method, message_id: u16, path: &str) -> Self {
        let mut msg = Self::new(message_type, method.into(), message_id);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            msg.add_option(CoapOption::new(option::URI_PATH, segment.as_bytes()));
        }
        msg
    }

    /// Response skeleton; the exchange layer fills in type, id and token.
    pub fn response(code: Code) -> Self {
        Self::new(MessageType::Acknowledgement, code, 0)
    }

    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id)
    }

    /// Reset; `code` is 0.00 except for the "no such resource" reset.
    pub fn reset(message_id: u16, code: Code) -> Self {
        Self::new(MessageType::Reset, code, message_id)
    }

    pub fn with_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_content_format(mut self, format: u16) -> Self {
        self.set_content_format(format);
        self
    }

    pub fn add_option(&mut self, opt: CoapOption) {
        let at = self
            .options
            .iter()
            .position(|o| o.number > opt.number)
            .unwrap_or(self.options.len());
        self.options.insert(at, opt);
    }

    pub fn options_of(&self, number: u16) -> impl Iterator<Item = &CoapOption> {
        self.options.iter().filter(move |o| o.number == number)
    }

    pub fn set_content_format(&mut self, format: u16) {
        self.options.retain(|o| o.number != option::CONTENT_FORMAT);
        self.add_option(CoapOption::uint(option::CONTENT_FORMAT, u32::from(format)));
    }

    pub fn content_format(&self) -> Option<u16> {
        self.options_of(option::CONTENT_FORMAT)
            .next()
            .and_then(CoapOption::as_uint)
            .and_then(|v| u16::try_from(v).ok())
    }

    /// Uri-Path segments joined with '/'.
    pub fn uri_path(&self) -> String {
        self.options_of(option::URI_PATH)
            .map(|o| String::from_utf8_lossy(&o.value).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn is_request(&self) -> bool {
        self.code.is_request()
    }

    /// First critical option we do not understand.
    pub fn unknown_critical_option(&self) -> Option<u16> {
        self.options
            .iter()
            .map(|o| o.number)
            .find(|n| option::is_critical(*n) && !option::is_known(*n))
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

const PREVIEW_LEN: usize = 64;

/// One-line trace form, e.g.
/// `CON Post mid=0x1a2b token=0c path=/accessControl cf=50 payload={"UAT":..} (24 B)`.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} mid={:#06x} token={}",
            self.message_type.abbrev(),
            self.code,
            self.message_id,
            hex::encode(&self.token)
        )?;
        let path = self.uri_path();
        if !path.is_empty() {
            write!(f, " path=/{}", path)?;
        }
        if let Some(cf) = self.content_format() {
            write!(f, " cf={}", cf)?;
        }
        if !self.payload.is_empty() {
            match self.payload_str() {
                Some(text) => {
                    let flat: String = text
                        .chars()
                        .filter(|c| !c.is_control())
                        .take(PREVIEW_LEN)
                        .collect();
                    write!(f, " payload={}", flat)?;
                }
                None => write!(f, " payload=<binary>")?,
            }
            write!(f, " ({} B)", self.payload.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_parts_and_display() {
        assert_eq!(Code::CONTENT.class(), 2);
        assert_eq!(Code::CONTENT.detail(), 5);
        assert_eq!(Code::CONTENT.to_string(), "2.05");
        assert_eq!(Code::NOT_FOUND.to_string(), "4.04");
        assert_eq!(Code::POST.to_string(), "Post");
        assert!(Code::POST.is_request());
        assert!(!Code::EMPTY.is_request());
        assert!(Code::BAD_OPTION.is_response());
    }

    #[test]
    fn test_request_path_options() {
        let msg = Message::request(MessageType::Confirmable, Method::Post, 7, "/a/b/");
        assert_eq!(msg.uri_path(), "a/b");
        assert_eq!(msg.options.len(), 2);
    }

    #[test]
    fn test_options_stay_sorted() {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1);
        msg.add_option(CoapOption::uint(option::CONTENT_FORMAT, 50));
        msg.add_option(CoapOption::new(option::URI_PATH, "x"));
        msg.add_option(CoapOption::new(option::URI_HOST, "h"));
        let numbers: Vec<u16> = msg.options.iter().map(|o| o.number).collect();
        assert_eq!(numbers, vec![3, 11, 12]);
    }

    #[test]
    fn test_content_format_uint() {
        let msg = Message::response(Code::CONTENT).with_content_format(content_format::APPLICATION_JSON);
        assert_eq!(msg.content_format(), Some(50));
        assert_eq!(CoapOption::uint(12, 0).value, Vec::<u8>::new());
        assert_eq!(CoapOption::uint(12, 0x0102).value, vec![1, 2]);
    }

    #[test]
    fn test_unknown_critical_option() {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1);
        msg.add_option(CoapOption::new(2048, "elective"));
        assert_eq!(msg.unknown_critical_option(), None);
        msg.add_option(CoapOption::new(2049, "critical"));
        assert_eq!(msg.unknown_critical_option(), Some(2049));
    }

    #[test]
    fn test_display_line() {
        let msg = Message::request(MessageType::Confirmable, Method::Post, 0x1a2b, "accessControl")
            .with_token(vec![0x0c])
            .with_payload(r#"{"UAT":{"RL":"Visitor"}}"#)
            .with_content_format(content_format::APPLICATION_JSON);
        assert_eq!(
            msg.to_string(),
            r#"CON Post mid=0x1a2b token=0c path=/accessControl cf=50 payload={"UAT":{"RL":"Visitor"}} (24 B)"#
        );
    }
}
