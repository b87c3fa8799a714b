//! DTLS alert protocol (content type 21).

use super::errors::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    HandshakeFailure,
    DecodeError,
    DecryptError,
    InternalError,
    UnknownPskIdentity,
    /// Anything we do not name
    Other(u8),
}

impl AlertDescription {
    pub fn code(self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::DecodeError => 50,
            AlertDescription::DecryptError => 51,
            AlertDescription::InternalError => 80,
            AlertDescription::UnknownPskIdentity => 115,
            AlertDescription::Other(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            40 => AlertDescription::HandshakeFailure,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            80 => AlertDescription::InternalError,
            115 => AlertDescription::UnknownPskIdentity,
            other => AlertDescription::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    pub fn encode(&self) -> [u8; 2] {
        [self.level as u8, self.description.code()]
    }

    pub fn decode(fragment: &[u8]) -> Result<Self, DecodeError> {
        match fragment {
            [level, description] => {
                let level = match level {
                    1 => AlertLevel::Warning,
                    2 => AlertLevel::Fatal,
                    _ => return Err(DecodeError::Malformed("alert level")),
                };
                Ok(Self {
                    level,
                    description: AlertDescription::from_code(*description),
                })
            }
            _ => Err(DecodeError::Malformed("alert length")),
        }
    }

    /// close_notify or any fatal alert ends the session.
    pub fn is_terminal(&self) -> bool {
        self.level == AlertLevel::Fatal || self.description == AlertDescription::CloseNotify
    }
}
