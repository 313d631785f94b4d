//! Alert message types, written out longhand rather than built on a
//! macro-generated enum since this crate has no backing parser combinator
//! crate for that kind of codegen.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Fatal,
    Unknown(u8),
}

impl AlertLevel {
    pub fn to_u8(&self) -> u8 {
        match self {
            AlertLevel::Warning => 1,
            AlertLevel::Fatal => 2,
            AlertLevel::Unknown(v) => *v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            v => AlertLevel::Unknown(v),
        }
    }
}

/// Only the subset of RFC 5246 §7.2 alert descriptions this crate's error
/// taxonomy (§7) can actually produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    HandshakeFailure,
    IllegalParameter,
    DecodeError,
    ProtocolVersion,
    InternalError,
    Unknown(u8),
}

impl AlertDescription {
    pub fn to_u8(&self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::IllegalParameter => 47,
            AlertDescription::DecodeError => 50,
            AlertDescription::ProtocolVersion => 70,
            AlertDescription::InternalError => 80,
            AlertDescription::Unknown(v) => *v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            40 => AlertDescription::HandshakeFailure,
            47 => AlertDescription::IllegalParameter,
            50 => AlertDescription::DecodeError,
            70 => AlertDescription::ProtocolVersion,
            80 => AlertDescription::InternalError,
            v => AlertDescription::Unknown(v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
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

    pub fn parse(input: &[u8]) -> Option<Self> {
        if input.len() != 2 {
            return None;
        }
        Some(Self {
            level: AlertLevel::from_u8(input[0]),
            description: AlertDescription::from_u8(input[1]),
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.level.to_u8());
        out.push(self.description.to_u8());
    }
}
