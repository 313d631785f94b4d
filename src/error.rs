use crate::alert::AlertDescription;

/// Error taxonomy for the handshake core.
///
/// Every variant maps to exactly one fatal alert via [`Error::to_alert`]; there
/// is no taxonomy entry for a non-fatal condition because §7 treats every
/// handshake error as connection-terminating.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no mutually acceptable protocol version: {0}")]
    ProtocolVersion(String),

    #[error("handshake failure: {0}")]
    HandshakeFailure(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("bad record mac: {0}")]
    BadRecordMAC(String),

    #[error("illegal parameter: {0}")]
    IllegalParameter(String),

    #[error("decode error: {0}")]
    DecodeError(String),
}

impl Error {
    pub fn to_alert(&self) -> AlertDescription {
        match self {
            Error::ProtocolVersion(_) => AlertDescription::ProtocolVersion,
            Error::HandshakeFailure(_) => AlertDescription::HandshakeFailure,
            Error::UnexpectedMessage(_) => AlertDescription::UnexpectedMessage,
            Error::BadRecordMAC(_) => AlertDescription::BadRecordMac,
            Error::IllegalParameter(_) => AlertDescription::IllegalParameter,
            Error::DecodeError(_) => AlertDescription::DecodeError,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
