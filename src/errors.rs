use crate::alert::{AlertDescription, AlertLevel};
use crate::cipher::CipherSuite;

use thiserror::Error;

/// Coarse classification of [`TLSError`], used to pick the alert to send and by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Framing,
    Crypto,
    ProtocolSequence,
    Negotiation,
    Alert,
    Local,
}

#[derive(Error, Debug)]
pub enum TLSError {
    // Framing
    #[error("invalid length")]
    InvalidLengthError,
    #[error("message has trailing bytes")]
    TrailingBytesError,
    #[error("Invalid content type: {}", _0)]
    InvalidContentTypeError(u8),
    #[error("Unsupported protocol version {}.{}", _0, _1)]
    ProtocolVersionError(u8, u8),
    #[error("record of {} bytes exceeds the maximum", _0)]
    RecordOverflowError(usize),
    #[error("handshake message of {} bytes exceeds the maximum", _0)]
    HandshakeOverflowError(usize),
    #[error("Invalid alert.")]
    InvalidAlertError,
    #[error("Invalid change cipher spec.")]
    InvalidChangeCipherSpecError,
    #[error("{}", _0)]
    TryFromIntError(#[from] std::num::TryFromIntError),

    // Crypto
    #[error("Cryptographic integrity error: {}", _0)]
    IntegrityError(&'static str),
    #[error("decryption failed")]
    DecryptionFailedError,
    #[error("Finished verify data mismatch")]
    FinishedMismatchError,
    #[error("Cipher error: {}", _0)]
    CipherError(&'static str),

    // Protocol sequence
    #[error("Unexpected message: {}", _0)]
    UnexpectedMessageError(&'static str),
    #[error("Invalid handshake type: {}", _0)]
    InvalidHandshakeTypeError(u8),

    // Negotiation
    #[error("Cipher not supported: {:#06x}", _0)]
    CipherNotSupportedError(CipherSuite),
    #[error("no mutually supported cipher suite")]
    NoSharedCipherSuiteError,
    #[error("Invalid compression method.")]
    InvalidCompressionMethodError,
    #[error("Certificate rejected: {}", _0)]
    CertificateError(&'static str),

    // Peer alert
    #[error("Received {:?} alert: {:?}", _0, _1)]
    AlertReceivedError(AlertLevel, AlertDescription),

    // Local
    #[error("handshake is not complete")]
    HandshakeIncompleteError,
    #[error("session has failed and must be reset or discarded")]
    SessionFailedError,
    #[error("Invalid session state: {}", _0)]
    InvalidStateError(&'static str),
    #[error("Invalid configuration: {}", _0)]
    ConfigError(&'static str),
    #[error("Private key error: {}", _0)]
    PrivateKeyError(&'static str),
    #[error("Random generator failed")]
    RandomError,
    #[error("connection closed by peer")]
    ConnectionClosedError,
    #[error("{}", _0)]
    StdIoError(#[from] std::io::Error),
}

impl TLSError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TLSError::InvalidLengthError
            | TLSError::TrailingBytesError
            | TLSError::InvalidContentTypeError(_)
            | TLSError::ProtocolVersionError(_, _)
            | TLSError::RecordOverflowError(_)
            | TLSError::HandshakeOverflowError(_)
            | TLSError::InvalidAlertError
            | TLSError::InvalidChangeCipherSpecError
            | TLSError::TryFromIntError(_) => ErrorKind::Framing,

            TLSError::IntegrityError(_)
            | TLSError::DecryptionFailedError
            | TLSError::FinishedMismatchError
            | TLSError::CipherError(_) => ErrorKind::Crypto,

            TLSError::UnexpectedMessageError(_) | TLSError::InvalidHandshakeTypeError(_) => ErrorKind::ProtocolSequence,

            TLSError::CipherNotSupportedError(_)
            | TLSError::NoSharedCipherSuiteError
            | TLSError::InvalidCompressionMethodError
            | TLSError::CertificateError(_) => ErrorKind::Negotiation,

            TLSError::AlertReceivedError(_, _) => ErrorKind::Alert,

            TLSError::HandshakeIncompleteError
            | TLSError::SessionFailedError
            | TLSError::InvalidStateError(_)
            | TLSError::ConfigError(_)
            | TLSError::PrivateKeyError(_)
            | TLSError::RandomError
            | TLSError::ConnectionClosedError
            | TLSError::StdIoError(_) => ErrorKind::Local,
        }
    }

    /// The fatal alert to report to the peer for this error, if any.
    pub fn alert_description(&self) -> Option<AlertDescription> {
        match self {
            TLSError::ProtocolVersionError(_, _) => Some(AlertDescription::ProtocolVersion),
            TLSError::RecordOverflowError(_) => Some(AlertDescription::RecordOverflow),
            TLSError::FinishedMismatchError => Some(AlertDescription::DecryptError),
            TLSError::IntegrityError(_) => Some(AlertDescription::BadRecordMac),
            TLSError::DecryptionFailedError => Some(AlertDescription::DecryptionFailedRESERVED),
            TLSError::CipherError(_) | TLSError::RandomError => Some(AlertDescription::InternalError),
            _ => match self.kind() {
                ErrorKind::Framing => Some(AlertDescription::DecodeError),
                ErrorKind::ProtocolSequence => Some(AlertDescription::UnexpectedMessage),
                ErrorKind::Negotiation => Some(AlertDescription::HandshakeFailure),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::alert::AlertDescription;
    use crate::errors::{ErrorKind, TLSError};

    #[test]
    fn errors_map_to_alerts() {
        assert_eq!(
            TLSError::UnexpectedMessageError("x").alert_description(),
            Some(AlertDescription::UnexpectedMessage)
        );
        assert_eq!(TLSError::NoSharedCipherSuiteError.alert_description(), Some(AlertDescription::HandshakeFailure));
        assert_eq!(TLSError::IntegrityError("bad record mac").alert_description(), Some(AlertDescription::BadRecordMac));
        assert_eq!(TLSError::InvalidLengthError.alert_description(), Some(AlertDescription::DecodeError));
        assert_eq!(TLSError::HandshakeIncompleteError.alert_description(), None);
    }

    #[test]
    fn rsa_failures_are_crypto_errors() {
        assert_eq!(TLSError::DecryptionFailedError.kind(), ErrorKind::Crypto);
        assert_eq!(
            TLSError::DecryptionFailedError.alert_description(),
            Some(AlertDescription::DecryptionFailedRESERVED)
        );
    }
}
