use crate::errors;
use crate::pack::{Pack, Reader};

use num_traits::FromPrimitive;

#[derive(Debug, Copy, Clone, PartialEq, Primitive)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

#[derive(Debug, Copy, Clone, PartialEq, Primitive)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    DecryptionFailedRESERVED = 21,
    RecordOverflow = 22,
    DecompressionFailure = 30,
    HandshakeFailure = 40,
    NoCertificateRESERVED = 41,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ExportRestrictionRESERVED = 60,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    NoRenegotiation = 100,
    UnsupportedExtension = 110,
}

#[derive(Debug, Copy, Clone, PartialEq)]
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
}

impl Pack for Alert {
    fn pack(&self) -> Vec<u8> {
        vec![self.level as u8, self.description as u8]
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let level = AlertLevel::from_u8(reader.u8()?).ok_or(errors::TLSError::InvalidAlertError)?;
        let description = AlertDescription::from_u8(reader.u8()?).ok_or(errors::TLSError::InvalidAlertError)?;
        Ok(Self { level, description })
    }
}

#[cfg(test)]
mod tests {
    use crate::alert::{Alert, AlertDescription, AlertLevel};
    use crate::errors::TLSError;
    use crate::pack::{Pack, Reader};
    use crate::pack_unpack_inverse_test;

    pack_unpack_inverse_test!(
        fatal_alert_pack_unpack_inverse_test, Alert::fatal(AlertDescription::HandshakeFailure);
        close_notify_pack_unpack_inverse_test, Alert::close_notify()
    );

    #[test]
    fn unpack_alert_from_wire() {
        let alert = Alert::unpack(&mut Reader::new(&[2, 40])).expect("unpacking alert failed");
        assert_eq!(alert.level, AlertLevel::Fatal);
        assert_eq!(alert.description, AlertDescription::HandshakeFailure);
    }

    #[test]
    fn unknown_alert_description_is_rejected() {
        match Alert::unpack(&mut Reader::new(&[2, 7])) {
            Err(TLSError::InvalidAlertError) => (),
            other => panic!("expected InvalidAlertError, got {:?}", other),
        }
    }
}
