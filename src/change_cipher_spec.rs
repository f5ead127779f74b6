use crate::errors;
use crate::pack::{Pack, Reader};

use num_traits::FromPrimitive;

#[derive(Debug, Copy, Clone, PartialEq, Primitive)]
#[repr(u8)]
pub enum Type {
    ChangeCipherSpec = 1,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeCipherSpec {
    pub r#type: Type,
}

impl ChangeCipherSpec {
    pub fn new() -> Self {
        Self {
            r#type: Type::ChangeCipherSpec,
        }
    }
}

impl Default for ChangeCipherSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl Pack for ChangeCipherSpec {
    fn pack(&self) -> Vec<u8> {
        vec![self.r#type as u8]
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let r#type = Type::from_u8(reader.u8()?).ok_or(errors::TLSError::InvalidChangeCipherSpecError)?;
        Ok(Self { r#type })
    }
}

/// Parses a whole ChangeCipherSpec record payload, which must be exactly `[1]`.
pub fn decode(payload: &[u8]) -> Result<ChangeCipherSpec, errors::TLSError> {
    let mut reader = Reader::new(payload);
    let change_cipher_spec = ChangeCipherSpec::unpack(&mut reader).map_err(|_| errors::TLSError::InvalidChangeCipherSpecError)?;
    reader.expect_empty().map_err(|_| errors::TLSError::InvalidChangeCipherSpecError)?;
    Ok(change_cipher_spec)
}
