use crate::errors;

use byteorder::{BigEndian, ByteOrder};
use std::convert::TryFrom;

/// Wire encoding for protocol structures.
///
/// `unpack` reads from a bounds-checked [`Reader`]; running off the end of the
/// input is always an `InvalidLengthError`, never a panic.
pub trait Pack: Sized {
    fn pack(&self) -> Vec<u8>;
    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError>;
}

/// Cursor over borrowed bytes, reading big-endian scalars and length-prefixed vectors.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], errors::TLSError> {
        if self.remaining() < n {
            return Err(errors::TLSError::InvalidLengthError);
        }
        let bytes = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8, errors::TLSError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, errors::TLSError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn u24(&mut self) -> Result<u32, errors::TLSError> {
        Ok(BigEndian::read_u24(self.take(3)?))
    }

    pub fn vec_u8(&mut self) -> Result<&'a [u8], errors::TLSError> {
        let length = usize::from(self.u8()?);
        self.take(length)
    }

    pub fn vec_u16(&mut self) -> Result<&'a [u8], errors::TLSError> {
        let length = usize::from(self.u16()?);
        self.take(length)
    }

    pub fn vec_u24(&mut self) -> Result<&'a [u8], errors::TLSError> {
        let length = usize::try_from(self.u24()?)?;
        self.take(length)
    }

    /// Structures must consume their whole body; trailing garbage is a framing error.
    pub fn expect_empty(&self) -> Result<(), errors::TLSError> {
        match self.remaining() {
            0 => Ok(()),
            _ => Err(errors::TLSError::TrailingBytesError),
        }
    }
}

pub fn put_u16(v: &mut Vec<u8>, n: u16) {
    let mut bytes = [0; 2];
    BigEndian::write_u16(&mut bytes, n);
    v.extend_from_slice(&bytes);
}

pub fn put_u24(v: &mut Vec<u8>, n: u32) {
    let mut bytes = [0; 3];
    BigEndian::write_u24(&mut bytes, n);
    v.extend_from_slice(&bytes);
}

// Length prefixes are truncated to their width; bodies are bounded where they are built.

pub fn put_vec_u8(v: &mut Vec<u8>, body: &[u8]) {
    v.push(body.len() as u8);
    v.extend_from_slice(body);
}

pub fn put_vec_u16(v: &mut Vec<u8>, body: &[u8]) {
    put_u16(v, body.len() as u16);
    v.extend_from_slice(body);
}

pub fn put_vec_u24(v: &mut Vec<u8>, body: &[u8]) {
    put_u24(v, body.len() as u32);
    v.extend_from_slice(body);
}
