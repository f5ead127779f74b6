use crate::errors::TLSError;

/// Byte stream carrying TLS records.
pub trait Transport {
    fn send(&self, buf: &[u8]) -> Result<(), TLSError>;
    /// Returns 0 once the peer has closed the stream.
    fn recv(&self, buf: &mut [u8]) -> Result<usize, TLSError>;
}
