use crate::errors;
use crate::handshake::HANDSHAKE_HEADER_LENGTH;

use byteorder::{BigEndian, ByteOrder};
use bytes::BytesMut;
use std::convert::TryFrom;

/// Upper bound on a single reassembled handshake message.
pub const MAX_HANDSHAKE_MESSAGE_LENGTH: usize = 1 << 17;

/// Rebuilds handshake messages from handshake record payloads.
///
/// A message may span several records and one record may carry several
/// messages; boundaries come only from the 4-byte handshake header.
#[derive(Debug, Default)]
pub struct HandshakeReassembler {
    buffer: BytesMut,
}

impl HandshakeReassembler {
    pub fn new() -> Self {
        Self { buffer: BytesMut::new() }
    }

    pub fn push(&mut self, fragment: &[u8]) {
        self.buffer.extend_from_slice(fragment);
    }

    /// Pops the next complete message, header included.
    pub fn next_message(&mut self) -> Result<Option<Vec<u8>>, errors::TLSError> {
        if self.buffer.len() < HANDSHAKE_HEADER_LENGTH {
            return Ok(None);
        }
        let length = usize::try_from(BigEndian::read_u24(&self.buffer[1..HANDSHAKE_HEADER_LENGTH]))?;
        if length > MAX_HANDSHAKE_MESSAGE_LENGTH {
            return Err(errors::TLSError::HandshakeOverflowError(length));
        }
        if self.buffer.len() < HANDSHAKE_HEADER_LENGTH + length {
            return Ok(None);
        }
        Ok(Some(self.buffer.split_to(HANDSHAKE_HEADER_LENGTH + length).to_vec()))
    }

    /// True when no partial message is pending.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::TLSError;
    use crate::fragment::HandshakeReassembler;

    use hex;

    #[test]
    fn reassemble_message_split_across_records() {
        let message = hex::decode("0b00000a000007000004deadbeef").expect("decode hex failed");
        let mut reassembler = HandshakeReassembler::new();
        for fragment in message.chunks(3) {
            assert!(reassembler.next_message().expect("next_message failed").is_none());
            reassembler.push(fragment);
        }
        assert_eq!(reassembler.next_message().expect("next_message failed"), Some(message));
        assert!(reassembler.is_empty());
    }

    #[test]
    fn several_messages_in_one_record() {
        let mut reassembler = HandshakeReassembler::new();
        reassembler.push(&[14, 0, 0, 0, 20, 0, 0, 2, 1, 2, 16]);
        assert_eq!(reassembler.next_message().expect("next_message failed"), Some(vec![14, 0, 0, 0]));
        assert_eq!(reassembler.next_message().expect("next_message failed"), Some(vec![20, 0, 0, 2, 1, 2]));
        assert_eq!(reassembler.next_message().expect("next_message failed"), None);
        assert!(!reassembler.is_empty());
        reassembler.clear();
        assert!(reassembler.is_empty());
    }

    #[test]
    fn oversized_message_is_rejected() {
        let mut reassembler = HandshakeReassembler::new();
        reassembler.push(&[11, 0xff, 0xff, 0xff]);
        match reassembler.next_message() {
            Err(TLSError::HandshakeOverflowError(0x00ff_ffff)) => (),
            other => panic!("expected HandshakeOverflowError, got {:?}", other),
        }
    }
}
