use crate::errors;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Handshake messages covered by the Finished hashes, in protocol order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TranscriptSlot {
    ClientHello,
    ServerHello,
    ServerCertificate,
    ServerHelloDone,
    ClientKeyExchange,
    ClientFinished,
}

pub const TRANSCRIPT_SLOTS: [TranscriptSlot; 6] = [
    TranscriptSlot::ClientHello,
    TranscriptSlot::ServerHello,
    TranscriptSlot::ServerCertificate,
    TranscriptSlot::ServerHelloDone,
    TranscriptSlot::ClientKeyExchange,
    TranscriptSlot::ClientFinished,
];

/// Exact bytes of each handshake message, header included, as sent or received.
///
/// Slots are append-only and must be filled in order.
#[derive(Default)]
pub struct Transcript {
    entries: Vec<(TranscriptSlot, Zeroizing<Vec<u8>>)>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(TRANSCRIPT_SLOTS.len()),
        }
    }

    pub fn record(&mut self, slot: TranscriptSlot, message: &[u8]) -> Result<(), errors::TLSError> {
        match TRANSCRIPT_SLOTS.get(self.entries.len()) {
            Some(&next) if next == slot => {
                self.entries.push((slot, Zeroizing::new(message.to_vec())));
                Ok(())
            }
            _ => Err(errors::TLSError::UnexpectedMessageError("handshake message out of order")),
        }
    }

    /// SHA-256 over the concatenation of every filled slot.
    pub fn hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for (_, message) in self.entries.iter() {
            hasher.update(&message[..]);
        }
        hasher.finalize().to_vec()
    }
}
