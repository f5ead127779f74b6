use crate::cipher::AES_BLOCK_LENGTH;
use crate::crypto;
use crate::errors;
use crate::pack::{put_u16, Pack, Reader};

use num_traits::FromPrimitive;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

pub const HEADER_LENGTH: usize = 5;
pub const MAX_FRAGMENT_LENGTH: usize = 16384;
/// Largest payload placed in a single record; leaves room for MAC and padding.
pub const MAX_PLAINTEXT_CHUNK: usize = 16292;
pub const MAX_RECORD_LENGTH: usize = MAX_FRAGMENT_LENGTH + 64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub fn pack_bytes(&self) -> [u8; 2] {
        [self.major, self.minor]
    }
}

impl Pack for ProtocolVersion {
    fn pack(&self) -> Vec<u8> {
        self.pack_bytes().to_vec()
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let major = reader.u8()?;
        let minor = reader.u8()?;
        Ok(Self { major, minor })
    }
}

pub const TLS_1_2: ProtocolVersion = ProtocolVersion { major: 3, minor: 3 };

#[derive(Debug, Copy, Clone, Primitive, PartialEq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordHeader {
    pub r#type: ContentType,
    pub version: ProtocolVersion,
    pub length: usize,
}

impl RecordHeader {
    pub fn new(r#type: ContentType, length: usize) -> Self {
        Self {
            r#type,
            version: TLS_1_2,
            length,
        }
    }

    /// Header plus fragment.
    pub fn record_length(&self) -> usize {
        HEADER_LENGTH + self.length
    }
}

impl Pack for RecordHeader {
    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(HEADER_LENGTH);
        v.push(self.r#type as u8);
        v.extend_from_slice(&self.version.pack_bytes());
        put_u16(&mut v, self.length as u16);
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let content_type = reader.u8()?;
        let r#type = ContentType::from_u8(content_type).ok_or(errors::TLSError::InvalidContentTypeError(content_type))?;
        let version = ProtocolVersion::unpack(reader)?;
        if version.major != 3 || version.minor > 3 {
            return Err(errors::TLSError::ProtocolVersionError(version.major, version.minor));
        }
        let length = usize::from(reader.u16()?);
        if length > MAX_RECORD_LENGTH {
            return Err(errors::TLSError::RecordOverflowError(length));
        }
        Ok(Self { r#type, version, length })
    }
}

/// Parses the header at the front of `bytes`. `None` means fewer than five bytes are buffered.
pub fn decode_header(bytes: &[u8]) -> Result<Option<RecordHeader>, errors::TLSError> {
    if bytes.len() < HEADER_LENGTH {
        return Ok(None);
    }
    RecordHeader::unpack(&mut Reader::new(&bytes[..HEADER_LENGTH])).map(Some)
}

fn chunks(payload: &[u8]) -> Vec<&[u8]> {
    if payload.is_empty() {
        return vec![payload];
    }
    payload.chunks(MAX_PLAINTEXT_CHUNK).collect()
}

pub fn encode_plain(r#type: ContentType, payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(payload.len() + HEADER_LENGTH);
    for chunk in chunks(payload) {
        v.extend_from_slice(&RecordHeader::new(r#type, chunk.len()).pack());
        v.extend_from_slice(chunk);
    }
    v
}

/// MAC-then-encrypt `payload` into one or more records, advancing `seq_num` once per record.
pub fn encode_protected<R>(
    r#type: ContentType,
    payload: &[u8],
    keys: &crypto::DirectionKeys,
    seq_num: &mut u64,
    rng: &mut R,
) -> Result<Vec<u8>, errors::TLSError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut v = Vec::new();
    for chunk in chunks(payload) {
        let mac = crypto::mac(keys, *seq_num, r#type, TLS_1_2, chunk)?;
        let padding_length = AES_BLOCK_LENGTH - 1 - ((chunk.len() + mac.len()) % AES_BLOCK_LENGTH);

        let mut block = Zeroizing::new(Vec::with_capacity(chunk.len() + mac.len() + padding_length + 1));
        block.extend_from_slice(chunk);
        block.extend_from_slice(&mac);
        let block_len = block.len();
        block.resize(block_len + padding_length + 1, padding_length as u8);

        let mut iv = [0; AES_BLOCK_LENGTH];
        rng.try_fill_bytes(&mut iv).map_err(|_| errors::TLSError::RandomError)?;
        let ciphertext = crypto::encrypt(&keys.enc_key, &iv, &block)?;

        v.extend_from_slice(&RecordHeader::new(r#type, iv.len() + ciphertext.len()).pack());
        v.extend_from_slice(&iv);
        v.extend_from_slice(&ciphertext);
        *seq_num = seq_num.checked_add(1).ok_or(errors::TLSError::CipherError("sequence number exhausted"))?;
    }
    Ok(v)
}

/// Smallest protected record: header, IV and one padded MAC.
pub fn minimum_protected_length(mac_length: usize) -> usize {
    let padded_mac = (mac_length / AES_BLOCK_LENGTH + 1) * AES_BLOCK_LENGTH;
    HEADER_LENGTH + AES_BLOCK_LENGTH + padded_mac
}

/// Decrypts and authenticates one complete record, header included.
///
/// Every failure past the header is reported as the same `IntegrityError` so a
/// peer cannot tell a padding failure from a MAC failure.
pub fn decode_protected(
    record: &[u8],
    keys: &crypto::DirectionKeys,
    seq_num: &mut u64,
) -> Result<Zeroizing<Vec<u8>>, errors::TLSError> {
    let bad_record_mac = errors::TLSError::IntegrityError("bad record mac");
    let header = decode_header(record)?.ok_or(errors::TLSError::InvalidLengthError)?;
    if record.len() != header.record_length() {
        return Err(errors::TLSError::InvalidLengthError);
    }

    let mac_length = keys.mac_length();
    if record.len() < minimum_protected_length(mac_length) || header.length % AES_BLOCK_LENGTH != 0 {
        return Err(bad_record_mac);
    }

    let fragment = &record[HEADER_LENGTH..];
    let (iv, ciphertext) = fragment.split_at(AES_BLOCK_LENGTH);
    let plaintext = Zeroizing::new(crypto::decrypt(&keys.enc_key, iv, ciphertext)?);

    let padding_length = match plaintext.last() {
        Some(&p) if usize::from(p) < AES_BLOCK_LENGTH => usize::from(p),
        _ => return Err(bad_record_mac),
    };
    let content_length = match plaintext.len().checked_sub(padding_length + 1 + mac_length) {
        Some(n) if n <= MAX_FRAGMENT_LENGTH => n,
        _ => return Err(bad_record_mac),
    };

    let padding = &plaintext[plaintext.len() - padding_length - 1..];
    let padding_ok = padding.iter().fold(0u8, |acc, &b| acc | (b ^ padding_length as u8)) == 0;

    let content = &plaintext[..content_length];
    let tag = &plaintext[content_length..content_length + mac_length];
    let mac_ok = crypto::verify_mac(keys, *seq_num, header.r#type, header.version, content, tag).is_ok();
    if !(padding_ok && mac_ok) {
        return Err(bad_record_mac);
    }

    *seq_num = seq_num.checked_add(1).ok_or(errors::TLSError::CipherError("sequence number exhausted"))?;
    Ok(Zeroizing::new(content.to_vec()))
}

#[cfg(test)]
mod tests {
    use crate::cipher;
    use crate::crypto::{ConnectionEnd, DirectionKeys, KeyBlock};
    use crate::errors::{ErrorKind, TLSError};
    use crate::pack::Pack;
    use crate::pack_unpack_inverse_test;
    use crate::record;
    use crate::record::{ContentType, RecordHeader};

    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    pack_unpack_inverse_test!(
        record_header_pack_unpack_inverse_test, RecordHeader::new(ContentType::Handshake, 300);
        protocol_version_pack_unpack_inverse_test, record::TLS_1_2
    );

    fn keys(suite: cipher::CipherSuite) -> DirectionKeys {
        let parameters = cipher::parameters(suite).expect("parameters failed");
        let block: Vec<u8> = (0..=255).collect();
        KeyBlock::from_bytes(&parameters, &block).expect("building KeyBlock failed").writer(ConnectionEnd::Client)
    }

    #[test]
    fn protected_round_trip_for_every_suite() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for &suite in cipher::SUPPORTED_CIPHER_SUITES.iter() {
            let keys = keys(suite);
            for &size in [0usize, 1, 15, 16, 100, record::MAX_PLAINTEXT_CHUNK].iter() {
                let payload = vec![0xa5; size];
                let mut send_seq = 0;
                let wire = record::encode_protected(ContentType::ApplicationData, &payload, &keys, &mut send_seq, &mut rng)
                    .expect("encode_protected failed");
                assert_eq!(send_seq, 1);
                let mut recv_seq = 0;
                let plaintext = record::decode_protected(&wire, &keys, &mut recv_seq).expect("decode_protected failed");
                assert_eq!(&plaintext[..], &payload[..]);
                assert_eq!(recv_seq, 1);
            }
        }
    }

    #[test]
    fn protected_length_matches_padding_rule() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let keys = keys(cipher::TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut seq = 0;
        let wire = record::encode_protected(ContentType::Handshake, &[0; 16], &keys, &mut seq, &mut rng).expect("encode failed");
        // iv + ceil((16 + 20 + 1) / 16) blocks
        assert_eq!(wire.len(), record::HEADER_LENGTH + 16 + 48);

        let wire = record::encode_protected(ContentType::Handshake, &[], &keys, &mut seq, &mut rng).expect("encode failed");
        assert_eq!(wire.len(), 53);
        assert_eq!(record::minimum_protected_length(20), 53);
        assert_eq!(record::minimum_protected_length(32), 69);
    }

    #[test]
    fn sequence_number_counts_records() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let keys = keys(cipher::TLS_RSA_WITH_AES_256_CBC_SHA256);
        let mut seq = 0;
        let mut wire = Vec::new();
        for i in 0..5u8 {
            wire.push(record::encode_protected(ContentType::ApplicationData, &[i], &keys, &mut seq, &mut rng).expect("encode failed"));
        }
        assert_eq!(seq, 5);

        let big = vec![1; record::MAX_PLAINTEXT_CHUNK * 2 + 1];
        record::encode_protected(ContentType::ApplicationData, &big, &keys, &mut seq, &mut rng).expect("encode failed");
        assert_eq!(seq, 8);

        // out of order delivery fails the MAC
        let mut recv_seq = 0;
        assert!(record::decode_protected(&wire[1], &keys, &mut recv_seq).is_err());
        assert_eq!(recv_seq, 0);
    }

    #[test]
    fn any_flipped_bit_is_detected() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let keys = keys(cipher::TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut seq = 0;
        let wire = record::encode_protected(ContentType::ApplicationData, b"hello", &keys, &mut seq, &mut rng).expect("encode failed");
        for byte in record::HEADER_LENGTH..wire.len() {
            for bit in 0..8 {
                let mut tampered = wire.clone();
                tampered[byte] ^= 1 << bit;
                let mut recv_seq = 0;
                match record::decode_protected(&tampered, &keys, &mut recv_seq) {
                    Err(e) => assert_eq!(e.kind(), ErrorKind::Crypto),
                    Ok(_) => panic!("tampered byte {} bit {} was accepted", byte, bit),
                }
            }
        }
    }

    #[test]
    fn short_or_unaligned_records_are_rejected() {
        let keys = keys(cipher::TLS_RSA_WITH_AES_128_CBC_SHA256);
        let mut seq = 0;
        let mut short = RecordHeader::new(ContentType::ApplicationData, 48).pack();
        short.extend_from_slice(&[0; 48]);
        match record::decode_protected(&short, &keys, &mut seq) {
            Err(TLSError::IntegrityError(_)) => (),
            other => panic!("expected IntegrityError, got {:?}", other),
        }

        let mut unaligned = RecordHeader::new(ContentType::ApplicationData, 70).pack();
        unaligned.extend_from_slice(&[0; 70]);
        assert!(record::decode_protected(&unaligned, &keys, &mut seq).is_err());
        assert_eq!(seq, 0);
    }

    #[test]
    fn plain_records_are_split_into_chunks() {
        let wire = record::encode_plain(ContentType::Handshake, &[]);
        assert_eq!(wire, vec![22, 3, 3, 0, 0]);

        let payload = vec![7; record::MAX_PLAINTEXT_CHUNK + 10];
        let wire = record::encode_plain(ContentType::Handshake, &payload);
        assert_eq!(wire.len(), payload.len() + 2 * record::HEADER_LENGTH);
        let first = record::decode_header(&wire).expect("decode_header failed").expect("header missing");
        assert_eq!(first.length, record::MAX_PLAINTEXT_CHUNK);
        let second = record::decode_header(&wire[first.record_length()..])
            .expect("decode_header failed")
            .expect("header missing");
        assert_eq!(second.length, 10);
    }

    #[test]
    fn header_validation() {
        assert_eq!(record::decode_header(&[22, 3, 3, 0]).expect("decode_header failed"), None);
        match record::decode_header(&[24, 3, 3, 0, 0]) {
            Err(TLSError::InvalidContentTypeError(24)) => (),
            other => panic!("expected InvalidContentTypeError, got {:?}", other),
        }
        match record::decode_header(&[22, 3, 4, 0, 0]) {
            Err(TLSError::ProtocolVersionError(3, 4)) => (),
            other => panic!("expected ProtocolVersionError, got {:?}", other),
        }
        match record::decode_header(&[23, 3, 3, 0x40, 0x41]) {
            Err(TLSError::RecordOverflowError(16449)) => (),
            other => panic!("expected RecordOverflowError, got {:?}", other),
        }
        let header = record::decode_header(&[21, 3, 1, 0x40, 0x40]).expect("decode_header failed").expect("header missing");
        assert_eq!(header.length, record::MAX_RECORD_LENGTH);
        assert_eq!(header.version.minor, 1);
    }
}
