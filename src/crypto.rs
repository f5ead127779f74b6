use crate::cipher;
use crate::errors;
use crate::record::{ContentType, ProtocolVersion};

use aes::{Aes128, Aes256};
use block_modes::block_padding::NoPadding;
use block_modes::{BlockMode, Cbc};
use ring::hmac;
use sha2::{Digest, Sha256};
use std::convert::TryFrom;
use zeroize::Zeroizing;

pub const VERIFY_DATA_LENGTH: usize = 12;
pub const MASTER_SECRET_STR: &[u8; 13] = b"master secret";
pub const MASTER_SECRET_LEN: usize = 48;
pub const PRE_MASTER_SECRET_LEN: usize = 48;
pub const KEY_BLOCK_STR: &[u8; 13] = b"key expansion";
pub const KEY_BLOCK_LEN: usize = 256;
pub const CLIENT_FINISHED_LABEL: &[u8; 15] = b"client finished";
pub const SERVER_FINISHED_LABEL: &[u8; 15] = b"server finished";

pub type MasterSecret = Zeroizing<[u8; MASTER_SECRET_LEN]>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConnectionEnd {
    Server,
    Client,
}

impl ConnectionEnd {
    pub fn peer(self) -> Self {
        match self {
            ConnectionEnd::Server => ConnectionEnd::Client,
            ConnectionEnd::Client => ConnectionEnd::Server,
        }
    }
}

/// MAC and encryption keys protecting one direction of the connection.
#[derive(Clone)]
pub struct DirectionKeys {
    pub mac_algorithm: cipher::MACAlgorithm,
    pub mac_key: Zeroizing<Vec<u8>>,
    pub enc_key: Zeroizing<Vec<u8>>,
}

impl DirectionKeys {
    pub fn mac_length(&self) -> usize {
        match self.mac_algorithm {
            cipher::MACAlgorithm::HmacSha1 => 20,
            cipher::MACAlgorithm::HmacSha256 => 32,
        }
    }
}

#[derive(Clone)]
pub struct KeyBlock {
    pub client_write_mac_key: Zeroizing<Vec<u8>>,
    pub server_write_mac_key: Zeroizing<Vec<u8>>,
    pub client_write_key: Zeroizing<Vec<u8>>,
    pub server_write_key: Zeroizing<Vec<u8>>,
    mac_algorithm: cipher::MACAlgorithm,
}

impl KeyBlock {
    pub fn new(
        cipher_parameters: &cipher::CipherParameters,
        master_secret: &[u8],
        server_random: &[u8],
        client_random: &[u8],
    ) -> Result<Self, errors::TLSError> {
        let unparsed_block = derive_key_block(master_secret, server_random, client_random);
        Self::from_bytes(cipher_parameters, &unparsed_block)
    }

    /// Slices PRF output in the fixed order: client MAC, server MAC, client key, server key.
    pub fn from_bytes(cipher_parameters: &cipher::CipherParameters, unparsed_block: &[u8]) -> Result<Self, errors::TLSError> {
        let mac_key_length = cipher_parameters.mac_key_length;
        let write_key_length = cipher_parameters.enc_key_length;
        if unparsed_block.len() < cipher_parameters.key_material_length() {
            return Err(errors::TLSError::CipherError("key block too short"));
        }

        let mut i = 0;
        let client_write_mac_key = Zeroizing::new(unparsed_block[i..i + mac_key_length].to_vec());
        i += mac_key_length;
        let server_write_mac_key = Zeroizing::new(unparsed_block[i..i + mac_key_length].to_vec());
        i += mac_key_length;
        let client_write_key = Zeroizing::new(unparsed_block[i..i + write_key_length].to_vec());
        i += write_key_length;
        let server_write_key = Zeroizing::new(unparsed_block[i..i + write_key_length].to_vec());
        Ok(Self {
            client_write_mac_key,
            server_write_mac_key,
            client_write_key,
            server_write_key,
            mac_algorithm: cipher_parameters.mac_algorithm,
        })
    }

    /// Keys used by `end` when it sends records.
    pub fn writer(&self, end: ConnectionEnd) -> DirectionKeys {
        let (mac_key, enc_key) = match end {
            ConnectionEnd::Client => (&self.client_write_mac_key, &self.client_write_key),
            ConnectionEnd::Server => (&self.server_write_mac_key, &self.server_write_key),
        };
        DirectionKeys {
            mac_algorithm: self.mac_algorithm,
            mac_key: mac_key.clone(),
            enc_key: enc_key.clone(),
        }
    }

    pub fn as_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(
            [
                &self.client_write_mac_key[..],
                &self.server_write_mac_key[..],
                &self.client_write_key[..],
                &self.server_write_key[..],
            ]
            .concat(),
        )
    }
}

fn concat_sign(key: &hmac::Key, a: &[u8], b: &[u8]) -> hmac::Tag {
    let mut ctx = hmac::Context::with_key(key);
    ctx.update(a);
    ctx.update(b);
    ctx.sign()
}

/// P_SHA256 from RFC 5246 section 5. `seed` already includes the label.
pub fn prf_sha256(secret: &[u8], seed: &[u8], output_length: usize) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    // A(1) = HMAC_hash(secret, A(0)), A(0) = seed
    let mut a = hmac::sign(&key, seed);
    let mut result = Vec::with_capacity(output_length + 32);
    while result.len() < output_length {
        // HMAC_hash(secret, A(i) + seed)
        let p_hash = concat_sign(&key, a.as_ref(), seed);
        result.extend_from_slice(p_hash.as_ref());
        a = hmac::sign(&key, a.as_ref());
    }
    result.truncate(output_length);
    result
}

pub fn prf(secret: &[u8], label: &[u8], seed: &[u8], output_length: usize) -> Zeroizing<Vec<u8>> {
    let labelled_seed = [label, seed].concat();
    Zeroizing::new(prf_sha256(secret, &labelled_seed, output_length))
}

//master_secret = PRF(pre_master_secret, "master secret", ClientHello.random + ServerHello.random)[0..47];
pub fn derive_master_secret(pre_master_secret: &[u8], client_random: &[u8], server_random: &[u8]) -> MasterSecret {
    let seed = [client_random, server_random].concat();
    let result = prf(pre_master_secret, MASTER_SECRET_STR, &seed, MASTER_SECRET_LEN);
    let mut master_secret = Zeroizing::new([0; MASTER_SECRET_LEN]);
    master_secret.copy_from_slice(&result);
    master_secret
}

pub fn derive_key_block(master_secret: &[u8], server_random: &[u8], client_random: &[u8]) -> Zeroizing<Vec<u8>> {
    let seed = [server_random, client_random].concat();
    prf(master_secret, KEY_BLOCK_STR, &seed, KEY_BLOCK_LEN)
}

pub fn transcript_hash(handshake_messages: &[u8]) -> Vec<u8> {
    Sha256::digest(handshake_messages).to_vec()
}

pub fn verify_data(finished_label: &[u8], handshake_hash: &[u8], master_secret: &[u8]) -> Vec<u8> {
    let prf_output = prf(master_secret, finished_label, handshake_hash, VERIFY_DATA_LENGTH);
    prf_output[..VERIFY_DATA_LENGTH].to_vec()
}

/// Constant-time equality for secrets and pinned values. Length differences return false.
pub fn slices_equal(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}

fn hmac_algorithm(mac_algorithm: cipher::MACAlgorithm) -> hmac::Algorithm {
    match mac_algorithm {
        cipher::MACAlgorithm::HmacSha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
        cipher::MACAlgorithm::HmacSha256 => hmac::HMAC_SHA256,
    }
}

fn mac_header(seq_num: u64, r#type: ContentType, version: ProtocolVersion, length: usize) -> Result<Vec<u8>, errors::TLSError> {
    let mut header = Vec::with_capacity(13);
    header.extend_from_slice(&seq_num.to_be_bytes());
    header.push(r#type as u8);
    header.extend_from_slice(&version.pack_bytes());
    header.extend_from_slice(&u16::try_from(length)?.to_be_bytes());
    Ok(header)
}

// MAC(MAC_write_key, seq_num + type + version + length + fragment)
pub fn mac(
    keys: &DirectionKeys,
    seq_num: u64,
    r#type: ContentType,
    version: ProtocolVersion,
    fragment: &[u8],
) -> Result<Vec<u8>, errors::TLSError> {
    let key = hmac::Key::new(hmac_algorithm(keys.mac_algorithm), &keys.mac_key);
    let header = mac_header(seq_num, r#type, version, fragment.len())?;
    Ok(concat_sign(&key, &header, fragment).as_ref().to_vec())
}

pub fn verify_mac(
    keys: &DirectionKeys,
    seq_num: u64,
    r#type: ContentType,
    version: ProtocolVersion,
    fragment: &[u8],
    tag: &[u8],
) -> Result<(), errors::TLSError> {
    let key = hmac::Key::new(hmac_algorithm(keys.mac_algorithm), &keys.mac_key);
    let material = [mac_header(seq_num, r#type, version, fragment.len())?, fragment.to_vec()].concat();
    hmac::verify(&key, &material, tag).map_err(|_| errors::TLSError::IntegrityError("bad record mac"))
}

type Aes128Cbc = Cbc<Aes128, NoPadding>;
type Aes256Cbc = Cbc<Aes256, NoPadding>;

/// AES-CBC over block-aligned input; padding is applied by the record layer.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
    if plaintext.len() % cipher::AES_BLOCK_LENGTH != 0 {
        return Err(errors::TLSError::CipherError("plaintext is not block aligned"));
    }
    let ciphertext = match key.len() {
        16 => Aes128Cbc::new_from_slices(key, iv)
            .map_err(|_| errors::TLSError::CipherError("invalid key or iv length"))?
            .encrypt_vec(plaintext),
        32 => Aes256Cbc::new_from_slices(key, iv)
            .map_err(|_| errors::TLSError::CipherError("invalid key or iv length"))?
            .encrypt_vec(plaintext),
        _ => return Err(errors::TLSError::CipherError("invalid key length")),
    };
    Ok(ciphertext)
}

pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
    let plaintext = match key.len() {
        16 => Aes128Cbc::new_from_slices(key, iv)
            .map_err(|_| errors::TLSError::CipherError("invalid key or iv length"))?
            .decrypt_vec(ciphertext),
        32 => Aes256Cbc::new_from_slices(key, iv)
            .map_err(|_| errors::TLSError::CipherError("invalid key or iv length"))?
            .decrypt_vec(ciphertext),
        _ => return Err(errors::TLSError::CipherError("invalid key length")),
    };
    plaintext.map_err(|_| errors::TLSError::IntegrityError("bad record mac"))
}
