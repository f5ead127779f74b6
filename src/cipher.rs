use crate::errors;

pub type CipherSuite = u16;

/// Placeholder suite before negotiation.
pub const TLS_NULL_WITH_NULL_NULL: CipherSuite = 0x0000;
pub const TLS_RSA_WITH_AES_128_CBC_SHA: CipherSuite = 0x002f;
pub const TLS_RSA_WITH_AES_256_CBC_SHA: CipherSuite = 0x0035;
pub const TLS_RSA_WITH_AES_128_CBC_SHA256: CipherSuite = 0x003c;
pub const TLS_RSA_WITH_AES_256_CBC_SHA256: CipherSuite = 0x003d;

/// Every suite this crate implements, strongest first.
pub const SUPPORTED_CIPHER_SUITES: [CipherSuite; 4] = [
    TLS_RSA_WITH_AES_256_CBC_SHA256,
    TLS_RSA_WITH_AES_128_CBC_SHA256,
    TLS_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_CBC_SHA,
];

pub const AES_BLOCK_LENGTH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MACAlgorithm {
    HmacSha1,
    HmacSha256,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CipherParameters {
    pub enc_key_length: usize,
    pub mac_algorithm: MACAlgorithm,
    pub mac_length: usize,
    pub mac_key_length: usize,
}

impl CipherParameters {
    /// Bytes of key block consumed by the four write keys.
    pub fn key_material_length(&self) -> usize {
        2 * self.mac_key_length + 2 * self.enc_key_length
    }
}

pub fn is_supported(cipher: CipherSuite) -> bool {
    SUPPORTED_CIPHER_SUITES.contains(&cipher)
}

pub fn parameters(cipher: CipherSuite) -> Result<CipherParameters, errors::TLSError> {
    let (enc_key_length, mac_algorithm) = match cipher {
        TLS_RSA_WITH_AES_128_CBC_SHA => (16, MACAlgorithm::HmacSha1),
        TLS_RSA_WITH_AES_256_CBC_SHA => (32, MACAlgorithm::HmacSha1),
        TLS_RSA_WITH_AES_128_CBC_SHA256 => (16, MACAlgorithm::HmacSha256),
        TLS_RSA_WITH_AES_256_CBC_SHA256 => (32, MACAlgorithm::HmacSha256),
        _ => return Err(errors::TLSError::CipherNotSupportedError(cipher)),
    };
    let mac_length = match mac_algorithm {
        MACAlgorithm::HmacSha1 => 20,
        MACAlgorithm::HmacSha256 => 32,
    };
    Ok(CipherParameters {
        enc_key_length,
        mac_algorithm,
        mac_length,
        mac_key_length: mac_length,
    })
}
