use crate::certificate::CertificateStore;
use crate::cipher::{self, CipherSuite};
use crate::errors;

use std::sync::Arc;

fn validate_cipher_suites(cipher_suites: &[CipherSuite]) -> Result<(), errors::TLSError> {
    if cipher_suites.is_empty() {
        return Err(errors::TLSError::ConfigError("no cipher suites configured"));
    }
    match cipher_suites.iter().find(|&&suite| !cipher::is_supported(suite)) {
        Some(&suite) => Err(errors::TLSError::CipherNotSupportedError(suite)),
        None => Ok(()),
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Offered in this order.
    pub cipher_suites: Vec<CipherSuite>,
    /// PKCS#1 RSAPublicKey DER the server certificate must carry, byte for byte.
    pub pinned_public_key: Option<Vec<u8>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cipher_suites: cipher::SUPPORTED_CIPHER_SUITES.to_vec(),
            pinned_public_key: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cipher_suites(mut self, cipher_suites: Vec<CipherSuite>) -> Self {
        self.cipher_suites = cipher_suites;
        self
    }

    pub fn with_pinned_public_key(mut self, public_key: Vec<u8>) -> Self {
        self.pinned_public_key = Some(public_key);
        self
    }

    pub fn validate(&self) -> Result<(), errors::TLSError> {
        validate_cipher_suites(&self.cipher_suites)
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    /// Server preference order used for selection.
    pub cipher_suites: Vec<CipherSuite>,
    pub certificate_store: Arc<CertificateStore>,
}

impl ServerConfig {
    pub fn new(certificate_store: Arc<CertificateStore>) -> Self {
        Self {
            cipher_suites: cipher::SUPPORTED_CIPHER_SUITES.to_vec(),
            certificate_store,
        }
    }

    pub fn with_cipher_suites(mut self, cipher_suites: Vec<CipherSuite>) -> Self {
        self.cipher_suites = cipher_suites;
        self
    }

    pub fn validate(&self) -> Result<(), errors::TLSError> {
        validate_cipher_suites(&self.cipher_suites)
    }
}
