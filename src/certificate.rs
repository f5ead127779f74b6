use crate::crypto::PRE_MASTER_SECRET_LEN;
use crate::errors;
use crate::record::TLS_1_2;

use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::sync::Mutex;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use zeroize::Zeroizing;

/// Largest total size of a Certificate message list.
const MAX_CERTIFICATE_LIST_LENGTH: usize = 0x00ff_ffff;

/// PKCS#1 RSAPublicKey DER from the subjectPublicKey of an X.509 certificate.
pub fn public_key_from_certificate(der: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|_| errors::TLSError::CertificateError("malformed certificate"))?;
    let public_key = cert.tbs_certificate.subject_pki.subject_public_key.data.to_vec();
    Ok(public_key)
}

/// RSA key of an X.509 certificate; any other key type is rejected.
pub fn rsa_public_key_from_certificate(der: &[u8]) -> Result<(Vec<u8>, RsaPublicKey), errors::TLSError> {
    let public_key = public_key_from_certificate(der)?;
    let rsa_public_key = RsaPublicKey::from_pkcs1_der(&public_key)
        .map_err(|_| errors::TLSError::CertificateError("certificate key is not RSA"))?;
    Ok((public_key, rsa_public_key))
}

/// Server certificate, optional chain and the matching private key.
///
/// Shared by every server session through an `Arc`. All private key
/// operations are serialised by one mutex.
pub struct CertificateStore {
    certificate: Vec<u8>,
    chain: Vec<Vec<u8>>,
    public_key: Vec<u8>,
    private_key: Mutex<RsaPrivateKey>,
}

impl CertificateStore {
    /// `key_der` may be PKCS#1 or PKCS#8. The key must belong to the certificate.
    pub fn new(certificate_der: &[u8], key_der: &[u8]) -> Result<Self, errors::TLSError> {
        let (public_key, rsa_public_key) = rsa_public_key_from_certificate(certificate_der)?;
        let private_key = RsaPrivateKey::from_pkcs1_der(key_der)
            .or_else(|_| RsaPrivateKey::from_pkcs8_der(key_der))
            .map_err(|_| errors::TLSError::PrivateKeyError("key is neither PKCS#1 nor PKCS#8 RSA DER"))?;
        if RsaPublicKey::from(&private_key) != rsa_public_key {
            return Err(errors::TLSError::PrivateKeyError("key does not match certificate"));
        }
        let store = Self {
            certificate: certificate_der.to_vec(),
            chain: Vec::new(),
            public_key,
            private_key: Mutex::new(private_key),
        };
        store.check_list_length()?;
        Ok(store)
    }

    /// Intermediate certificates sent after the leaf, in order.
    pub fn with_chain(mut self, chain: Vec<Vec<u8>>) -> Result<Self, errors::TLSError> {
        if chain.iter().any(|c| c.is_empty()) {
            return Err(errors::TLSError::ConfigError("empty certificate in chain"));
        }
        self.chain = chain;
        self.check_list_length()?;
        Ok(self)
    }

    fn check_list_length(&self) -> Result<(), errors::TLSError> {
        let total: usize = self.certificate_list().iter().map(|c| 3 + c.len()).sum();
        match total {
            n if n <= MAX_CERTIFICATE_LIST_LENGTH && self.certificate.len() <= MAX_CERTIFICATE_LIST_LENGTH => Ok(()),
            _ => Err(errors::TLSError::ConfigError("certificate chain too long")),
        }
    }

    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Leaf certificate followed by the chain, as sent in the Certificate message.
    pub fn certificate_list(&self) -> Vec<Vec<u8>> {
        let mut list = Vec::with_capacity(1 + self.chain.len());
        list.push(self.certificate.clone());
        list.extend(self.chain.iter().cloned());
        list
    }

    /// PKCS#1 RSAPublicKey DER of the leaf certificate.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Recovers the pre-master secret from a ClientKeyExchange.
    ///
    /// A failed decryption, a wrong length and a wrong embedded version all
    /// produce the same `DecryptionFailedError`.
    pub fn decrypt_pre_master_secret(&self, encrypted: &[u8]) -> Result<Zeroizing<Vec<u8>>, errors::TLSError> {
        let private_key = self.private_key.lock().map_err(|_| errors::TLSError::DecryptionFailedError)?;
        let pre_master_secret = private_key
            .decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, encrypted)
            .map(Zeroizing::new)
            .map_err(|_| errors::TLSError::DecryptionFailedError)?;
        drop(private_key);

        if pre_master_secret.len() != PRE_MASTER_SECRET_LEN || pre_master_secret[..2] != TLS_1_2.pack_bytes() {
            return Err(errors::TLSError::DecryptionFailedError);
        }
        Ok(pre_master_secret)
    }
}

#[cfg(test)]
mod tests {
    use crate::certificate::{self, CertificateStore};
    use crate::errors::TLSError;

    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
    use std::sync::Arc;
    use std::thread;

    const CERTIFICATE: &[u8] = include_bytes!("../tests/fixtures/server-cert.der");
    const KEY: &[u8] = include_bytes!("../tests/fixtures/server-key.der");
    const KEY_PKCS8: &[u8] = include_bytes!("../tests/fixtures/server-key.pk8.der");
    const OTHER_KEY: &[u8] = include_bytes!("../tests/fixtures/other-key.der");

    fn encrypt(store: &CertificateStore, message: &[u8]) -> Vec<u8> {
        let public_key = RsaPublicKey::from_pkcs1_der(store.public_key()).expect("parsing public key failed");
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        public_key.encrypt(&mut rng, Pkcs1v15Encrypt, message).expect("encrypt failed")
    }

    #[test]
    fn public_key_is_pkcs1_rsa() {
        let public_key = certificate::public_key_from_certificate(CERTIFICATE).expect("public_key_from_certificate failed");
        // SEQUENCE { INTEGER n, INTEGER e }
        assert_eq!(public_key[0], 0x30);
        RsaPublicKey::from_pkcs1_der(&public_key).expect("parsing public key failed");
        assert!(certificate::public_key_from_certificate(&CERTIFICATE[..100]).is_err());
    }

    #[test]
    fn store_accepts_pkcs1_and_pkcs8_keys() {
        let store = CertificateStore::new(CERTIFICATE, KEY).expect("building CertificateStore failed");
        let store8 = CertificateStore::new(CERTIFICATE, KEY_PKCS8).expect("building CertificateStore failed");
        assert_eq!(store.public_key(), store8.public_key());
        assert_eq!(store.certificate_list(), vec![CERTIFICATE.to_vec()]);

        let store = store.with_chain(vec![vec![0x30, 0x00]]).expect("with_chain failed");
        assert_eq!(store.certificate_list().len(), 2);
        assert_eq!(store.certificate(), CERTIFICATE);
    }

    #[test]
    fn mismatched_key_is_rejected() {
        match CertificateStore::new(CERTIFICATE, OTHER_KEY) {
            Err(TLSError::PrivateKeyError(_)) => (),
            Err(e) => panic!("expected PrivateKeyError, got {:?}", e),
            Ok(_) => panic!("mismatched key was accepted"),
        }
        match CertificateStore::new(CERTIFICATE, &[0x30, 0x03, 0x02, 0x01, 0x00]) {
            Err(TLSError::PrivateKeyError(_)) => (),
            Err(e) => panic!("expected PrivateKeyError, got {:?}", e),
            Ok(_) => panic!("garbage key was accepted"),
        }
    }

    #[test]
    fn decrypt_pre_master_secret() {
        let store = CertificateStore::new(CERTIFICATE, KEY).expect("building CertificateStore failed");
        let mut pre_master_secret = vec![0x42; 48];
        pre_master_secret[0] = 3;
        pre_master_secret[1] = 3;
        let encrypted = encrypt(&store, &pre_master_secret);
        let decrypted = store.decrypt_pre_master_secret(&encrypted).expect("decrypt_pre_master_secret failed");
        assert_eq!(&decrypted[..], &pre_master_secret[..]);
    }

    #[test]
    fn decrypt_failures_are_indistinguishable() {
        let store = CertificateStore::new(CERTIFICATE, KEY).expect("building CertificateStore failed");
        let wrong_version = encrypt(&store, &[[3, 1].to_vec(), vec![0; 46]].concat());
        let wrong_length = encrypt(&store, &[3, 3, 0, 0]);
        let garbage = vec![0x5a; 256];
        for encrypted in [wrong_version, wrong_length, garbage, Vec::new()].iter() {
            match store.decrypt_pre_master_secret(encrypted) {
                Err(TLSError::DecryptionFailedError) => (),
                Err(e) => panic!("expected DecryptionFailedError, got {:?}", e),
                Ok(_) => panic!("bad ClientKeyExchange was accepted"),
            }
        }
    }

    #[test]
    fn store_is_shared_across_threads() {
        let store = Arc::new(CertificateStore::new(CERTIFICATE, KEY).expect("building CertificateStore failed"));
        let mut pre_master_secret = vec![0x11; 48];
        pre_master_secret[..2].copy_from_slice(&[3, 3]);
        let encrypted = encrypt(&store, &pre_master_secret);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let encrypted = encrypted.clone();
                thread::spawn(move || store.decrypt_pre_master_secret(&encrypted).map(|p| p.to_vec()))
            })
            .collect();
        for handle in handles {
            let decrypted = handle.join().expect("thread panicked").expect("decrypt_pre_master_secret failed");
            assert_eq!(decrypted, pre_master_secret);
        }
    }
}
