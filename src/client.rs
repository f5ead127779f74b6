use crate::certificate;
use crate::config::ClientConfig;
use crate::crypto::{self, ConnectionEnd, PRE_MASTER_SECRET_LEN};
use crate::errors;
use crate::handshake::{self, Certificates, ClientHello, ClientKeyExchange, Finished, HandshakeType, Random, ServerHello, ServerHelloDone};
use crate::record::{ContentType, TLS_1_2};
use crate::session::{SecureRng, Session, SessionCore};
use crate::transcript::TranscriptSlot;

use log::debug;
use rand_core::{OsRng, RngCore};
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use zeroize::Zeroizing;

#[derive(Clone, Copy, Debug, PartialEq)]
enum HandshakeState {
    Idle,
    ExpectServerHello,
    ExpectCertificate,
    ExpectServerHelloDone,
    ExpectChangeCipherSpec,
    ExpectFinished,
    Done,
}

/// Client side of a TLS 1.2 connection.
pub struct ClientSession {
    core: SessionCore,
    config: ClientConfig,
    handshake_state: HandshakeState,
    server_public_key: Option<RsaPublicKey>,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Result<ClientSession, errors::TLSError> {
        Self::with_rng(config, OsRng)
    }

    pub fn with_rng<R: SecureRng + 'static>(config: ClientConfig, rng: R) -> Result<ClientSession, errors::TLSError> {
        config.validate()?;
        Ok(ClientSession {
            core: SessionCore::new(ConnectionEnd::Client, Box::new(rng)),
            config,
            handshake_state: HandshakeState::Idle,
            server_public_key: None,
        })
    }

    // Flight 1
    fn send_client_hello(&mut self) -> Result<Vec<u8>, errors::TLSError> {
        let random = Random::new(self.core.rng())?;
        let message = handshake::encode(ClientHello::new(random, self.config.cipher_suites.clone()));
        self.core.client_random = Some(random);
        self.core.record_handshake(TranscriptSlot::ClientHello, &message)?;
        debug!("client: sending ClientHello offering {:04x?}", self.config.cipher_suites);
        self.handshake_state = HandshakeState::ExpectServerHello;
        self.core.encode_record(ContentType::Handshake, &message)
    }

    fn recv_server_hello(&mut self, message: &[u8]) -> Result<(), errors::TLSError> {
        let server_hello = handshake::decode::<ServerHello>(message)?;
        if server_hello.server_version != TLS_1_2 {
            return Err(errors::TLSError::ProtocolVersionError(
                server_hello.server_version.major,
                server_hello.server_version.minor,
            ));
        }
        if !self.config.cipher_suites.contains(&server_hello.cipher_suite) {
            return Err(errors::TLSError::CipherNotSupportedError(server_hello.cipher_suite));
        }
        debug!("client: received ServerHello selecting {:#06x}", server_hello.cipher_suite);
        self.core.record_handshake(TranscriptSlot::ServerHello, message)?;
        self.core.set_cipher_suite(server_hello.cipher_suite);
        self.core.server_random = Some(server_hello.random);
        self.handshake_state = HandshakeState::ExpectCertificate;
        Ok(())
    }

    fn recv_certificate(&mut self, message: &[u8]) -> Result<(), errors::TLSError> {
        let certificates = handshake::decode::<Certificates>(message)?;
        let leaf = certificates
            .certificate_list
            .first()
            .ok_or(errors::TLSError::CertificateError("server sent no certificate"))?;
        let (public_key, rsa_public_key) = certificate::rsa_public_key_from_certificate(leaf)?;
        if let Some(pinned) = &self.config.pinned_public_key {
            if !crypto::slices_equal(pinned, &public_key) {
                return Err(errors::TLSError::CertificateError("server public key does not match pin"));
            }
        }
        debug!("client: received Certificate chain of {}", certificates.certificate_list.len());
        self.core.record_handshake(TranscriptSlot::ServerCertificate, message)?;
        self.server_public_key = Some(rsa_public_key);
        self.handshake_state = HandshakeState::ExpectServerHelloDone;
        Ok(())
    }

    // Flight 3: ClientKeyExchange, ChangeCipherSpec, Finished
    fn recv_server_hello_done(&mut self, message: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        handshake::decode::<ServerHelloDone>(message)?;
        debug!("client: received ServerHelloDone");
        self.core.record_handshake(TranscriptSlot::ServerHelloDone, message)?;

        let mut pre_master_secret = Zeroizing::new([0; PRE_MASTER_SECRET_LEN]);
        pre_master_secret[..2].copy_from_slice(&TLS_1_2.pack_bytes());
        self.core
            .rng()
            .try_fill_bytes(&mut pre_master_secret[2..])
            .map_err(|_| errors::TLSError::RandomError)?;
        let server_public_key = self
            .server_public_key
            .as_ref()
            .ok_or(errors::TLSError::UnexpectedMessageError("server certificate missing"))?;
        let encrypted = server_public_key
            .encrypt(self.core.rng(), Pkcs1v15Encrypt, &pre_master_secret[..])
            .map_err(|_| errors::TLSError::CipherError("RSA encryption failed"))?;
        self.core.install_keys(&pre_master_secret[..])?;

        let client_key_exchange = handshake::encode(ClientKeyExchange::new(encrypted));
        self.core.record_handshake(TranscriptSlot::ClientKeyExchange, &client_key_exchange)?;
        let mut output = self.core.encode_record(ContentType::Handshake, &client_key_exchange)?;
        debug!("client: sending ClientKeyExchange");

        output.extend_from_slice(&self.core.change_cipher_spec_record()?);
        self.core.activate_send_cipher()?;

        let handshake_hash = self.core.transcript()?.hash();
        let verify_data = crypto::verify_data(crypto::CLIENT_FINISHED_LABEL, &handshake_hash, self.core.master_secret()?);
        let finished = handshake::encode(Finished::new(verify_data));
        self.core.record_handshake(TranscriptSlot::ClientFinished, &finished)?;
        output.extend_from_slice(&self.core.encode_record(ContentType::Handshake, &finished)?);
        debug!("client: sending Finished");

        self.handshake_state = HandshakeState::ExpectChangeCipherSpec;
        Ok(output)
    }

    fn recv_finished(&mut self, message: &[u8]) -> Result<(), errors::TLSError> {
        let finished = handshake::decode::<Finished>(message)?;
        let handshake_hash = self.core.transcript()?.hash();
        let expected = crypto::verify_data(crypto::SERVER_FINISHED_LABEL, &handshake_hash, self.core.master_secret()?);
        if !crypto::slices_equal(&expected, &finished.verify_data) {
            return Err(errors::TLSError::FinishedMismatchError);
        }
        debug!("client: server Finished verified");
        self.handshake_state = HandshakeState::Done;
        self.core.complete();
        Ok(())
    }
}

impl Session for ClientSession {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SessionCore {
        &mut self.core
    }

    fn start_handshake(&mut self) -> Result<Vec<u8>, errors::TLSError> {
        self.send_client_hello()
    }

    fn handle_handshake(&mut self, message: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        match (self.handshake_state, handshake::message_type(message)?) {
            (HandshakeState::ExpectServerHello, HandshakeType::ServerHello) => self.recv_server_hello(message).map(|_| Vec::new()),
            (HandshakeState::ExpectCertificate, HandshakeType::Certificates) => self.recv_certificate(message).map(|_| Vec::new()),
            (HandshakeState::ExpectServerHelloDone, HandshakeType::ServerHelloDone) => self.recv_server_hello_done(message),
            (HandshakeState::ExpectFinished, HandshakeType::Finished) => self.recv_finished(message).map(|_| Vec::new()),
            (_, msg_type) => {
                debug!("client: {:?} while in {:?}", msg_type, self.handshake_state);
                Err(errors::TLSError::UnexpectedMessageError("unexpected handshake message"))
            }
        }
    }

    fn handle_change_cipher_spec(&mut self) -> Result<(), errors::TLSError> {
        match self.handshake_state {
            HandshakeState::ExpectChangeCipherSpec => {
                self.core.activate_recv_cipher()?;
                self.handshake_state = HandshakeState::ExpectFinished;
                Ok(())
            }
            _ => Err(errors::TLSError::UnexpectedMessageError("unexpected change cipher spec")),
        }
    }

    fn reset_role(&mut self) {
        self.handshake_state = HandshakeState::Idle;
        self.server_public_key = None;
    }
}
