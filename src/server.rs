use crate::cipher::CipherSuite;
use crate::config::ServerConfig;
use crate::crypto::{self, ConnectionEnd};
use crate::errors;
use crate::handshake::{self, Certificates, ClientHello, ClientKeyExchange, CompressionMethod, Finished, HandshakeType, Random, ServerHello, ServerHelloDone};
use crate::record::{ContentType, ProtocolVersion, TLS_1_2};
use crate::session::{SecureRng, Session, SessionCore};
use crate::transcript::TranscriptSlot;

use log::debug;
use rand_core::OsRng;

#[derive(Clone, Copy, Debug, PartialEq)]
enum HandshakeState {
    Idle,
    ExpectClientHello,
    ExpectClientKeyExchange,
    ExpectChangeCipherSpec,
    ExpectFinished,
    Done,
}

/// Server side of a TLS 1.2 connection.
pub struct ServerSession {
    core: SessionCore,
    config: ServerConfig,
    handshake_state: HandshakeState,
}

fn is_acceptable_client_version(version: ProtocolVersion) -> bool {
    (version.major, version.minor) >= (TLS_1_2.major, TLS_1_2.minor)
}

/// First suite in our preference order that the client also offered.
fn select_cipher_suite(preference: &[CipherSuite], offered: &[CipherSuite]) -> Option<CipherSuite> {
    preference.iter().copied().find(|suite| offered.contains(suite))
}

impl ServerSession {
    pub fn new(config: ServerConfig) -> Result<ServerSession, errors::TLSError> {
        Self::with_rng(config, OsRng)
    }

    pub fn with_rng<R: SecureRng + 'static>(config: ServerConfig, rng: R) -> Result<ServerSession, errors::TLSError> {
        config.validate()?;
        Ok(ServerSession {
            core: SessionCore::new(ConnectionEnd::Server, Box::new(rng)),
            config,
            handshake_state: HandshakeState::Idle,
        })
    }

    // Flight 2: ServerHello, Certificate, ServerHelloDone
    fn recv_client_hello(&mut self, message: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        let client_hello = handshake::decode::<ClientHello>(message)?;
        if !is_acceptable_client_version(client_hello.client_version) {
            return Err(errors::TLSError::ProtocolVersionError(
                client_hello.client_version.major,
                client_hello.client_version.minor,
            ));
        }
        if !client_hello.compression_methods.offers(CompressionMethod::Null) {
            return Err(errors::TLSError::InvalidCompressionMethodError);
        }
        let cipher_suite = select_cipher_suite(&self.config.cipher_suites, &client_hello.cipher_suites.0)
            .ok_or(errors::TLSError::NoSharedCipherSuiteError)?;
        debug!(
            "server: received ClientHello offering {:04x?}, selected {:#06x}",
            client_hello.cipher_suites.0, cipher_suite
        );
        self.core.record_handshake(TranscriptSlot::ClientHello, message)?;
        self.core.set_cipher_suite(cipher_suite);
        self.core.client_random = Some(client_hello.random);

        let random = Random::new(self.core.rng())?;
        self.core.server_random = Some(random);
        let server_hello = handshake::encode(ServerHello::new(random, cipher_suite));
        let certificates = handshake::encode(Certificates::new(self.config.certificate_store.certificate_list()));
        let server_hello_done = handshake::encode(ServerHelloDone);
        self.core.record_handshake(TranscriptSlot::ServerHello, &server_hello)?;
        self.core.record_handshake(TranscriptSlot::ServerCertificate, &certificates)?;
        self.core.record_handshake(TranscriptSlot::ServerHelloDone, &server_hello_done)?;
        debug!("server: sending ServerHello, Certificate, ServerHelloDone");

        let flight = [server_hello, certificates, server_hello_done].concat();
        self.handshake_state = HandshakeState::ExpectClientKeyExchange;
        self.core.encode_record(ContentType::Handshake, &flight)
    }

    fn recv_client_key_exchange(&mut self, message: &[u8]) -> Result<(), errors::TLSError> {
        let client_key_exchange = handshake::decode::<ClientKeyExchange>(message)?;
        let pre_master_secret = self
            .config
            .certificate_store
            .decrypt_pre_master_secret(&client_key_exchange.encrypted_pre_master_secret)?;
        debug!("server: received ClientKeyExchange");
        self.core.record_handshake(TranscriptSlot::ClientKeyExchange, message)?;
        self.core.install_keys(&pre_master_secret)?;
        self.handshake_state = HandshakeState::ExpectChangeCipherSpec;
        Ok(())
    }

    // Flight 4: ChangeCipherSpec, Finished
    fn recv_finished(&mut self, message: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        let finished = handshake::decode::<Finished>(message)?;
        let handshake_hash = self.core.transcript()?.hash();
        let expected = crypto::verify_data(crypto::CLIENT_FINISHED_LABEL, &handshake_hash, self.core.master_secret()?);
        if !crypto::slices_equal(&expected, &finished.verify_data) {
            return Err(errors::TLSError::FinishedMismatchError);
        }
        debug!("server: client Finished verified");
        self.core.record_handshake(TranscriptSlot::ClientFinished, message)?;

        let mut output = self.core.change_cipher_spec_record()?;
        self.core.activate_send_cipher()?;
        let handshake_hash = self.core.transcript()?.hash();
        let verify_data = crypto::verify_data(crypto::SERVER_FINISHED_LABEL, &handshake_hash, self.core.master_secret()?);
        output.extend_from_slice(&self.core.encode_record(ContentType::Handshake, &handshake::encode(Finished::new(verify_data)))?);
        debug!("server: sending Finished");

        self.handshake_state = HandshakeState::Done;
        self.core.complete();
        Ok(output)
    }
}

impl Session for ServerSession {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SessionCore {
        &mut self.core
    }

    fn start_handshake(&mut self) -> Result<Vec<u8>, errors::TLSError> {
        self.handshake_state = HandshakeState::ExpectClientHello;
        Ok(Vec::new())
    }

    fn handle_handshake(&mut self, message: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        match (self.handshake_state, handshake::message_type(message)?) {
            (HandshakeState::ExpectClientHello, HandshakeType::ClientHello) => self.recv_client_hello(message),
            (HandshakeState::ExpectClientKeyExchange, HandshakeType::ClientKeyExchange) => {
                self.recv_client_key_exchange(message).map(|_| Vec::new())
            }
            (HandshakeState::ExpectFinished, HandshakeType::Finished) => self.recv_finished(message),
            (_, msg_type) => {
                debug!("server: {:?} while in {:?}", msg_type, self.handshake_state);
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
    }
}

#[cfg(test)]
mod tests {
    use crate::alert::AlertDescription;
    use crate::cipher;
    use crate::config::ClientConfig;
    use crate::crypto::{self, ConnectionEnd};
    use crate::errors::TLSError;
    use crate::handshake::{self, ClientHello, ClientKeyExchange, Random};
    use crate::record::{self, ContentType, ProtocolVersion};
    use crate::server;
    use crate::session::{Outcome, Session, SessionState};
    use crate::test::support;

    fn client_hello_record(hello: ClientHello) -> Vec<u8> {
        record::encode_plain(ContentType::Handshake, &handshake::encode(hello))
    }

    fn expect_failure(outcome: Outcome, description: AlertDescription) -> TLSError {
        match outcome {
            Outcome::Error { error, alert } => {
                assert_eq!(alert, Some(support::alert_record(description)), "wrong alert for {:?}", error);
                error
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn server_preference_wins() {
        let preference = [0x003d, 0x002f];
        assert_eq!(server::select_cipher_suite(&preference, &[0x002f, 0x003d]), Some(0x003d));
        assert_eq!(server::select_cipher_suite(&preference, &[0x0035, 0x002f]), Some(0x002f));
        assert_eq!(server::select_cipher_suite(&preference, &[0xc02f]), None);

        assert!(server::is_acceptable_client_version(ProtocolVersion { major: 3, minor: 3 }));
        assert!(server::is_acceptable_client_version(ProtocolVersion { major: 3, minor: 4 }));
        assert!(!server::is_acceptable_client_version(ProtocolVersion { major: 3, minor: 1 }));
    }

    #[test]
    fn no_shared_suite_fails_with_handshake_failure() {
        let mut client = support::client(20, ClientConfig::new().with_cipher_suites(vec![cipher::TLS_RSA_WITH_AES_128_CBC_SHA]));
        let config = support::server_config().with_cipher_suites(vec![cipher::TLS_RSA_WITH_AES_256_CBC_SHA256]);
        let mut server = support::server(21, config);
        let client_hello = client.start().expect("start failed");
        server.start().expect("start failed");
        match expect_failure(server.on_transport_read(&client_hello), AlertDescription::HandshakeFailure) {
            TLSError::NoSharedCipherSuiteError => (),
            e => panic!("expected NoSharedCipherSuiteError, got {:?}", e),
        }
        assert_eq!(server.cipher_suite(), cipher::TLS_NULL_WITH_NULL_NULL);
        assert_eq!(server.state(), SessionState::Failed);

        let mut server = support::server(21, support::server_config());
        server.start().expect("start failed");
        let outcome = server.on_transport_read(&client_hello_record(ClientHello::new(Random([1; 32]), vec![0xc02f])));
        match expect_failure(outcome, AlertDescription::HandshakeFailure) {
            TLSError::NoSharedCipherSuiteError => (),
            e => panic!("expected NoSharedCipherSuiteError, got {:?}", e),
        }
    }

    #[test]
    fn client_hello_is_validated() {
        let mut old = ClientHello::new(Random([2; 32]), vec![cipher::TLS_RSA_WITH_AES_128_CBC_SHA]);
        old.client_version = ProtocolVersion { major: 3, minor: 1 };
        let mut server = support::server(22, support::server_config());
        server.start().expect("start failed");
        match expect_failure(server.on_transport_read(&client_hello_record(old)), AlertDescription::ProtocolVersion) {
            TLSError::ProtocolVersionError(3, 1) => (),
            e => panic!("expected ProtocolVersionError, got {:?}", e),
        }

        let mut compressed = ClientHello::new(Random([2; 32]), vec![cipher::TLS_RSA_WITH_AES_128_CBC_SHA]);
        compressed.compression_methods.0 = vec![1];
        let mut server = support::server(22, support::server_config());
        server.start().expect("start failed");
        match expect_failure(server.on_transport_read(&client_hello_record(compressed)), AlertDescription::HandshakeFailure) {
            TLSError::InvalidCompressionMethodError => (),
            e => panic!("expected InvalidCompressionMethodError, got {:?}", e),
        }

        let mut newer = ClientHello::new(Random([2; 32]), vec![cipher::TLS_RSA_WITH_AES_128_CBC_SHA]);
        newer.client_version = ProtocolVersion { major: 3, minor: 4 };
        newer.extensions = Some(vec![0xff, 0x01, 0x00, 0x01, 0x00]);
        let mut server = support::server(22, support::server_config());
        server.start().expect("start failed");
        support::expect_output(server.on_transport_read(&client_hello_record(newer)));
        assert_eq!(server.cipher_suite(), cipher::TLS_RSA_WITH_AES_128_CBC_SHA);
    }

    #[test]
    fn undecryptable_key_exchange_fails() {
        let mut client = support::client(23, ClientConfig::default());
        let mut server = support::server(24, support::server_config());
        let client_hello = client.start().expect("start failed");
        server.start().expect("start failed");
        support::expect_output(server.on_transport_read(&client_hello));

        let garbage = handshake::encode(ClientKeyExchange::new(vec![0x5a; 256]));
        let outcome = server.on_transport_read(&record::encode_plain(ContentType::Handshake, &garbage));
        match expect_failure(outcome, AlertDescription::DecryptionFailedRESERVED) {
            TLSError::DecryptionFailedError => (),
            e => panic!("expected DecryptionFailedError, got {:?}", e),
        }
        assert!(server.master_secret().is_none());
    }

    #[test]
    fn messages_out_of_order_are_rejected() {
        let mut server = support::server(25, support::server_config());
        server.start().expect("start failed");
        let finished = handshake::encode(handshake::Finished::new(vec![0; 12]));
        let outcome = server.on_transport_read(&record::encode_plain(ContentType::Handshake, &finished));
        match expect_failure(outcome, AlertDescription::UnexpectedMessage) {
            TLSError::UnexpectedMessageError(_) => (),
            e => panic!("expected UnexpectedMessageError, got {:?}", e),
        }

        let mut client = support::client(26, ClientConfig::default());
        let mut server = support::server(27, support::server_config());
        let client_hello = client.start().expect("start failed");
        server.start().expect("start failed");
        support::expect_output(server.on_transport_read(&client_hello));
        let outcome = server.on_transport_read(&[20, 3, 3, 0, 1, 1]);
        match expect_failure(outcome, AlertDescription::UnexpectedMessage) {
            TLSError::UnexpectedMessageError(_) => (),
            e => panic!("expected UnexpectedMessageError, got {:?}", e),
        }
    }

    #[test]
    fn wrong_client_verify_data_fails_with_decrypt_error() {
        let mut client = support::client(63, ClientConfig::default());
        let mut server = support::server(64, support::server_config());
        let client_flight = support::client_final_flight(&mut client, &mut server);
        let header = record::decode_header(&client_flight)
            .expect("decode_header failed")
            .expect("header missing");
        let key_exchange_and_ccs = header.record_length() + 6;
        assert_eq!(&client_flight[header.record_length()..key_exchange_and_ccs], &[20, 3, 3, 0, 1, 1]);
        match server.on_transport_read(&client_flight[..key_exchange_and_ccs]) {
            Outcome::NeedMoreData => (),
            other => panic!("expected NeedMoreData, got {:?}", other),
        }

        let client_keys = support::direction_keys(&client, ConnectionEnd::Client);
        let finished = handshake::encode(handshake::Finished::new(vec![0xff; crypto::VERIFY_DATA_LENGTH]));
        let mut seq_num = 0;
        let forged = record::encode_protected(ContentType::Handshake, &finished, &client_keys, &mut seq_num, &mut support::rng(65))
            .expect("encode_protected failed");
        match expect_failure(server.on_transport_read(&forged), AlertDescription::DecryptError) {
            TLSError::FinishedMismatchError => (),
            e => panic!("expected FinishedMismatchError, got {:?}", e),
        }
        assert_eq!(server.state(), SessionState::Failed);
        assert!(server.key_block().is_none());
    }

    #[test]
    fn server_start_sends_nothing() {
        let mut server = support::server(28, support::server_config());
        assert_eq!(server.start().expect("start failed"), Vec::<u8>::new());
        assert_eq!(server.state(), SessionState::Handshaking);
        match server.on_transport_read(&[22, 3, 3]) {
            Outcome::NeedMoreData => (),
            other => panic!("expected NeedMoreData, got {:?}", other),
        }
    }
}
