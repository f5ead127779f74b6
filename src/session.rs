use crate::alert::Alert;
use crate::change_cipher_spec::{self, ChangeCipherSpec};
use crate::cipher::{self, CipherSuite};
use crate::crypto::{self, ConnectionEnd, DirectionKeys, KeyBlock, MasterSecret};
use crate::errors;
use crate::fragment::HandshakeReassembler;
use crate::handshake::Random;
use crate::pack::{Pack, Reader};
use crate::record::{self, ContentType};
use crate::transcript::{Transcript, TranscriptSlot};

use bytes::BytesMut;
use log::{debug, info, warn};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Randomness source for a session: hello randoms, pre-master secret, IVs and RSA padding.
pub trait SecureRng: RngCore + CryptoRng + Send {}
impl<T: RngCore + CryptoRng + Send> SecureRng for T {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Handshaking,
    Established,
    Failed,
}

/// Result of feeding transport bytes to a session.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to send or deliver; wait for more bytes.
    NeedMoreData,
    /// Handshake bytes to send to the peer.
    Output(Vec<u8>),
    /// The handshake just completed. Any final flight is carried here and may be empty.
    HandshakeComplete(Vec<u8>),
    ApplicationData(Vec<u8>),
    /// The session failed. `alert` is a clear-text alert record to send, when one can be.
    Error {
        error: errors::TLSError,
        alert: Option<Vec<u8>>,
    },
}

enum Step {
    NeedMoreData,
    Continue(Vec<u8>),
    ApplicationData(Zeroizing<Vec<u8>>),
    Complete(Vec<u8>),
}

/// Record layer and key state shared by both roles.
pub struct SessionCore {
    end: ConnectionEnd,
    state: SessionState,
    cipher_suite: CipherSuite,

    send_cipher_active: bool,
    recv_cipher_active: bool,
    send_seq: u64,
    recv_seq: u64,

    buffer: BytesMut,
    reassembler: HandshakeReassembler,
    transcript: Option<Transcript>,

    pub(crate) client_random: Option<Random>,
    pub(crate) server_random: Option<Random>,
    master_secret: Option<MasterSecret>,
    key_block: Option<KeyBlock>,
    write_keys: Option<DirectionKeys>,
    read_keys: Option<DirectionKeys>,

    rng: Box<dyn SecureRng>,

    // failure hit after application data in the same read, reported on the next read
    pending_failure: Option<Outcome>,
}

impl SessionCore {
    pub fn new(end: ConnectionEnd, rng: Box<dyn SecureRng>) -> Self {
        Self {
            end,
            state: SessionState::Init,
            cipher_suite: cipher::TLS_NULL_WITH_NULL_NULL,
            send_cipher_active: false,
            recv_cipher_active: false,
            send_seq: 0,
            recv_seq: 0,
            buffer: BytesMut::new(),
            reassembler: HandshakeReassembler::new(),
            transcript: None,
            client_random: None,
            server_random: None,
            master_secret: None,
            key_block: None,
            write_keys: None,
            read_keys: None,
            rng,
            pending_failure: None,
        }
    }

    pub fn end(&self) -> ConnectionEnd {
        self.end
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    pub fn send_sequence_number(&self) -> u64 {
        self.send_seq
    }

    pub fn recv_sequence_number(&self) -> u64 {
        self.recv_seq
    }

    pub(crate) fn rng(&mut self) -> &mut Box<dyn SecureRng> {
        &mut self.rng
    }

    pub(crate) fn begin_handshake(&mut self) {
        self.state = SessionState::Handshaking;
        self.transcript = Some(Transcript::new());
    }

    pub(crate) fn set_cipher_suite(&mut self, cipher_suite: CipherSuite) {
        self.cipher_suite = cipher_suite;
    }

    pub(crate) fn transcript(&mut self) -> Result<&mut Transcript, errors::TLSError> {
        self.transcript
            .as_mut()
            .ok_or(errors::TLSError::UnexpectedMessageError("no handshake in progress"))
    }

    pub(crate) fn record_handshake(&mut self, slot: TranscriptSlot, message: &[u8]) -> Result<(), errors::TLSError> {
        self.transcript()?.record(slot, message)
    }

    pub(crate) fn master_secret(&self) -> Result<&[u8], errors::TLSError> {
        self.master_secret
            .as_ref()
            .map(|m| &m[..])
            .ok_or(errors::TLSError::UnexpectedMessageError("keys not yet derived"))
    }

    /// Derives the master secret and both directions' keys for the negotiated suite.
    pub(crate) fn install_keys(&mut self, pre_master_secret: &[u8]) -> Result<(), errors::TLSError> {
        let parameters = cipher::parameters(self.cipher_suite)?;
        let (client_random, server_random) = match (self.client_random, self.server_random) {
            (Some(c), Some(s)) => (c, s),
            _ => return Err(errors::TLSError::UnexpectedMessageError("hello randoms missing")),
        };
        let master_secret = crypto::derive_master_secret(pre_master_secret, &client_random.0, &server_random.0);
        let key_block = KeyBlock::new(&parameters, &master_secret[..], &server_random.0, &client_random.0)?;
        self.write_keys = Some(key_block.writer(self.end));
        self.read_keys = Some(key_block.writer(self.end.peer()));
        self.key_block = Some(key_block);
        self.master_secret = Some(master_secret);
        Ok(())
    }

    pub(crate) fn activate_send_cipher(&mut self) -> Result<(), errors::TLSError> {
        if self.write_keys.is_none() {
            return Err(errors::TLSError::UnexpectedMessageError("change cipher spec before key exchange"));
        }
        self.send_cipher_active = true;
        self.send_seq = 0;
        debug!("{:?}: send cipher active", self.end);
        Ok(())
    }

    pub(crate) fn activate_recv_cipher(&mut self) -> Result<(), errors::TLSError> {
        if self.read_keys.is_none() {
            return Err(errors::TLSError::UnexpectedMessageError("change cipher spec before key exchange"));
        }
        self.recv_cipher_active = true;
        self.recv_seq = 0;
        debug!("{:?}: receive cipher active", self.end);
        Ok(())
    }

    /// Protected once our ChangeCipherSpec has been sent, clear before that.
    pub(crate) fn encode_record(&mut self, r#type: ContentType, payload: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        match (&self.write_keys, self.send_cipher_active) {
            (Some(keys), true) => record::encode_protected(r#type, payload, keys, &mut self.send_seq, &mut self.rng),
            _ => Ok(record::encode_plain(r#type, payload)),
        }
    }

    pub(crate) fn change_cipher_spec_record(&mut self) -> Result<Vec<u8>, errors::TLSError> {
        debug!("{:?}: sending ChangeCipherSpec", self.end);
        self.encode_record(ContentType::ChangeCipherSpec, &ChangeCipherSpec::new().pack())
    }

    /// Alerts always travel in the clear, so a fatal alert is only sent before our cipher is active.
    fn fatal_alert_record(&self, error: &errors::TLSError) -> Option<Vec<u8>> {
        match (error.alert_description(), self.send_cipher_active) {
            (Some(description), false) => Some(record::encode_plain(ContentType::Alert, &Alert::fatal(description).pack())),
            _ => None,
        }
    }

    pub(crate) fn complete(&mut self) {
        self.state = SessionState::Established;
        self.transcript = None;
        info!("{:?}: handshake complete, cipher suite {:#06x}", self.end, self.cipher_suite);
    }

    fn wipe(&mut self) {
        self.transcript = None;
        self.master_secret = None;
        self.key_block = None;
        self.write_keys = None;
        self.read_keys = None;
        self.client_random = None;
        self.server_random = None;
        self.buffer.clear();
        self.reassembler.clear();
    }

    fn reset(&mut self) {
        self.wipe();
        self.pending_failure = None;
        self.state = SessionState::Init;
        self.cipher_suite = cipher::TLS_NULL_WITH_NULL_NULL;
        self.send_cipher_active = false;
        self.recv_cipher_active = false;
        self.send_seq = 0;
        self.recv_seq = 0;
    }

    /// Splits the next complete record off the buffer and removes its protection.
    fn next_record(&mut self) -> Result<Option<(ContentType, Zeroizing<Vec<u8>>)>, errors::TLSError> {
        let header = match record::decode_header(&self.buffer)? {
            Some(header) if self.buffer.len() >= header.record_length() => header,
            _ => return Ok(None),
        };
        let bytes = self.buffer.split_to(header.record_length());

        // a two byte alert is always clear text, even after ChangeCipherSpec
        let clear_alert = header.r#type == ContentType::Alert && header.length == 2;
        let payload = match (&self.read_keys, self.recv_cipher_active && !clear_alert) {
            (Some(keys), true) => record::decode_protected(&bytes, keys, &mut self.recv_seq)?,
            (None, true) => return Err(errors::TLSError::CipherError("receive keys missing")),
            (_, false) => {
                if header.length > record::MAX_FRAGMENT_LENGTH {
                    return Err(errors::TLSError::RecordOverflowError(header.length));
                }
                Zeroizing::new(bytes[record::HEADER_LENGTH..].to_vec())
            }
        };
        Ok(Some((header.r#type, payload)))
    }
}

/// Capability shared by [`ClientSession`](crate::client::ClientSession) and
/// [`ServerSession`](crate::server::ServerSession).
///
/// Roles provide the handshake handlers; record processing, failure handling
/// and the application data API are shared.
pub trait Session {
    fn core(&self) -> &SessionCore;
    fn core_mut(&mut self) -> &mut SessionCore;

    /// First flight for this role, sent by `start`.
    fn start_handshake(&mut self) -> Result<Vec<u8>, errors::TLSError>;
    /// Handles one complete handshake message and returns records to send.
    fn handle_handshake(&mut self, message: &[u8]) -> Result<Vec<u8>, errors::TLSError>;
    fn handle_change_cipher_spec(&mut self) -> Result<(), errors::TLSError>;
    /// Clears role specific handshake state.
    fn reset_role(&mut self);

    /// `Init -> Handshaking`. A client gets its ClientHello back; a server gets nothing.
    fn start(&mut self) -> Result<Vec<u8>, errors::TLSError> {
        match self.core().state() {
            SessionState::Init => (),
            SessionState::Failed => return Err(errors::TLSError::SessionFailedError),
            _ => return Err(errors::TLSError::InvalidStateError("session already started")),
        }
        self.core_mut().begin_handshake();
        match self.start_handshake() {
            Ok(output) => Ok(output),
            Err(error) => match fail(self, error) {
                Outcome::Error { error, .. } => Err(error),
                _ => Err(errors::TLSError::SessionFailedError),
            },
        }
    }

    /// Buffers `bytes` and processes every complete record.
    ///
    /// When a record fails after application data was decoded in the same call,
    /// the data is returned first and the failure on the next call.
    fn on_transport_read(&mut self, bytes: &[u8]) -> Outcome {
        match self.core().state() {
            SessionState::Failed => {
                return match self.core_mut().pending_failure.take() {
                    Some(failure) => failure,
                    None => Outcome::Error {
                        error: errors::TLSError::SessionFailedError,
                        alert: None,
                    },
                }
            }
            SessionState::Init => {
                return Outcome::Error {
                    error: errors::TLSError::InvalidStateError("session not started"),
                    alert: None,
                }
            }
            _ => (),
        }
        self.core_mut().buffer.extend_from_slice(bytes);

        let mut output = Vec::new();
        let mut application_data = Vec::new();
        loop {
            match process_next_record(self) {
                Ok(Step::NeedMoreData) => break,
                Ok(Step::Continue(out)) => output.extend_from_slice(&out),
                Ok(Step::ApplicationData(data)) => application_data.extend_from_slice(&data),
                Ok(Step::Complete(out)) => {
                    output.extend_from_slice(&out);
                    return Outcome::HandshakeComplete(output);
                }
                Err(error) => {
                    let failure = fail(self, error);
                    if application_data.is_empty() {
                        return failure;
                    }
                    // deliver what was authenticated before the failing record
                    self.core_mut().pending_failure = Some(failure);
                    return Outcome::ApplicationData(application_data);
                }
            }
        }

        if !application_data.is_empty() {
            Outcome::ApplicationData(application_data)
        } else if !output.is_empty() {
            Outcome::Output(output)
        } else {
            Outcome::NeedMoreData
        }
    }

    /// Protects `payload` as one or more application data records.
    fn make_application_record(&mut self, payload: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        match self.core().state() {
            SessionState::Established => self.core_mut().encode_record(ContentType::ApplicationData, payload),
            SessionState::Failed => Err(errors::TLSError::SessionFailedError),
            _ => Err(errors::TLSError::HandshakeIncompleteError),
        }
    }

    fn make_close_notify(&self) -> Vec<u8> {
        record::encode_plain(ContentType::Alert, &Alert::close_notify().pack())
    }

    fn is_handshake_complete(&self) -> bool {
        self.core().state() == SessionState::Established
    }

    fn state(&self) -> SessionState {
        self.core().state()
    }

    fn cipher_suite(&self) -> CipherSuite {
        self.core().cipher_suite()
    }

    fn master_secret(&self) -> Option<Zeroizing<Vec<u8>>> {
        self.core().master_secret.as_ref().map(|m| Zeroizing::new(m.to_vec()))
    }

    fn key_block(&self) -> Option<Zeroizing<Vec<u8>>> {
        self.core().key_block.as_ref().map(|k| k.as_bytes())
    }

    /// Wipes all key material and returns to `Init`.
    fn reset(&mut self) {
        self.core_mut().reset();
        self.reset_role();
        debug!("{:?}: session reset", self.core().end());
    }
}

fn process_next_record<S: Session + ?Sized>(session: &mut S) -> Result<Step, errors::TLSError> {
    let (r#type, payload) = match session.core_mut().next_record()? {
        Some(record) => record,
        None => return Ok(Step::NeedMoreData),
    };

    match r#type {
        ContentType::ChangeCipherSpec => {
            change_cipher_spec::decode(&payload)?;
            if !session.core().reassembler.is_empty() {
                return Err(errors::TLSError::UnexpectedMessageError("change cipher spec inside a handshake message"));
            }
            debug!("{:?}: received ChangeCipherSpec", session.core().end());
            session.handle_change_cipher_spec()?;
            Ok(Step::Continue(Vec::new()))
        }
        ContentType::Alert => {
            let mut reader = Reader::new(&payload);
            let alert = Alert::unpack(&mut reader)?;
            reader.expect_empty()?;
            Err(errors::TLSError::AlertReceivedError(alert.level, alert.description))
        }
        ContentType::ApplicationData => match session.core().state() {
            SessionState::Established => Ok(Step::ApplicationData(payload)),
            _ => Err(errors::TLSError::UnexpectedMessageError("application data before handshake completion")),
        },
        ContentType::Handshake => {
            if session.core().state() == SessionState::Established {
                return Err(errors::TLSError::UnexpectedMessageError("renegotiation is not supported"));
            }
            session.core_mut().reassembler.push(&payload);
            let mut output = Vec::new();
            while let Some(message) = session.core_mut().reassembler.next_message()? {
                output.extend_from_slice(&session.handle_handshake(&message)?);
                if session.core().state() == SessionState::Established {
                    if !session.core().reassembler.is_empty() {
                        return Err(errors::TLSError::UnexpectedMessageError("handshake message after Finished"));
                    }
                    return Ok(Step::Complete(output));
                }
            }
            Ok(Step::Continue(output))
        }
    }
}

/// Moves to `Failed`, wipes secrets and builds the alert to send, if any.
fn fail<S: Session + ?Sized>(session: &mut S, error: errors::TLSError) -> Outcome {
    let core = session.core_mut();
    warn!("{:?}: session failed: {}", core.end(), error);
    let alert = core.fatal_alert_record(&error);
    core.state = SessionState::Failed;
    core.wipe();
    Outcome::Error { error, alert }
}
