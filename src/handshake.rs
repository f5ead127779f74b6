use crate::cipher::CipherSuite;
use crate::errors;
use crate::pack::{put_u16, put_u24, put_vec_u16, put_vec_u24, put_vec_u8, Pack, Reader};
use crate::record;

use num_traits::FromPrimitive;
use rand_core::{CryptoRng, RngCore};

pub const HANDSHAKE_HEADER_LENGTH: usize = 4;
pub const RANDOM_LENGTH: usize = 32;
pub const MAX_SESSION_ID_LENGTH: usize = 32;

#[derive(Debug, Copy, Clone, PartialEq, Primitive)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificates = 11, // made plural because Certificate message is actually a list of Certificates
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

/// Handshake type of a complete message, read from its first byte.
pub fn message_type(message: &[u8]) -> Result<HandshakeType, errors::TLSError> {
    let msg_type = *message.first().ok_or(errors::TLSError::InvalidLengthError)?;
    HandshakeType::from_u8(msg_type).ok_or(errors::TLSError::InvalidHandshakeTypeError(msg_type))
}

pub trait ValidMessage {
    fn into_handshake_type() -> HandshakeType;
}
macro_rules! new_handshake_trait {
    ($name: ident) => {
        impl ValidMessage for $name {
            fn into_handshake_type() -> HandshakeType {
                HandshakeType::$name
            }
        }
    };
}
// Ensures we can statically pack/unpack valid Handshake messages
new_handshake_trait!(ClientHello);
new_handshake_trait!(ServerHello);
new_handshake_trait!(Certificates);
new_handshake_trait!(ServerHelloDone);
new_handshake_trait!(ClientKeyExchange);
new_handshake_trait!(Finished);

/// `[msg_type:1][length:3]` followed by the body.
#[derive(Clone, Debug)]
pub struct Handshake<Body>
where
    Body: ValidMessage + Pack,
{
    pub msg_type: HandshakeType,
    pub body: Body,
}

impl<Body> Handshake<Body>
where
    Body: ValidMessage + Pack,
{
    pub fn new(body: Body) -> Self {
        Self {
            msg_type: Body::into_handshake_type(),
            body,
        }
    }
}

impl<Body> Pack for Handshake<Body>
where
    Body: ValidMessage + Pack,
{
    fn pack(&self) -> Vec<u8> {
        let body = self.body.pack();
        let mut v = Vec::with_capacity(HANDSHAKE_HEADER_LENGTH + body.len());
        v.push(self.msg_type as u8);
        put_vec_u24(&mut v, &body);
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let msg_type = reader.u8()?;
        if msg_type != Body::into_handshake_type() as u8 {
            return Err(errors::TLSError::InvalidHandshakeTypeError(msg_type));
        }
        let mut body_reader = Reader::new(reader.vec_u24()?);
        let body = Body::unpack(&mut body_reader)?;
        body_reader.expect_empty()?;
        Ok(Self::new(body))
    }
}

/// Decodes one complete handshake message and returns its body.
pub fn decode<Body>(message: &[u8]) -> Result<Body, errors::TLSError>
where
    Body: ValidMessage + Pack,
{
    let mut reader = Reader::new(message);
    let handshake = Handshake::<Body>::unpack(&mut reader)?;
    reader.expect_empty()?;
    Ok(handshake.body)
}

pub fn encode<Body>(body: Body) -> Vec<u8>
where
    Body: ValidMessage + Pack,
{
    Handshake::new(body).pack()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Random(pub [u8; RANDOM_LENGTH]);

impl Random {
    /// All 32 bytes are random; no timestamp prefix is used.
    pub fn new<R>(rng: &mut R) -> Result<Random, errors::TLSError>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let mut random_bytes = [0; RANDOM_LENGTH];
        rng.try_fill_bytes(&mut random_bytes).map_err(|_| errors::TLSError::RandomError)?;
        Ok(Random(random_bytes))
    }
}

impl Pack for Random {
    fn pack(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let mut random_bytes = [0; RANDOM_LENGTH];
        random_bytes.copy_from_slice(reader.take(RANDOM_LENGTH)?);
        Ok(Random(random_bytes))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionID(pub Vec<u8>);

impl Pack for SessionID {
    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(1 + self.0.len());
        put_vec_u8(&mut v, &self.0);
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let session_id = reader.vec_u8()?;
        if session_id.len() > MAX_SESSION_ID_LENGTH {
            return Err(errors::TLSError::InvalidLengthError);
        }
        Ok(SessionID(session_id.to_vec()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CipherSuites(pub Vec<CipherSuite>);

impl Pack for CipherSuites {
    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(2 + 2 * self.0.len());
        put_u16(&mut v, (2 * self.0.len()) as u16);
        for cipher_suite in self.0.iter() {
            put_u16(&mut v, *cipher_suite);
        }
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let field = reader.vec_u16()?;
        if field.is_empty() || field.len() % 2 != 0 {
            return Err(errors::TLSError::InvalidLengthError);
        }
        let cipher_suites = field.chunks_exact(2).map(|i| u16::from_be_bytes([i[0], i[1]])).collect();
        Ok(CipherSuites(cipher_suites))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Primitive)]
#[repr(u8)]
pub enum CompressionMethod {
    Null = 0,
}

/// Raw compression method codes offered by a client; unknown codes are kept.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressionMethods(pub Vec<u8>);

impl CompressionMethods {
    pub fn offers(&self, method: CompressionMethod) -> bool {
        self.0.contains(&(method as u8))
    }
}

impl Pack for CompressionMethods {
    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(1 + self.0.len());
        put_vec_u8(&mut v, &self.0);
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let field = reader.vec_u8()?;
        if field.is_empty() {
            return Err(errors::TLSError::InvalidLengthError);
        }
        Ok(CompressionMethods(field.to_vec()))
    }
}

//
// Handshake messages
//

#[derive(Clone, Debug, PartialEq)]
pub struct ClientHello {
    pub client_version: record::ProtocolVersion,
    pub random: Random,
    pub session_id: SessionID,
    pub cipher_suites: CipherSuites,
    pub compression_methods: CompressionMethods,
    /// Raw extensions block, `None` when the client sent none. Contents are ignored.
    pub extensions: Option<Vec<u8>>,
}

impl ClientHello {
    pub fn new(random: Random, cipher_suites: Vec<CipherSuite>) -> Self {
        Self {
            client_version: record::TLS_1_2,
            random,
            session_id: SessionID::default(),
            cipher_suites: CipherSuites(cipher_suites),
            compression_methods: CompressionMethods(vec![CompressionMethod::Null as u8]),
            extensions: None,
        }
    }
}

impl Pack for ClientHello {
    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&self.client_version.pack());
        v.extend_from_slice(&self.random.pack());
        v.extend_from_slice(&self.session_id.pack());
        v.extend_from_slice(&self.cipher_suites.pack());
        v.extend_from_slice(&self.compression_methods.pack());
        if let Some(extensions) = &self.extensions {
            put_vec_u16(&mut v, extensions);
        }
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let client_version = record::ProtocolVersion::unpack(reader)?;
        let random = Random::unpack(reader)?;
        let session_id = SessionID::unpack(reader)?;
        let cipher_suites = CipherSuites::unpack(reader)?;
        let compression_methods = CompressionMethods::unpack(reader)?;
        let extensions = match reader.is_empty() {
            true => None,
            false => Some(reader.vec_u16()?.to_vec()),
        };
        Ok(Self {
            client_version,
            random,
            session_id,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerHello {
    pub server_version: record::ProtocolVersion,
    pub random: Random,
    pub session_id: SessionID,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub extensions: Option<Vec<u8>>,
}

impl ServerHello {
    pub fn new(random: Random, cipher_suite: CipherSuite) -> Self {
        Self {
            server_version: record::TLS_1_2,
            random,
            session_id: SessionID::default(),
            cipher_suite,
            compression_method: CompressionMethod::Null,
            extensions: None,
        }
    }
}

impl Pack for ServerHello {
    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&self.server_version.pack());
        v.extend_from_slice(&self.random.pack());
        v.extend_from_slice(&self.session_id.pack());
        put_u16(&mut v, self.cipher_suite);
        v.push(self.compression_method as u8);
        if let Some(extensions) = &self.extensions {
            put_vec_u16(&mut v, extensions);
        }
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let server_version = record::ProtocolVersion::unpack(reader)?;
        let random = Random::unpack(reader)?;
        let session_id = SessionID::unpack(reader)?;
        let cipher_suite = reader.u16()?;
        let compression_method =
            CompressionMethod::from_u8(reader.u8()?).ok_or(errors::TLSError::InvalidCompressionMethodError)?;
        let extensions = match reader.is_empty() {
            true => None,
            false => Some(reader.vec_u16()?.to_vec()),
        };
        Ok(Self {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }
}

/// Certificate chain, leaf first, each entry DER.
#[derive(Clone, Debug, PartialEq)]
pub struct Certificates {
    pub certificate_list: Vec<Vec<u8>>,
}

impl Certificates {
    pub fn new(certificate_list: Vec<Vec<u8>>) -> Self {
        Self { certificate_list }
    }
}

impl Pack for Certificates {
    fn pack(&self) -> Vec<u8> {
        let total: usize = self.certificate_list.iter().map(|c| 3 + c.len()).sum();
        let mut v = Vec::with_capacity(3 + total);
        put_u24(&mut v, total as u32);
        for certificate in self.certificate_list.iter() {
            put_vec_u24(&mut v, certificate);
        }
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        let mut list = Reader::new(reader.vec_u24()?);
        let mut certificate_list = Vec::new();
        while !list.is_empty() {
            let certificate = list.vec_u24()?;
            if certificate.is_empty() {
                return Err(errors::TLSError::InvalidLengthError);
            }
            certificate_list.push(certificate.to_vec());
        }
        Ok(Self { certificate_list })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerHelloDone;

impl Pack for ServerHelloDone {
    fn pack(&self) -> Vec<u8> {
        Vec::new()
    }

    fn unpack(_reader: &mut Reader) -> Result<Self, errors::TLSError> {
        Ok(ServerHelloDone)
    }
}

/// RSA-encrypted pre-master secret, u16 length prefixed.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientKeyExchange {
    pub encrypted_pre_master_secret: Vec<u8>,
}

impl ClientKeyExchange {
    pub fn new(encrypted_pre_master_secret: Vec<u8>) -> Self {
        Self {
            encrypted_pre_master_secret,
        }
    }
}

impl Pack for ClientKeyExchange {
    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(2 + self.encrypted_pre_master_secret.len());
        put_vec_u16(&mut v, &self.encrypted_pre_master_secret);
        v
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        Ok(Self::new(reader.vec_u16()?.to_vec()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn new(verify_data: Vec<u8>) -> Self {
        Self { verify_data }
    }
}

impl Pack for Finished {
    fn pack(&self) -> Vec<u8> {
        self.verify_data.clone()
    }

    fn unpack(reader: &mut Reader) -> Result<Self, errors::TLSError> {
        Ok(Self::new(reader.take(crate::crypto::VERIFY_DATA_LENGTH)?.to_vec()))
    }
}
