//!# tls12
//! A TLS 1.2 session engine using ring and RustCrypto.
//!
//! Supports the RSA key exchange with AES-CBC and HMAC-SHA1/SHA256 suites:
//! `TLS_RSA_WITH_AES_{128,256}_CBC_{SHA,SHA256}`.
//!
//! Sessions never do I/O themselves. Feed received bytes to
//! [`Session::on_transport_read`] and send whatever comes back, or let a
//! [`Connection`] drive a [`Transport`] for you.
//!

#[macro_use]
extern crate enum_primitive_derive;
extern crate num_traits;

pub mod alert;
pub mod certificate;
mod change_cipher_spec;
pub mod cipher;
pub mod client;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod errors;
mod fragment;
pub mod handshake;
pub mod pack;
pub mod record;
pub mod server;
pub mod session;
mod transcript;
pub mod transport {
    pub mod tcp;
    pub mod transport;
}

pub use crate::certificate::CertificateStore;
pub use crate::client::ClientSession;
pub use crate::config::{ClientConfig, ServerConfig};
pub use crate::connection::Connection;
pub use crate::errors::{ErrorKind, TLSError};
pub use crate::server::ServerSession;
pub use crate::session::{Outcome, Session, SessionState};
pub use crate::transport::transport::Transport;
