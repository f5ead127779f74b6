use crate::alert::{AlertDescription, AlertLevel};
use crate::errors;
use crate::session::{Outcome, Session, SessionState};
use crate::transport::transport::Transport;

use log::{debug, warn};

const READ_BUFFER_LENGTH: usize = 18 * 1024;

/// Blocking driver tying a [`Session`] to a [`Transport`].
pub struct Connection<T: Transport, S: Session> {
    transport: T,
    session: S,
    // application data that arrived in the same read as the final handshake flight
    pending: Vec<u8>,
    buf: Vec<u8>,
}

impl<T: Transport, S: Session> Connection<T, S> {
    pub fn new(transport: T, session: S) -> Self {
        Self {
            transport,
            session,
            pending: Vec::new(),
            buf: vec![0; READ_BUFFER_LENGTH],
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.session)
    }

    fn recv(&mut self) -> Result<usize, errors::TLSError> {
        match self.transport.recv(&mut self.buf)? {
            0 => Err(errors::TLSError::ConnectionClosedError),
            n => Ok(n),
        }
    }

    /// Alerts are best-effort; the session error is what gets reported.
    fn fail(&self, error: errors::TLSError, alert: Option<Vec<u8>>) -> errors::TLSError {
        if let Some(alert) = alert {
            if let Err(e) = self.transport.send(&alert) {
                warn!("failed to send alert: {}", e);
            }
        }
        error
    }

    /// Runs the handshake to completion.
    pub fn handshake(&mut self) -> Result<(), errors::TLSError> {
        let first_flight = self.session.start()?;
        if !first_flight.is_empty() {
            self.transport.send(&first_flight)?;
        }
        loop {
            let n = self.recv()?;
            match self.session.on_transport_read(&self.buf[..n]) {
                Outcome::NeedMoreData => (),
                Outcome::Output(output) => self.transport.send(&output)?,
                Outcome::HandshakeComplete(output) => {
                    if !output.is_empty() {
                        self.transport.send(&output)?;
                    }
                    break;
                }
                Outcome::ApplicationData(_) => {
                    return Err(errors::TLSError::UnexpectedMessageError("application data during handshake"))
                }
                Outcome::Error { error, alert } => return Err(self.fail(error, alert)),
            }
        }
        debug!("connection established, cipher suite {:#06x}", self.session.cipher_suite());

        // records that trailed the peer's Finished are still buffered in the session
        match self.session.on_transport_read(&[]) {
            Outcome::ApplicationData(data) => self.pending.extend_from_slice(&data),
            Outcome::Error { error, alert } => return Err(self.fail(error, alert)),
            _ => (),
        }
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), errors::TLSError> {
        let records = self.session.make_application_record(data)?;
        self.transport.send(&records)
    }

    /// Next chunk of application data. An empty result means the peer sent close_notify.
    pub fn read(&mut self) -> Result<Vec<u8>, errors::TLSError> {
        if !self.pending.is_empty() {
            return Ok(std::mem::take(&mut self.pending));
        }
        loop {
            // a failed session may still hold a failure that trailed its last data
            let outcome = if self.session.state() == SessionState::Failed {
                self.session.on_transport_read(&[])
            } else {
                let n = self.recv()?;
                self.session.on_transport_read(&self.buf[..n])
            };
            match outcome {
                Outcome::ApplicationData(data) => return Ok(data),
                Outcome::NeedMoreData => (),
                Outcome::Error {
                    error: errors::TLSError::AlertReceivedError(AlertLevel::Warning, AlertDescription::CloseNotify),
                    ..
                } => {
                    debug!("peer sent close_notify");
                    return Ok(Vec::new());
                }
                Outcome::Error { error, alert } => return Err(self.fail(error, alert)),
                Outcome::Output(_) | Outcome::HandshakeComplete(_) => {
                    return Err(errors::TLSError::UnexpectedMessageError("handshake output after completion"))
                }
            }
        }
    }

    /// Sends close_notify. The session is reset and may not be reused on this transport.
    pub fn close(&mut self) -> Result<(), errors::TLSError> {
        let close_notify = self.session.make_close_notify();
        self.session.reset();
        self.transport.send(&close_notify)
    }
}
