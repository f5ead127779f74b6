use crate::errors::TLSError;
use crate::transport::transport::Transport;

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

pub struct Tcp {
    stream: TcpStream,
}

impl Tcp {
    pub fn connect<A: ToSocketAddrs>(server: A) -> Result<Self, TLSError> {
        let stream = TcpStream::connect(server)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Wraps an accepted stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for Tcp {
    fn send(&self, buf: &[u8]) -> Result<(), TLSError> {
        (&self.stream).write_all(buf)?;
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, TLSError> {
        let n = (&self.stream).read(buf)?;
        Ok(n)
    }
}
