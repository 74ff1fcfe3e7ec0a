//! Blocking TCP adapter.
//!
//! Satisfies the engine's all-or-nothing read contract by filling each
//! request completely before returning, so a peer that trickles bytes does
//! not surface as a short read. The advisory `connection_write_timeout`
//! from the configuration becomes the socket write timeout here; keepalive
//! remains the caller's concern (driven by `keepalive_interval` and a
//! periodic [`crate::session::Session::ping`]).

use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::config::Config;

use super::Transport;

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, config: &Config) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let timeout = config.connection_write_timeout;
        stream.set_write_timeout(if timeout.is_zero() { None } else { Some(timeout) })?;
        Ok(Self { stream })
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read_exact(buf) {
            Ok(()) => Ok(buf.len()),
            // A clean close between frames is EOF, not an error.
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write_all(buf)?;
        Ok(buf.len())
    }
}
