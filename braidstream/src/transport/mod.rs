//! Transport capability: the byte-level boundary between the session
//! engine and the host's I/O.
//!
//! The engine is agnostic to what carries its frames; anything that can
//! move bytes in order satisfies [`Transport`]. Adapters for real
//! deployments live alongside the trait: [`mem::MemoryTransport`] pairs two
//! in-process endpoints (the test harness), [`tcp::TcpTransport`] wraps a
//! blocking TCP socket.

pub mod mem;
pub mod tcp;

use std::io;

/// A reliable, ordered duplex byte channel.
///
/// The session issues all-or-nothing reads and writes: a call that moves
/// fewer bytes than requested is treated as an I/O failure, so adapters
/// over partial-delivery channels (non-blocking sockets) must loop until
/// the request is satisfied. `Ok(0)` from `read` signals end of stream.
pub trait Transport: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}
