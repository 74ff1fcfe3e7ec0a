//! braidstream: yamux stream multiplexing over any reliable, ordered byte
//! transport.
//!
//! A [`Session`] wraps one side of a duplex connection and exposes many
//! independent bidirectional byte [`Stream`]s over it, using the yamux
//! wire protocol: a 12-byte frame header, per-stream credit windows for
//! flow control, SYN/ACK/FIN/RST lifecycle flags, PING keepalives, and
//! GO_AWAY for graceful termination.
//!
//! The engine is synchronous and runs no background work: it only makes
//! progress while the caller invokes [`Session::process`] (which consumes
//! exactly one inbound frame) or one of the stream operations. The
//! underlying connection is abstracted behind the [`Transport`] trait, so
//! the same engine drives TCP sockets, pipes, or the in-memory pair used
//! below.
//!
//! ```
//! use braidstream::{Config, Session};
//! use braidstream::transport::mem::MemoryTransport;
//!
//! let (client_io, server_io) = MemoryTransport::pair();
//! let client = Session::client(client_io, Config::default());
//! let server = Session::server(server_io, Config::default());
//!
//! let stream = client.open_stream()?; // SYN goes out
//! server.process()?;                  // server replies SYN+ACK
//! client.process()?;                  // stream is now established
//!
//! stream.write(b"hello")?;
//! server.process()?;                  // DATA frame lands in the buffer
//!
//! let peer = server.accept_stream()?.expect("stream pending accept");
//! let mut buf = [0u8; 16];
//! let n = peer.read(&mut buf)?;
//! assert_eq!(&buf[..n], b"hello");
//! # Ok::<(), braidstream::BraidStreamError>(())
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod frame;
pub mod mux;
pub mod session;
pub mod stream;
pub mod transport;

pub use config::Config;
pub use error::{BraidStreamError, ErrorKind, Result};
pub use frame::{Flags, FrameType, GoAwayReason, Header};
pub use mux::StreamId;
pub use session::Session;
pub use stream::{Stream, StreamState};
pub use transport::Transport;
