//! Stream states, the per-stream record, and the public stream handle.
//!
//! Lifecycle: Idle -> SynSent / SynRecv -> Established -> FinSent /
//! FinRecv -> Closed. Closed is absorbing. A locally-opened stream sits in
//! SynSent until the peer's SYN+ACK arrives; an inbound stream is
//! Established as soon as the SYN+ACK reply has been emitted.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::mux::StreamId;
use crate::session::SessionCore;

/// Stream state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Allocated but no handshake frame exchanged yet.
    Idle,
    /// SYN sent, waiting for the peer's SYN+ACK.
    SynSent,
    /// SYN received, queued for accept.
    SynRecv,
    /// Open in both directions.
    Established,
    /// FIN sent; inbound data may still arrive.
    FinSent,
    /// FIN received; reads drain the buffer, then report EOF.
    FinRecv,
    /// Fully closed.
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Idle => write!(f, "Idle"),
            StreamState::SynSent => write!(f, "SynSent"),
            StreamState::SynRecv => write!(f, "SynRecv"),
            StreamState::Established => write!(f, "Established"),
            StreamState::FinSent => write!(f, "FinSent"),
            StreamState::FinRecv => write!(f, "FinRecv"),
            StreamState::Closed => write!(f, "Closed"),
        }
    }
}

/// Per-stream record owned by the session core.
pub(crate) struct StreamEntry {
    pub(crate) id: StreamId,
    pub(crate) state: StreamState,
    /// Inbound payloads not yet read by the application.
    pub(crate) recv_buf: Buffer,
    /// Credit granted by the remote: how many payload bytes we may still
    /// send. Starts at 0 until the peer's SYN or SYN+ACK advertisement.
    pub(crate) send_window: u32,
    /// Credit we have advertised to the remote.
    pub(crate) recv_window: u32,
}

impl StreamEntry {
    pub(crate) fn new(
        id: StreamId,
        state: StreamState,
        send_window: u32,
        recv_window: u32,
    ) -> Self {
        Self {
            id,
            state,
            recv_buf: Buffer::new(),
            send_window,
            recv_window,
        }
    }

    /// Whether the sending half can no longer carry data.
    pub(crate) fn is_send_closed(&self) -> bool {
        matches!(
            self.state,
            StreamState::FinSent | StreamState::FinRecv | StreamState::Closed
        )
    }

    /// Apply a remote FIN: no more data will arrive after the current frame.
    pub(crate) fn half_close_remote(&mut self) {
        match self.state {
            StreamState::Established => self.state = StreamState::FinRecv,
            StreamState::FinSent => self.state = StreamState::Closed,
            _ => {}
        }
    }

    /// Abort the stream: terminal state, buffered data abandoned.
    pub(crate) fn reset(&mut self) {
        self.state = StreamState::Closed;
        self.recv_buf.clear();
    }

    pub(crate) fn consume_recv(&mut self, n: u32) {
        self.recv_window = self.recv_window.saturating_sub(n);
    }

    pub(crate) fn replenish_recv(&mut self, n: u32, max: u32) {
        self.recv_window = self.recv_window.saturating_add(n).min(max);
    }
}

/// Handle to one multiplexed stream.
///
/// The handle stays usable after the stream closes: operations then fail
/// with the `Closed` error kind rather than dangling. Dropping the handle
/// releases the stream's slot in the session once it has closed.
pub struct Stream {
    core: Arc<Mutex<SessionCore>>,
    id: StreamId,
}

impl Stream {
    pub(crate) fn new(core: Arc<Mutex<SessionCore>>, id: StreamId) -> Self {
        Self { core, id }
    }

    /// The stream's wire identifier.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Current lifecycle state. Reports `Closed` once the session has
    /// released the stream.
    pub fn state(&self) -> StreamState {
        self.core
            .lock()
            .stream_state(self.id)
            .unwrap_or(StreamState::Closed)
    }

    /// Remaining send credit granted by the peer.
    pub fn send_window(&self) -> u32 {
        self.core.lock().stream_send_window(self.id).unwrap_or(0)
    }

    /// Read buffered data received on this stream.
    ///
    /// Never touches the transport for inbound bytes; it drains the receive
    /// buffer filled by [`crate::session::Session::process`] and emits a
    /// window update granting back the credit just freed. Returns `Ok(0)`
    /// when no data is buffered; once the peer has half-closed and the
    /// buffer is drained that is the EOF signal.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.core.lock().stream_read(self.id, buf)
    }

    /// Write data, fragmented into DATA frames within the send window.
    ///
    /// Returns the number of bytes accepted, which is short when the send
    /// window is smaller than `buf`; fails with the `WouldBlock` kind when
    /// the window is exhausted entirely.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.core.lock().stream_write(self.id, buf)
    }

    /// Close the stream: FIN for an orderly half-close, RST to abort.
    pub fn close(&self, reset: bool) -> Result<()> {
        self.core.lock().stream_close(self.id, reset)
    }

    /// Grant additional send credit, as if a WINDOW_UPDATE had arrived.
    pub fn update_window(&self, increment: u32) -> Result<()> {
        self.core.lock().stream_update_window(self.id, increment)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.core.lock().release_if_closed(self.id);
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("id", &self.id).finish()
    }
}
