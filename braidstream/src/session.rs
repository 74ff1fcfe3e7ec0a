//! Session engine.
//!
//! A session owns one side of the multiplexed connection: the transport,
//! the stream table, the accept queue, and the shutdown state. It performs
//! no background work; every state transition happens on the caller's
//! thread inside [`Session::process`] or one of the stream operations.
//!
//! `process` consumes exactly one inbound frame per call: it reads the
//! 12-byte header, then dispatches on the frame type, pulling any payload
//! off the transport itself. Outbound frames (SYN, SYN+ACK, DATA, window
//! updates, PING, GO_AWAY) are emitted synchronously from whichever call
//! triggers them.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::{BraidStreamError, Result};
use crate::frame::{
    Flags, FrameType, GoAwayReason, Header, HEADER_SIZE, MAX_DATA_FRAME_SIZE, PING_TOKEN_MAX,
};
use crate::mux::{is_local_parity, StreamId, StreamTable, RESERVED_STREAM_ID};
use crate::stream::{Stream, StreamEntry, StreamState};
use crate::transport::Transport;

/// One endpoint of a multiplexed connection.
///
/// `Session` is a cheap handle around the shared core; [`Stream`] handles
/// returned by [`open_stream`](Session::open_stream) and
/// [`accept_stream`](Session::accept_stream) keep the core alive and may be
/// used from other threads.
pub struct Session {
    core: Arc<Mutex<SessionCore>>,
}

impl Session {
    /// Create the client side of a session. Client streams use odd IDs.
    pub fn client(transport: impl Transport + 'static, config: Config) -> Self {
        Self::new(Box::new(transport), true, config)
    }

    /// Create the server side of a session. Server streams use even IDs.
    pub fn server(transport: impl Transport + 'static, config: Config) -> Self {
        Self::new(Box::new(transport), false, config)
    }

    fn new(transport: Box<dyn Transport>, client: bool, config: Config) -> Self {
        // ArrayQueue needs a nonzero capacity; a backlog of 0 still refuses
        // every second queued stream, which is as close as the bound gets.
        let backlog = config.accept_backlog.max(1);
        let core = SessionCore {
            transport,
            client,
            streams: StreamTable::new(client),
            accept_queue: ArrayQueue::new(backlog),
            shutdown: false,
            remote_go_away: None,
            ping_outstanding: false,
            scratch: Vec::new(),
            config,
        };
        Self {
            core: Arc::new(Mutex::new(core)),
        }
    }

    /// Consume and dispatch exactly one inbound frame.
    ///
    /// Fails with the `Closed` kind once the session is shut down, and with
    /// the `Io` kind when the transport cannot satisfy a full header or
    /// payload read.
    pub fn process(&self) -> Result<()> {
        self.core.lock().process_one()
    }

    /// Open a new stream with the next locally-allocated ID.
    pub fn open_stream(&self) -> Result<Stream> {
        let id = self.core.lock().open_stream_id(None)?;
        Ok(Stream::new(self.core.clone(), id))
    }

    /// Open a new stream with an explicit ID.
    ///
    /// IDs `0` and `0xFFFFFFFF` are reserved and rejected.
    pub fn open_stream_with_id(&self, id: StreamId) -> Result<Stream> {
        let id = self.core.lock().open_stream_id(Some(id))?;
        Ok(Stream::new(self.core.clone(), id))
    }

    /// Take the next inbound stream off the accept queue.
    ///
    /// Returns `Ok(None)` when nothing is pending; fails with the `Closed`
    /// kind once the session is shut down.
    pub fn accept_stream(&self) -> Result<Option<Stream>> {
        match self.core.lock().accept_next()? {
            Some(id) => Ok(Some(Stream::new(self.core.clone(), id))),
            None => Ok(None),
        }
    }

    /// Send a keepalive PING (SYN flag, stream 0, empty token).
    pub fn ping(&self) -> Result<()> {
        self.core.lock().ping()
    }

    /// Whether a PING is in flight without its ACK yet.
    pub fn ping_outstanding(&self) -> bool {
        self.core.lock().ping_outstanding
    }

    /// Shut the session down: best-effort GO_AWAY with `reason`, then every
    /// live stream is reset. Idempotent.
    pub fn close(&self, reason: GoAwayReason) -> Result<()> {
        self.core.lock().close_session(reason)
    }

    /// True once a GO_AWAY has been sent or received.
    pub fn is_shutdown(&self) -> bool {
        self.core.lock().shutdown
    }

    /// The reason carried by the peer's GO_AWAY, if one arrived.
    pub fn remote_go_away(&self) -> Option<GoAwayReason> {
        self.core.lock().remote_go_away
    }

    /// Number of streams currently tracked (including closed streams whose
    /// handles are still held).
    pub fn num_streams(&self) -> usize {
        self.core.lock().streams.len()
    }
}

pub(crate) struct SessionCore {
    transport: Box<dyn Transport>,
    client: bool,
    streams: StreamTable,
    /// Inbound streams awaiting `accept_stream`, in SYN arrival order.
    accept_queue: ArrayQueue<StreamId>,
    /// Set once a GO_AWAY has been sent or received.
    shutdown: bool,
    remote_go_away: Option<GoAwayReason>,
    ping_outstanding: bool,
    /// Reusable inbound payload buffer, grown on demand.
    scratch: Vec<u8>,
    config: Config,
}

impl SessionCore {
    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    fn process_one(&mut self) -> Result<()> {
        if self.shutdown {
            return Err(BraidStreamError::SessionClosed);
        }

        self.fill_scratch(HEADER_SIZE)?;
        let header = Header::decode(&self.scratch[..HEADER_SIZE])?;
        trace!(
            frame_type = ?header.frame_type,
            flags = header.flags.0,
            stream = header.stream_id,
            length = header.length,
            "inbound frame"
        );

        match header.frame_type {
            FrameType::Data => self.handle_data(&header),
            FrameType::WindowUpdate => self.handle_window_update(&header),
            FrameType::Ping => self.handle_ping(&header),
            FrameType::GoAway => self.handle_go_away(&header),
        }
    }

    fn handle_data(&mut self, header: &Header) -> Result<()> {
        let id = header.stream_id;
        let len = header.length as usize;

        let state = match self.streams.get(id) {
            Some(entry) => entry.state,
            None => return Err(BraidStreamError::StreamNotFound(id)),
        };
        if state == StreamState::Closed {
            return Err(BraidStreamError::StreamClosed(id));
        }

        if header.flags.contains(Flags::RST) {
            if let Some(entry) = self.streams.get_mut(id) {
                entry.reset();
            }
            debug!(stream = id, "stream reset by remote");
            return Ok(());
        }

        // No data may follow a FIN we already saw.
        if state == StreamState::FinRecv {
            return Err(BraidStreamError::StreamClosed(id));
        }

        if header.flags.contains(Flags::FIN) {
            if let Some(entry) = self.streams.get_mut(id) {
                entry.half_close_remote();
                debug!(stream = id, state = %entry.state, "remote half-close");
            }
        }

        if len == 0 {
            return Ok(());
        }

        self.fill_scratch(len)?;
        let max = self.config.max_stream_window_size;
        let mut replenish = None;
        if let Some(entry) = self.streams.get_mut(id) {
            entry.recv_buf.write(&self.scratch[..len])?;
            entry.consume_recv(len as u32);
            if entry.recv_window < max / 2 {
                let increment = max - entry.recv_window;
                entry.recv_window = max;
                replenish = Some(increment);
            }
        }

        if let Some(increment) = replenish {
            let update = Header::new(FrameType::WindowUpdate, Flags::NONE, id, 4);
            self.send_frame(&update, &increment.to_be_bytes())?;
            trace!(stream = id, increment, "receive window replenished");
        }
        Ok(())
    }

    fn handle_window_update(&mut self, header: &Header) -> Result<()> {
        if header.length != 4 {
            return Err(BraidStreamError::InvalidFrameLength {
                frame: "WINDOW_UPDATE",
                length: header.length,
            });
        }
        self.fill_scratch(4)?;
        let value = u32::from_be_bytes([
            self.scratch[0],
            self.scratch[1],
            self.scratch[2],
            self.scratch[3],
        ]);
        let id = header.stream_id;
        let flags = header.flags;

        if flags.contains(Flags::RST) {
            match self.streams.get_mut(id) {
                Some(entry) => {
                    entry.reset();
                    debug!(stream = id, "stream reset by remote");
                }
                None => warn!(stream = id, "RST for unknown stream"),
            }
            return Ok(());
        }

        if flags.contains(Flags::SYN) && flags.contains(Flags::ACK) {
            // The peer completed an open we initiated.
            match self.streams.get_mut(id) {
                Some(entry) if entry.state == StreamState::SynSent => {
                    entry.send_window = value;
                    entry.state = StreamState::Established;
                    debug!(stream = id, send_window = value, "stream established");
                }
                Some(entry) => {
                    warn!(stream = id, state = %entry.state, "unexpected SYN+ACK")
                }
                None => warn!(stream = id, "SYN+ACK for unknown stream"),
            }
            return Ok(());
        }

        if flags.contains(Flags::SYN) {
            return self.handle_inbound_open(id, value);
        }

        if flags.contains(Flags::ACK) {
            if flags.contains(Flags::FIN) {
                if let Some(entry) = self.streams.get_mut(id) {
                    if entry.state == StreamState::FinSent {
                        entry.state = StreamState::Closed;
                        debug!(stream = id, "stream closed");
                    }
                }
            }
            // A bare ACK grants nothing further.
            return Ok(());
        }

        if flags.contains(Flags::FIN) {
            // Remote half-close carried on a window update.
            match self.streams.get_mut(id) {
                Some(entry) => {
                    entry.half_close_remote();
                    debug!(stream = id, state = %entry.state, "remote half-close");
                }
                None => {
                    warn!(stream = id, "FIN for unknown stream");
                    return Ok(());
                }
            }
            let reply = Header::new(FrameType::WindowUpdate, Flags::FIN | Flags::ACK, id, 4);
            self.send_frame(&reply, &0u32.to_be_bytes())?;
            return Ok(());
        }

        // No flags: a plain credit grant.
        match self.streams.get_mut(id) {
            Some(entry) => {
                entry.send_window = entry.send_window.saturating_add(value);
                trace!(
                    stream = id,
                    increment = value,
                    send_window = entry.send_window,
                    "send credit granted"
                );
            }
            None => warn!(stream = id, "window update for unknown stream"),
        }
        Ok(())
    }

    /// A SYN arrived: the peer is opening `id` and advertising its receive
    /// window as our initial send credit.
    fn handle_inbound_open(&mut self, id: StreamId, peer_window: u32) -> Result<()> {
        if self.streams.contains(id) {
            return Err(BraidStreamError::DuplicateSyn(id));
        }
        if id == 0 || id == RESERVED_STREAM_ID {
            return Err(BraidStreamError::InvalidStreamId(id));
        }
        if is_local_parity(self.client, id) {
            return Err(BraidStreamError::StreamIdParity(id));
        }

        let max = self.config.max_stream_window_size;
        self.streams
            .insert(StreamEntry::new(id, StreamState::SynRecv, peer_window, max))
            .map_err(|_| BraidStreamError::Internal("stream table rejected a vetted id"))?;

        if self.accept_queue.push(id).is_err() {
            // Backlog full: refuse the stream.
            self.streams.remove(id);
            warn!(stream = id, "accept backlog full, refusing stream");
            let rst = Header::new(FrameType::Data, Flags::RST, id, 0);
            self.send_frame(&rst, &[])?;
            return Ok(());
        }

        // SYN+ACK advertises our receive window; the stream is live from
        // the moment it goes out.
        let reply = Header::new(FrameType::WindowUpdate, Flags::SYN | Flags::ACK, id, 4);
        self.send_frame(&reply, &max.to_be_bytes())?;
        if let Some(entry) = self.streams.get_mut(id) {
            entry.state = StreamState::Established;
        }
        debug!(stream = id, send_window = peer_window, "inbound stream established");
        Ok(())
    }

    fn handle_ping(&mut self, header: &Header) -> Result<()> {
        if header.flags.contains(Flags::ACK) {
            self.ping_outstanding = false;
            trace!("ping acknowledged");
            return Ok(());
        }

        // Echo the request's opaque token, capped at 8 bytes. The full
        // advertised payload is consumed either way to preserve framing.
        let len = header.length as usize;
        let token_len = len.min(PING_TOKEN_MAX);
        if len > 0 {
            self.fill_scratch(len)?;
        }
        let mut token = [0u8; PING_TOKEN_MAX];
        token[..token_len].copy_from_slice(&self.scratch[..token_len]);

        let reply = Header::new(FrameType::Ping, Flags::ACK, 0, token_len as u32);
        self.send_frame(&reply, &token[..token_len])?;
        trace!(token_len, "ping echoed");
        Ok(())
    }

    fn handle_go_away(&mut self, header: &Header) -> Result<()> {
        if header.length != 4 {
            return Err(BraidStreamError::InvalidFrameLength {
                frame: "GO_AWAY",
                length: header.length,
            });
        }
        self.fill_scratch(4)?;
        let code = u32::from_be_bytes([
            self.scratch[0],
            self.scratch[1],
            self.scratch[2],
            self.scratch[3],
        ]);
        let reason = GoAwayReason::from_code(code);
        self.remote_go_away = Some(reason);
        self.shutdown = true;
        debug!(%reason, "received GO_AWAY");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session operations
    // ------------------------------------------------------------------

    fn open_stream_id(&mut self, explicit: Option<StreamId>) -> Result<StreamId> {
        if self.shutdown {
            return Err(BraidStreamError::SessionClosed);
        }
        let id = match explicit {
            Some(id) => {
                if id == 0 || id == RESERVED_STREAM_ID {
                    return Err(BraidStreamError::InvalidStreamId(id));
                }
                if self.streams.contains(id) {
                    return Err(BraidStreamError::StreamAlreadyExists(id));
                }
                id
            }
            None => self.streams.allocate_id(),
        };

        // The SYN carries our receive window advertisement; send credit
        // stays at 0 until the peer's SYN+ACK arrives.
        let window = self.config.max_stream_window_size;
        let syn = Header::new(FrameType::WindowUpdate, Flags::SYN, id, 4);
        self.send_frame(&syn, &window.to_be_bytes())?;

        self.streams
            .insert(StreamEntry::new(id, StreamState::SynSent, 0, window))?;
        debug!(stream = id, "stream opened, SYN sent");
        Ok(id)
    }

    fn accept_next(&mut self) -> Result<Option<StreamId>> {
        if self.shutdown {
            return Err(BraidStreamError::SessionClosed);
        }
        while let Some(id) = self.accept_queue.pop() {
            match self.streams.get_mut(id) {
                Some(entry) if entry.state != StreamState::Closed => {
                    entry.state = StreamState::Established;
                    trace!(stream = id, "stream accepted");
                    return Ok(Some(id));
                }
                // Closed (or already released) while queued: skip it.
                Some(_) => {
                    self.streams.remove(id);
                }
                None => {}
            }
        }
        Ok(None)
    }

    fn ping(&mut self) -> Result<()> {
        if self.shutdown {
            return Err(BraidStreamError::SessionClosed);
        }
        if self.ping_outstanding {
            warn!("previous ping still outstanding");
        }
        let ping = Header::new(FrameType::Ping, Flags::SYN, 0, 0);
        self.send_frame(&ping, &[])?;
        self.ping_outstanding = true;
        Ok(())
    }

    fn close_session(&mut self, reason: GoAwayReason) -> Result<()> {
        if self.shutdown {
            return Ok(());
        }
        self.shutdown = true;

        let go_away = Header::new(FrameType::GoAway, Flags::NONE, 0, 4);
        if let Err(err) = self.send_frame(&go_away, &reason.code().to_be_bytes()) {
            debug!(%err, "GO_AWAY not sent");
        }

        // Reset every live stream, best-effort; local state always advances.
        for id in self.streams.ids() {
            let live = self
                .streams
                .get(id)
                .map(|entry| entry.state != StreamState::Closed)
                .unwrap_or(false);
            if live {
                let rst = Header::new(FrameType::Data, Flags::RST, id, 0);
                if let Err(err) = self.send_frame(&rst, &[]) {
                    debug!(stream = id, %err, "RST not sent during shutdown");
                }
            }
            if let Some(entry) = self.streams.get_mut(id) {
                entry.reset();
            }
        }
        debug!(%reason, "session closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stream operations (invoked through `Stream` handles)
    // ------------------------------------------------------------------

    pub(crate) fn stream_state(&self, id: StreamId) -> Option<StreamState> {
        self.streams.get(id).map(|entry| entry.state)
    }

    pub(crate) fn stream_send_window(&self, id: StreamId) -> Option<u32> {
        self.streams.get(id).map(|entry| entry.send_window)
    }

    pub(crate) fn stream_read(&mut self, id: StreamId, buf: &mut [u8]) -> Result<usize> {
        let max = self.config.max_stream_window_size;
        let n = match self.streams.get_mut(id) {
            None => return Err(BraidStreamError::StreamNotFound(id)),
            Some(entry) => {
                if entry.state == StreamState::Closed && entry.recv_buf.is_empty() {
                    return Err(BraidStreamError::StreamClosed(id));
                }
                let n = entry.recv_buf.read(buf);
                if n == 0 {
                    // Nothing buffered: EOF after a remote FIN, or simply no
                    // data yet.
                    return Ok(0);
                }
                entry.replenish_recv(n as u32, max);
                n
            }
        };

        // Grant the freed credit back to the peer. The read itself already
        // succeeded, so a transport failure here only logs.
        let update = Header::new(FrameType::WindowUpdate, Flags::NONE, id, 4);
        if let Err(err) = self.send_frame(&update, &(n as u32).to_be_bytes()) {
            warn!(stream = id, %err, "window update after read not sent");
        }
        Ok(n)
    }

    pub(crate) fn stream_write(&mut self, id: StreamId, buf: &[u8]) -> Result<usize> {
        let send_window = match self.streams.get(id) {
            None => return Err(BraidStreamError::StreamNotFound(id)),
            Some(entry) if entry.is_send_closed() => {
                return Err(BraidStreamError::StreamClosed(id))
            }
            Some(entry) => entry.send_window,
        };
        if buf.is_empty() {
            return Ok(0);
        }
        if send_window == 0 {
            return Err(BraidStreamError::WindowExhausted(id));
        }

        let allow = buf.len().min(send_window as usize);
        let mut written = 0;
        while written < allow {
            let chunk = (allow - written).min(MAX_DATA_FRAME_SIZE);
            let header = Header::new(FrameType::Data, Flags::NONE, id, chunk as u32);
            let result = self
                .write_all(&header.encode())
                .and_then(|()| self.write_all(&buf[written..written + chunk]));
            if let Err(err) = result {
                if written > 0 {
                    warn!(stream = id, %err, written, "write stopped early");
                    return Ok(written);
                }
                return Err(err);
            }
            written += chunk;
            if let Some(entry) = self.streams.get_mut(id) {
                entry.send_window = entry.send_window.saturating_sub(chunk as u32);
            }
        }
        trace!(stream = id, bytes = written, "data written");
        Ok(written)
    }

    pub(crate) fn stream_close(&mut self, id: StreamId, reset: bool) -> Result<()> {
        let state = match self.streams.get(id) {
            None => return Err(BraidStreamError::StreamNotFound(id)),
            Some(entry) => entry.state,
        };
        if state == StreamState::Closed {
            return Ok(());
        }

        let flags = if reset { Flags::RST } else { Flags::FIN };
        let header = Header::new(FrameType::Data, flags, id, 0);
        // Best-effort: local state advances even if the frame cannot go out.
        if let Err(err) = self.send_frame(&header, &[]) {
            debug!(stream = id, %err, "close frame not sent");
        }

        if let Some(entry) = self.streams.get_mut(id) {
            if reset {
                entry.reset();
            } else {
                entry.state = match entry.state {
                    StreamState::FinRecv => StreamState::Closed,
                    StreamState::Idle => StreamState::Closed,
                    _ => StreamState::FinSent,
                };
            }
            debug!(stream = id, state = %entry.state, reset, "stream closed locally");
        }
        Ok(())
    }

    pub(crate) fn stream_update_window(&mut self, id: StreamId, increment: u32) -> Result<()> {
        match self.streams.get_mut(id) {
            None => Err(BraidStreamError::StreamNotFound(id)),
            Some(entry) => {
                entry.send_window = entry.send_window.saturating_add(increment);
                Ok(())
            }
        }
    }

    /// Drop the table entry once the application has released its handle.
    pub(crate) fn release_if_closed(&mut self, id: StreamId) {
        let closed = self
            .streams
            .get(id)
            .map(|entry| entry.state == StreamState::Closed)
            .unwrap_or(false);
        if closed {
            self.streams.remove(id);
        }
    }

    // ------------------------------------------------------------------
    // Transport helpers
    // ------------------------------------------------------------------

    /// Read exactly `len` bytes into the scratch buffer. The transport
    /// contract is all-or-nothing: a short read is an I/O error.
    fn fill_scratch(&mut self, len: usize) -> Result<()> {
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        let n = self.transport.read(&mut self.scratch[..len])?;
        if n != len {
            return Err(BraidStreamError::ShortIo {
                op: "read",
                expected: len,
                actual: n,
            });
        }
        Ok(())
    }

    /// Emit one control frame as a single transport write.
    fn send_frame(&mut self, header: &Header, payload: &[u8]) -> Result<()> {
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        header.encode_into(&mut frame);
        frame.put_slice(payload);
        self.write_all(&frame)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.transport.write(buf)?;
        if n != buf.len() {
            return Err(BraidStreamError::ShortIo {
                op: "write",
                expected: buf.len(),
                actual: n,
            });
        }
        Ok(())
    }
}
