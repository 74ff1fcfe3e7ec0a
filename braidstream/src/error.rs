use thiserror::Error;

/// Coarse error categories exposed alongside the detailed variants.
///
/// Callers deciding policy (retry, close the session, surface to the
/// application) usually care about the category rather than the precise
/// variant; `BraidStreamError::kind()` maps every variant onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Argument or wire-field validation failure.
    Invalid,
    /// The allocator refused a buffer growth request.
    OutOfMemory,
    /// The transport failed or returned a short count.
    Io,
    /// The session or stream can no longer serve the operation.
    Closed,
    /// A blocking wrapper ran out of time waiting for an item. The core
    /// itself reports an empty accept queue as `Ok(None)` instead.
    Timeout,
    /// The remote endpoint violated the wire protocol.
    Protocol,
    /// A post-condition inside the engine was violated.
    Internal,
    /// A frame referenced a stream id that is not in the table.
    InvalidStream,
    /// The send window is exhausted; retry after the peer grants credit.
    WouldBlock,
}

/// All errors produced by the braidstream session engine.
#[derive(Debug, Error)]
pub enum BraidStreamError {
    #[error("header too short: expected {expected} bytes, got {actual}")]
    HeaderTooShort { expected: usize, actual: usize },

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("invalid length {length} for {frame} frame")]
    InvalidFrameLength { frame: &'static str, length: u32 },

    #[error("invalid stream id 0x{0:08x}")]
    InvalidStreamId(u32),

    #[error("stream id {0} carries the wrong parity for its initiator")]
    StreamIdParity(u32),

    #[error("stream {0} not found")]
    StreamNotFound(u32),

    #[error("stream {0} already exists")]
    StreamAlreadyExists(u32),

    #[error("duplicate SYN for existing stream {0}")]
    DuplicateSyn(u32),

    #[error("stream {0} is closed")]
    StreamClosed(u32),

    #[error("session is shut down")]
    SessionClosed,

    #[error("send window exhausted for stream {0}")]
    WindowExhausted(u32),

    #[error("receive buffer allocation of {0} bytes refused")]
    BufferAllocation(usize),

    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport {op} was short: {actual} of {expected} bytes")]
    ShortIo {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl BraidStreamError {
    /// The coarse category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use BraidStreamError::*;
        match self {
            HeaderTooShort { .. } | InvalidStreamId(_) | StreamAlreadyExists(_) => {
                ErrorKind::Invalid
            }
            UnsupportedVersion(_)
            | UnknownFrameType(_)
            | InvalidFrameLength { .. }
            | StreamIdParity(_)
            | DuplicateSyn(_) => ErrorKind::Protocol,
            StreamNotFound(_) => ErrorKind::InvalidStream,
            StreamClosed(_) | SessionClosed => ErrorKind::Closed,
            WindowExhausted(_) => ErrorKind::WouldBlock,
            BufferAllocation(_) => ErrorKind::OutOfMemory,
            Io(_) | ShortIo { .. } => ErrorKind::Io,
            Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, BraidStreamError>;
