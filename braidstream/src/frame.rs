//! Wire frame header codec.
//!
//! Every yamux frame starts with the same 12-byte header (all multibyte
//! fields big-endian):
//!
//! ```text
//! +-------------+----------+------------+----------------+--------------+
//! | Version(8)  | Type(8)  | Flags(16)  | Stream ID(32)  | Length(32)   |
//! +-------------+----------+------------+----------------+--------------+
//! ```
//!
//! The meaning of `length` depends on the frame type: payload byte count
//! for DATA, a 32-bit window value for WINDOW_UPDATE, an opaque token for
//! PING, and the reason code length (always 4) for GO_AWAY. The codec is
//! pure: payload bytes are pulled off the transport by the session engine
//! after the header has been decoded.

use std::fmt;
use std::ops::BitOr;

use bytes::{Buf, BufMut};

use crate::error::{BraidStreamError, Result};

/// The only protocol version on the wire.
pub const PROTO_VERSION: u8 = 0;

/// Fixed size of the frame header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Maximum payload carried by a single DATA frame.
pub const MAX_DATA_FRAME_SIZE: usize = 16384;

/// Maximum opaque token length echoed back for a PING.
pub const PING_TOKEN_MAX: usize = 8;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    WindowUpdate = 0x1,
    Ping = 0x2,
    GoAway = 0x3,
}

impl TryFrom<u8> for FrameType {
    type Error = BraidStreamError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(FrameType::Data),
            0x1 => Ok(FrameType::WindowUpdate),
            0x2 => Ok(FrameType::Ping),
            0x3 => Ok(FrameType::GoAway),
            other => Err(BraidStreamError::UnknownFrameType(other)),
        }
    }
}

/// Flag bits carried in the 16-bit flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u16);

impl Flags {
    pub const NONE: Self = Self(0x0);
    /// Requests a stream open (or marks a PING request).
    pub const SYN: Self = Self(0x1);
    /// Acknowledges a SYN (or marks a PING response).
    pub const ACK: Self = Self(0x2);
    /// Half-closes the sender's direction of a stream.
    pub const FIN: Self = Self(0x4);
    /// Aborts a stream in both directions.
    pub const RST: Self = Self(0x8);

    pub fn contains(self, flag: Flags) -> bool {
        (self.0 & flag.0) == flag.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Reason codes carried by GO_AWAY frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoAwayReason {
    Normal,
    ProtocolError,
    InternalError,
    /// A code this implementation does not define; preserved numerically.
    Other(u32),
}

impl GoAwayReason {
    pub fn code(self) -> u32 {
        match self {
            GoAwayReason::Normal => 0,
            GoAwayReason::ProtocolError => 1,
            GoAwayReason::InternalError => 2,
            GoAwayReason::Other(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => GoAwayReason::Normal,
            1 => GoAwayReason::ProtocolError,
            2 => GoAwayReason::InternalError,
            other => GoAwayReason::Other(other),
        }
    }
}

impl fmt::Display for GoAwayReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoAwayReason::Normal => write!(f, "normal"),
            GoAwayReason::ProtocolError => write!(f, "protocol error"),
            GoAwayReason::InternalError => write!(f, "internal error"),
            GoAwayReason::Other(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub frame_type: FrameType,
    pub flags: Flags,
    pub stream_id: u32,
    pub length: u32,
}

impl Header {
    /// Build a header at the current protocol version.
    pub fn new(frame_type: FrameType, flags: Flags, stream_id: u32, length: u32) -> Self {
        Self {
            version: PROTO_VERSION,
            frame_type,
            flags,
            stream_id,
            length,
        }
    }

    /// Encode into a fixed 12-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        buf[1] = self.frame_type as u8;
        buf[2..4].copy_from_slice(&self.flags.0.to_be_bytes());
        buf[4..8].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Encode into a pre-allocated buffer.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.frame_type as u8);
        buf.put_u16(self.flags.0);
        buf.put_u32(self.stream_id);
        buf.put_u32(self.length);
    }

    /// Decode a header from the given bytes.
    ///
    /// Requires at least [`HEADER_SIZE`] bytes; rejects unsupported versions
    /// and unknown frame types.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(BraidStreamError::HeaderTooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let version = data.get_u8();
        if version != PROTO_VERSION {
            return Err(BraidStreamError::UnsupportedVersion(version));
        }
        let frame_type = FrameType::try_from(data.get_u8())?;
        let flags = Flags(data.get_u16());
        let stream_id = data.get_u32();
        let length = data.get_u32();

        Ok(Self {
            version,
            frame_type,
            flags,
            stream_id,
            length,
        })
    }
}
