//! Session configuration.

use std::time::Duration;

/// Default receive window advertised for each stream: 256 KiB.
pub const DEFAULT_WINDOW_SIZE: u32 = 256 * 1024;

/// Tunables snapshotted by each session at creation.
///
/// The two interval fields and `enable_keepalive` are advisory: the engine
/// runs no timers of its own, so they only steer transport adapters (see
/// [`crate::transport::tcp::TcpTransport`]) and caller-driven keepalive
/// loops.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of inbound streams queued awaiting `accept_stream`.
    /// Streams arriving beyond this bound are refused with RST.
    pub accept_backlog: usize,
    /// Whether the caller should run a keepalive ping loop.
    pub enable_keepalive: bool,
    /// Advisory write timeout for the underlying connection.
    pub connection_write_timeout: Duration,
    /// Advisory interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Initial receive window advertised per stream, and the ceiling used
    /// when replenishing it.
    pub max_stream_window_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accept_backlog: 256,
            enable_keepalive: true,
            connection_write_timeout: Duration::from_millis(30_000),
            keepalive_interval: Duration::from_millis(60_000),
            max_stream_window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}
