//! In-memory paired transport.
//!
//! Two endpoints share a pair of byte queues: what one end writes, the
//! other reads, in order. Clones of an endpoint share its queues and fault
//! flags, so a test can keep a clone outside the session to inspect
//! pending traffic or inject transport failures mid-run.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Transport;

#[derive(Clone)]
pub struct MemoryTransport {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<VecDeque<u8>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Create two connected endpoints.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
        let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
        let a = MemoryTransport {
            rx: b_to_a.clone(),
            tx: a_to_b.clone(),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        };
        let b = MemoryTransport {
            rx: a_to_b,
            tx: b_to_a,
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        };
        (a, b)
    }

    /// Bytes queued for this endpoint to read.
    pub fn pending(&self) -> usize {
        self.rx.lock().len()
    }

    /// Make subsequent reads on this endpoint fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent writes on this endpoint fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected read failure",
            ));
        }
        let mut rx = self.rx.lock();
        let n = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            ));
        }
        self.tx.lock().extend(buf.iter().copied());
        Ok(buf.len())
    }
}
