use bytes::{Bytes, BytesMut};
use tokio::time::{Duration, Instant};

/// Upper bound on added latency: a batch is flushed at most this long after
/// its first fragment arrived.
pub const BATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Flush immediately once this many bytes are buffered.
pub const MAX_BATCH_SIZE: usize = 1024 * 1024;

/// Coalesces inbound fragments so the subprocess pipe sees few large writes
/// instead of one write per socket frame. Fragments are never reordered;
/// `take` concatenates them in arrival order.
#[derive(Debug, Default)]
pub struct Batcher {
    chunks: Vec<Bytes>,
    size: usize,
    deadline: Option<Instant>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment. Arms the flush deadline when the buffer goes from
    /// empty to non-empty. Returns true once the accumulated size has reached
    /// `MAX_BATCH_SIZE`.
    pub fn ingest(&mut self, chunk: Bytes) -> bool {
        if self.chunks.is_empty() {
            self.deadline = Some(Instant::now() + BATCH_TIMEOUT);
        }
        self.size += chunk.len();
        self.chunks.push(chunk);
        self.size >= MAX_BATCH_SIZE
    }

    /// Re-buffers a payload the pipe refused. It was the concatenation of the
    /// oldest fragments, so it goes back to the front. No deadline is armed;
    /// the pending flush fires on the next drain signal.
    pub fn requeue(&mut self, payload: Bytes) {
        self.size += payload.len();
        self.chunks.insert(0, payload);
    }

    /// Drops the armed deadline without touching the buffer. Used when the
    /// deadline expires while the pipe is saturated.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Discards everything, deadline included. Buffered bytes not yet
    /// flushed when a stream ends are lost with the connection.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.size = 0;
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[allow(dead_code)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Concatenates the buffered fragments in arrival order into a single
    /// payload, clearing the buffer and the deadline.
    pub fn take(&mut self) -> Bytes {
        self.deadline = None;
        self.size = 0;
        let chunks = std::mem::take(&mut self.chunks);
        if chunks.len() == 1 {
            return chunks.into_iter().next().unwrap_or_default();
        }
        let total = chunks.iter().map(Bytes::len).sum();
        let mut buf = BytesMut::with_capacity(total);
        for chunk in &chunks {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }
}

/// Mirrors whether the subprocess input channel currently accepts writes.
/// While saturated the batcher keeps accumulating and exactly one flush stays
/// pending; the drain signal re-opens the gate.
#[derive(Debug)]
pub struct BackpressureController {
    writable: bool,
}

impl BackpressureController {
    pub fn new() -> Self {
        Self { writable: true }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Records the outcome of a write attempt. `accepted == false` means the
    /// channel reported saturation and flushing must pause until drain.
    pub fn on_write_result(&mut self, accepted: bool) {
        if !accepted {
            self.writable = false;
        }
    }

    pub fn on_drain(&mut self) {
        self.writable = true;
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
