//! Buffers client audio while the transcription leg is down.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Bounded FIFO for audio frames awaiting a (re)connected recognizer.
///
/// Overflow drops the oldest frame. A saturation episode begins when the
/// queue reaches capacity and ends when it drains; each episode yields at
/// most one warning, raised once the queue has stayed full past
/// `warn_after`.
#[derive(Debug)]
pub struct AudioFrameBridge {
    queue: VecDeque<Bytes>,
    capacity: usize,
    warn_after: Duration,
    full_since: Option<Instant>,
    warned: bool,
    dropped: u64,
}

impl AudioFrameBridge {
    pub fn new(capacity: usize, warn_after: Duration) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            warn_after,
            full_since: None,
            warned: false,
            dropped: 0,
        }
    }

    /// Queues a frame for later replay. Returns `true` exactly when the
    /// saturation warning should fire.
    pub fn enqueue(&mut self, chunk: Bytes) -> bool {
        let mut warn = false;
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
            self.dropped += 1;
            if let Some(since) = self.full_since {
                if !self.warned && since.elapsed() >= self.warn_after {
                    self.warned = true;
                    warn = true;
                }
            }
        }
        self.queue.push_back(chunk);

        if self.queue.len() >= self.capacity {
            self.full_since.get_or_insert_with(Instant::now);
        } else {
            self.full_since = None;
            self.warned = false;
        }
        warn
    }

    /// Removes all buffered frames, oldest first, for replay after a
    /// reconnect. Ends any saturation episode.
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.full_since = None;
        self.warned = false;
        self.queue.drain(..).collect()
    }

    /// Total frames discarded to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
