//! Tiered pool of reusable byte buffers for the write path.
//!
//! Three tiers: 4 KiB, 32 KiB, 256 KiB. A buffer handed out by
//! [`BufferPool::acquire`] always has length 0 and capacity at least the
//! requested size. Contents beyond the zero length are not cleared.

use bytes::Bytes;
use parking_lot::Mutex;

pub const SMALL_TIER: usize = 4 * 1024;
pub const MEDIUM_TIER: usize = 32 * 1024;
pub const LARGE_TIER: usize = 256 * 1024;

const TIERS: [usize; 3] = [SMALL_TIER, MEDIUM_TIER, LARGE_TIER];

/// Idle buffers kept per tier.
const MAX_IDLE_PER_TIER: usize = 32;

pub struct BufferPool {
    tiers: [Mutex<Vec<Vec<u8>>>; 3],
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            tiers: [Mutex::new(Vec::new()), Mutex::new(Vec::new()), Mutex::new(Vec::new())],
        }
    }

    /// A zero-length buffer with capacity >= `hint`, from the smallest tier
    /// that fits. Requests above the largest tier get a fresh allocation.
    pub fn acquire(&self, hint: usize) -> Vec<u8> {
        let Some(tier) = TIERS.iter().position(|&size| hint <= size) else {
            return Vec::with_capacity(hint);
        };
        let mut buf = self.tiers[tier]
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(TIERS[tier]));
        buf.clear();
        buf
    }

    /// A buffer of length `len` for fixed-size reads.
    pub fn acquire_len(&self, len: usize) -> Vec<u8> {
        let mut buf = self.acquire(len);
        buf.resize(len, 0);
        buf
    }

    /// Return a buffer. It lands in the largest tier its capacity covers;
    /// buffers below the small tier or above the large tier are dropped.
    pub fn release(&self, mut buf: Vec<u8>) {
        let cap = buf.capacity();
        if cap > LARGE_TIER {
            return;
        }
        let Some(tier) = TIERS.iter().rposition(|&size| cap >= size) else {
            return;
        };
        buf.clear();
        let mut idle = self.tiers[tier].lock();
        if idle.len() < MAX_IDLE_PER_TIER {
            idle.push(buf);
        }
    }

    /// Return the buffer behind a frame that has been written. Returns
    /// false when another handle still shares it, in which case it is left
    /// to be freed normally.
    pub fn reclaim(&self, frame: Bytes) -> bool {
        match frame.try_into_mut() {
            Ok(buf) => {
                self.release(buf.into());
                true
            }
            Err(_) => false,
        }
    }

    /// Idle buffers currently held, per tier (small, medium, large).
    pub fn idle_counts(&self) -> [usize; 3] {
        [
            self.tiers[0].lock().len(),
            self.tiers[1].lock().len(),
            self.tiers[2].lock().len(),
        ]
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
