use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::buffer::Buffer;

/// Hints passed along with every allocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocFlags {
    /// Ask for a zero-filled block. Every `Buffer` starts zero-filled, so
    /// this only matters to allocators which account for it.
    pub zeroed: bool,
    /// Prefer the top end of the pool, for long-lived blocks.
    pub top: bool,
    /// Allocate from the temporary pool.
    pub temporary: bool,
}

impl AllocFlags {
    pub fn zeroed() -> Self {
        AllocFlags {
            zeroed: true,
            ..Default::default()
        }
    }

    pub fn temporary() -> Self {
        AllocFlags {
            temporary: true,
            ..Default::default()
        }
    }
}

/// The memory source used by resource managers for every payload and
/// intermediate block. Returning `None` signals exhaustion.
pub trait Allocator: Send + Sync + 'static {
    fn allocate(&self, size: usize, align: usize, flags: AllocFlags) -> Option<Buffer>;
}

/// Allocates straight from the global allocator. Flags are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    #[inline]
    fn allocate(&self, size: usize, align: usize, _: AllocFlags) -> Option<Buffer> {
        Buffer::try_new(size, align)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tracker {
    allocations: AtomicUsize,
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
    fail_at: AtomicUsize,
}

impl Tracker {
    pub(crate) fn release(&self, len: usize) {
        let prev = self.live_buffers.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "tracked buffer released twice.");
        self.live_bytes.fetch_sub(len, Ordering::SeqCst);
    }
}

/// An allocator which keeps count of the buffers it handed out and which are
/// still alive. It can also be told to fail a specific allocation.
#[derive(Debug, Default, Clone)]
pub struct TrackingAllocator {
    tracker: Arc<Tracker>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        TrackingAllocator::default()
    }

    /// Makes the `nth` allocation from now on fail (1-based). Zero disables
    /// the failure.
    pub fn fail_after(&self, nth: usize) {
        let target = if nth == 0 {
            0
        } else {
            self.tracker.allocations.load(Ordering::SeqCst) + nth
        };

        self.tracker.fail_at.store(target, Ordering::SeqCst);
    }

    /// Number of allocation attempts so far, including failed ones.
    pub fn allocations(&self) -> usize {
        self.tracker.allocations.load(Ordering::SeqCst)
    }

    /// Number of buffers allocated here which have not been dropped yet.
    pub fn live_buffers(&self) -> usize {
        self.tracker.live_buffers.load(Ordering::SeqCst)
    }

    /// Number of bytes held by live buffers.
    pub fn live_bytes(&self) -> usize {
        self.tracker.live_bytes.load(Ordering::SeqCst)
    }
}

impl Allocator for TrackingAllocator {
    fn allocate(&self, size: usize, align: usize, _: AllocFlags) -> Option<Buffer> {
        let n = self.tracker.allocations.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.tracker.fail_at.load(Ordering::SeqCst) {
            debug!("Forced allocation failure #{} ({} bytes).", n, size);
            return None;
        }

        let mut buf = Buffer::try_new(size, align)?;
        self.tracker.live_buffers.fetch_add(1, Ordering::SeqCst);
        self.tracker.live_bytes.fetch_add(size, Ordering::SeqCst);
        buf.attach(self.tracker.clone());
        Some(buf)
    }
}
