use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashSet;
use parking_lot::Mutex;
use rand::Rng;

/// Allocates 32-bit TEIDs by random draw with retry-on-collision.
///
/// The teacher's `PortAllocator` (`crates/service/src/session/ports.rs`)
/// uses a bitmap over its whole range because a UDP port space is only 16
/// bits; a TEID space is 32 bits, far too large to bitmap, so collisions are
/// resolved by retrying a fresh random draw against a set of the TEIDs
/// currently in use — the allocator only needs to guarantee uniqueness
/// among *live* TEIDs, not across the full value space.
#[derive(Default)]
pub struct TeidAllocator {
    allocated: Mutex<AHashSet<u32>>,
}

impl TeidAllocator {
    /// # Test
    ///
    /// ```
    /// use pgw_service::teid::TeidAllocator;
    ///
    /// let allocator = TeidAllocator::default();
    /// let a = allocator.alloc();
    /// let b = allocator.alloc();
    /// assert_ne!(a, b);
    /// ```
    pub fn alloc(&self) -> u32 {
        let mut allocated = self.allocated.lock();

        loop {
            let candidate = rand::rng().random::<u32>();
            if candidate != 0 && allocated.insert(candidate) {
                return candidate;
            }
        }
    }

    pub fn release(&self, teid: u32) {
        self.allocated.lock().remove(&teid);
    }
}
