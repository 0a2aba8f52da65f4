//! Cross-thread surface invalidation flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
struct Shared {
    invalid: AtomicBool,
    /// Latest window size, width in the high half.
    size: AtomicU64,
}

/// Handle for telling the scheduler the surface needs rebuilding.
///
/// Cloneable and `Send + Sync`, so window callbacks on any thread can hold
/// one. Marking only sets a flag; the scheduler acts on it at the start
/// of its next tick.
#[derive(Debug, Clone)]
pub struct SurfaceInvalidator {
    shared: Arc<Shared>,
}

impl SurfaceInvalidator {
    /// Creates a clear flag with an initial window size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                invalid: AtomicBool::new(false),
                size: AtomicU64::new(pack(width, height)),
            }),
        }
    }

    /// Requests a surface recreation. Idempotent.
    #[inline]
    pub fn mark_invalid(&self) {
        self.shared.invalid.store(true, Ordering::Release);
    }

    /// Records a new window size and requests a recreation.
    pub fn notify_resize(&self, width: u32, height: u32) {
        self.shared.size.store(pack(width, height), Ordering::Release);
        self.mark_invalid();
    }

    /// Returns true if a recreation is pending.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.shared.invalid.load(Ordering::Acquire)
    }

    /// Latest window size reported through [`notify_resize`](Self::notify_resize).
    pub fn size_hint(&self) -> (u32, u32) {
        unpack(self.shared.size.load(Ordering::Acquire))
    }

    /// Clears the flag, returning whether it was set.
    #[inline]
    pub(crate) fn take(&self) -> bool {
        self.shared.invalid.swap(false, Ordering::AcqRel)
    }
}

fn pack(width: u32, height: u32) -> u64 {
    (u64::from(width) << 32) | u64::from(height)
}

fn unpack(size: u64) -> (u32, u32) {
    ((size >> 32) as u32, size as u32)
}
