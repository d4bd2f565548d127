//! Per-manager coordination lock.
//!
//! The render thread holds it around each critical section that touches
//! shared manager state (a single draw call, a registry sweep). External
//! threads hold it while they mutate or dispose something the render thread
//! may be using. It is re-entrant so a disposal triggered from inside a draw
//! on the render thread does not deadlock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Guard returned by [`CoordinationLock::lock`].
pub type CoordinationGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// Exclusive lock arbitrating between a render loop and external callers.
#[derive(Debug, Default)]
pub struct CoordinationLock {
    inner: ReentrantMutex<()>,
    contended: AtomicU64,
}

impl CoordinationLock {
    /// Creates an unlocked coordination lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is held.
    pub fn lock(&self) -> CoordinationGuard<'_> {
        if let Some(guard) = self.inner.try_lock() {
            return guard;
        }
        self.contended.fetch_add(1, Ordering::Relaxed);
        self.inner.lock()
    }

    /// Waits at most `timeout` for the lock.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<CoordinationGuard<'_>> {
        self.inner.try_lock_for(timeout)
    }

    /// Returns true if some thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Number of `lock` calls that had to wait.
    pub fn contention_count(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }
}
