//! # Object Pool
//!
//! Recycles heap instances of frequently captured data.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Data that can be cleared in place for reuse.
pub trait Poolable: Default + Send + 'static {
    /// Clears the instance, keeping any allocated capacity.
    fn reset(&mut self);
}

struct Shared<T> {
    idle: Mutex<Vec<Box<T>>>,
    allocated: AtomicUsize,
}

/// A thread-safe pool of reusable instances.
///
/// Acquiring pops an idle instance or allocates a new one when the pool is
/// empty. Dropping the returned [`Pooled`] handle resets the instance and puts
/// it back, so the next acquire sees the same allocation.
///
/// # Example
///
/// ```rust
/// use lumen_core::{ObjectPool, Poolable};
///
/// #[derive(Default)]
/// struct Scratch(Vec<u8>);
///
/// impl Poolable for Scratch {
///     fn reset(&mut self) {
///         self.0.clear();
///     }
/// }
///
/// let pool: ObjectPool<Scratch> = ObjectPool::new();
/// {
///     let mut scratch = pool.acquire();
///     scratch.0.extend_from_slice(b"frame");
/// }
/// assert_eq!(pool.idle_count(), 1);
/// assert!(pool.acquire().0.is_empty());
/// ```
pub struct ObjectPool<T: Poolable> {
    shared: Arc<Shared<T>>,
}

impl<T: Poolable> ObjectPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a pool with `warm` instances already allocated and idle.
    #[must_use]
    pub fn with_capacity(warm: usize) -> Self {
        let idle: Vec<Box<T>> = (0..warm).map(|_| Box::default()).collect();
        Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(idle),
                allocated: AtomicUsize::new(warm),
            }),
        }
    }

    /// Takes an idle instance, or allocates one if none is idle.
    pub fn acquire(&self) -> Pooled<T> {
        let reused = self.shared.idle.lock().pop();
        let item = reused.unwrap_or_else(|| {
            self.shared.allocated.fetch_add(1, Ordering::Relaxed);
            Box::default()
        });
        Pooled {
            item: Some(item),
            home: Arc::clone(&self.shared),
        }
    }

    /// Number of instances waiting in the pool.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Number of instances this pool has ever allocated.
    pub fn allocated_total(&self) -> usize {
        self.shared.allocated.load(Ordering::Relaxed)
    }
}

impl<T: Poolable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Poolable> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.idle_count())
            .field("allocated", &self.allocated_total())
            .finish()
    }
}

/// A pooled instance. Returns to its pool when dropped.
pub struct Pooled<T: Poolable> {
    item: Option<Box<T>>,
    home: Arc<Shared<T>>,
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the item.
        self.item.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(mut item) = self.item.take() {
            item.reset();
            self.home.idle.lock().push(item);
        }
    }
}

impl<T: Poolable + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Events {
        keys: Vec<u32>,
        buttons: u8,
    }

    impl Poolable for Events {
        fn reset(&mut self) {
            self.keys.clear();
            self.buttons = 0;
        }
    }

    #[test]
    fn test_release_then_acquire_returns_same_instance() {
        let pool: ObjectPool<Events> = ObjectPool::new();

        let mut first = pool.acquire();
        first.keys.extend([1, 2, 3]);
        first.buttons = 0b101;
        let address = std::ptr::addr_of!(*first) as usize;
        drop(first);

        assert_eq!(pool.idle_count(), 1);

        let second = pool.acquire();
        assert_eq!(std::ptr::addr_of!(*second) as usize, address);
        assert!(second.keys.is_empty());
        assert_eq!(second.buttons, 0);
        assert!(second.keys.capacity() >= 3);
        assert_eq!(pool.allocated_total(), 1);
    }

    #[test]
    fn test_empty_pool_allocates() {
        let pool: ObjectPool<Events> = ObjectPool::with_capacity(1);
        let a = pool.acquire();
        let b = pool.acquire();

        assert_eq!(pool.allocated_total(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn test_handles_cross_threads() {
        let pool: ObjectPool<Events> = ObjectPool::new();
        let mut handle = pool.acquire();
        handle.keys.push(9);

        std::thread::spawn(move || drop(handle)).join().unwrap();

        assert_eq!(pool.idle_count(), 1);
    }
}
