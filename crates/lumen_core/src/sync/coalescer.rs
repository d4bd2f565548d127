//! # Update Coalescer
//!
//! A CPU-side value paired with a pending-upload flag.
//!
//! ## Protocol
//!
//! ```text
//! writer threads                      render thread
//! ──────────────                      ─────────────
//! set(v)  ─┐                          flush(upload)
//! set(v') ─┼─ lock, compare, store,     ├─ fast path: flag clear → return
//! set(v'')─┘  raise flag                └─ lock
//!                                           ├─ upload(current value)
//!                                           └─ lower flag, unlock
//! ```
//!
//! The flag is lowered only after the upload has read the current value under
//! the same lock that writers take, so a write that lands before `flush`
//! returns is either part of the upload or leaves the flag raised.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

struct State<T> {
    value: T,
    pending: bool,
}

/// A value that reaches its device-side mirror at most once per change.
pub struct Coalesced<T> {
    state: Mutex<State<T>>,
    /// Mirror of `State::pending` for the lock-free clean check.
    dirty: AtomicBool,
    uploads: AtomicU64,
}

impl<T: Clone + PartialEq> Coalesced<T> {
    /// Creates a coalescer holding `value`.
    ///
    /// The initial value has never been uploaded, so it starts pending.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(State { value, pending: true }),
            dirty: AtomicBool::new(true),
            uploads: AtomicU64::new(0),
        }
    }

    /// Stores `value` if it differs from the current one.
    ///
    /// Returns true if the value changed and an upload is now pending.
    pub fn set(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.value == value {
            return false;
        }
        state.value = value;
        state.pending = true;
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Edits the value in place; marks it pending only if it changed.
    pub fn update(&self, edit: impl FnOnce(&mut T)) -> bool {
        let mut state = self.state.lock();
        let before = state.value.clone();
        edit(&mut state.value);
        if state.value == before {
            return false;
        }
        state.pending = true;
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Copy of the current value.
    pub fn get(&self) -> T {
        self.state.lock().value.clone()
    }

    /// Returns true if the value changed since the last successful flush.
    pub fn is_pending(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Pushes the current value through `upload` if it is pending.
    ///
    /// Returns `Ok(true)` if an upload ran. The flag is only cleared when
    /// `upload` succeeds; on error it stays raised and the next flush retries.
    ///
    /// `upload` runs under the coalescer's lock and must not call back into
    /// this coalescer.
    ///
    /// # Errors
    ///
    /// Returns whatever `upload` returns.
    pub fn flush<E>(&self, upload: impl FnOnce(&T) -> Result<(), E>) -> Result<bool, E> {
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(false);
        }

        let mut state = self.state.lock();
        if !state.pending {
            return Ok(false);
        }
        upload(&state.value)?;
        state.pending = false;
        self.dirty.store(false, Ordering::Release);
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Number of successful uploads so far.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Raises the flag without changing the value.
    ///
    /// Used when the device-side mirror was lost and must be rewritten.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.pending = true;
        self.dirty.store(true, Ordering::Release);
    }
}

impl<T: fmt::Debug> fmt::Debug for Coalesced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Coalesced")
            .field("value", &state.value)
            .field("pending", &state.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Arc;

    #[test]
    fn test_many_writes_one_upload() {
        let value = Coalesced::new(0_u32);
        value.flush(|_| Ok::<_, Infallible>(())).unwrap();

        for i in 1..=50 {
            value.set(i);
        }

        let mut uploaded = Vec::new();
        let mut upload = |v: &u32| {
            uploaded.push(*v);
            Ok::<_, Infallible>(())
        };
        assert_eq!(value.flush(&mut upload), Ok(true));
        assert_eq!(value.flush(&mut upload), Ok(false));

        assert_eq!(uploaded, vec![50]);
        assert_eq!(value.upload_count(), 2);
    }

    #[test]
    fn test_equal_write_does_not_dirty() {
        let value = Coalesced::new(7_i32);
        value.flush(|_| Ok::<_, Infallible>(())).unwrap();

        assert!(!value.set(7));
        assert!(!value.is_pending());
        assert!(!value.update(|v| *v += 0));
        assert!(value.update(|v| *v += 1));
        assert!(value.is_pending());
    }

    #[test]
    fn test_failed_upload_keeps_flag() {
        let value = Coalesced::new(1_u8);

        assert_eq!(value.flush(|_| Err("device lost")), Err("device lost"));
        assert!(value.is_pending());
        assert_eq!(value.upload_count(), 0);

        assert_eq!(value.flush(|_| Ok::<_, &str>(())), Ok(true));
        assert!(!value.is_pending());
    }

    #[test]
    fn test_invalidate_forces_reupload() {
        let value = Coalesced::new([1.0_f32; 4]);
        value.flush(|_| Ok::<_, Infallible>(())).unwrap();

        value.invalidate();
        assert!(value.is_pending());
        assert_eq!(value.flush(|_| Ok::<_, Infallible>(())), Ok(true));
    }

    #[test]
    fn test_no_write_is_lost_under_contention() {
        let value = Arc::new(Coalesced::new(0_u64));
        let writer = {
            let value = Arc::clone(&value);
            std::thread::spawn(move || {
                for i in 1..=10_000 {
                    value.set(i);
                }
            })
        };

        let mut last = 0;
        while !writer.is_finished() {
            value
                .flush(|v| {
                    last = *v;
                    Ok::<_, Infallible>(())
                })
                .unwrap();
        }
        writer.join().unwrap();
        value
            .flush(|v| {
                last = *v;
                Ok::<_, Infallible>(())
            })
            .unwrap();

        assert_eq!(last, 10_000);
        assert!(!value.is_pending());
    }
}
