//! # Deferred Scheduler
//!
//! Actions queued by any thread and run later on the owning loop.
//!
//! ```text
//! head ─▶ [due: frame 12] ─▶ [due: +250ms] ─▶ [due: frame 13] ◀─ tail
//! ```
//!
//! Entries live in a slot map and are doubly linked in submission order, so
//! cancelling is O(1) and due entries fire in the order they were scheduled.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slotmap::SlotMap;
use tracing::trace;

slotmap::new_key_type! {
    /// Handle to a scheduled action, used for cancellation.
    pub struct ScheduleKey;
}

/// When a deferred action becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// After this many frames have been run by the owning loop.
    Frames(u64),
    /// After this much wall time.
    After(Duration),
}

#[derive(Debug, Clone, Copy)]
enum Due {
    Frame(u64),
    At(Instant),
}

impl Due {
    fn reached(self, frame: u64, now: Instant) -> bool {
        match self {
            Self::Frame(due) => frame >= due,
            Self::At(due) => now >= due,
        }
    }
}

type Action = Box<dyn FnOnce() + Send>;

struct Entry {
    due: Due,
    action: Option<Action>,
    prev: Option<ScheduleKey>,
    next: Option<ScheduleKey>,
}

#[derive(Default)]
struct List {
    entries: SlotMap<ScheduleKey, Entry>,
    head: Option<ScheduleKey>,
    tail: Option<ScheduleKey>,
    last_frame: u64,
}

impl List {
    fn push_back(&mut self, due: Due, action: Action) -> ScheduleKey {
        let prev = self.tail;
        let key = self.entries.insert(Entry {
            due,
            action: Some(action),
            prev,
            next: None,
        });
        match prev {
            Some(prev) => {
                if let Some(entry) = self.entries.get_mut(prev) {
                    entry.next = Some(key);
                }
            }
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        key
    }

    fn unlink(&mut self, key: ScheduleKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        match entry.prev {
            Some(prev) => {
                if let Some(p) = self.entries.get_mut(prev) {
                    p.next = entry.next;
                }
            }
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => {
                if let Some(n) = self.entries.get_mut(next) {
                    n.prev = entry.prev;
                }
            }
            None => self.tail = entry.prev,
        }
        Some(entry)
    }
}

/// A cancellable list of deferred actions.
///
/// Any thread may schedule or cancel. Only the owning loop calls
/// [`run_due`](Self::run_due); actions run on that thread, outside the lock,
/// so an action may schedule further actions. A running action cannot be
/// interrupted.
#[derive(Default)]
pub struct DeferredScheduler {
    list: Mutex<List>,
}

impl DeferredScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `action` to run once `trigger` is reached.
    ///
    /// Frame triggers count from the last frame passed to `run_due`.
    pub fn schedule(
        &self,
        trigger: Trigger,
        action: impl FnOnce() + Send + 'static,
    ) -> ScheduleKey {
        let mut list = self.list.lock();
        let due = match trigger {
            Trigger::Frames(frames) => Due::Frame(list.last_frame.saturating_add(frames)),
            Trigger::After(delay) => Due::At(Instant::now() + delay),
        };
        list.push_back(due, Box::new(action))
    }

    /// Removes a pending action. Returns false if it already ran or was
    /// cancelled.
    pub fn cancel(&self, key: ScheduleKey) -> bool {
        self.list.lock().unlink(key).is_some()
    }

    /// Runs every action due at `frame` / `now`, in scheduling order.
    ///
    /// Returns the number of actions run.
    pub fn run_due(&self, frame: u64, now: Instant) -> usize {
        let due: Vec<Action> = {
            let mut list = self.list.lock();
            list.last_frame = list.last_frame.max(frame);

            let mut ready = Vec::new();
            let mut cursor = list.head;
            while let Some(key) = cursor {
                let Some(entry) = list.entries.get(key) else {
                    break;
                };
                cursor = entry.next;
                if entry.due.reached(frame, now) {
                    if let Some(action) = list.unlink(key).and_then(|mut e| e.action.take()) {
                        ready.push(action);
                    }
                }
            }
            ready
        };

        let count = due.len();
        for action in due {
            action();
        }
        if count > 0 {
            trace!(frame, count, "ran deferred actions");
        }
        count
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.list.lock().entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DeferredScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredScheduler")
            .field("pending", &self.len())
            .finish()
    }
}
