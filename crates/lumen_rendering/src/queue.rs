//! # Priority Draw Queue
//!
//! Collects what wants to be drawn this frame and hands it to the render
//! thread in layering order.
//!
//! ## Ordering
//!
//! Higher priority drains first. Items drained first are drawn first and end
//! up visually beneath later ones (painter's algorithm), so a background uses
//! a high priority and a cursor a low one. Equal priorities keep their
//! enqueue order.
//!
//! ## Threading
//!
//! Any number of producers may enqueue concurrently. Exactly one consumer,
//! the owning render thread, drains once per frame.

use std::cmp::Reverse;
use std::fmt;

use parking_lot::Mutex;

/// A multi-producer, single-consumer queue ordered by priority.
pub struct DrawQueue<T> {
    items: Mutex<Vec<(i32, T)>>,
}

impl<T> DrawQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a queue with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Adds one item.
    pub fn enqueue(&self, item: T, priority: i32) {
        self.items.lock().push((priority, item));
    }

    /// Adds a range of items sharing one priority, under a single lock.
    pub fn enqueue_range<I>(&self, items: I, priority: i32)
    where
        I: IntoIterator<Item = T>,
    {
        let items = items.into_iter();
        let mut queue = self.items.lock();
        queue.reserve(items.size_hint().0);
        queue.extend(items.map(|item| (priority, item)));
    }

    /// Adds a range of `(item, priority)` pairs, under a single lock.
    pub fn enqueue_many<I>(&self, items: I)
    where
        I: IntoIterator<Item = (T, i32)>,
    {
        let items = items.into_iter();
        let mut queue = self.items.lock();
        queue.reserve(items.size_hint().0);
        queue.extend(items.map(|(item, priority)| (priority, item)));
    }

    /// Awaitable form of [`enqueue`](Self::enqueue). Same ordering rules.
    pub async fn enqueue_async(&self, item: T, priority: i32) {
        tokio::task::yield_now().await;
        self.enqueue(item, priority);
    }

    /// Awaitable form of [`enqueue_range`](Self::enqueue_range).
    pub async fn enqueue_range_async<I>(&self, items: I, priority: i32)
    where
        I: IntoIterator<Item = T>,
    {
        tokio::task::yield_now().await;
        self.enqueue_range(items, priority);
    }

    /// Grows the queue so it can hold `capacity` items without reallocating.
    pub fn ensure_capacity(&self, capacity: usize) {
        let mut queue = self.items.lock();
        let missing = capacity.saturating_sub(queue.len());
        queue.reserve(missing);
    }

    /// Grows the queue so `additional` more items fit without reallocating.
    pub fn ensure_free_space(&self, additional: usize) {
        self.items.lock().reserve(additional);
    }

    /// Allocated room, in items.
    pub fn capacity(&self) -> usize {
        self.items.lock().capacity()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every queued item into `out`, sorted for drawing.
    ///
    /// `out` is cleared first and its allocation becomes the queue's next
    /// buffer, so alternating two vectors frame to frame never reallocates in
    /// steady state.
    pub fn drain_into(&self, out: &mut Vec<(i32, T)>) {
        out.clear();
        std::mem::swap(&mut *self.items.lock(), out);
        out.sort_by_key(|&(priority, _)| Reverse(priority));
    }

    /// Takes every queued item, sorted for drawing.
    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::new();
        self.drain_into(&mut out);
        out.into_iter().map(|(_, item)| item).collect()
    }
}

impl<T> Default for DrawQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DrawQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawQueue")
            .field("len", &self.items.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_priority_drains_first_and_ties_are_stable() {
        // Painter's algorithm: the first item drawn ends up underneath.
        let queue = DrawQueue::new();
        queue.enqueue("p3", 3);
        queue.enqueue("p1-first", 1);
        queue.enqueue("p2", 2);
        queue.enqueue("p1-second", 1);

        assert_eq!(queue.drain(), vec!["p3", "p2", "p1-first", "p1-second"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicates_allowed() {
        let queue = DrawQueue::new();
        queue.enqueue(7, 0);
        queue.enqueue(7, 0);
        assert_eq!(queue.drain(), vec![7, 7]);
    }

    #[test]
    fn test_ranges_and_negative_priorities() {
        let queue = DrawQueue::new();
        queue.enqueue_range(["a", "b"], -1);
        queue.enqueue_many([("c", 5), ("d", -1)]);
        queue.enqueue("e", 0);

        assert_eq!(queue.drain(), vec!["c", "e", "a", "b", "d"]);
    }

    #[test]
    fn test_capacity_presizing() {
        let queue: DrawQueue<u32> = DrawQueue::new();
        queue.ensure_capacity(128);
        assert!(queue.capacity() >= 128);

        queue.enqueue_range(0..100, 0);
        queue.ensure_free_space(200);
        assert!(queue.capacity() >= 300);
    }

    #[test]
    fn test_drain_into_swaps_buffers() {
        let queue = DrawQueue::with_capacity(64);
        let mut scratch = Vec::with_capacity(16);
        queue.enqueue(1, 1);

        queue.drain_into(&mut scratch);

        assert_eq!(scratch, vec![(1, 1)]);
        assert!(scratch.capacity() >= 64);
        assert!(queue.capacity() >= 16);
    }

    #[tokio::test]
    async fn test_async_enqueue_matches_sync_ordering() {
        let queue = DrawQueue::new();
        queue.enqueue("sync-1", 1);
        queue.enqueue_async("async-1", 1).await;
        queue.enqueue_async("async-9", 9).await;
        queue.enqueue_range_async(["r-1a", "r-1b"], 1).await;

        assert_eq!(queue.drain(), vec!["async-9", "sync-1", "async-1", "r-1a", "r-1b"]);
    }
}
