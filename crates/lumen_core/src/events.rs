//! Lifecycle notifications.
//!
//! Subscribers get their own channel. Emitting never blocks and never calls
//! foreign code under a lock; disconnected receivers are pruned on the next
//! emit.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// A list of subscribers for events of type `E`.
pub struct Observers<E> {
    senders: Mutex<Vec<Sender<E>>>,
}

impl<E: Clone> Observers<E> {
    /// Creates an empty observer list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// Sends `event` to every live subscriber.
    pub fn emit(&self, event: &E) {
        let mut senders = self.senders.lock();
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of subscribers that were alive at the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().len()
    }
}

impl<E: Clone> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.senders.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let observers = Observers::new();
        let a = observers.subscribe();
        let b = observers.subscribe();

        observers.emit(&7_u32);

        assert_eq!(a.try_recv(), Ok(7));
        assert_eq!(b.try_recv(), Ok(7));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let observers = Observers::new();
        let kept = observers.subscribe();
        drop(observers.subscribe());
        assert_eq!(observers.subscriber_count(), 2);

        observers.emit(&"ping");

        assert_eq!(observers.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok("ping"));
    }
}
