//! Insertion-ordered element list with per-element skip flags.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone)]
struct Slot<T> {
    item: T,
    skip: bool,
}

/// A thread-safe list that keeps insertion order.
///
/// Skipped elements stay in the list but are left out of [`visible`] and
/// [`flatten`], together with everything nested below them.
///
/// [`visible`]: OrderedList::visible
/// [`flatten`]: OrderedList::flatten
pub struct OrderedList<T> {
    slots: Mutex<Vec<Slot<T>>>,
}

/// Elements that own a nested list of their own kind.
pub trait Nested: Clone {
    /// The nested list, if this element has one.
    fn children(&self) -> Option<&OrderedList<Self>>;
}

/// Shared elements whose nested list holds `Arc`s of their own type.
///
/// Implementing this for a type makes `Arc<Self>` [`Nested`], so lists of
/// shared elements defined in other crates can be flattened.
pub trait NestedNode: Sized {
    /// The nested list, if this element has one.
    fn nested_list(&self) -> Option<&OrderedList<Arc<Self>>>;
}

impl<T: NestedNode> Nested for Arc<T> {
    fn children(&self) -> Option<&OrderedList<Self>> {
        T::nested_list(self)
    }
}

impl<T: Clone + PartialEq> OrderedList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Appends an element.
    pub fn push(&self, item: T) {
        self.slots.lock().push(Slot { item, skip: false });
    }

    /// Inserts an element at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, item: T) {
        let mut slots = self.slots.lock();
        let index = index.min(slots.len());
        slots.insert(index, Slot { item, skip: false });
    }

    /// Removes the first element equal to `item`.
    pub fn remove(&self, item: &T) -> bool {
        let mut slots = self.slots.lock();
        match slots.iter().position(|s| s.item == *item) {
            Some(index) => {
                slots.remove(index);
                true
            }
            None => false,
        }
    }

    /// Sets the skip flag of the first element equal to `item`.
    ///
    /// Returns false if the element is not in the list.
    pub fn set_skip(&self, item: &T, skip: bool) -> bool {
        let mut slots = self.slots.lock();
        match slots.iter_mut().find(|s| s.item == *item) {
            Some(slot) => {
                slot.skip = skip;
                true
            }
            None => false,
        }
    }

    /// Returns the skip flag of `item`, if present.
    pub fn is_skipped(&self, item: &T) -> Option<bool> {
        self.slots
            .lock()
            .iter()
            .find(|s| s.item == *item)
            .map(|s| s.skip)
    }

    /// Number of elements, skipped ones included.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every element.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Snapshot of all elements in order.
    pub fn items(&self) -> Vec<T> {
        self.slots.lock().iter().map(|s| s.item.clone()).collect()
    }

    /// Snapshot of the non-skipped elements in order.
    pub fn visible(&self) -> Vec<T> {
        self.slots
            .lock()
            .iter()
            .filter(|s| !s.skip)
            .map(|s| s.item.clone())
            .collect()
    }
}

impl<T: Nested + PartialEq> OrderedList<T> {
    /// Depth-first, pre-order walk of the visible elements.
    ///
    /// Each nested list is snapshotted on its own; no two list locks are held
    /// at the same time.
    pub fn flatten(&self) -> Vec<T> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<T>) {
        for item in self.visible() {
            out.push(item.clone());
            if let Some(children) = item.children() {
                children.flatten_into(out);
            }
        }
    }
}

impl<T: Clone + PartialEq> Default for OrderedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for OrderedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedList")
            .field("len", &self.slots.lock().len())
            .finish()
    }
}
