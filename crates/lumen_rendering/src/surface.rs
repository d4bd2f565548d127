//! Render targets and their per-manager lists.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use lumen_core::{CoreError, CoreResult};

/// Identity of a render manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u32);

impl ManagerId {
    /// Allocates a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manager#{}", self.0)
    }
}

/// Identity of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

/// A surface a manager presents to.
#[derive(Debug)]
pub struct RenderTarget {
    id: TargetId,
    owner: ManagerId,
    label: String,
    size: (u32, u32),
}

impl RenderTarget {
    /// Creates a target owned by `owner`.
    #[must_use]
    pub fn new(owner: ManagerId, label: impl Into<String>, size: (u32, u32)) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Arc::new(Self {
            id: TargetId(NEXT.fetch_add(1, Ordering::Relaxed)),
            owner,
            label: label.into(),
            size,
        })
    }

    /// Target id.
    pub fn id(&self) -> TargetId {
        self.id
    }

    /// Owning manager.
    pub fn owner(&self) -> ManagerId {
        self.owner
    }

    /// Display name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size in pixels.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// The targets one manager presents to.
#[derive(Debug)]
pub struct RenderTargetList {
    owner: ManagerId,
    targets: Mutex<Vec<Arc<RenderTarget>>>,
}

impl RenderTargetList {
    /// Creates an empty list for `owner`.
    #[must_use]
    pub fn new(owner: ManagerId) -> Self {
        Self {
            owner,
            targets: Mutex::new(Vec::new()),
        }
    }

    /// Adds a target owned by this list's manager.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OwnershipMismatch`] if the target belongs to
    /// another manager. The list is left unchanged.
    pub fn add(&self, target: Arc<RenderTarget>) -> CoreResult<()> {
        if target.owner != self.owner {
            return Err(CoreError::OwnershipMismatch(format!(
                "target '{}' belongs to {}, not {}",
                target.label, target.owner, self.owner
            )));
        }
        self.targets.lock().push(target);
        Ok(())
    }

    /// Removes a target. Returns false if it was not in the list.
    pub fn remove(&self, id: TargetId) -> bool {
        let mut targets = self.targets.lock();
        let before = targets.len();
        targets.retain(|t| t.id != id);
        targets.len() != before
    }

    /// Ids of all targets, in insertion order.
    pub fn ids(&self) -> Vec<TargetId> {
        self.targets.lock().iter().map(|t| t.id).collect()
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    /// Returns true if there are no targets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_target_rejected_without_mutation() {
        let mine = ManagerId::next();
        let theirs = ManagerId::next();
        let list = RenderTargetList::new(mine);

        list.add(RenderTarget::new(mine, "main", (800, 600))).unwrap();
        let result = list.add(RenderTarget::new(theirs, "other", (640, 480)));

        assert!(matches!(result, Err(CoreError::OwnershipMismatch(_))));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_by_id() {
        let owner = ManagerId::next();
        let list = RenderTargetList::new(owner);
        let target = RenderTarget::new(owner, "main", (1, 1));
        list.add(Arc::clone(&target)).unwrap();

        assert_eq!(list.ids(), vec![target.id()]);
        assert!(list.remove(target.id()));
        assert!(!list.remove(target.id()));
        assert!(list.is_empty());
    }
}
