//! Functional components: behavior installed on a node after construction.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use lumen_core::{CoreError, CoreResult};

use super::capability::Behavior;
use super::node::Node;
use super::services::{ServiceProvider, ServiceScope};

slotmap::new_key_type! {
    /// Key of a component within its node's registry.
    pub struct ComponentKey;
}

struct ComponentState {
    owner: Weak<Node>,
    key: Option<ComponentKey>,
    scope: Option<Arc<dyn ServiceScope>>,
    disposed: bool,
}

/// A behavior with its own attach lifecycle and service scope.
///
/// A component belongs to at most one node at a time. It is attached while
/// its node is attached and has a scope only while attached.
pub struct FunctionalComponent {
    behavior: Arc<dyn Behavior>,
    state: Mutex<ComponentState>,
}

impl FunctionalComponent {
    /// Wraps a behavior.
    #[must_use]
    pub fn new(behavior: impl Behavior) -> Arc<Self> {
        Self::from_arc(Arc::new(behavior))
    }

    /// Wraps a shared behavior.
    #[must_use]
    pub fn from_arc(behavior: Arc<dyn Behavior>) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            state: Mutex::new(ComponentState {
                owner: Weak::new(),
                key: None,
                scope: None,
                disposed: false,
            }),
        })
    }

    /// The wrapped behavior.
    pub fn behavior(&self) -> &Arc<dyn Behavior> {
        &self.behavior
    }

    /// The node this component is installed on.
    pub fn owner(&self) -> Option<Arc<Node>> {
        self.state.lock().owner.upgrade()
    }

    /// Key in the owner's registry.
    pub fn key(&self) -> Option<ComponentKey> {
        self.state.lock().key
    }

    /// Returns true while attached.
    pub fn is_attached(&self) -> bool {
        self.state.lock().scope.is_some()
    }

    /// Returns true once disposed.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// The component's own scope.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Disposed`] after disposal and
    /// [`CoreError::InvalidState`] while detached.
    pub fn services(&self) -> CoreResult<Arc<dyn ServiceScope>> {
        let state = self.state.lock();
        if state.disposed {
            return Err(CoreError::Disposed {
                what: "functional component",
            });
        }
        state
            .scope
            .clone()
            .ok_or_else(|| CoreError::invalid_state("functional component is not attached"))
    }

    /// Resolves a service through the component's scope.
    ///
    /// # Errors
    ///
    /// See [`services`](Self::services); also [`CoreError::ServiceNotFound`].
    pub fn resolve<T: Any + Send + Sync>(&self) -> CoreResult<Arc<T>> {
        self.services()?.resolve::<T>()
    }

    /// Detaches, uninstalls and marks the component disposed. Calling it again
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates failures from uninstalling.
    pub fn dispose(&self) -> CoreResult<()> {
        let (owner, key) = {
            let state = self.state.lock();
            if state.disposed {
                return Ok(());
            }
            (state.owner.upgrade(), state.key)
        };
        match (owner, key) {
            (Some(owner), Some(key)) => {
                owner.uninstall_component(key)?;
            }
            _ => {
                self.detach();
            }
        }

        let mut state = self.state.lock();
        state.disposed = true;
        state.scope = None;
        state.owner = Weak::new();
        state.key = None;
        debug!("functional component disposed");
        Ok(())
    }

    pub(crate) fn claim(&self, owner: &Arc<Node>) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(CoreError::Disposed {
                what: "functional component",
            });
        }
        if let Some(current) = state.owner.upgrade() {
            return Err(CoreError::invalid_state(format!(
                "component already installed on node '{}'",
                current.name()
            )));
        }
        state.owner = Arc::downgrade(owner);
        Ok(())
    }

    pub(crate) fn set_key(&self, key: ComponentKey) {
        self.state.lock().key = Some(key);
    }

    pub(crate) fn release_claim(&self) {
        let mut state = self.state.lock();
        state.owner = Weak::new();
        state.key = None;
    }

    pub(crate) fn attach(
        &self,
        node: &Arc<Node>,
        provider: &dyn ServiceProvider,
    ) -> CoreResult<()> {
        let scope = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(CoreError::Disposed {
                    what: "functional component",
                });
            }
            if state.scope.is_some() {
                return Err(CoreError::invalid_state("functional component is already attached"));
            }
            let scope = provider.create_scope();
            state.scope = Some(Arc::clone(&scope));
            scope
        };
        self.behavior.on_attached(node, scope.as_ref());
        trace!(node = %node.name(), "component attached");
        Ok(())
    }

    /// Releases the scope and runs the detached hook. Returns false, without
    /// running the hook, if the component was not attached; of two racing
    /// callers only one detaches.
    pub(crate) fn detach(&self) -> bool {
        let (scope, owner) = {
            let mut state = self.state.lock();
            let Some(scope) = state.scope.take() else {
                return false;
            };
            (scope, state.owner.upgrade())
        };
        if let Some(node) = &owner {
            self.behavior.on_detached(node);
        }
        drop(scope);
        trace!("component detached");
        true
    }
}

impl Drop for FunctionalComponent {
    fn drop(&mut self) {
        if self.state.get_mut().scope.take().is_some() {
            trace!("attached component dropped, scope released");
        }
    }
}

impl fmt::Debug for FunctionalComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FunctionalComponent")
            .field("key", &state.key)
            .field("attached", &state.scope.is_some())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NodeEvent, Scene};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        attached: AtomicUsize,
        detached: AtomicUsize,
    }

    impl Behavior for Arc<Counting> {
        fn on_attached(&self, _node: &Arc<Node>, _services: &dyn ServiceScope) {
            self.attached.fetch_add(1, Ordering::SeqCst);
        }

        fn on_detached(&self, _node: &Arc<Node>) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_install_on_attached_node_attaches() {
        let scene = Scene::new("components");
        let node = Node::new("host");
        scene.add(Arc::clone(&node)).unwrap();
        let counts = Arc::new(Counting::default());
        let component = FunctionalComponent::new(Arc::clone(&counts));

        let key = node.install_component(Arc::clone(&component)).unwrap();

        assert!(component.is_attached());
        assert_eq!(component.key(), Some(key));
        assert_eq!(counts.attached.load(Ordering::SeqCst), 1);
        assert!(!node.components().is_sealed());
    }

    #[test]
    fn test_install_on_detached_node_waits_for_attach() {
        let scene = Scene::new("components");
        let node = Node::new("host");
        let counts = Arc::new(Counting::default());
        let component = FunctionalComponent::new(Arc::clone(&counts));

        node.install_component(Arc::clone(&component)).unwrap();
        assert!(!component.is_attached());
        assert!(matches!(component.services(), Err(CoreError::InvalidState(_))));

        scene.add(Arc::clone(&node)).unwrap();
        assert!(component.is_attached());

        node.detach().unwrap();
        assert!(!component.is_attached());
        assert_eq!(counts.attached.load(Ordering::SeqCst), 1);
        assert_eq!(counts.detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_component_belongs_to_one_node() {
        let scene = Scene::new("components");
        let a = Node::new("a");
        let b = Node::new("b");
        scene.add(Arc::clone(&a)).unwrap();
        scene.add(Arc::clone(&b)).unwrap();
        let component = FunctionalComponent::new(Arc::new(Counting::default()));

        a.install_component(Arc::clone(&component)).unwrap();
        assert!(matches!(
            b.install_component(Arc::clone(&component)),
            Err(CoreError::InvalidState(_))
        ));
        assert_eq!(b.components().len(), 0);
    }

    #[test]
    fn test_uninstall_detaches_and_notifies() {
        let scene = Scene::new("components");
        let node = Node::new("host");
        scene.add(Arc::clone(&node)).unwrap();
        let counts = Arc::new(Counting::default());
        let component = FunctionalComponent::new(Arc::clone(&counts));
        let key = node.install_component(Arc::clone(&component)).unwrap();
        let events = node.subscribe();

        node.uninstall_component(key).unwrap();

        assert!(!component.is_attached());
        assert!(component.owner().is_none());
        assert_eq!(counts.detached.load(Ordering::SeqCst), 1);
        assert_eq!(events.try_recv().unwrap(), NodeEvent::ComponentUninstalled(key));
        assert!(matches!(node.uninstall_component(key), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_dispose_is_idempotent_and_final() {
        let scene = Scene::new("components");
        let node = Node::new("host");
        scene.add(Arc::clone(&node)).unwrap();
        let component = FunctionalComponent::new(Arc::new(Counting::default()));
        node.install_component(Arc::clone(&component)).unwrap();

        component.dispose().unwrap();
        component.dispose().unwrap();

        assert!(component.is_disposed());
        assert_eq!(node.components().len(), 0);
        assert!(matches!(component.services(), Err(CoreError::Disposed { .. })));
        assert!(matches!(
            node.install_component(component),
            Err(CoreError::Disposed { .. })
        ));
    }

    #[test]
    fn test_component_resolves_scene_services() {
        let scene = Scene::new("components");
        scene.services().insert(String::from("palette"));
        let node = Node::new("host");
        scene.add(Arc::clone(&node)).unwrap();
        let component = FunctionalComponent::new(Arc::new(Counting::default()));
        node.install_component(Arc::clone(&component)).unwrap();

        assert_eq!(component.resolve::<String>().unwrap().as_str(), "palette");
    }
}
