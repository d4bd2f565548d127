//! # Nodes
//!
//! ## Attachment
//!
//! ```text
//! detached ──insert_child/add──▶ attached ──detach──▶ detached
//!  parent: none                   parent: Some(p)      parent: none
//!  scene:  none                   scene:  Some(s)      scene:  none
//!  index:  None                   index:  Some(i)      index:  None
//! ```
//!
//! Attach binds parent, scene, index and a fresh service scope, attaches the
//! installed components, runs the behavior's `on_attached` hook and then
//! emits [`NodeEvent::Attached`].
//!
//! Detach first detaches the children, last index first. It then runs
//! `on_detached`, emits [`NodeEvent::Detached`], detaches the components and
//! finally clears parent, scene, index and scope.
//!
//! ## Locking
//!
//! Each node has a `children` lock and a `links` lock. A `children` lock may
//! be held while taking a child's `links` lock, never the other way round.
//! Hooks and events always run with no lock held.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tracing::debug;

use lumen_core::{CoreError, CoreResult, KeyedRegistry, Observers};

use super::capability::Behavior;
use super::component::{ComponentKey, FunctionalComponent};
use super::scene::Scene;
use super::services::{ServiceProvider, ServiceScope};

/// Registry of the components installed on a node.
pub type ComponentRegistry = KeyedRegistry<ComponentKey, Arc<FunctionalComponent>>;

/// The sealed registry shared by every node without components.
fn empty_components() -> Arc<ComponentRegistry> {
    static EMPTY: OnceLock<Arc<ComponentRegistry>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(ComponentRegistry::sealed())))
}

/// Lifecycle notification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// The node was attached at `index`.
    Attached {
        /// Position in the parent.
        index: usize,
    },
    /// The node is detaching from `index`.
    Detached {
        /// Former position in the parent.
        index: usize,
    },
    /// A sibling was inserted or removed and the node moved.
    IndexChanged {
        /// Previous position.
        old: usize,
        /// New position.
        new: usize,
    },
    /// A component was installed.
    ComponentInstalled(ComponentKey),
    /// A component was uninstalled.
    ComponentUninstalled(ComponentKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Detached,
    Attached,
    Detaching,
}

struct Links {
    state: LinkState,
    parent: Weak<Node>,
    scene: Weak<Scene>,
    index: Option<usize>,
    provider: Option<Arc<dyn ServiceProvider>>,
    scope: Option<Arc<dyn ServiceScope>>,
}

impl Links {
    fn detached() -> Self {
        Self {
            state: LinkState::Detached,
            parent: Weak::new(),
            scene: Weak::new(),
            index: None,
            provider: None,
            scope: None,
        }
    }
}

/// A node of the scene graph.
pub struct Node {
    name: String,
    this: Weak<Node>,
    behavior: Option<Arc<dyn Behavior>>,
    propagate: bool,
    links: RwLock<Links>,
    children: RwLock<Vec<Arc<Node>>>,
    components: RwLock<Arc<ComponentRegistry>>,
    events: Observers<NodeEvent>,
}

/// Builder for [`Node`].
#[must_use]
pub struct NodeBuilder {
    name: String,
    behavior: Option<Arc<dyn Behavior>>,
    propagate: bool,
}

impl NodeBuilder {
    /// Attaches a behavior to the node.
    pub fn behavior(self, behavior: impl Behavior) -> Self {
        self.behavior_arc(Arc::new(behavior))
    }

    /// Attaches a shared behavior to the node.
    pub fn behavior_arc(mut self, behavior: Arc<dyn Behavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Whether update and draw walks descend into the children.
    ///
    /// Nodes that register their children's work themselves turn this off.
    pub fn propagate(mut self, propagate: bool) -> Self {
        self.propagate = propagate;
        self
    }

    /// Creates the detached node.
    pub fn build(self) -> Arc<Node> {
        Arc::new_cyclic(|this| Node {
            name: self.name,
            this: this.clone(),
            behavior: self.behavior,
            propagate: self.propagate,
            links: RwLock::new(Links::detached()),
            children: RwLock::new(Vec::new()),
            components: RwLock::new(empty_components()),
            events: Observers::new(),
        })
    }
}

impl Node {
    /// Creates a detached node without behavior.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::builder(name).build()
    }

    /// Starts building a node.
    pub fn builder(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder {
            name: name.into(),
            behavior: None,
            propagate: true,
        }
    }

    fn arc(&self) -> CoreResult<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or_else(|| {
                CoreError::invalid_state(format!("node '{}' is being dropped", self.name))
            })
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's own behavior.
    pub fn behavior(&self) -> Option<&Arc<dyn Behavior>> {
        self.behavior.as_ref()
    }

    /// Whether walks descend into the children.
    pub fn propagates(&self) -> bool {
        self.propagate
    }

    /// Returns true while the node is attached.
    pub fn is_attached(&self) -> bool {
        self.links.read().state == LinkState::Attached
    }

    /// The parent node. `None` when detached and for a scene's root.
    pub fn parent(&self) -> Option<Arc<Node>> {
        self.links.read().parent.upgrade()
    }

    /// The scene this node is attached to.
    pub fn scene(&self) -> Option<Arc<Scene>> {
        self.links.read().scene.upgrade()
    }

    /// Position within the parent. `None` when detached.
    pub fn index(&self) -> Option<usize> {
        self.links.read().index
    }

    /// Snapshot of the children in index order.
    pub fn children(&self) -> Vec<Arc<Node>> {
        self.children.read().clone()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    /// The installed components.
    ///
    /// Nodes that never had a component share one sealed, empty registry.
    pub fn components(&self) -> Arc<ComponentRegistry> {
        Arc::clone(&self.components.read())
    }

    /// Subscribes to this node's lifecycle events.
    pub fn subscribe(&self) -> Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// The node's service scope.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the node is detached.
    pub fn services(&self) -> CoreResult<Arc<dyn ServiceScope>> {
        self.links
            .read()
            .scope
            .clone()
            .ok_or_else(|| CoreError::invalid_state(format!("node '{}' is detached", self.name)))
    }

    /// Resolves a service through the node's scope.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the node is detached and
    /// [`CoreError::ServiceNotFound`] if no such service is registered.
    pub fn resolve<T: std::any::Any + Send + Sync>(&self) -> CoreResult<Arc<T>> {
        self.services()?.resolve::<T>()
    }

    /// Appends a child. Returns its index.
    ///
    /// # Errors
    ///
    /// See [`insert_child`](Self::insert_child).
    pub fn add_child(&self, child: Arc<Node>) -> CoreResult<usize> {
        self.insert_child(usize::MAX, child)
    }

    /// Inserts a child at `index`, clamped to the child count. Returns the
    /// index it landed at. Later siblings move up and get
    /// [`NodeEvent::IndexChanged`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if this node is not attached or the
    /// child is already attached.
    pub fn insert_child(&self, index: usize, child: Arc<Node>) -> CoreResult<usize> {
        let me = self.arc()?;
        if Arc::ptr_eq(&me, &child) {
            return Err(CoreError::invalid_state(format!(
                "node '{}' cannot be its own child",
                self.name
            )));
        }

        let (index, moved) = {
            let mut children = self.children.write();
            let (scene, provider) = {
                let links = self.links.read();
                match (links.state, &links.provider) {
                    (LinkState::Attached, Some(provider)) => {
                        (links.scene.clone(), Arc::clone(provider))
                    }
                    _ => {
                        return Err(CoreError::invalid_state(format!(
                            "node '{}' is not attached",
                            self.name
                        )))
                    }
                }
            };
            let index = index.min(children.len());
            child.bind(Arc::downgrade(&me), scene, index, provider)?;
            children.insert(index, Arc::clone(&child));
            (index, Self::reindex_from(&children, index + 1))
        };

        for (sibling, old, new) in moved {
            sibling.events.emit(&NodeEvent::IndexChanged { old, new });
        }
        child.announce_attached(&child);
        debug!(parent = %self.name, child = %child.name, index, "node attached");
        Ok(index)
    }

    /// Detaches `child` from this node.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if `child` is not a child of this
    /// node.
    pub fn remove_child(&self, child: &Arc<Node>) -> CoreResult<()> {
        let is_mine = child
            .parent()
            .is_some_and(|parent| std::ptr::eq(Arc::as_ptr(&parent), self));
        if !is_mine {
            return Err(CoreError::invalid_state(format!(
                "node '{}' is not a child of '{}'",
                child.name, self.name
            )));
        }
        child.detach()
    }

    /// Detaches this node and its whole subtree.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the node is not attached.
    pub fn detach(&self) -> CoreResult<()> {
        let me = self.arc()?;
        let index = {
            let mut links = self.links.write();
            if links.state != LinkState::Attached {
                return Err(CoreError::invalid_state(format!(
                    "node '{}' is not attached",
                    self.name
                )));
            }
            links.state = LinkState::Detaching;
            links.index
        };

        let children = self.children();
        for child in children.iter().rev() {
            if let Err(error) = child.detach() {
                debug!(node = %child.name, %error, "child already detached");
            }
        }

        if let Some(behavior) = &self.behavior {
            behavior.on_detached(&me);
        }
        if let Some(index) = index {
            self.events.emit(&NodeEvent::Detached { index });
        }
        for component in self.components().values() {
            component.detach();
        }

        let parent = {
            let mut links = self.links.write();
            let parent = std::mem::take(&mut links.parent);
            *links = Links::detached();
            parent
        };
        if let Some(parent) = parent.upgrade() {
            parent.forget_child(&me);
        }
        debug!(node = %self.name, "node detached");
        Ok(())
    }

    /// Installs a component and returns its key.
    ///
    /// If this node is attached the component is attached right away;
    /// otherwise it is attached when the node is.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Disposed`] for a disposed component and
    /// [`CoreError::InvalidState`] if it is installed on another node.
    pub fn install_component(
        &self,
        component: Arc<FunctionalComponent>,
    ) -> CoreResult<ComponentKey> {
        let me = self.arc()?;
        component.claim(&me)?;

        let registry = {
            let mut registry = self.components.write();
            if registry.is_sealed() {
                *registry = Arc::new(ComponentRegistry::new());
            }
            Arc::clone(&registry)
        };
        let key = match registry.add(Arc::clone(&component)) {
            Ok(key) => key,
            Err(error) => {
                component.release_claim();
                return Err(error);
            }
        };
        component.set_key(key);
        self.events.emit(&NodeEvent::ComponentInstalled(key));

        let provider = {
            let links = self.links.read();
            if links.state == LinkState::Attached {
                links.provider.clone()
            } else {
                None
            }
        };
        if let Some(provider) = provider {
            component.attach(&me, provider.as_ref())?;
        }
        Ok(key)
    }

    /// Uninstalls a component, detaching it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no component has `key`, and
    /// [`CoreError::InvalidState`] if the node never had components.
    pub fn uninstall_component(&self, key: ComponentKey) -> CoreResult<Arc<FunctionalComponent>> {
        let registry = self.components();
        let component = registry.remove(key)?.ok_or_else(|| {
            CoreError::NotFound(format!("component {key:?} on node '{}'", self.name))
        })?;
        component.detach();
        component.release_claim();
        self.events.emit(&NodeEvent::ComponentUninstalled(key));
        Ok(component)
    }

    pub(crate) fn bind_root(&self, scene: Weak<Scene>, provider: Arc<dyn ServiceProvider>) {
        let mut links = self.links.write();
        links.state = LinkState::Attached;
        links.scene = scene;
        links.index = Some(0);
        links.scope = Some(provider.create_scope());
        links.provider = Some(provider);
    }

    fn bind(
        &self,
        parent: Weak<Node>,
        scene: Weak<Scene>,
        index: usize,
        provider: Arc<dyn ServiceProvider>,
    ) -> CoreResult<()> {
        let mut links = self.links.write();
        if links.state != LinkState::Detached {
            return Err(CoreError::invalid_state(format!(
                "node '{}' is already attached",
                self.name
            )));
        }
        links.state = LinkState::Attached;
        links.parent = parent;
        links.scene = scene;
        links.index = Some(index);
        links.scope = Some(provider.create_scope());
        links.provider = Some(provider);
        Ok(())
    }

    fn announce_attached(&self, me: &Arc<Node>) {
        let (index, provider, scope) = {
            let links = self.links.read();
            (links.index, links.provider.clone(), links.scope.clone())
        };
        let (Some(index), Some(provider), Some(scope)) = (index, provider, scope) else {
            return;
        };

        for component in self.components().values() {
            if let Err(error) = component.attach(me, provider.as_ref()) {
                debug!(node = %self.name, %error, "component not attached");
            }
        }
        if let Some(behavior) = &self.behavior {
            behavior.on_attached(me, scope.as_ref());
        }
        self.events.emit(&NodeEvent::Attached { index });
    }

    fn set_index(&self, index: usize) -> usize {
        let mut links = self.links.write();
        let old = links.index.unwrap_or(index);
        links.index = Some(index);
        old
    }

    /// Renumbers `children[from..]`. Called with the children lock held.
    fn reindex_from(children: &[Arc<Node>], from: usize) -> Vec<(Arc<Node>, usize, usize)> {
        children
            .iter()
            .enumerate()
            .skip(from)
            .filter_map(|(new, sibling)| {
                let old = sibling.set_index(new);
                (old != new).then(|| (Arc::clone(sibling), old, new))
            })
            .collect()
    }

    fn forget_child(&self, child: &Arc<Node>) {
        let moved = {
            let mut children = self.children.write();
            let Some(position) = children.iter().position(|c| Arc::ptr_eq(c, child)) else {
                return;
            };
            children.remove(position);
            Self::reindex_from(&children, position)
        };
        for (sibling, old, new) in moved {
            sibling.events.emit(&NodeEvent::IndexChanged { old, new });
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children = self.child_count();
        let links = self.links.read();
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("state", &links.state)
            .field("index", &links.index)
            .field("children", &children)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn live_scene() -> Arc<Scene> {
        Scene::new("test")
    }

    #[test]
    fn test_attach_detach_symmetry() {
        let scene = live_scene();
        let node = Node::new("player");

        scene.add(Arc::clone(&node)).unwrap();
        assert!(node.is_attached());
        assert!(node.parent().is_some());
        assert!(node.scene().is_some());
        assert_eq!(node.index(), Some(0));

        node.detach().unwrap();
        assert!(node.parent().is_none());
        assert!(node.scene().is_none());
        assert_eq!(node.index(), None);
        assert_eq!(scene.root().child_count(), 0);
    }

    #[test]
    fn test_double_attach_fails() {
        let scene = live_scene();
        let node = Node::new("once");
        scene.add(Arc::clone(&node)).unwrap();

        assert!(matches!(scene.add(Arc::clone(&node)), Err(CoreError::InvalidState(_))));
        assert_eq!(scene.root().child_count(), 1);
    }

    #[test]
    fn test_detach_unattached_fails() {
        let node = Node::new("loose");
        assert!(matches!(node.detach(), Err(CoreError::InvalidState(_))));
    }

    #[test]
    fn test_detached_parent_rejects_children() {
        let parent = Node::new("parent");
        let child = Node::new("child");

        assert!(matches!(parent.add_child(Arc::clone(&child)), Err(CoreError::InvalidState(_))));
        assert!(!child.is_attached());
    }

    #[test]
    fn test_event_order_and_payloads() {
        let scene = live_scene();
        let node = Node::new("watched");
        let events = node.subscribe();

        scene.add(Arc::clone(&node)).unwrap();
        node.detach().unwrap();

        let seen: Vec<NodeEvent> = events.try_iter().collect();
        assert_eq!(
            seen,
            vec![NodeEvent::Attached { index: 0 }, NodeEvent::Detached { index: 0 }]
        );
    }

    #[test]
    fn test_sibling_indices_follow_insert_and_remove() {
        let scene = live_scene();
        let a = Node::new("a");
        let b = Node::new("b");
        let c = Node::new("c");
        scene.add(Arc::clone(&a)).unwrap();
        scene.add(Arc::clone(&c)).unwrap();
        let c_events = c.subscribe();

        assert_eq!(scene.root().insert_child(1, Arc::clone(&b)).unwrap(), 1);
        assert_eq!((a.index(), b.index(), c.index()), (Some(0), Some(1), Some(2)));

        scene.root().remove_child(&a).unwrap();
        assert_eq!((b.index(), c.index()), (Some(0), Some(1)));

        let seen: Vec<NodeEvent> = c_events.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                NodeEvent::IndexChanged { old: 1, new: 2 },
                NodeEvent::IndexChanged { old: 2, new: 1 },
            ]
        );
    }

    #[test]
    fn test_detach_tears_down_subtree_bottom_up() {
        let scene = live_scene();
        let parent = Node::new("parent");
        scene.add(Arc::clone(&parent)).unwrap();
        let first = Node::new("first");
        let second = Node::new("second");
        let grandchild = Node::new("grandchild");
        parent.add_child(Arc::clone(&first)).unwrap();
        parent.add_child(Arc::clone(&second)).unwrap();
        first.add_child(Arc::clone(&grandchild)).unwrap();

        parent.detach().unwrap();

        for node in [&parent, &first, &second, &grandchild] {
            assert!(!node.is_attached(), "{} still attached", node.name());
        }
        assert_eq!(parent.child_count(), 0);
        assert_eq!(first.child_count(), 0);
    }

    #[test]
    fn test_remove_foreign_child_fails() {
        let scene = live_scene();
        let a = Node::new("a");
        let b = Node::new("b");
        scene.add(Arc::clone(&a)).unwrap();
        scene.add(Arc::clone(&b)).unwrap();

        assert!(matches!(a.remove_child(&b), Err(CoreError::InvalidState(_))));
        assert!(b.is_attached());
    }

    #[derive(Default)]
    struct Hooks {
        attached: AtomicUsize,
        detached: AtomicUsize,
    }

    impl Behavior for Arc<Hooks> {
        fn on_attached(&self, _node: &Arc<Node>, _services: &dyn ServiceScope) {
            self.attached.fetch_add(1, Ordering::SeqCst);
        }

        fn on_detached(&self, node: &Arc<Node>) {
            // Still attached while the hook runs.
            assert!(node.index().is_some());
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_hooks_run_once_per_transition() {
        let scene = live_scene();
        let hooks = Arc::new(Hooks::default());
        let node = Node::builder("hooked").behavior(Arc::clone(&hooks)).build();

        scene.add(Arc::clone(&node)).unwrap();
        node.detach().unwrap();
        scene.add(Arc::clone(&node)).unwrap();

        assert_eq!(hooks.attached.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nodes_without_components_share_sealed_registry() {
        let a = Node::new("a");
        let b = Node::new("b");

        assert!(a.components().is_sealed());
        assert!(Arc::ptr_eq(&a.components(), &b.components()));
        assert_eq!(a.components().len(), 0);
    }

    #[test]
    fn test_node_services_follow_attachment() {
        let scene = live_scene();
        scene.services().insert(42_u32);
        let node = Node::new("svc");

        assert!(matches!(node.resolve::<u32>(), Err(CoreError::InvalidState(_))));
        scene.add(Arc::clone(&node)).unwrap();
        assert_eq!(*node.resolve::<u32>().unwrap(), 42);
        let open = scene.services().live_scopes();

        node.detach().unwrap();
        assert_eq!(scene.services().live_scopes(), open - 1);
    }

    #[test]
    fn test_concurrent_attach_of_same_node_has_one_winner() {
        let scene = live_scene();
        let contested = Node::new("contested");
        let parents: Vec<Arc<Node>> = (0..4).map(|i| Node::new(format!("p{i}"))).collect();
        for parent in &parents {
            scene.add(Arc::clone(parent)).unwrap();
        }

        let handles: Vec<_> = parents
            .iter()
            .map(|parent| {
                let parent = Arc::clone(parent);
                let contested = Arc::clone(&contested);
                std::thread::spawn(move || parent.add_child(contested).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(parents.iter().map(|p| p.child_count()).sum::<usize>(), 1);
    }
}
