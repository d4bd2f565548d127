//! The scene: a root node plus the services its nodes resolve.

use std::fmt;
use std::sync::Arc;

use lumen_core::CoreResult;

use super::capability::Behavior;
use super::node::Node;
use super::services::{ServiceMap, ServiceProvider};

/// One unit of per-frame work: a behavior and the node it runs for.
#[derive(Clone)]
pub struct Task {
    /// The owning node.
    pub node: Arc<Node>,
    /// The node's behavior or one of its components' behaviors.
    pub behavior: Arc<dyn Behavior>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("node", &self.node.name())
            .field("capabilities", &self.behavior.capabilities())
            .finish()
    }
}

/// A scene graph.
pub struct Scene {
    name: String,
    root: Arc<Node>,
    services: ServiceMap,
}

impl Scene {
    /// Creates a scene with an empty service map.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_services(name, ServiceMap::new())
    }

    /// Creates a scene whose nodes resolve from `services`.
    #[must_use]
    pub fn with_services(name: impl Into<String>, services: ServiceMap) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let root = Node::new("root");
            let provider: Arc<dyn ServiceProvider> = Arc::new(services.clone());
            root.bind_root(this.clone(), provider);
            Self {
                name: name.into(),
                root,
                services,
            }
        })
    }

    /// Scene name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The always-attached root.
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Services available to every node.
    pub fn services(&self) -> &ServiceMap {
        &self.services
    }

    /// Attaches `node` under the root.
    ///
    /// # Errors
    ///
    /// See [`Node::add_child`].
    pub fn add(&self, node: Arc<Node>) -> CoreResult<usize> {
        self.root.add_child(node)
    }

    /// All attached nodes, depth-first in index order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        let mut out = Vec::new();
        Self::walk(&self.root, &mut |node| out.push(Arc::clone(node)), false);
        out
    }

    /// Finds the first attached node named `name`.
    pub fn find(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes().into_iter().find(|node| node.name() == name)
    }

    /// Collects the behaviors to run this frame.
    ///
    /// Detached nodes are skipped. A node that does not propagate contributes
    /// its own work but none of its descendants'.
    pub fn collect_tasks(&self) -> Vec<Task> {
        let mut tasks = Vec::new();
        Self::walk(
            &self.root,
            &mut |node| {
                if let Some(behavior) = node.behavior() {
                    tasks.push(Task {
                        node: Arc::clone(node),
                        behavior: Arc::clone(behavior),
                    });
                }
                for component in node.components().values() {
                    if component.is_attached() {
                        tasks.push(Task {
                            node: Arc::clone(node),
                            behavior: Arc::clone(component.behavior()),
                        });
                    }
                }
            },
            true,
        );
        tasks
    }

    fn walk(node: &Arc<Node>, visit: &mut dyn FnMut(&Arc<Node>), honor_propagate: bool) {
        if !node.is_attached() {
            return;
        }
        visit(node);
        if honor_propagate && !node.propagates() {
            return;
        }
        for child in node.children() {
            Self::walk(&child, visit, honor_propagate);
        }
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("services", &self.services)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::FunctionalComponent;

    struct Marker;

    impl Behavior for Marker {}

    #[test]
    fn test_root_is_attached() {
        let scene = Scene::new("main");
        assert!(scene.root().is_attached());
        assert!(scene.root().parent().is_none());
        assert!(Arc::ptr_eq(&scene.root().scene().unwrap(), &scene));
    }

    #[test]
    fn test_nodes_are_depth_first() {
        let scene = Scene::new("main");
        let a = Node::new("a");
        let b = Node::new("b");
        scene.add(Arc::clone(&a)).unwrap();
        scene.add(Arc::clone(&b)).unwrap();
        a.add_child(Node::new("a0")).unwrap();

        let names: Vec<String> = scene.nodes().iter().map(|n| n.name().to_owned()).collect();
        assert_eq!(names, ["root", "a", "a0", "b"]);
        assert!(scene.find("a0").is_some());
        assert!(scene.find("missing").is_none());
    }

    #[test]
    fn test_collect_tasks_honors_propagation() {
        let scene = Scene::new("main");
        let gate = Node::builder("gate").behavior(Marker).propagate(false).build();
        scene.add(Arc::clone(&gate)).unwrap();
        gate.add_child(Node::builder("hidden").behavior(Marker).build())
            .unwrap();
        let open = Node::builder("open").behavior(Marker).build();
        scene.add(Arc::clone(&open)).unwrap();
        open.install_component(FunctionalComponent::new(Marker)).unwrap();

        let names: Vec<String> = scene
            .collect_tasks()
            .iter()
            .map(|t| t.node.name().to_owned())
            .collect();
        assert_eq!(names, ["gate", "open", "open"]);
    }
}
