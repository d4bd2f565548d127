//! Integration test for components detached from two threads at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};

use lumen_rendering::scene::ServiceScope;
use lumen_rendering::{Behavior, FunctionalComponent, Node, Scene};

/// Counts hooks; the detached hook announces itself and then lingers.
struct Slow {
    attached: AtomicUsize,
    detached: AtomicUsize,
    entered: Sender<()>,
}

impl Behavior for Slow {
    fn on_attached(&self, _node: &Arc<Node>, _services: &dyn ServiceScope) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    fn on_detached(&self, _node: &Arc<Node>) {
        self.detached.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.try_send(());
        thread::sleep(Duration::from_millis(100));
    }
}

fn slow_component() -> (Arc<Slow>, Arc<FunctionalComponent>, crossbeam_channel::Receiver<()>) {
    let (entered, entered_rx) = bounded(4);
    let slow = Arc::new(Slow {
        attached: AtomicUsize::new(0),
        detached: AtomicUsize::new(0),
        entered,
    });
    let component = FunctionalComponent::from_arc(slow.clone());
    (slow, component, entered_rx)
}

#[test]
fn test_node_detach_racing_uninstall_detaches_once() {
    let scene = Scene::new("race");
    let node = Node::new("host");
    scene.add(Arc::clone(&node)).unwrap();
    let (slow, component, entered) = slow_component();
    let key = node.install_component(Arc::clone(&component)).unwrap();
    assert_eq!(slow.attached.load(Ordering::SeqCst), 1);

    let detacher = {
        let node = Arc::clone(&node);
        thread::spawn(move || node.detach())
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    let uninstalled = node.uninstall_component(key);

    assert!(detacher.join().unwrap().is_ok());
    assert!(uninstalled.is_ok());
    assert_eq!(slow.detached.load(Ordering::SeqCst), 1);
    assert!(!component.is_attached());
    assert!(!node.is_attached());
    assert!(node.detach().is_err());
}

#[test]
fn test_uninstall_racing_node_detach_detaches_once() {
    let scene = Scene::new("race");
    let node = Node::new("host");
    scene.add(Arc::clone(&node)).unwrap();
    let (slow, component, entered) = slow_component();
    let key = node.install_component(Arc::clone(&component)).unwrap();

    let uninstaller = {
        let node = Arc::clone(&node);
        thread::spawn(move || node.uninstall_component(key).map(|_| ()))
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    let detached = node.detach();

    assert!(uninstaller.join().unwrap().is_ok());
    assert!(detached.is_ok());
    assert_eq!(slow.detached.load(Ordering::SeqCst), 1);
    assert!(component.owner().is_none());
    assert!(!node.is_attached());
}
