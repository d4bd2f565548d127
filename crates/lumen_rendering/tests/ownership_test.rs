//! Integration test for queueing operations across managers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use lumen_core::{CoreError, ManagerConfig};
use lumen_rendering::scene::Drawable;
use lumen_rendering::{
    Behavior, DrawContext, DrawOperation, FrameContext, HeadlessDevice, Node, Operation,
    RenderManager, RenderResult, Scene,
};

/// Draws a labelled quad; only queued explicitly.
struct Labelled(&'static str);

impl DrawOperation for Labelled {
    fn draw(&mut self, cx: &mut DrawContext<'_>, _delta: Duration) -> RenderResult<()> {
        cx.draw(self.0, Vec::new(), 6, 1);
        Ok(())
    }
}

/// Pushes its operations straight onto the frame's queue.
struct Pusher {
    operations: Mutex<Vec<Arc<Operation>>>,
}

impl Drawable for Pusher {
    fn enqueue_draws(&self, _node: &Arc<Node>, cx: &FrameContext<'_>) -> RenderResult<()> {
        for operation in self.operations.lock().iter() {
            cx.queue.enqueue(Arc::clone(operation), 0);
        }
        Ok(())
    }
}

impl Behavior for Pusher {
    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }
}

fn manager(name: &str) -> (Arc<Scene>, RenderManager, Arc<Node>) {
    let scene = Scene::new(name);
    let config = ManagerConfig::new(name, 1, 16).unwrap().with_target_fps(0);
    let manager = RenderManager::new(config, Arc::clone(&scene)).unwrap();
    let host = Node::new("host");
    scene.add(Arc::clone(&host)).unwrap();
    (scene, manager, host)
}

#[test]
fn test_handle_enqueue_rejects_foreign_and_loose_operations() {
    let (_scene_a, a, host_a) = manager("a");
    let (_scene_b, b, _host_b) = manager("b");
    let foreign = Operation::new("foreign", Labelled("foreign"));
    foreign.register(&host_a, &a.handle()).unwrap();
    let loose = Operation::new("loose", Labelled("loose"));
    let retired = Operation::new("retired", Labelled("retired"));
    retired.register(&host_a, &a.handle()).unwrap();
    retired.dispose().unwrap();

    assert!(matches!(
        b.handle().enqueue(Arc::clone(&foreign), 0),
        Err(CoreError::OwnershipMismatch(_))
    ));
    assert!(matches!(
        b.handle().enqueue(Arc::clone(&loose), 0),
        Err(CoreError::InvalidState(_))
    ));
    assert!(matches!(
        a.handle().enqueue(Arc::clone(&retired), 0),
        Err(CoreError::Disposed { .. })
    ));
    assert!(a.handle().enqueue(Arc::clone(&foreign), 0).is_ok());

    // Nothing reached b's queue, so its frame is empty and still submitted.
    let (device, probe) = HeadlessDevice::probed();
    let mut frames_b = b.frame_loop(device).unwrap();
    let stats = frames_b.run_frame().unwrap();
    assert_eq!(stats.queued, 0);
    assert_eq!(probe.submissions(), 1);

    let mut frames_a = a.frame_loop(HeadlessDevice::default()).unwrap();
    let stats = frames_a.run_frame().unwrap();
    assert_eq!(stats.draws, 1);
    assert_eq!(frames_a.device().probe().last_submission().unwrap().draw_labels(), ["foreign"]);
}

#[test]
fn test_bad_queue_entries_are_dropped_without_failing_the_frame() {
    let (_scene_a, a, host_a) = manager("a");
    let (scene_b, b, host_b) = manager("b");
    let foreign = Operation::new("foreign", Labelled("foreign"));
    foreign.register(&host_a, &a.handle()).unwrap();
    let own = Operation::new("own", Labelled("own"));
    own.register(&host_b, &b.handle()).unwrap();
    let loose = Operation::new("loose", Labelled("loose"));

    let pusher = Node::builder("pusher")
        .behavior(Pusher {
            operations: Mutex::new(vec![foreign, Arc::clone(&own), loose]),
        })
        .build();
    scene_b.add(pusher).unwrap();

    let (device, probe) = HeadlessDevice::probed();
    let mut frames = b.frame_loop(device).unwrap();
    let stats = frames.run_frame().unwrap();

    assert_eq!(stats.queued, 3);
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.rejected_draws, 2);
    assert_eq!(probe.submissions(), 1);
    assert_eq!(probe.last_submission().unwrap().draw_labels(), ["own"]);
}
