//! # Render Manager
//!
//! One manager owns one render thread. Everything the thread shares with the
//! rest of the process lives in [`ManagerShared`]; other threads reach it
//! through a [`ManagerHandle`], which the manager also registers as a service
//! of its scene so behaviors can resolve it when attached.
//!
//! ```text
//!  other threads                       render thread
//!  ─────────────                       ─────────────
//!  handle.send_input(ev) ──channel──▶  capture input
//!  handle.schedule(..)   ──list────▶   run due actions
//!  op.dispose()          ──channel──▶  destroy released buffers
//!      └─ coordination lock ◀────────▶ each draw call
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info};

use lumen_core::{
    CoordinationLock, CoreError, CoreResult, DeferredScheduler, KeyedRegistry, ManagerConfig,
    RawInputEvent, ScheduleKey, Trigger,
};

use crate::device::{BufferHandle, Device};
use crate::error::{RenderError, RenderResult};
use crate::frame::FrameLoop;
use crate::operation::{Operation, OperationKey};
use crate::overlay::{Overlay, UiContext};
use crate::queue::DrawQueue;
use crate::scene::Scene;
use crate::stats::FrameStats;
use crate::surface::{ManagerId, RenderTarget, RenderTargetList};

/// State shared between a manager's render thread and everyone else.
pub(crate) struct ManagerShared {
    pub(crate) id: ManagerId,
    pub(crate) config: ManagerConfig,
    pub(crate) coordination: CoordinationLock,
    pub(crate) operations: KeyedRegistry<OperationKey, Arc<Operation>>,
    pub(crate) queue: DrawQueue<Arc<Operation>>,
    pub(crate) scheduler: DeferredScheduler,
    pub(crate) targets: RenderTargetList,
    pub(crate) overlay: Arc<Overlay>,
    pub(crate) ui: Mutex<Option<Arc<Mutex<dyn UiContext>>>>,
    pub(crate) scene: Arc<Scene>,
    pub(crate) input_rx: Receiver<RawInputEvent>,
    pub(crate) release_rx: Receiver<BufferHandle>,
    input_tx: Sender<RawInputEvent>,
    release_tx: Sender<BufferHandle>,
    pub(crate) running: AtomicBool,
    pub(crate) frame: AtomicU64,
    pub(crate) last_stats: Mutex<Option<FrameStats>>,
}

impl ManagerShared {
    /// Hands buffers to the render thread for destruction.
    pub(crate) fn release_buffers(&self, buffers: Vec<BufferHandle>) {
        for buffer in buffers {
            // The receiver lives in `self`, so the send cannot fail.
            let _ = self.release_tx.send(buffer);
        }
    }
}

/// A cheap, cloneable reference to a manager usable from any thread.
///
/// Holds the manager weakly; every call on a dropped manager fails or
/// returns an empty result.
#[derive(Clone)]
pub struct ManagerHandle {
    id: ManagerId,
    shared: Weak<ManagerShared>,
}

impl ManagerHandle {
    pub(crate) fn upgrade(&self) -> CoreResult<Arc<ManagerShared>> {
        self.shared
            .upgrade()
            .ok_or_else(|| CoreError::invalid_state(format!("{} has been dropped", self.id)))
    }

    /// The manager's id.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Returns true while the manager exists.
    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Queues a raw input event for the next frame's snapshot.
    pub fn send_input(&self, event: RawInputEvent) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.input_tx.send(event).is_ok())
    }

    /// Runs `action` on the render thread once `trigger` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the manager is gone.
    pub fn schedule(
        &self,
        trigger: Trigger,
        action: impl FnOnce() + Send + 'static,
    ) -> CoreResult<ScheduleKey> {
        Ok(self.upgrade()?.scheduler.schedule(trigger, action))
    }

    /// Cancels a scheduled action that has not run yet.
    pub fn cancel(&self, key: ScheduleKey) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.scheduler.cancel(key))
    }

    /// Runs `f` holding the manager's coordination lock, so no draw of this
    /// manager runs concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the manager is gone.
    pub fn with_coordination<R>(&self, f: impl FnOnce() -> R) -> CoreResult<R> {
        let shared = self.upgrade()?;
        let _coordination = shared.coordination.lock();
        Ok(f())
    }

    /// Number of registered operations.
    pub fn operation_count(&self) -> usize {
        self.shared
            .upgrade()
            .map_or(0, |shared| shared.operations.len())
    }

    /// Snapshot of the registered operations.
    pub fn operations(&self) -> Vec<Arc<Operation>> {
        self.shared
            .upgrade()
            .map(|shared| shared.operations.values())
            .unwrap_or_default()
    }

    /// Looks up an operation.
    pub fn operation(&self, key: OperationKey) -> Option<Arc<Operation>> {
        self.shared.upgrade()?.operations.get(key)
    }

    /// Queues an operation for the next draw phase.
    ///
    /// Nothing is queued when the operation is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the manager is gone or the
    /// operation is not registered, [`CoreError::Disposed`] if it was
    /// disposed and [`CoreError::OwnershipMismatch`] if it is registered with
    /// another manager.
    pub fn enqueue(&self, operation: Arc<Operation>, priority: i32) -> CoreResult<()> {
        let shared = self.upgrade()?;
        operation.check_queueable(shared.id)?;
        shared.queue.enqueue(operation, priority);
        Ok(())
    }

    /// Adds a render target.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OwnershipMismatch`] if the target belongs to
    /// another manager.
    pub fn add_target(&self, target: Arc<RenderTarget>) -> CoreResult<()> {
        self.upgrade()?.targets.add(target)
    }

    /// The overlay drawn by the UI pass.
    pub fn overlay(&self) -> Option<Arc<Overlay>> {
        self.shared.upgrade().map(|shared| Arc::clone(&shared.overlay))
    }

    /// Statistics of the last completed frame.
    pub fn last_stats(&self) -> Option<FrameStats> {
        *self.shared.upgrade()?.last_stats.lock()
    }

    /// Frames completed so far.
    pub fn frame(&self) -> u64 {
        self.shared
            .upgrade()
            .map_or(0, |shared| shared.frame.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Owns a render thread and the state it draws from.
pub struct RenderManager {
    shared: Arc<ManagerShared>,
    thread: Option<JoinHandle<RenderResult<FrameStats>>>,
}

impl RenderManager {
    /// Creates a stopped manager drawing `scene`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the configuration has a zero
    /// parallelism, operation hint or queue capacity, and
    /// [`CoreError::InvalidState`] if another live manager already draws
    /// `scene`.
    pub fn new(config: ManagerConfig, scene: Arc<Scene>) -> CoreResult<Self> {
        config.validate()?;
        let id = ManagerId::next();
        let (input_tx, input_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let shared = Arc::new(ManagerShared {
            id,
            coordination: CoordinationLock::new(),
            operations: KeyedRegistry::with_capacity(config.expected_operations),
            queue: DrawQueue::with_capacity(config.queue_capacity),
            scheduler: DeferredScheduler::new(),
            targets: RenderTargetList::new(id),
            overlay: Arc::new(Overlay::new()),
            ui: Mutex::new(None),
            scene,
            input_rx,
            release_rx,
            input_tx,
            release_tx,
            running: AtomicBool::new(false),
            frame: AtomicU64::new(0),
            last_stats: Mutex::new(None),
            config,
        });
        let manager = Self { shared, thread: None };
        let services = manager.shared.scene.services();
        if let Err(current) = services.insert_unless(manager.handle(), ManagerHandle::is_alive) {
            return Err(CoreError::invalid_state(format!(
                "scene '{}' is already drawn by {}",
                manager.shared.scene.name(),
                current.id()
            )));
        }
        info!(manager = %id, name = %manager.shared.config.name, "manager created");
        Ok(manager)
    }

    /// The manager's id.
    pub fn id(&self) -> ManagerId {
        self.shared.id
    }

    /// The configuration the manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// The scene the manager draws.
    pub fn scene(&self) -> &Arc<Scene> {
        &self.shared.scene
    }

    /// A handle for other threads.
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            id: self.shared.id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Creates a render target owned by this manager and adds it.
    ///
    /// # Errors
    ///
    /// Never fails for a target created here; the result mirrors
    /// [`RenderTargetList::add`].
    pub fn create_target(
        &self,
        label: impl Into<String>,
        size: (u32, u32),
    ) -> CoreResult<Arc<RenderTarget>> {
        let target = RenderTarget::new(self.shared.id, label, size);
        self.shared.targets.add(Arc::clone(&target))?;
        Ok(target)
    }

    /// The overlay drawn by the UI pass.
    pub fn overlay(&self) -> &Arc<Overlay> {
        &self.shared.overlay
    }

    /// Installs the UI context used by the UI pass.
    pub fn set_ui(&self, ui: Arc<Mutex<dyn UiContext>>) {
        *self.shared.ui.lock() = Some(ui);
    }

    /// Returns true while the render thread is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Builds a frame loop driven by the caller instead of a render thread.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Runtime`] if the async runtime cannot be built.
    pub fn frame_loop<D: Device>(&self, device: D) -> RenderResult<FrameLoop<D>> {
        FrameLoop::new(Arc::clone(&self.shared), device)
    }

    /// Starts the render thread. The device is created on that thread by
    /// `factory` and never leaves it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the thread is already running
    /// and [`RenderError::ThreadSpawn`] if it cannot be spawned.
    pub fn start<D, F>(&mut self, factory: F) -> RenderResult<()>
    where
        D: Device + 'static,
        F: FnOnce() -> D + Send + 'static,
    {
        self.start_limited(factory, None)
    }

    /// Like [`start`](Self::start), but the thread stops by itself after
    /// `frames` frames when a limit is given.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub fn start_limited<D, F>(&mut self, factory: F, frames: Option<u64>) -> RenderResult<()>
    where
        D: Device + 'static,
        F: FnOnce() -> D + Send + 'static,
    {
        if self.thread.is_some() {
            return Err(
                CoreError::invalid_state(format!("{} is already started", self.shared.id)).into(),
            );
        }
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(format!("lumen-render-{}", self.shared.config.name))
            .spawn(move || {
                let result = FrameLoop::new(Arc::clone(&shared), factory())
                    .and_then(|mut frames_loop| frames_loop.run(frames));
                shared.running.store(false, Ordering::Release);
                if let Err(error) = &result {
                    error!(manager = %shared.id, %error, "render thread failed");
                }
                result
            });
        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                info!(manager = %self.shared.id, "render thread started");
                Ok(())
            }
            Err(error) => {
                self.shared.running.store(false, Ordering::Release);
                Err(RenderError::ThreadSpawn(error))
            }
        }
    }

    /// Signals the render thread to stop and waits for it.
    ///
    /// Returns the statistics of the last frame, or `None` if the thread was
    /// never started.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the render loop, or
    /// [`RenderError::RenderThreadPanicked`].
    pub fn stop(&mut self) -> RenderResult<Option<FrameStats>> {
        self.shared.running.store(false, Ordering::Release);
        self.join()
    }

    /// Waits for the render thread to end by itself.
    ///
    /// # Errors
    ///
    /// See [`stop`](Self::stop).
    pub fn join(&mut self) -> RenderResult<Option<FrameStats>> {
        let Some(thread) = self.thread.take() else {
            return Ok(None);
        };
        let stats = thread.join().map_err(|_| RenderError::RenderThreadPanicked)??;
        info!(manager = %self.shared.id, frame = stats.frame, "render thread stopped");
        Ok(Some(stats))
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(error) = self.stop() {
                error!(manager = %self.shared.id, %error, "render thread ended with an error");
            }
        }
    }
}

impl fmt::Debug for RenderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderManager")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("running", &self.is_running())
            .field("operations", &self.shared.operations.len())
            .finish()
    }
}
