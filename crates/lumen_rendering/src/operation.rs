//! # Draw Operations
//!
//! A draw operation is a registered unit of work that issues draw calls on
//! the render thread.
//!
//! ```text
//! Unregistered ─register─▶ Registering ─▶ Registered ⇄ Drawing
//!                                              │
//!                                           dispose
//!                                              ▼
//!                                          Disposing ─▶ Disposed
//! ```
//!
//! Drawing and disposal both run under the owning manager's coordination
//! lock, so a disposal from another thread waits for an in-flight draw to
//! return. A disposal requested from inside the draw itself completes when
//! the draw returns.
//!
//! [`DrawHandle`] disposes its operation when dropped.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytemuck::Pod;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use lumen_core::{CoreError, CoreResult};

use crate::device::{BufferHandle, CommandList, Device, DrawCommand};
use crate::error::RenderResult;
use crate::manager::{ManagerHandle, ManagerShared};
use crate::resource::SharedDrawResource;
use crate::scene::Node;
use crate::surface::ManagerId;

slotmap::new_key_type! {
    /// Key of an operation in its manager's registry.
    pub struct OperationKey;
}

/// Lifecycle state of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, not yet registered.
    Unregistered,
    /// Registration hooks are running.
    Registering,
    /// In a manager's registry and drawable.
    Registered,
    /// A draw call is in progress.
    Drawing,
    /// Release hooks are running.
    Disposing,
    /// Released. Terminal.
    Disposed,
}

/// Passed to the registration hooks.
#[derive(Debug)]
pub struct RegistrationContext<'a> {
    /// The manager the operation is joining.
    pub manager: ManagerId,
    /// The node that owns the operation.
    pub owner: &'a Arc<Node>,
}

/// The behavior of a draw operation.
pub trait DrawOperation: Send + 'static {
    /// Runs before the operation is bound to its owner and manager.
    fn on_registering(&mut self, _cx: &RegistrationContext<'_>) {}

    /// Runs after binding, before the operation enters the registry.
    fn on_registered(&mut self, _cx: &RegistrationContext<'_>) {}

    /// When `Some`, the manager queues this operation at that priority every
    /// frame. Operations returning `None` are queued by drawables.
    fn priority(&self) -> Option<i32> {
        None
    }

    /// Issues this operation's draw calls.
    ///
    /// `delta` is the time since this operation's previous draw, zero on the
    /// first.
    ///
    /// # Errors
    ///
    /// Errors propagate out of the frame and stop the render thread.
    fn draw(&mut self, cx: &mut DrawContext<'_>, delta: Duration) -> RenderResult<()>;

    /// Hands buffers owned by the operation back for destruction.
    fn release(&mut self, _cx: &mut ReleaseContext) {}
}

/// Render-thread state available to [`DrawOperation::draw`].
pub struct DrawContext<'a> {
    device: &'a mut dyn Device,
    commands: &'a mut CommandList,
    manager: ManagerId,
    frame: u64,
    uploads: u32,
}

impl<'a> DrawContext<'a> {
    /// Creates a context writing into `commands`.
    pub fn new(
        device: &'a mut dyn Device,
        commands: &'a mut CommandList,
        manager: ManagerId,
        frame: u64,
    ) -> Self {
        Self {
            device,
            commands,
            manager,
            frame,
            uploads: 0,
        }
    }

    /// The frame being drawn.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The manager running the frame.
    pub fn manager(&self) -> ManagerId {
        self.manager
    }

    /// Direct device access.
    pub fn device(&mut self) -> &mut dyn Device {
        &mut *self.device
    }

    /// Brings a shared resource's buffer up to date and returns it.
    ///
    /// # Errors
    ///
    /// Returns the device error if the buffer cannot be created or written.
    pub fn bind<T: Pod + PartialEq>(
        &mut self,
        resource: &SharedDrawResource<T>,
    ) -> RenderResult<BufferHandle> {
        let (handle, uploaded) = resource.bind(&mut *self.device)?;
        if uploaded {
            self.uploads += 1;
        }
        Ok(handle)
    }

    /// Appends a command to the frame's list.
    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    /// Appends a draw call.
    pub fn draw(
        &mut self,
        label: impl Into<String>,
        bindings: Vec<BufferHandle>,
        vertex_count: u32,
        instance_count: u32,
    ) {
        self.push(DrawCommand::Draw {
            label: label.into(),
            bindings,
            vertex_count,
            instance_count,
        });
    }

    /// Uploads performed through [`bind`](Self::bind) so far.
    pub fn uploads(&self) -> u32 {
        self.uploads
    }
}

/// Collects buffers to destroy on the render thread.
#[derive(Debug, Default)]
pub struct ReleaseContext {
    buffers: Vec<BufferHandle>,
}

impl ReleaseContext {
    /// Schedules `handle` for destruction.
    pub fn release_buffer(&mut self, handle: BufferHandle) {
        self.buffers.push(handle);
    }

    /// Detaches a shared resource's buffer and schedules it for destruction.
    pub fn release_resource<T: Pod + PartialEq>(&mut self, resource: &SharedDrawResource<T>) {
        if let Some(handle) = resource.release() {
            self.buffers.push(handle);
        }
    }

    /// Buffers collected so far.
    pub fn buffers(&self) -> &[BufferHandle] {
        &self.buffers
    }
}

struct OperationState {
    lifecycle: Lifecycle,
    body: Option<Box<dyn DrawOperation>>,
    owner: Weak<Node>,
    manager: Weak<ManagerShared>,
    key: Option<OperationKey>,
    last_draw: Option<Instant>,
    dispose_requested: bool,
}

impl OperationState {
    /// Runs the release hook and clears every reference. Caller holds the
    /// manager's coordination lock if there is one.
    fn retire(&mut self) -> (Option<OperationKey>, Vec<BufferHandle>) {
        self.lifecycle = Lifecycle::Disposing;
        let mut cx = ReleaseContext::default();
        if let Some(mut body) = self.body.take() {
            body.release(&mut cx);
        }
        self.owner = Weak::new();
        self.manager = Weak::new();
        self.lifecycle = Lifecycle::Disposed;
        (self.key.take(), cx.buffers)
    }
}

/// A draw operation and its lifecycle.
pub struct Operation {
    label: String,
    state: Mutex<OperationState>,
}

impl Operation {
    /// Creates an unregistered operation.
    pub fn new(label: impl Into<String>, body: impl DrawOperation) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            state: Mutex::new(OperationState {
                lifecycle: Lifecycle::Unregistered,
                body: Some(Box::new(body)),
                owner: Weak::new(),
                manager: Weak::new(),
                key: None,
                last_draw: None,
                dispose_requested: false,
            }),
        })
    }

    /// Name used in logs and draw commands.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    /// Returns true once disposed.
    pub fn is_disposed(&self) -> bool {
        self.lifecycle() == Lifecycle::Disposed
    }

    /// Key in the manager's registry while registered.
    pub fn key(&self) -> Option<OperationKey> {
        self.state.lock().key
    }

    /// The owning node while registered.
    pub fn owner(&self) -> Option<Arc<Node>> {
        self.state.lock().owner.upgrade()
    }

    /// Priority for automatic queueing. `None` while drawing or disposed.
    pub fn priority(&self) -> Option<i32> {
        let state = self.state.lock();
        match state.lifecycle {
            Lifecycle::Registered => state.body.as_ref().and_then(|body| body.priority()),
            _ => None,
        }
    }

    /// Registers the operation with `manager` on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Disposed`] if the operation was disposed and
    /// [`CoreError::InvalidState`] if it is already registered or the manager
    /// is gone.
    pub fn register(
        self: &Arc<Self>,
        owner: &Arc<Node>,
        manager: &ManagerHandle,
    ) -> CoreResult<OperationKey> {
        let shared = manager.upgrade()?;
        let _coordination = shared.coordination.lock();
        {
            let mut state = self.state.lock();
            match state.lifecycle {
                Lifecycle::Unregistered => {}
                Lifecycle::Disposing | Lifecycle::Disposed => {
                    return Err(CoreError::Disposed { what: "draw operation" });
                }
                _ => {
                    return Err(CoreError::invalid_state(format!(
                        "operation '{}' is already registered",
                        self.label
                    )));
                }
            }
            state.lifecycle = Lifecycle::Registering;
            let cx = RegistrationContext {
                manager: shared.id,
                owner,
            };
            if let Some(body) = state.body.as_mut() {
                body.on_registering(&cx);
            }
            state.owner = Arc::downgrade(owner);
            state.manager = Arc::downgrade(&shared);
            if let Some(body) = state.body.as_mut() {
                body.on_registered(&cx);
            }
        }

        let key = match shared.operations.add(Arc::clone(self)) {
            Ok(key) => key,
            Err(error) => {
                let mut state = self.state.lock();
                state.lifecycle = Lifecycle::Unregistered;
                state.owner = Weak::new();
                state.manager = Weak::new();
                return Err(error);
            }
        };
        let mut state = self.state.lock();
        state.key = Some(key);
        state.lifecycle = Lifecycle::Registered;
        debug!(operation = %self.label, manager = %shared.id, "operation registered");
        Ok(key)
    }

    /// Runs the draw hook.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Disposed`] after disposal,
    /// [`CoreError::InvalidState`] before registration and
    /// [`CoreError::OwnershipMismatch`] if `cx` belongs to another manager.
    /// Errors from the hook are passed through.
    pub fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let shared = {
            let state = self.state.lock();
            self.check_drawable(&state)?;
            state
                .manager
                .upgrade()
                .ok_or_else(|| {
                    CoreError::invalid_state(format!("manager of '{}' is gone", self.label))
                })?
        };
        if shared.id != cx.manager() {
            return Err(CoreError::OwnershipMismatch(format!(
                "operation '{}' belongs to {}, drawn by {}",
                self.label,
                shared.id,
                cx.manager()
            ))
            .into());
        }

        let _coordination = shared.coordination.lock();
        let (mut body, delta) = {
            let mut state = self.state.lock();
            self.check_drawable(&state)?;
            let Some(body) = state.body.take() else {
                return Err(CoreError::invalid_state(format!(
                    "operation '{}' is already drawing",
                    self.label
                ))
                .into());
            };
            state.lifecycle = Lifecycle::Drawing;
            let now = Instant::now();
            let delta = state.last_draw.map_or(Duration::ZERO, |last| now - last);
            state.last_draw = Some(now);
            (body, delta)
        };

        let result = body.draw(cx, delta);

        let retired = {
            let mut state = self.state.lock();
            state.body = Some(body);
            state.lifecycle = Lifecycle::Registered;
            state.dispose_requested.then(|| state.retire())
        };
        if let Some((key, buffers)) = retired {
            self.finish_dispose(&shared, key, buffers);
        }
        trace!(operation = %self.label, ?delta, "drawn");
        result
    }

    /// Releases the operation.
    ///
    /// Waits for an in-flight draw on another thread. Called from inside this
    /// operation's own draw, the release happens when the draw returns.
    /// Disposing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible; the result is kept for the registry removal.
    pub fn dispose(&self) -> CoreResult<()> {
        let shared = {
            let state = self.state.lock();
            if state.lifecycle == Lifecycle::Disposed {
                return Ok(());
            }
            state.manager.upgrade()
        };
        let _coordination = shared.as_ref().map(|shared| shared.coordination.lock());

        let (key, buffers) = {
            let mut state = self.state.lock();
            match state.lifecycle {
                Lifecycle::Disposed | Lifecycle::Disposing => return Ok(()),
                Lifecycle::Drawing => {
                    state.dispose_requested = true;
                    trace!(operation = %self.label, "dispose deferred until draw returns");
                    return Ok(());
                }
                _ => state.retire(),
            }
        };
        match shared.as_deref() {
            Some(shared) => self.finish_dispose(shared, key, buffers),
            None if !buffers.is_empty() => {
                warn!(
                    operation = %self.label,
                    count = buffers.len(),
                    "manager gone, buffers not released"
                );
            }
            None => {}
        }
        Ok(())
    }

    /// Checks that the operation may be queued on `manager`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Disposed`] after disposal,
    /// [`CoreError::InvalidState`] before registration and
    /// [`CoreError::OwnershipMismatch`] if it is registered with another
    /// manager.
    pub fn check_queueable(&self, manager: ManagerId) -> CoreResult<()> {
        let state = self.state.lock();
        match state.lifecycle {
            Lifecycle::Registered | Lifecycle::Drawing => {}
            Lifecycle::Disposing | Lifecycle::Disposed => {
                return Err(CoreError::Disposed { what: "draw operation" });
            }
            Lifecycle::Unregistered | Lifecycle::Registering => {
                return Err(CoreError::invalid_state(format!(
                    "operation '{}' is not registered",
                    self.label
                )));
            }
        }
        match state.manager.upgrade().map(|shared| shared.id) {
            Some(owner) if owner == manager => Ok(()),
            Some(owner) => Err(CoreError::OwnershipMismatch(format!(
                "operation '{}' belongs to {owner}, queued on {manager}",
                self.label
            ))),
            None => Err(CoreError::invalid_state(format!(
                "manager of '{}' is gone",
                self.label
            ))),
        }
    }

    fn check_drawable(&self, state: &OperationState) -> CoreResult<()> {
        match state.lifecycle {
            Lifecycle::Registered => Ok(()),
            Lifecycle::Disposing | Lifecycle::Disposed => {
                Err(CoreError::Disposed { what: "draw operation" })
            }
            Lifecycle::Drawing => Err(CoreError::invalid_state(format!(
                "operation '{}' is already drawing",
                self.label
            ))),
            Lifecycle::Unregistered | Lifecycle::Registering => Err(CoreError::invalid_state(
                format!("operation '{}' is not registered", self.label),
            )),
        }
    }

    fn finish_dispose(
        &self,
        shared: &ManagerShared,
        key: Option<OperationKey>,
        buffers: Vec<BufferHandle>,
    ) {
        if let Some(key) = key {
            if let Err(error) = shared.operations.remove(key) {
                warn!(operation = %self.label, %error, "registry removal failed");
            }
        }
        let released = buffers.len();
        shared.release_buffers(buffers);
        debug!(operation = %self.label, released, "operation disposed");
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Operation")
            .field("label", &self.label)
            .field("lifecycle", &state.lifecycle)
            .field("key", &state.key)
            .finish_non_exhaustive()
    }
}

/// Owns an operation and disposes it when dropped.
///
/// The registry keeps operations alive, so an operation nobody disposes would
/// otherwise live as long as its manager.
#[must_use = "dropping the handle disposes the operation"]
pub struct DrawHandle {
    operation: Arc<Operation>,
}

impl DrawHandle {
    /// Wraps an existing operation.
    pub fn new(operation: Arc<Operation>) -> Self {
        Self { operation }
    }

    /// Creates and registers an operation.
    ///
    /// # Errors
    ///
    /// See [`Operation::register`].
    pub fn register(
        label: impl Into<String>,
        body: impl DrawOperation,
        owner: &Arc<Node>,
        manager: &ManagerHandle,
    ) -> CoreResult<Self> {
        let handle = Self::new(Operation::new(label, body));
        handle.operation.register(owner, manager)?;
        Ok(handle)
    }

    /// The shared operation, e.g. for queueing.
    pub fn operation(&self) -> &Arc<Operation> {
        &self.operation
    }

    /// Disposes now and reports the outcome.
    ///
    /// # Errors
    ///
    /// See [`Operation::dispose`].
    pub fn dispose(self) -> CoreResult<()> {
        self.operation.dispose()
    }
}

impl Deref for DrawHandle {
    type Target = Operation;

    fn deref(&self) -> &Operation {
        &self.operation
    }
}

impl Drop for DrawHandle {
    fn drop(&mut self) {
        if let Err(error) = self.operation.dispose() {
            warn!(operation = %self.operation.label, %error, "dispose on drop failed");
        }
    }
}

impl fmt::Debug for DrawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DrawHandle").field(&self.operation).finish()
    }
}
