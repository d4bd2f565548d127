//! # Capabilities
//!
//! Behavior is attached to nodes and functional components as a
//! [`Behavior`] trait object. What the frame loop does with it is decided by
//! the capabilities it exposes:
//!
//! | capability        | phase  | trait                 |
//! |-------------------|--------|-----------------------|
//! | updatable         | update | [`Updatable`]         |
//! | async updatable   | update | [`AsyncUpdatable`]    |
//! | drawable          | draw   | [`Drawable`]          |
//! | async drawable    | draw   | [`AsyncDrawable`]     |

use std::sync::Arc;

use bitflags::bitflags;

use lumen_core::{DeferredScheduler, FrameTime, InputSnapshot};

use super::node::Node;
use super::services::ServiceScope;
use crate::error::RenderResult;
use crate::operation::Operation;
use crate::queue::DrawQueue;
use crate::surface::ManagerId;

/// Boxed future returned by async capabilities.
pub use futures::future::BoxFuture;

bitflags! {
    /// The capability set of a behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Implements [`Updatable`].
        const UPDATE = 1 << 0;
        /// Implements [`AsyncUpdatable`].
        const UPDATE_ASYNC = 1 << 1;
        /// Implements [`Drawable`].
        const DRAW = 1 << 2;
        /// Implements [`AsyncDrawable`].
        const DRAW_ASYNC = 1 << 3;
    }
}

/// Ordered update phases. Every batch finishes before the next starts; inside
/// a batch no order is guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum UpdateBatch {
    /// Runs first.
    First,
    /// Runs after `First`.
    Early,
    /// The default batch.
    #[default]
    Default,
    /// Runs after `Default`.
    Late,
    /// Runs last.
    Last,
}

impl UpdateBatch {
    /// All batches in execution order.
    pub const ALL: [Self; 5] = [Self::First, Self::Early, Self::Default, Self::Late, Self::Last];
}

/// Per-frame state handed to capabilities.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// The frame's number and delta time.
    pub time: FrameTime,
    /// Input captured for this frame.
    pub input: &'a InputSnapshot,
    /// The manager's draw queue.
    pub queue: &'a DrawQueue<Arc<Operation>>,
    /// The manager's deferred scheduler.
    pub scheduler: &'a DeferredScheduler,
    /// The manager running the frame.
    pub manager: ManagerId,
}

/// Runs during the update phase.
pub trait Updatable: Send + Sync {
    /// The batch to run in.
    fn batch(&self) -> UpdateBatch {
        UpdateBatch::Default
    }

    /// Advances state by one frame.
    ///
    /// # Errors
    ///
    /// An error ends the frame and stops the render thread.
    fn update(&self, node: &Arc<Node>, cx: &FrameContext<'_>) -> RenderResult<()>;
}

/// Runs during the update phase and may await.
pub trait AsyncUpdatable: Send + Sync {
    /// The batch to run in.
    fn batch(&self) -> UpdateBatch {
        UpdateBatch::Default
    }

    /// Advances state by one frame.
    fn update_async<'a>(
        &'a self,
        node: &'a Arc<Node>,
        cx: &'a FrameContext<'a>,
    ) -> BoxFuture<'a, RenderResult<()>>;
}

/// Enqueues draw operations during the draw phase.
pub trait Drawable: Send + Sync {
    /// Puts this frame's operations into `cx.queue`.
    ///
    /// # Errors
    ///
    /// An error ends the frame and stops the render thread.
    fn enqueue_draws(&self, node: &Arc<Node>, cx: &FrameContext<'_>) -> RenderResult<()>;
}

/// Enqueues draw operations during the draw phase and may await.
pub trait AsyncDrawable: Send + Sync {
    /// Puts this frame's operations into `cx.queue`.
    fn enqueue_draws_async<'a>(
        &'a self,
        node: &'a Arc<Node>,
        cx: &'a FrameContext<'a>,
    ) -> BoxFuture<'a, RenderResult<()>>;
}

/// Behavior attached to a node or carried by a functional component.
///
/// Every method has a default, so a behavior only implements the hooks and
/// capabilities it uses.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// use lumen_rendering::scene::{Behavior, FrameContext, Node, Updatable};
/// use lumen_rendering::RenderResult;
///
/// #[derive(Default)]
/// struct FrameCounter(AtomicU64);
///
/// impl Updatable for FrameCounter {
///     fn update(&self, _node: &Arc<Node>, _cx: &FrameContext<'_>) -> RenderResult<()> {
///         self.0.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
///
/// impl Behavior for FrameCounter {
///     fn as_updatable(&self) -> Option<&dyn Updatable> {
///         Some(self)
///     }
/// }
/// ```
pub trait Behavior: Send + Sync + 'static {
    /// Called after the owner is attached, with the owner's fresh scope.
    fn on_attached(&self, _node: &Arc<Node>, _services: &dyn ServiceScope) {}

    /// Called before the owner detaches. The scope is still valid.
    fn on_detached(&self, _node: &Arc<Node>) {}

    /// Update capability.
    fn as_updatable(&self) -> Option<&dyn Updatable> {
        None
    }

    /// Async update capability.
    fn as_async_updatable(&self) -> Option<&dyn AsyncUpdatable> {
        None
    }

    /// Draw capability.
    fn as_drawable(&self) -> Option<&dyn Drawable> {
        None
    }

    /// Async draw capability.
    fn as_async_drawable(&self) -> Option<&dyn AsyncDrawable> {
        None
    }

    /// The capability set, derived from the accessors above.
    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::UPDATE, self.as_updatable().is_some());
        caps.set(Capabilities::UPDATE_ASYNC, self.as_async_updatable().is_some());
        caps.set(Capabilities::DRAW, self.as_drawable().is_some());
        caps.set(Capabilities::DRAW_ASYNC, self.as_async_drawable().is_some());
        caps
    }
}
