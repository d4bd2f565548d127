//! Scene graph: nodes, functional components and the behaviors they carry.

mod capability;
mod component;
mod node;
#[allow(clippy::module_inception)]
mod scene;
mod services;

pub use capability::{
    AsyncDrawable, AsyncUpdatable, Behavior, BoxFuture, Capabilities, Drawable, FrameContext,
    Updatable, UpdateBatch,
};
pub use component::{ComponentKey, FunctionalComponent};
pub use node::{ComponentRegistry, Node, NodeBuilder, NodeEvent};
pub use scene::{Scene, Task};
pub use services::{ServiceInstance, ServiceMap, ServiceProvider, ServiceScope};
