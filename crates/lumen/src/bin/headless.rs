//! # LUMEN Headless Runner
//!
//! Runs every configured manager against a headless device for a fixed
//! number of frames, then logs what each manager drew.
//!
//! ```bash
//! # Defaults: one manager, 120 frames
//! ./lumen_headless
//!
//! # Custom config and frame count
//! ./lumen_headless lumen.toml 600
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info};

use lumen::core::EngineConfig;
use lumen::rendering::scene::{ServiceScope, Updatable};
use lumen::rendering::{
    Behavior, DrawContext, DrawHandle, DrawOperation, FrameContext, HeadlessDevice, Node,
    ReleaseContext, SharedDrawResource,
};
use lumen::{Engine, EngineEvent, ManagerHandle, RenderResult};

const DEFAULT_FRAMES: u64 = 120;
const QUADS_PER_MANAGER: usize = 8;

/// One coloured quad.
struct Quad {
    color: Arc<SharedDrawResource<[f32; 4]>>,
    priority: i32,
}

impl DrawOperation for Quad {
    fn priority(&self) -> Option<i32> {
        Some(self.priority)
    }

    fn draw(&mut self, cx: &mut DrawContext<'_>, _delta: Duration) -> RenderResult<()> {
        let buffer = cx.bind(&self.color)?;
        cx.draw("quad", vec![buffer], 6, 1);
        Ok(())
    }

    fn release(&mut self, cx: &mut ReleaseContext) {
        cx.release_resource(&self.color);
    }
}

/// Registers a quad while attached and cycles its colour every few frames.
struct Pulse {
    color: Arc<SharedDrawResource<[f32; 4]>>,
    period: u64,
    priority: i32,
    handle: Mutex<Option<DrawHandle>>,
}

impl Pulse {
    fn new(index: usize) -> Self {
        Self {
            color: Arc::new(SharedDrawResource::uniform([0.0, 0.0, 0.0, 1.0])),
            period: 1 + u64::try_from(index % 4).unwrap_or_default(),
            priority: i32::try_from(index % 3).unwrap_or_default(),
            handle: Mutex::new(None),
        }
    }
}

impl Updatable for Pulse {
    fn update(&self, _node: &Arc<Node>, cx: &FrameContext<'_>) -> RenderResult<()> {
        if cx.time.frame % self.period == 0 {
            #[allow(clippy::cast_precision_loss)]
            let phase = (cx.time.frame / self.period % 16) as f32 / 16.0;
            self.color.update(|rgba| rgba[0] = phase);
        }
        Ok(())
    }
}

impl Behavior for Pulse {
    fn on_attached(&self, node: &Arc<Node>, services: &dyn ServiceScope) {
        let registered = services.resolve::<ManagerHandle>().and_then(|manager| {
            let quad = Quad {
                color: Arc::clone(&self.color),
                priority: self.priority,
            };
            DrawHandle::register(node.name(), quad, node, &manager)
        });
        match registered {
            Ok(handle) => *self.handle.lock() = Some(handle),
            Err(error) => error!(node = node.name(), %error, "quad registration failed"),
        }
    }

    fn on_detached(&self, _node: &Arc<Node>) {
        self.handle.lock().take();
    }

    fn as_updatable(&self) -> Option<&dyn Updatable> {
        Some(self)
    }
}

fn load_config(path: Option<&str>) -> lumen::CoreResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let config_path = args.next();
    let frames = args
        .next()
        .and_then(|frames| frames.parse::<u64>().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let mut engine = match load_config(config_path.as_deref()).and_then(Engine::new) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("lumen_headless: {e}");
            std::process::exit(1);
        }
    };
    engine.init_logging();

    for manager in engine.managers() {
        let scene = manager.scene();
        for index in 0..QUADS_PER_MANAGER {
            let node = Node::builder(format!("quad-{index}"))
                .behavior(Pulse::new(index))
                .build();
            if let Err(error) = scene.add(node) {
                error!(manager = %manager.id(), %error, "scene setup failed");
                std::process::exit(1);
            }
        }
    }

    let events = engine.events();
    if let Err(error) = engine.start(|_| HeadlessDevice::default(), Some(frames)) {
        error!(%error, "start failed");
        engine.stop();
        std::process::exit(1);
    }
    info!(frames, managers = engine.managers().len(), "running headless");

    let outcomes = engine.join();
    for event in events.try_iter() {
        match event {
            EngineEvent::ManagerStopped {
                name,
                stats: Some(stats),
                ..
            } => info!(
                manager = %name,
                frame = stats.frame,
                draws = stats.draws,
                uploads = stats.uploads,
                frame_time_ms = stats.frame_time_ms,
                "manager finished"
            ),
            EngineEvent::ManagerFailed { name, error, .. } => {
                error!(manager = %name, %error, "manager failed");
            }
            _ => {}
        }
    }

    if outcomes.iter().any(|outcome| outcome.result.is_err()) {
        std::process::exit(1);
    }
}
