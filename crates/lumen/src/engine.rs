//! # Engine Host
//!
//! Builds one [`RenderManager`] per configured manager and runs each on its
//! own render thread. Lifecycle changes are reported over a crossbeam
//! channel so a supervisor can decide whether to restart a failed manager.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use lumen_core::{logging, CoreResult, EngineConfig};
use lumen_rendering::{Device, FrameStats, ManagerId, RenderManager, RenderResult, Scene};

/// Lifecycle events of the hosted managers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A render thread started.
    ManagerStarted {
        /// Manager id.
        id: ManagerId,
        /// Configured name.
        name: String,
    },
    /// A render thread ended cleanly.
    ManagerStopped {
        /// Manager id.
        id: ManagerId,
        /// Configured name.
        name: String,
        /// Statistics of its last frame.
        stats: Option<FrameStats>,
    },
    /// A render thread ended with an error.
    ManagerFailed {
        /// Manager id.
        id: ManagerId,
        /// Configured name.
        name: String,
        /// The error, rendered for logging.
        error: String,
    },
}

/// How one manager's render thread ended.
#[derive(Debug)]
pub struct ManagerOutcome {
    /// Manager id.
    pub id: ManagerId,
    /// Configured name.
    pub name: String,
    /// Last frame's statistics, or the error that ended the loop.
    pub result: RenderResult<Option<FrameStats>>,
}

/// Hosts the configured render managers.
pub struct Engine {
    config: EngineConfig,
    managers: Vec<RenderManager>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl Engine {
    /// Creates one manager with an empty scene per configured manager.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the configuration.
    pub fn new(config: EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        let managers = config
            .managers
            .iter()
            .map(|manager| RenderManager::new(manager.clone(), Scene::new(manager.name.clone())))
            .collect::<CoreResult<Vec<_>>>()?;
        let (events_tx, events_rx) = unbounded();
        info!(managers = managers.len(), "engine created");
        Ok(Self {
            config,
            managers,
            events_tx,
            events_rx,
        })
    }

    /// Parses a TOML configuration and creates the engine.
    ///
    /// # Errors
    ///
    /// Returns [`lumen_core::CoreError::InvalidConfig`] for malformed TOML and
    /// the validation error otherwise.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        Self::new(EngineConfig::from_toml_str(source)?)
    }

    /// Installs the tracing subscriber with the configured filter.
    ///
    /// Returns false if a subscriber was already installed.
    pub fn init_logging(&self) -> bool {
        logging::init(&self.config.log_filter)
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The hosted managers, in configuration order.
    pub fn managers(&self) -> &[RenderManager] {
        &self.managers
    }

    /// Looks up a manager by its configured name.
    pub fn manager(&self, name: &str) -> Option<&RenderManager> {
        self.managers.iter().find(|m| m.config().name == name)
    }

    /// A receiver of lifecycle events.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }

    /// Starts every manager. `factory` builds each manager's device on that
    /// manager's render thread.
    ///
    /// With a frame limit the threads stop by themselves; collect them with
    /// [`join`](Self::join).
    ///
    /// # Errors
    ///
    /// Returns the first start failure. Managers started before it keep
    /// running.
    pub fn start<D, F>(&mut self, factory: F, frames: Option<u64>) -> RenderResult<()>
    where
        D: Device + 'static,
        F: Fn(ManagerId) -> D + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        for manager in &mut self.managers {
            let id = manager.id();
            let build = Arc::clone(&factory);
            manager.start_limited(move || build(id), frames)?;
            Self::emit(&self.events_tx, EngineEvent::ManagerStarted {
                id,
                name: manager.config().name.clone(),
            });
        }
        Ok(())
    }

    /// Signals every render thread to stop and waits for them.
    pub fn stop(&mut self) -> Vec<ManagerOutcome> {
        self.finish(true)
    }

    /// Waits for every render thread to end by itself.
    pub fn join(&mut self) -> Vec<ManagerOutcome> {
        self.finish(false)
    }

    fn finish(&mut self, signal: bool) -> Vec<ManagerOutcome> {
        let mut outcomes = Vec::with_capacity(self.managers.len());
        for manager in &mut self.managers {
            let id = manager.id();
            let name = manager.config().name.clone();
            let result = if signal { manager.stop() } else { manager.join() };
            let event = match &result {
                Ok(stats) => EngineEvent::ManagerStopped {
                    id,
                    name: name.clone(),
                    stats: *stats,
                },
                Err(error) => {
                    warn!(manager = %id, %error, "manager failed");
                    EngineEvent::ManagerFailed {
                        id,
                        name: name.clone(),
                        error: error.to_string(),
                    }
                }
            };
            Self::emit(&self.events_tx, event);
            outcomes.push(ManagerOutcome { id, name, result });
        }
        outcomes
    }

    fn emit(events: &Sender<EngineEvent>, event: EngineEvent) {
        // The engine keeps a receiver, so the channel never disconnects.
        let _ = events.send(event);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.managers.iter().any(RenderManager::is_running) {
            self.stop();
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("managers", &self.managers)
            .finish_non_exhaustive()
    }
}
