//! # Frame Loop
//!
//! One frame of a manager, in order:
//!
//! 1. tick the clock
//! 2. destroy buffers released since the last frame
//! 3. run due deferred actions
//! 4. capture input into a pooled snapshot
//! 5. update phase: every [`UpdateBatch`] in order; sync updates of a batch
//!    run in parallel, async updates are awaited one by one
//! 6. draw phase: queue operations with a fixed priority, let drawables
//!    queue the rest, then drain the queue and draw in priority order;
//!    queued items that are disposed, unregistered or owned by another
//!    manager are counted and dropped
//! 7. UI pass
//! 8. submit the command list
//!
//! Every device call happens here, on the thread that owns the loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, trace, warn};

use lumen_core::{CoreError, FrameClock, InputCapture};

use crate::device::{CommandList, Device};
use crate::error::{RenderError, RenderResult};
use crate::manager::ManagerShared;
use crate::operation::{DrawContext, Operation};
use crate::overlay::UiPass;
use crate::scene::{FrameContext, Task, UpdateBatch};
use crate::stats::FrameStats;

/// Drives the frames of one manager against one device.
pub struct FrameLoop<D: Device> {
    shared: Arc<ManagerShared>,
    device: D,
    clock: FrameClock,
    input: InputCapture,
    runtime: Runtime,
    scratch: Vec<(i32, Arc<Operation>)>,
}

impl<D: Device> FrameLoop<D> {
    pub(crate) fn new(shared: Arc<ManagerShared>, device: D) -> RenderResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(RenderError::Runtime)?;
        Ok(Self {
            clock: FrameClock::new(shared.config.target_fps),
            input: InputCapture::new(shared.config.snapshot_pool_size),
            scratch: Vec::with_capacity(shared.config.queue_capacity),
            shared,
            device,
            runtime,
        })
    }

    /// The device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Frames run so far.
    pub fn frame(&self) -> u64 {
        self.clock.frame()
    }

    /// Runs frames until the manager is stopped or `limit` frames ran.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a frame.
    pub fn run(&mut self, limit: Option<u64>) -> RenderResult<FrameStats> {
        let mut last = FrameStats::default();
        while self.shared.running.load(Ordering::Acquire) {
            if limit.is_some_and(|limit| self.clock.frame() >= limit) {
                break;
            }
            last = self.run_frame()?;
            self.clock.wait_for_next_frame();
        }
        Ok(last)
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Update, draw and device errors end the frame and are returned as is.
    /// Draws of operations disposed after being queued are skipped.
    pub fn run_frame(&mut self) -> RenderResult<FrameStats> {
        let started = Instant::now();
        let time = self.clock.tick();
        let frame = time.frame;
        let mut stats = FrameStats {
            frame,
            ..FrameStats::default()
        };

        for buffer in self.shared.release_rx.try_iter() {
            match self.device.destroy_buffer(buffer) {
                Ok(()) => stats.released_buffers += 1,
                Err(error) => warn!(?buffer, %error, "buffer release failed"),
            }
        }
        stats.deferred_actions = count(self.shared.scheduler.run_due(frame, Instant::now()));

        let input = self.input.capture(self.shared.input_rx.try_iter());
        let tasks = self.shared.scene.collect_tasks();
        let cx = FrameContext {
            time,
            input: &input,
            queue: &self.shared.queue,
            scheduler: &self.shared.scheduler,
            manager: self.shared.id,
        };

        for batch in UpdateBatch::ALL {
            let sync: Vec<&Task> = tasks
                .iter()
                .filter(|task| task.behavior.as_updatable().is_some_and(|u| u.batch() == batch))
                .collect();
            stats.updates += run_updates(&sync, &cx, self.shared.config.parallelism)?;

            for task in &tasks {
                if let Some(updatable) = task.behavior.as_async_updatable() {
                    if updatable.batch() == batch {
                        self.runtime.block_on(updatable.update_async(&task.node, &cx))?;
                        stats.async_updates += 1;
                    }
                }
            }
        }

        for operation in self.shared.operations.values() {
            if let Some(priority) = operation.priority() {
                self.shared.queue.enqueue(operation, priority);
            }
        }
        for task in &tasks {
            if let Some(drawable) = task.behavior.as_drawable() {
                drawable.enqueue_draws(&task.node, &cx)?;
            }
        }
        for task in &tasks {
            if let Some(drawable) = task.behavior.as_async_drawable() {
                self.runtime.block_on(drawable.enqueue_draws_async(&task.node, &cx))?;
            }
        }
        drop(tasks);
        drop(input);

        self.shared.queue.drain_into(&mut self.scratch);
        stats.queued = count(self.scratch.len());
        let mut commands = CommandList::new(frame, self.shared.targets.ids());
        {
            let mut draw = DrawContext::new(&mut self.device, &mut commands, self.shared.id, frame);
            for (_, operation) in self.scratch.drain(..) {
                match operation.check_queueable(self.shared.id) {
                    Ok(()) => {}
                    Err(CoreError::Disposed { .. }) => {
                        trace!(operation = %operation.label(), "skipped disposed draw");
                        stats.skipped_draws += 1;
                        continue;
                    }
                    Err(error) => {
                        warn!(operation = %operation.label(), %error, "dropped queued draw");
                        stats.rejected_draws += 1;
                        continue;
                    }
                }
                match operation.draw(&mut draw) {
                    Ok(()) => stats.draws += 1,
                    Err(error) if error.is_disposed() => {
                        trace!(operation = %operation.label(), "skipped disposed draw");
                        stats.skipped_draws += 1;
                    }
                    Err(error) => return Err(error),
                }
            }
            stats.uploads = draw.uploads();
        }

        let ui = self.shared.ui.lock().clone();
        if let Some(ui) = ui {
            stats.ui_elements = UiPass::run(&self.shared.overlay, &ui, frame, &mut commands);
        }

        self.device.submit(commands)?;

        stats.frame_time_ms = started.elapsed().as_secs_f32() * 1000.0;
        if let Some(target) = self.clock.target_frame_duration() {
            if started.elapsed() > target {
                debug!(frame, ms = stats.frame_time_ms, "frame over budget");
            }
        }
        self.shared.frame.store(frame, Ordering::Release);
        *self.shared.last_stats.lock() = Some(stats);
        trace!(frame, draws = stats.draws, queued = stats.queued, "frame done");
        Ok(stats)
    }
}

/// Runs the sync updates of one batch on up to `parallelism` threads.
fn run_updates(tasks: &[&Task], cx: &FrameContext<'_>, parallelism: usize) -> RenderResult<u32> {
    let run_chunk = |chunk: &[&Task]| -> RenderResult<u32> {
        let mut ran = 0;
        for task in chunk {
            if let Some(updatable) = task.behavior.as_updatable() {
                updatable.update(&task.node, cx)?;
                ran += 1;
            }
        }
        Ok(ran)
    };

    if parallelism <= 1 || tasks.len() <= 1 {
        return run_chunk(tasks);
    }

    let chunk_size = tasks.len().div_ceil(parallelism);
    std::thread::scope(|scope| {
        let workers: Vec<_> = tasks
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || run_chunk(chunk)))
            .collect();

        let mut ran = 0;
        let mut failure = None;
        for worker in workers {
            match worker.join() {
                Ok(Ok(count)) => ran += count,
                Ok(Err(error)) => {
                    failure.get_or_insert(error);
                }
                Err(_) => {
                    failure.get_or_insert(RenderError::WorkerPanicked);
                }
            }
        }
        failure.map_or(Ok(ran), Err)
    })
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
