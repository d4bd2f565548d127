//! Overlay elements and the UI pass.
//!
//! The immediate-mode UI library behind [`UiContext`] keeps global drawing
//! state and is not thread-safe, so UI passes of all managers in the process
//! are serialized by one lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use lumen_core::{NestedNode, OrderedList};

use crate::device::{CommandList, DrawCommand};

static UI_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// An element drawn by the UI pass, with nested elements of its own.
pub struct OverlayElement {
    id: u64,
    label: String,
    children: OrderedList<Arc<OverlayElement>>,
}

impl OverlayElement {
    /// Creates an element without children.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Arc::new(Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            children: OrderedList::new(),
        })
    }

    /// Unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Nested elements.
    pub fn children(&self) -> &OrderedList<Arc<OverlayElement>> {
        &self.children
    }
}

impl PartialEq for OverlayElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl NestedNode for OverlayElement {
    fn nested_list(&self) -> Option<&OrderedList<Arc<Self>>> {
        Some(&self.children)
    }
}

impl fmt::Debug for OverlayElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayElement")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("children", &self.children.len())
            .finish()
    }
}

/// The top-level overlay elements of one manager.
#[derive(Debug, Default)]
pub struct Overlay {
    elements: OrderedList<Arc<OverlayElement>>,
}

impl Overlay {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level elements.
    pub fn elements(&self) -> &OrderedList<Arc<OverlayElement>> {
        &self.elements
    }

    /// Visible elements in draw order, depth-first.
    pub fn draw_list(&self) -> Vec<Arc<OverlayElement>> {
        self.elements.flatten()
    }
}

/// The immediate-mode UI collaborator.
pub trait UiContext: Send {
    /// Starts a UI frame.
    fn begin(&mut self, frame: u64);

    /// Draws one element.
    fn element(&mut self, element: &OverlayElement);

    /// Ends the frame and returns the command that presents it, if any.
    fn end(&mut self) -> Option<DrawCommand>;
}

/// Runs UI passes under the process-wide UI lock.
pub struct UiPass;

impl UiPass {
    /// Draws the overlay's visible elements into `commands`. Returns the
    /// number of elements drawn.
    pub fn run(
        overlay: &Overlay,
        ui: &Mutex<dyn UiContext>,
        frame: u64,
        commands: &mut CommandList,
    ) -> u32 {
        let elements = overlay.draw_list();
        let _exclusive = UI_LOCK.lock();
        let mut ui = ui.lock();
        ui.begin(frame);
        for element in &elements {
            ui.element(element);
        }
        if let Some(command) = ui.end() {
            commands.push(command);
        }
        trace!(frame, elements = elements.len(), "ui pass");
        u32::try_from(elements.len()).unwrap_or(u32::MAX)
    }
}

/// A [`UiContext`] that records what it was asked to draw.
#[derive(Debug, Default)]
pub struct RecordingUi {
    frames: u64,
    current: Vec<String>,
    last_frame: Vec<String>,
}

impl RecordingUi {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed UI frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Labels drawn in the last completed frame.
    pub fn last_frame(&self) -> &[String] {
        &self.last_frame
    }
}

impl UiContext for RecordingUi {
    fn begin(&mut self, _frame: u64) {
        self.current.clear();
    }

    fn element(&mut self, element: &OverlayElement) {
        self.current.push(element.label.clone());
    }

    fn end(&mut self) -> Option<DrawCommand> {
        self.frames += 1;
        std::mem::swap(&mut self.current, &mut self.last_frame);
        let elements = u32::try_from(self.last_frame.len()).unwrap_or(u32::MAX);
        Some(DrawCommand::Overlay { elements })
    }
}
