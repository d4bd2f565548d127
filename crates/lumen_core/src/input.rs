//! Input capture.
//!
//! The windowing layer pushes [`RawInputEvent`]s; once per frame the render
//! thread folds them into a pooled [`InputSnapshot`] that update code reads.

use crate::memory::{ObjectPool, Poolable, Pooled};

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Right mouse button.
    Right,
    /// Middle mouse button (scroll wheel click).
    Middle,
}

impl MouseButton {
    /// Bit used for this button in [`InputSnapshot::buttons`].
    #[must_use]
    pub const fn mask(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Right => 2,
            Self::Middle => 4,
        }
    }
}

/// Keyboard key.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    Enter,
    Tab,
    Backspace,
    Space,
    Up,
    Down,
    Left,
    Right,
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
}

/// A key transition recorded in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key.
    pub key: Key,
    /// True for a press, false for a release.
    pub pressed: bool,
}

/// Event produced by the windowing collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInputEvent {
    /// Key pressed.
    KeyDown(Key),
    /// Key released.
    KeyUp(Key),
    /// Text input.
    Char(char),
    /// Pointer moved to an absolute position.
    PointerMoved {
        /// X position.
        x: f32,
        /// Y position.
        y: f32,
    },
    /// Wheel scrolled by a delta.
    Wheel(f32),
    /// Mouse button pressed.
    ButtonDown(MouseButton),
    /// Mouse button released.
    ButtonUp(MouseButton),
}

/// Input as seen by one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    /// Key transitions in arrival order.
    pub key_events: Vec<KeyEvent>,
    /// Characters typed this frame.
    pub chars: Vec<char>,
    /// Pointer position at the end of the frame.
    pub position: (f32, f32),
    /// Accumulated wheel delta.
    pub wheel_delta: f32,
    /// Buttons held at the end of the frame.
    pub buttons: u8,
}

impl InputSnapshot {
    /// Returns true if `key` was pressed during the frame.
    #[must_use]
    pub fn key_pressed(&self, key: Key) -> bool {
        self.key_events.iter().any(|e| e.key == key && e.pressed)
    }

    /// Returns true if `button` was held at the end of the frame.
    #[must_use]
    pub fn button_down(&self, button: MouseButton) -> bool {
        self.buttons & button.mask() != 0
    }
}

impl Poolable for InputSnapshot {
    fn reset(&mut self) {
        self.key_events.clear();
        self.chars.clear();
        self.position = (0.0, 0.0);
        self.wheel_delta = 0.0;
        self.buttons = 0;
    }
}

/// Folds raw events into pooled per-frame snapshots.
///
/// Pointer position and held buttons persist across frames; lists and the
/// wheel delta only cover the events of one capture.
#[derive(Debug)]
pub struct InputCapture {
    pool: ObjectPool<InputSnapshot>,
    position: (f32, f32),
    buttons: u8,
}

impl InputCapture {
    /// Creates a capture with `warm` snapshots preallocated.
    #[must_use]
    pub fn new(warm: usize) -> Self {
        Self {
            pool: ObjectPool::with_capacity(warm),
            position: (0.0, 0.0),
            buttons: 0,
        }
    }

    /// Builds the snapshot for one frame.
    pub fn capture<I>(&mut self, events: I) -> Pooled<InputSnapshot>
    where
        I: IntoIterator<Item = RawInputEvent>,
    {
        let mut snapshot = self.pool.acquire();
        for event in events {
            match event {
                RawInputEvent::KeyDown(key) => {
                    snapshot.key_events.push(KeyEvent { key, pressed: true });
                }
                RawInputEvent::KeyUp(key) => {
                    snapshot.key_events.push(KeyEvent { key, pressed: false });
                }
                RawInputEvent::Char(c) => snapshot.chars.push(c),
                RawInputEvent::PointerMoved { x, y } => self.position = (x, y),
                RawInputEvent::Wheel(delta) => snapshot.wheel_delta += delta,
                RawInputEvent::ButtonDown(button) => self.buttons |= button.mask(),
                RawInputEvent::ButtonUp(button) => self.buttons &= !button.mask(),
            }
        }
        snapshot.position = self.position;
        snapshot.buttons = self.buttons;
        snapshot
    }

    /// The snapshot pool backing this capture.
    pub fn pool(&self) -> &ObjectPool<InputSnapshot> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_folds_events() {
        let mut capture = InputCapture::new(1);
        let snapshot = capture.capture([
            RawInputEvent::KeyDown(Key::W),
            RawInputEvent::Char('w'),
            RawInputEvent::PointerMoved { x: 10.0, y: 20.0 },
            RawInputEvent::Wheel(1.5),
            RawInputEvent::Wheel(-0.5),
            RawInputEvent::ButtonDown(MouseButton::Left),
            RawInputEvent::ButtonDown(MouseButton::Right),
            RawInputEvent::ButtonUp(MouseButton::Left),
        ]);

        assert!(snapshot.key_pressed(Key::W));
        assert_eq!(snapshot.chars, vec!['w']);
        assert_eq!(snapshot.position, (10.0, 20.0));
        assert!((snapshot.wheel_delta - 1.0).abs() < f32::EPSILON);
        assert!(snapshot.button_down(MouseButton::Right));
        assert!(!snapshot.button_down(MouseButton::Left));
    }

    #[test]
    fn test_state_persists_across_frames() {
        let mut capture = InputCapture::new(1);
        drop(capture.capture([
            RawInputEvent::PointerMoved { x: 3.0, y: 4.0 },
            RawInputEvent::ButtonDown(MouseButton::Middle),
            RawInputEvent::KeyDown(Key::A),
        ]));

        let next = capture.capture([]);
        assert_eq!(next.position, (3.0, 4.0));
        assert!(next.button_down(MouseButton::Middle));
        assert!(next.key_events.is_empty());
    }

    #[test]
    fn test_released_snapshot_is_reused_cleared() {
        let mut capture = InputCapture::new(1);
        let first = capture.capture([RawInputEvent::Char('x'), RawInputEvent::KeyDown(Key::X)]);
        let address = std::ptr::addr_of!(*first) as usize;
        drop(first);
        assert_eq!(capture.pool().idle_count(), 1);

        let second = capture.capture([]);
        assert_eq!(std::ptr::addr_of!(*second) as usize, address);
        assert!(second.key_events.is_empty());
        assert!(second.chars.is_empty());
        assert_eq!(second.buttons, 0);
        assert_eq!(capture.pool().allocated_total(), 1);
    }
}
