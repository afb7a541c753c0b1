//! Keyboard and mouse polling for the fly camera
//!
//! Input is polled once per frame rather than delivered through callbacks.
//! Only one movement direction applies per frame; keys are checked in the
//! order of [`MOVEMENT_BINDINGS`] and the first pressed key wins.

use glfw::{Key, MouseButton};

use crate::render::primitives::Camera;

/// Camera translation requested by the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementDirection {
    /// Along the view direction
    Forward,
    /// Against the view direction
    Backward,
    /// Against the right vector
    Left,
    /// Along the right vector
    Right,
    /// Along world up
    Up,
    /// Against world up
    Down,
}

/// Key bindings in priority order
pub const MOVEMENT_BINDINGS: [(Key, MovementDirection); 6] = [
    (Key::W, MovementDirection::Forward),
    (Key::S, MovementDirection::Backward),
    (Key::A, MovementDirection::Left),
    (Key::D, MovementDirection::Right),
    (Key::E, MovementDirection::Up),
    (Key::Q, MovementDirection::Down),
];

/// Mouse button that enables looking around
pub const LOOK_BUTTON: MouseButton = MouseButton::Button2;

/// Resolve this frame's movement from a key-state query
pub fn resolve_movement(is_down: impl Fn(Key) -> bool) -> Option<MovementDirection> {
    MOVEMENT_BINDINGS
        .iter()
        .find(|(key, _)| is_down(*key))
        .map(|&(_, direction)| direction)
}

/// Snapshot of the input state the camera consumes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSnapshot {
    /// Resolved movement, if any key is held
    pub movement: Option<MovementDirection>,
    /// Whether the look button is held
    pub looking: bool,
    /// Cursor position in screen coordinates
    pub cursor: (f64, f64),
}

impl InputSnapshot {
    /// Drive `camera` for a frame lasting `dt` seconds
    pub fn apply(&self, camera: &mut Camera, dt: f32) {
        if let Some(direction) = self.movement {
            camera.process_movement(direction, dt);
        }

        if self.looking {
            camera.process_mouse_move(self.cursor.0 as f32, self.cursor.1 as f32);
        } else {
            camera.release_mouse();
        }
    }
}
