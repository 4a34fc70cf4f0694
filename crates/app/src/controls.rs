//! Keyboard camera controls.
//!
//! | key          | action            |
//! |--------------|-------------------|
//! | W / S        | forward / back    |
//! | A / D        | left / right      |
//! | Space / LCtrl| up / down         |
//! | Q / E        | yaw left / right  |

use glam::Vec3;

use ember_platform::{InputState, KeyCode};
use ember_scene::Camera;

/// Movement requested by the keys held this frame, in camera space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraIntent {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
    /// Positive turns left.
    pub yaw: f32,
}

impl CameraIntent {
    pub fn from_input(input: &InputState) -> Self {
        let axis = |positive: KeyCode, negative: KeyCode| {
            let mut value = 0.0;
            if input.is_key_pressed(positive) {
                value += 1.0;
            }
            if input.is_key_pressed(negative) {
                value -= 1.0;
            }
            value
        };

        Self {
            forward: axis(KeyCode::KeyW, KeyCode::KeyS),
            right: axis(KeyCode::KeyD, KeyCode::KeyA),
            up: axis(KeyCode::Space, KeyCode::ControlLeft),
            yaw: axis(KeyCode::KeyQ, KeyCode::KeyE),
        }
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    /// Moves and turns `camera` for `dt` seconds.
    pub fn apply(&self, camera: &mut Camera, dt: f32) {
        let direction =
            camera.direction * self.forward + camera.right * self.right + camera.up * self.up;
        if direction != Vec3::ZERO {
            camera.move_by(direction.normalize() * camera.speed, dt);
        }
        if self.yaw != 0.0 {
            camera.rotate_yaw(self.yaw * camera.sensitivity, dt);
        }
    }
}
