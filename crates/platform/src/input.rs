//! Keyboard state.

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Which keys are held, sampled once per loop iteration.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-frame "just pressed" set. Call after the frame has
    /// consumed the input.
    pub fn end_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    /// Applies a winit keyboard event. Keys without a physical code and
    /// auto-repeats are ignored.
    pub fn on_key_event(&mut self, event: &KeyEvent) {
        let PhysicalKey::Code(key) = event.physical_key else {
            return;
        };
        match event.state {
            ElementState::Pressed if !event.repeat => self.on_key_pressed(key),
            ElementState::Pressed => {}
            ElementState::Released => self.on_key_released(key),
        }
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Releases every key, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.just_pressed_keys.clear();
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }
}
