//! Local transforms of scene nodes.
//!
//! A [`Transform`] holds translation, rotation and scale and composes them as
//! `T * R * S`, which is the order glTF node properties use.
//!
//! # Example
//!
//! ```
//! use ember_scene::Transform;
//! use glam::Vec3;
//!
//! let t = Transform::new()
//!     .with_translation(Vec3::new(1.0, 0.0, 0.0))
//!     .with_scale(Vec3::splat(2.0));
//!
//! let p = t.matrix().transform_point3(Vec3::X);
//! assert!((p - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
//! ```

use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Builds a transform from raw glTF TRS arrays (rotation is `[x, y, z, w]`).
    pub fn from_trs(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            translation: Vec3::from_array(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from_array(scale),
        }
    }

    /// The composed matrix `T * R * S`.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scale)
    }
}

impl From<Transform> for Mat4 {
    fn from(transform: Transform) -> Self {
        transform.matrix()
    }
}
