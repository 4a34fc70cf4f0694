//! Free-flying camera.

use glam::{Mat4, Quat, Vec3};

const NEAR: f32 = 0.01;
const FAR: f32 = 65536.0;

/// A camera described by a position and an orthonormal basis.
///
/// `direction`, `right` and `up` are kept orthonormal: yaw rotates the first
/// two around `up`.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aspect: f32,
    /// Movement speed in world units per second
    pub speed: f32,
    /// Yaw speed in radians per second
    pub sensitivity: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            fov: 70.0,
            aspect: 16.0 / 9.0,
            speed: 2.0,
            sensitivity: 1.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn with_speed(mut self, speed: f32, sensitivity: f32) -> Self {
        self.speed = speed;
        self.sensitivity = sensitivity;
        self
    }

    /// Moves by `velocity` for `dt` seconds.
    pub fn move_by(&mut self, velocity: Vec3, dt: f32) {
        self.position += velocity * dt;
    }

    /// Turns around the up axis by `angle` radians per second for `dt` seconds.
    /// Positive angles turn left.
    pub fn rotate_yaw(&mut self, angle: f32, dt: f32) {
        let rotation = Quat::from_axis_angle(self.up, angle * dt);
        self.direction = (rotation * self.direction).normalize();
        self.right = self.direction.cross(self.up).normalize();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.up)
    }

    /// Perspective projection with the Y axis flipped for Vulkan clip space.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov.to_radians(), self.aspect, NEAR, FAR);
        proj.y_axis.y *= -1.0;
        proj
    }
}
