//! Engine configuration.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Workgroup size of the post-process compute shader.
///
/// Every extent the shader runs over must be a multiple of it.
pub const COMPUTE_LOCAL_SIZE: [u32; 2] = [2, 2];

/// Runtime configuration for the engine.
///
/// The binary builds this from its command line; tests and embedders use
/// [`Default`] plus the `with_*` setters.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Window (and swapchain) size in pixels.
    pub window_extent: (u32, u32),
    /// Size of the offscreen color target the scene is rendered into.
    pub render_resolution: (u32, u32),
    /// glTF / GLB file loaded at startup.
    pub scene_path: PathBuf,
    /// Directory holding `model.vert.spv`, `model.frag.spv` and `postprocess.comp.spv`.
    pub shader_dir: PathBuf,
    /// Enable the Khronos validation layer when it is installed.
    pub enable_validation: bool,
    /// Camera translation speed in world units per second.
    pub camera_speed: f32,
    /// Camera yaw speed in radians per second.
    pub camera_sensitivity: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_extent: (1600, 900),
            render_resolution: (1600, 900),
            scene_path: PathBuf::from("assets/scene.glb"),
            shader_dir: PathBuf::from("shaders/spirv"),
            enable_validation: cfg!(debug_assertions),
            camera_speed: 2.0,
            camera_sensitivity: 1.5,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window extent. The render resolution follows it.
    pub fn with_window_extent(mut self, width: u32, height: u32) -> Self {
        self.window_extent = (width, height);
        self.render_resolution = (width, height);
        self
    }

    pub fn with_render_resolution(mut self, width: u32, height: u32) -> Self {
        self.render_resolution = (width, height);
        self
    }

    pub fn with_scene_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.scene_path = path.into();
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    pub fn with_camera_speed(mut self, speed: f32, sensitivity: f32) -> Self {
        self.camera_speed = speed;
        self.camera_sensitivity = sensitivity;
        self
    }

    /// Path of a shader binary inside [`shader_dir`](Self::shader_dir).
    pub fn shader_path(&self, file_name: &str) -> PathBuf {
        self.shader_dir.join(file_name)
    }

    pub fn scene_path(&self) -> &Path {
        &self.scene_path
    }

    /// Checks the configuration before any GPU object is created.
    ///
    /// The post-process output is copied into the swapchain without scaling,
    /// so the render resolution has to match the window extent, and the
    /// compute pass tiles that extent with [`COMPUTE_LOCAL_SIZE`] groups.
    pub fn validate(&self) -> Result<()> {
        let (w, h) = self.window_extent;
        if w == 0 || h == 0 {
            return Err(Error::Config(format!("window extent {w}x{h} is empty")));
        }

        let (rw, rh) = self.render_resolution;
        if rw == 0 || rh == 0 {
            return Err(Error::Config(format!("render resolution {rw}x{rh} is empty")));
        }

        if self.render_resolution != self.window_extent {
            return Err(Error::Config(format!(
                "render resolution {rw}x{rh} must equal window extent {w}x{h} (no scaling copy)"
            )));
        }

        let [lx, ly] = COMPUTE_LOCAL_SIZE;
        if w % lx != 0 || h % ly != 0 {
            return Err(Error::Config(format!(
                "window extent {w}x{h} is not a multiple of the {lx}x{ly} post-process workgroup"
            )));
        }

        if !self.camera_speed.is_finite() || !self.camera_sensitivity.is_finite() {
            return Err(Error::Config("camera speeds must be finite".to_string()));
        }

        Ok(())
    }
}
