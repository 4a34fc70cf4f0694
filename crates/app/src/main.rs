//! ember viewer.
//!
//! Loads a glTF scene, renders it through the offscreen + post-process
//! pipeline and lets the camera fly around it with the keyboard. An egui
//! overlay shows frame times unless `--no-ui` is given.

mod controls;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use ember_core::{EngineConfig, FrameClock};
use ember_platform::{InputState, Window};
use ember_renderer::{EguiOverlay, FrameStatsTracker, NoOverlay, Overlay, Renderer};

use crate::controls::CameraIntent;

const WINDOW_TITLE: &str = "ember";

/// Command line options.
#[derive(Parser, Debug)]
#[command(name = "ember", version, about = "Render a glTF scene with Vulkan")]
struct CliArgs {
    /// glTF or GLB scene to load
    #[arg(default_value = "assets/scene.glb")]
    scene: PathBuf,

    /// Directory holding the compiled SPIR-V shaders
    #[arg(long, default_value = "shaders/spirv")]
    shader_dir: PathBuf,

    #[arg(long, default_value_t = 1600)]
    width: u32,

    #[arg(long, default_value_t = 900)]
    height: u32,

    /// Camera speed in units per second
    #[arg(long, default_value_t = 2.0)]
    speed: f32,

    /// Camera yaw speed in radians per second
    #[arg(long, default_value_t = 1.5)]
    sensitivity: f32,

    /// Enable the Khronos validation layer [default: on in debug builds]
    #[arg(long)]
    validation: Option<bool>,

    /// Log frame time statistics every N frames (0 disables)
    #[arg(long, default_value_t = 0)]
    stats_every: u32,

    /// Render without the egui overlay
    #[arg(long)]
    no_ui: bool,
}

impl CliArgs {
    fn to_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_window_extent(self.width, self.height)
            .with_scene_path(&self.scene)
            .with_shader_dir(&self.shader_dir)
            .with_validation(self.validation.unwrap_or(cfg!(debug_assertions)))
            .with_camera_speed(self.speed, self.sensitivity)
    }

    fn overlay_options(&self) -> OverlayOptions {
        OverlayOptions {
            ui: !self.no_ui,
            stats_every: self.stats_every,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OverlayOptions {
    ui: bool,
    stats_every: u32,
}

impl OverlayOptions {
    fn tracker(&self) -> FrameStatsTracker {
        if self.stats_every > 0 {
            FrameStatsTracker::new(self.stats_every).with_logging(true)
        } else {
            FrameStatsTracker::default()
        }
    }

    fn build(&self) -> Box<dyn Overlay> {
        if self.ui {
            Box::new(EguiOverlay::new(self.tracker()))
        } else {
            Box::new(NoOverlay)
        }
    }
}

struct App {
    config: EngineConfig,
    overlay: OverlayOptions,
    // Declared before the window so it is dropped first.
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    clock: FrameClock,
    /// First fatal error; turned into a non-zero exit after the loop ends.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig, overlay: OverlayOptions) -> Self {
        Self {
            config,
            overlay,
            renderer: None,
            window: None,
            input: InputState::new(),
            clock: FrameClock::new(),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("{:#}", error);
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        // Release the GPU before the window goes away.
        self.renderer = None;
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (width, height) = self.config.window_extent;
        let window = Window::new(event_loop, width, height, WINDOW_TITLE)
            .context("failed to create window")?;

        let scene = ember_resources::load_scene(self.config.scene_path());
        let renderer = Renderer::new(&self.config, &window, scene, self.overlay.build())
            .context("failed to initialize renderer")?;

        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };

        let dt = self.clock.delta_secs();
        let intent = CameraIntent::from_input(&self.input);
        if !intent.is_idle() {
            intent.apply(renderer.camera_mut(), dt);
        }

        renderer.render_frame(window).context("frame failed")?;
        self.clock.mark_frame();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let consumed = match (self.renderer.as_mut(), self.window.as_ref()) {
            (Some(renderer), Some(window)) => renderer.on_window_event(window, &event),
            _ => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                    return;
                }
                // Releases always reach the camera so no key stays held.
                if !consumed || !event.state.is_pressed() {
                    self.input.on_key_event(&event);
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.input.end_frame();
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            info!("Exiting after {} frames", renderer.frame_number());
        }
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    ember_core::init_logging();
    info!("Starting ember");

    let config = args.to_config();
    config.validate().context("invalid configuration")?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, args.overlay_options());
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_give_valid_config() {
        let args = CliArgs::parse_from(["ember"]);
        let config = args.to_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_extent, (1600, 900));
        assert_eq!(config.render_resolution, config.window_extent);
    }

    #[test]
    fn test_cli_overrides() {
        let args = CliArgs::parse_from([
            "ember",
            "scenes/sponza.glb",
            "--width",
            "800",
            "--height",
            "600",
            "--shader-dir",
            "out/spv",
            "--speed",
            "5",
        ]);
        let config = args.to_config();
        assert_eq!(config.scene_path(), std::path::Path::new("scenes/sponza.glb"));
        assert_eq!(config.render_resolution, (800, 600));
        assert_eq!(config.shader_path("model.vert.spv"), PathBuf::from("out/spv/model.vert.spv"));
        assert_eq!(config.camera_speed, 5.0);
    }

    #[test]
    fn test_zero_width_is_rejected() {
        let args = CliArgs::parse_from(["ember", "--width", "0"]);
        assert!(args.to_config().validate().is_err());
    }

    #[test]
    fn test_overlay_flags() {
        let args = CliArgs::parse_from(["ember"]);
        assert_eq!(
            args.overlay_options(),
            OverlayOptions {
                ui: true,
                stats_every: 0
            }
        );

        let args = CliArgs::parse_from(["ember", "--no-ui", "--stats-every", "60"]);
        let options = args.overlay_options();
        assert!(!options.ui);
        assert_eq!(options.stats_every, 60);
    }

    #[test]
    fn test_stats_window_follows_stats_every() {
        let options = OverlayOptions {
            ui: true,
            stats_every: 3,
        };
        let mut tracker = options.tracker();
        assert!(tracker.push(std::time::Duration::from_millis(5)).is_none());
        assert!(tracker.push(std::time::Duration::from_millis(5)).is_none());
        assert!(tracker.push(std::time::Duration::from_millis(5)).is_some());
    }

    #[test]
    fn test_validation_flag() {
        let args = CliArgs::parse_from(["ember", "--validation", "false"]);
        assert!(!args.to_config().enable_validation);
    }
}
