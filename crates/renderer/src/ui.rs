//! egui overlay.
//!
//! [`EguiOverlay`] runs one egui frame per rendered frame: a frame time
//! window plus the egui demo windows. The tessellated meshes are painted at
//! the end of the scene pass, into the offscreen target, so the post-process
//! sees the UI like any other geometry.
//!
//! GPU work goes through a [`UiPainter`]. [`AshPainter`] wraps
//! `egui-ash-renderer` in dynamic rendering mode and allocates through the
//! device's gpu-allocator.

use std::collections::VecDeque;
use std::sync::Arc;

use egui::epaint::{ClippedPrimitive, ImageDelta};
use egui::{Context, PlatformOutput, RawInput, TextureId, ViewportId};
use egui_ash_renderer::{DynamicRendering, Options};
use egui_demo_lib::DemoWindows;
use tracing::debug;

use ember_platform::{Window, WindowEvent};
use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::{DeletionQueue, Device, vk};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::error::{RendererError, RendererResult};
use crate::overlay::{FrameStats, FrameStatsTracker, Overlay, OverlayTarget};

/// Uploads egui textures and records egui meshes.
pub trait UiPainter {
    /// Creates or updates textures. Runs outside frame recording.
    fn set_textures(&mut self, textures: &[(TextureId, ImageDelta)]) -> RendererResult<()>;

    /// Releases textures no frame in flight refers to.
    fn free_textures(&mut self, ids: &[TextureId]) -> RendererResult<()>;

    /// Records `primitives` into `cmd` inside the active rendering pass.
    fn draw(
        &mut self,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        pixels_per_point: f32,
        primitives: &[ClippedPrimitive],
    ) -> RendererResult<()>;
}

fn overlay_error(e: impl std::fmt::Display) -> RendererError {
    RendererError::Overlay(e.to_string())
}

/// [`UiPainter`] backed by `egui-ash-renderer`.
pub struct AshPainter {
    renderer: egui_ash_renderer::Renderer,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    // The renderer frees its allocations on drop, so the device and its
    // allocator must outlive it.
    _device: Arc<Device>,
}

impl AshPainter {
    pub fn new(target: &OverlayTarget<'_>, deletion: &mut DeletionQueue) -> RendererResult<Self> {
        let device = target.device;
        let graphics = device.queue_families().graphics;
        let command_pool = CommandPool::new(device.clone(), graphics, deletion)?;

        let renderer = egui_ash_renderer::Renderer::with_gpu_allocator(
            device.shared_allocator(),
            device.handle().clone(),
            DynamicRendering {
                color_attachment_format: target.color_format,
                depth_attachment_format: Some(target.depth_format),
            },
            Options {
                in_flight_frames: MAX_FRAMES_IN_FLIGHT,
                ..Default::default()
            },
        )
        .map_err(overlay_error)?;

        debug!(
            "egui renderer created for {:?} color, {:?} depth",
            target.color_format, target.depth_format
        );

        Ok(Self {
            renderer,
            queue: device.queues().graphics,
            command_pool: command_pool.handle(),
            _device: device.clone(),
        })
    }
}

impl UiPainter for AshPainter {
    fn set_textures(&mut self, textures: &[(TextureId, ImageDelta)]) -> RendererResult<()> {
        self.renderer
            .set_textures(self.queue, self.command_pool, textures)
            .map_err(overlay_error)
    }

    fn free_textures(&mut self, ids: &[TextureId]) -> RendererResult<()> {
        self.renderer.free_textures(ids).map_err(overlay_error)
    }

    fn draw(
        &mut self,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        pixels_per_point: f32,
        primitives: &[ClippedPrimitive],
    ) -> RendererResult<()> {
        self.renderer
            .cmd_draw(cmd, extent, pixels_per_point, primitives)
            .map_err(overlay_error)
    }
}

/// Output of one egui frame, waiting to be recorded.
struct UiFrame {
    primitives: Vec<ClippedPrimitive>,
    pixels_per_point: f32,
}

/// Frame statistics and the egui demo, drawn over the scene.
pub struct EguiOverlay {
    ctx: Context,
    winit: Option<egui_winit::State>,
    painter: Option<Box<dyn UiPainter>>,
    demo: DemoWindows,
    stats: FrameStatsTracker,
    pending: Option<UiFrame>,
    // Texture frees per egui frame, oldest first.
    free_queued: VecDeque<Vec<TextureId>>,
    max_texture_side: Option<usize>,
}

impl EguiOverlay {
    pub fn new(stats: FrameStatsTracker) -> Self {
        Self {
            ctx: Context::default(),
            winit: None,
            painter: None,
            demo: DemoWindows::default(),
            stats,
            pending: None,
            free_queued: VecDeque::with_capacity(MAX_FRAMES_IN_FLIGHT + 1),
            max_texture_side: None,
        }
    }

    /// Uses `painter` instead of creating an [`AshPainter`] on attach.
    pub fn with_painter(mut self, painter: Box<dyn UiPainter>) -> Self {
        self.painter = Some(painter);
        self
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    #[inline]
    pub fn stats(&self) -> &FrameStatsTracker {
        &self.stats
    }

    fn painter(&mut self) -> RendererResult<&mut Box<dyn UiPainter>> {
        self.painter
            .as_mut()
            .ok_or_else(|| RendererError::Overlay("overlay used before attach".to_string()))
    }

    /// Runs one egui frame on `raw_input`, uploads the textures it needs and
    /// tessellates its shapes for the next [`paint`](Self::paint).
    pub fn run(&mut self, raw_input: RawInput) -> RendererResult<PlatformOutput> {
        let report = self.stats.last_report().copied();
        let output = self.ctx.run(raw_input, |ctx| {
            stats_window(ctx, report.as_ref());
            self.demo.ui(ctx);
        });

        // A texture freed by egui frame N may still be drawn by frame N, so it
        // is released once that frame's slot comes around again.
        self.free_queued.push_back(output.textures_delta.free);
        let freed = if self.free_queued.len() > MAX_FRAMES_IN_FLIGHT {
            self.free_queued.pop_front().unwrap_or_default()
        } else {
            Vec::new()
        };
        let painter = self.painter()?;
        if !freed.is_empty() {
            painter.free_textures(&freed)?;
        }
        if !output.textures_delta.set.is_empty() {
            painter.set_textures(&output.textures_delta.set)?;
        }

        let primitives = self.ctx.tessellate(output.shapes, output.pixels_per_point);
        self.pending = Some(UiFrame {
            primitives,
            pixels_per_point: output.pixels_per_point,
        });
        Ok(output.platform_output)
    }

    /// Records the meshes of the last [`run`](Self::run) into `cmd`.
    ///
    /// Returns false when there was nothing to paint.
    pub fn paint(&mut self, cmd: vk::CommandBuffer, extent: vk::Extent2D) -> RendererResult<bool> {
        let Some(frame) = self.pending.take() else {
            return Ok(false);
        };
        self.painter()?
            .draw(cmd, extent, frame.pixels_per_point, &frame.primitives)?;
        Ok(true)
    }

    fn winit_state(&mut self, window: &Window) -> &mut egui_winit::State {
        let ctx = &self.ctx;
        let max_texture_side = self.max_texture_side;
        self.winit.get_or_insert_with(|| {
            let inner = window.inner();
            egui_winit::State::new(
                ctx.clone(),
                ViewportId::ROOT,
                inner,
                Some(inner.scale_factor() as f32),
                inner.theme(),
                max_texture_side,
            )
        })
    }
}

impl Default for EguiOverlay {
    fn default() -> Self {
        Self::new(FrameStatsTracker::default())
    }
}

impl Overlay for EguiOverlay {
    fn attach(
        &mut self,
        target: &OverlayTarget<'_>,
        deletion: &mut DeletionQueue,
    ) -> RendererResult<()> {
        self.max_texture_side = Some(target.device.limits().max_image_dimension2_d as usize);
        if self.painter.is_none() {
            self.painter = Some(Box::new(AshPainter::new(target, deletion)?));
        }
        Ok(())
    }

    fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state(window)
            .on_window_event(window.inner(), event)
            .consumed
    }

    fn new_frame(&mut self, window: &Window) -> RendererResult<()> {
        self.stats.tick();
        let raw_input = self.winit_state(window).take_egui_input(window.inner());
        let platform_output = self.run(raw_input)?;
        self.winit_state(window)
            .handle_platform_output(window.inner(), platform_output);
        Ok(())
    }

    fn record(&mut self, cmd: &CommandBuffer, extent: vk::Extent2D) -> RendererResult<()> {
        self.paint(cmd.handle(), extent)?;
        Ok(())
    }
}

fn stats_window(ctx: &Context, report: Option<&FrameStats>) {
    egui::Window::new("Frame time")
        .default_pos([12.0, 12.0])
        .resizable(false)
        .show(ctx, |ui| {
            if let Some(stats) = report {
                ui.label(format!(
                    "{:.2} ms ({:.0} fps)",
                    stats.mean().as_secs_f64() * 1000.0,
                    stats.fps()
                ));
                ui.label(format!(
                    "min {:.2} ms, max {:.2} ms over {} frames",
                    stats.min().as_secs_f64() * 1000.0,
                    stats.max().as_secs_f64() * 1000.0,
                    stats.count()
                ));
            } else {
                ui.label("measuring");
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use ember_rhi::vk::Handle;

    #[derive(Default)]
    struct PaintLog {
        uploaded: Vec<TextureId>,
        freed: Vec<TextureId>,
        /// (command buffer, extent, primitive count)
        draws: Vec<(vk::CommandBuffer, vk::Extent2D, usize)>,
    }

    struct RecordingPainter(Rc<RefCell<PaintLog>>);

    impl UiPainter for RecordingPainter {
        fn set_textures(&mut self, textures: &[(TextureId, ImageDelta)]) -> RendererResult<()> {
            let mut log = self.0.borrow_mut();
            log.uploaded.extend(textures.iter().map(|(id, _)| *id));
            Ok(())
        }

        fn free_textures(&mut self, ids: &[TextureId]) -> RendererResult<()> {
            self.0.borrow_mut().freed.extend_from_slice(ids);
            Ok(())
        }

        fn draw(
            &mut self,
            cmd: vk::CommandBuffer,
            extent: vk::Extent2D,
            _pixels_per_point: f32,
            primitives: &[ClippedPrimitive],
        ) -> RendererResult<()> {
            self.0.borrow_mut().draws.push((cmd, extent, primitives.len()));
            Ok(())
        }
    }

    fn overlay() -> (EguiOverlay, Rc<RefCell<PaintLog>>) {
        let log = Rc::new(RefCell::new(PaintLog::default()));
        let overlay = EguiOverlay::default().with_painter(Box::new(RecordingPainter(log.clone())));
        (overlay, log)
    }

    fn input() -> RawInput {
        RawInput {
            screen_rect: Some(egui::Rect::from_min_size(
                egui::Pos2::ZERO,
                egui::vec2(800.0, 600.0),
            )),
            ..Default::default()
        }
    }

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn test_first_frame_uploads_font_atlas() {
        let (mut overlay, log) = overlay();
        overlay.run(input()).unwrap();
        assert!(log.borrow().uploaded.contains(&TextureId::default()));
    }

    #[test]
    fn test_paint_records_ui_meshes() {
        let (mut overlay, log) = overlay();
        overlay.run(input()).unwrap();

        let cmd = vk::CommandBuffer::from_raw(7);
        assert!(overlay.paint(cmd, EXTENT).unwrap());

        let log = log.borrow();
        assert_eq!(log.draws.len(), 1);
        let (recorded_cmd, extent, primitives) = log.draws[0];
        assert_eq!(recorded_cmd, cmd);
        assert_eq!(extent, EXTENT);
        assert!(primitives > 0);
    }

    #[test]
    fn test_each_run_paints_once() {
        let (mut overlay, log) = overlay();
        assert!(!overlay.paint(vk::CommandBuffer::null(), EXTENT).unwrap());

        overlay.run(input()).unwrap();
        assert!(overlay.paint(vk::CommandBuffer::null(), EXTENT).unwrap());
        assert!(!overlay.paint(vk::CommandBuffer::null(), EXTENT).unwrap());

        overlay.run(input()).unwrap();
        assert!(overlay.paint(vk::CommandBuffer::null(), EXTENT).unwrap());
        assert_eq!(log.borrow().draws.len(), 2);
    }

    #[test]
    fn test_texture_free_waits_for_frames_in_flight() {
        let (mut overlay, log) = overlay();
        let texture = overlay.context().load_texture(
            "swatch",
            egui::ColorImage::new([1, 1], egui::Color32::WHITE),
            egui::TextureOptions::default(),
        );
        let id = texture.id();
        overlay.run(input()).unwrap();
        assert!(log.borrow().uploaded.contains(&id));

        drop(texture);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            overlay.run(input()).unwrap();
            assert!(!log.borrow().freed.contains(&id));
        }
        overlay.run(input()).unwrap();
        assert!(log.borrow().freed.contains(&id));
    }

    #[test]
    fn test_run_needs_a_painter() {
        let mut overlay = EguiOverlay::default();
        assert!(matches!(
            overlay.run(input()),
            Err(RendererError::Overlay(_))
        ));
    }
}
