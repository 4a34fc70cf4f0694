//! UI overlay hook.
//!
//! An [`Overlay`] records into the scene's dynamic rendering pass after the
//! geometry, so anything it draws lands in the offscreen target and goes
//! through post-processing with the rest of the frame. The egui
//! implementation lives in [`ui`](crate::ui).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use ember_platform::{Window, WindowEvent};
use ember_rhi::command::CommandBuffer;
use ember_rhi::{DeletionQueue, Device, vk};

use crate::error::RendererResult;

/// The device and attachment formats an overlay draws with.
pub struct OverlayTarget<'a> {
    pub device: &'a Arc<Device>,
    /// Format of the offscreen color target.
    pub color_format: vk::Format,
    /// Format of the depth attachment bound during the pass.
    pub depth_format: vk::Format,
}

pub trait Overlay {
    /// Creates GPU objects once the device and target formats are known.
    ///
    /// Called once, before the first frame. Objects registered with
    /// `deletion` are released with the rest of the renderer.
    fn attach(
        &mut self,
        _target: &OverlayTarget<'_>,
        _deletion: &mut DeletionQueue,
    ) -> RendererResult<()> {
        Ok(())
    }

    /// Offers a window event. Returns true when the overlay consumed it.
    fn on_window_event(&mut self, _window: &Window, _event: &WindowEvent) -> bool {
        false
    }

    /// Called once per frame, after the frame slot is free and before
    /// recording starts.
    fn new_frame(&mut self, window: &Window) -> RendererResult<()>;

    /// Records overlay draws into a target of `extent`. Rendering is active
    /// when this is called.
    fn record(&mut self, cmd: &CommandBuffer, extent: vk::Extent2D) -> RendererResult<()>;
}

/// Draws nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn new_frame(&mut self, _window: &Window) -> RendererResult<()> {
        Ok(())
    }

    fn record(&mut self, _cmd: &CommandBuffer, _extent: vk::Extent2D) -> RendererResult<()> {
        Ok(())
    }
}

/// Running frame time statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    count: u32,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl FrameStats {
    pub fn push(&mut self, frame_time: Duration) {
        if self.count == 0 {
            self.min = frame_time;
            self.max = frame_time;
        } else {
            self.min = self.min.min(frame_time);
            self.max = self.max.max(frame_time);
        }
        self.count += 1;
        self.total += frame_time;
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn min(&self) -> Duration {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }

    pub fn fps(&self) -> f64 {
        let mean = self.mean().as_secs_f64();
        if mean > 0.0 { 1.0 / mean } else { 0.0 }
    }
}

/// Collects frame times in windows of `window` frames.
///
/// The last full window is kept for display and optionally logged.
#[derive(Debug)]
pub struct FrameStatsTracker {
    stats: FrameStats,
    last_report: Option<FrameStats>,
    last_frame: Option<Instant>,
    window: u32,
    log_reports: bool,
}

impl FrameStatsTracker {
    pub fn new(window: u32) -> Self {
        Self {
            stats: FrameStats::default(),
            last_report: None,
            last_frame: None,
            window: window.max(1),
            log_reports: false,
        }
    }

    /// Logs every completed window at `info` level.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.log_reports = enable;
        self
    }

    /// Statistics of the window being collected.
    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Statistics of the last completed window.
    #[inline]
    pub fn last_report(&self) -> Option<&FrameStats> {
        self.last_report.as_ref()
    }

    /// Adds one frame time, restarting the window when it is full.
    /// Returns the statistics of the window that was just completed.
    pub fn push(&mut self, frame_time: Duration) -> Option<FrameStats> {
        self.stats.push(frame_time);
        if self.stats.count() < self.window {
            return None;
        }

        let report = std::mem::take(&mut self.stats);
        if self.log_reports {
            info!(
                "Frame time over {} frames: mean {:.2} ms ({:.1} fps), min {:.2} ms, max {:.2} ms",
                report.count(),
                report.mean().as_secs_f64() * 1000.0,
                report.fps(),
                report.min().as_secs_f64() * 1000.0,
                report.max().as_secs_f64() * 1000.0
            );
        }
        self.last_report = Some(report);
        Some(report)
    }

    /// Records the time since the previous call. The first call only starts
    /// the clock.
    pub fn tick(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            self.push(now - last);
        }
    }
}

impl Default for FrameStatsTracker {
    fn default() -> Self {
        Self::new(120)
    }
}
