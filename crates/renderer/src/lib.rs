//! Frame orchestration for the ember renderer.
//!
//! This crate turns a loaded scene into presented frames:
//! - [`FrameRing`](frame_ring::FrameRing): frames in flight and their fences
//! - [`FrameRecording`](recorder::FrameRecording): the per-frame layout
//!   transition protocol (render, post-process, copy, present)
//! - [`draw_nodes`](draw::draw_nodes): one indexed draw per scene node
//! - [`EguiOverlay`](ui::EguiOverlay): egui drawn into the scene pass
//! - [`Renderer`]: owns every GPU object and drives the loop

mod error;

pub mod draw;
pub mod frame_ring;
pub mod mesh;
pub mod overlay;
pub mod recorder;
pub mod renderer;
pub mod targets;
pub mod ubo;
pub mod ui;

pub use error::{RendererError, RendererResult};
pub use overlay::{FrameStatsTracker, NoOverlay, Overlay, OverlayTarget};
pub use renderer::Renderer;
pub use ui::EguiOverlay;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
