//! Renderer error type.

use ember_rhi::RhiError;
use ember_scene::SceneError;
use thiserror::Error;

/// Error type for renderer setup and per-frame work.
///
/// Every variant is fatal to the render loop.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// The scene could not be flattened or references missing meshes.
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Window or surface failure from the platform layer.
    #[error("Platform error: {0}")]
    Platform(#[from] ember_core::Error),

    #[error("Draw error: {0}")]
    Draw(String),

    /// The UI overlay failed to upload or record.
    #[error("Overlay error: {0}")]
    Overlay(String),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
