//! RHI error types.

use ash::vk;
use thiserror::Error;

/// Error type for every GPU-side operation.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader binary could not be read or was malformed
    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A buffer write or resource description was out of range
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Pipeline state was incomplete or inconsistent at build time
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Image copy between targets of different sizes
    #[error("Image copy extent mismatch: source {src:?}, destination {dst:?}")]
    ExtentMismatch { src: vk::Extent3D, dst: vk::Extent3D },

    /// Compute dispatch over an extent the workgroup size does not tile
    #[error("Invalid dispatch: extent {extent:?} is not tiled by local size {local_size:?}")]
    InvalidDispatch {
        extent: vk::Extent2D,
        local_size: [u32; 2],
    },

    /// The deletion queue was already flushed
    #[error("Deletion queue already flushed")]
    DeletionQueueClosed,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
