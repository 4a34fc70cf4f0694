//! Vulkan render hardware interface.
//!
//! Thin wrappers over `ash` covering what the renderer needs:
//! - instance, physical device selection and logical device creation
//! - the swapchain and frame synchronization primitives
//! - buffers and images allocated through `gpu-allocator`
//! - graphics and compute pipelines for dynamic rendering
//! - a [`DeletionQueue`] that releases every handle exactly once, in reverse
//!   creation order, after the device is idle

mod error;

pub mod allocator;
pub mod barrier;
pub mod buffer;
pub mod command;
pub mod deletion;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod vertex;

pub use allocator::{ResourceAllocator, pad_to_alignment};
pub use buffer::{AllocatedBuffer, BufferUsage};
pub use command::{CommandBuffer, CommandPool};
pub use deletion::{DeletionQueue, PendingRelease, ReleaseId, ReleaseSink};
pub use device::Device;
pub use error::{RhiError, RhiResult};
pub use image::AllocatedImage;
pub use instance::Instance;
pub use upload::UploadContext;

// Re-export ash types that users might need
pub use ash::vk;
