//! Offscreen, depth and post-process images.

use tracing::info;

use ember_rhi::{AllocatedImage, DeletionQueue, ResourceAllocator, RhiResult, vk};

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Rendered into, then read by the compute pass as a storage image.
pub const OFFSCREEN_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::STORAGE.as_raw()
        | vk::ImageUsageFlags::TRANSFER_SRC.as_raw(),
);

/// Written by the compute pass, then copied into the swapchain image.
pub const COMPUTE_OUTPUT_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::STORAGE.as_raw() | vk::ImageUsageFlags::TRANSFER_SRC.as_raw(),
);

pub const DEPTH_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;

/// The images shared by every frame slot.
///
/// The offscreen and depth images are sized to the render resolution; the
/// compute output matches the swapchain so it can be copied unscaled.
#[derive(Clone, Copy, Debug)]
pub struct RenderTargets {
    pub offscreen: AllocatedImage,
    pub depth: AllocatedImage,
    pub compute_output: AllocatedImage,
}

impl RenderTargets {
    pub fn new(
        allocator: &ResourceAllocator,
        color_format: vk::Format,
        render_resolution: vk::Extent2D,
        swapchain_extent: vk::Extent2D,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Self> {
        let offscreen = allocator.create_image(
            "offscreen",
            color_format,
            extent_3d(render_resolution),
            vk::ImageAspectFlags::COLOR,
            OFFSCREEN_USAGE,
            deletion,
        )?;
        let depth = allocator.create_image(
            "depth",
            DEPTH_FORMAT,
            extent_3d(render_resolution),
            vk::ImageAspectFlags::DEPTH,
            DEPTH_USAGE,
            deletion,
        )?;
        let compute_output = allocator.create_image(
            "compute output",
            color_format,
            extent_3d(swapchain_extent),
            vk::ImageAspectFlags::COLOR,
            COMPUTE_OUTPUT_USAGE,
            deletion,
        )?;

        info!(
            "Render targets: {}x{} {:?}, post-process output {}x{}",
            render_resolution.width,
            render_resolution.height,
            color_format,
            swapchain_extent.width,
            swapchain_extent.height
        );

        Ok(Self {
            offscreen,
            depth,
            compute_output,
        })
    }

    /// Viewport and render area of the scene pass.
    #[inline]
    pub fn render_extent(&self) -> vk::Extent2D {
        self.offscreen.extent_2d()
    }
}

pub(crate) fn extent_3d(extent: vk::Extent2D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offscreen_is_storage_and_attachment() {
        assert!(OFFSCREEN_USAGE.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(OFFSCREEN_USAGE.contains(vk::ImageUsageFlags::STORAGE));
    }

    #[test]
    fn test_compute_output_can_be_copied() {
        assert!(COMPUTE_OUTPUT_USAGE.contains(vk::ImageUsageFlags::STORAGE));
        assert!(COMPUTE_OUTPUT_USAGE.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(!COMPUTE_OUTPUT_USAGE.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn test_extent_3d_has_unit_depth() {
        let extent = extent_3d(vk::Extent2D {
            width: 1600,
            height: 900,
        });
        assert_eq!((extent.width, extent.height, extent.depth), (1600, 900, 1));
    }
}
