//! Image layout transitions, full barriers and validated copy/dispatch shapes.

use ash::vk;

use crate::command::CommandBuffer;
use crate::error::{RhiError, RhiResult};
use crate::image::full_subresource_range;

/// One layout change of one image, owned by `queue_family` on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
    pub queue_family: u32,
}

impl ImageTransition {
    pub fn color(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        queue_family: u32,
    ) -> Self {
        Self {
            image,
            old_layout,
            new_layout,
            aspect: vk::ImageAspectFlags::COLOR,
            queue_family,
        }
    }

    pub fn depth(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        queue_family: u32,
    ) -> Self {
        Self {
            aspect: vk::ImageAspectFlags::DEPTH,
            ..Self::color(image, old_layout, new_layout, queue_family)
        }
    }

    /// The barrier describing this transition.
    pub fn barrier(&self) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(self.queue_family)
            .dst_queue_family_index(self.queue_family)
            .image(self.image)
            .subresource_range(full_subresource_range(self.aspect))
    }

    /// Records the transition as a bottom-of-pipe to top-of-pipe barrier.
    pub fn record(&self, cmd: &CommandBuffer) {
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            &[],
            &[self.barrier()],
        );
    }
}

/// Records an execution barrier across the whole pipeline with no
/// resources attached.
pub fn full_barrier(cmd: &CommandBuffer) {
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        &[],
        &[],
    );
}

/// Builds the region for an unscaled whole-image color copy.
///
/// Both images must have the same extent; nothing is recorded otherwise.
pub fn image_copy_region(src: vk::Extent3D, dst: vk::Extent3D) -> RhiResult<vk::ImageCopy> {
    if src != dst {
        return Err(RhiError::ExtentMismatch { src, dst });
    }

    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };

    Ok(vk::ImageCopy {
        src_subresource: layers,
        src_offset: vk::Offset3D::default(),
        dst_subresource: layers,
        dst_offset: vk::Offset3D::default(),
        extent: src,
    })
}

/// Workgroup counts covering `extent` with `local_size` invocations each.
///
/// The extent must be non-zero and an exact multiple of the local size.
pub fn dispatch_grid(extent: vk::Extent2D, local_size: [u32; 2]) -> RhiResult<[u32; 3]> {
    let fits = |len: u32, local: u32| local != 0 && len != 0 && len % local == 0;

    if !fits(extent.width, local_size[0]) || !fits(extent.height, local_size[1]) {
        return Err(RhiError::InvalidDispatch { extent, local_size });
    }

    Ok([
        extent.width / local_size[0],
        extent.height / local_size[1],
        1,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn extent3(width: u32, height: u32) -> vk::Extent3D {
        vk::Extent3D {
            width,
            height,
            depth: 1,
        }
    }

    #[test]
    fn test_copy_region_equal_extents() {
        let region = image_copy_region(extent3(1600, 900), extent3(1600, 900)).unwrap();
        assert_eq!(region.extent, extent3(1600, 900));
        assert_eq!(region.src_subresource.layer_count, 1);
        assert_eq!(region.dst_offset, vk::Offset3D::default());
    }

    #[test]
    fn test_copy_region_rejects_mismatch() {
        let err = image_copy_region(extent3(1600, 900), extent3(1280, 720)).unwrap_err();
        match err {
            RhiError::ExtentMismatch { src, dst } => {
                assert_eq!(src.width, 1600);
                assert_eq!(dst.width, 1280);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_grid_halves_extent() {
        let extent = vk::Extent2D {
            width: 1600,
            height: 900,
        };
        assert_eq!(dispatch_grid(extent, [2, 2]).unwrap(), [800, 450, 1]);
    }

    #[test]
    fn test_dispatch_grid_rejects_indivisible() {
        let odd = vk::Extent2D {
            width: 1601,
            height: 900,
        };
        assert!(matches!(
            dispatch_grid(odd, [2, 2]),
            Err(RhiError::InvalidDispatch { .. })
        ));

        let empty = vk::Extent2D {
            width: 0,
            height: 900,
        };
        assert!(dispatch_grid(empty, [2, 2]).is_err());

        let even = vk::Extent2D {
            width: 4,
            height: 4,
        };
        assert!(dispatch_grid(even, [0, 2]).is_err());
    }

    #[test]
    fn test_transition_barrier_keeps_family() {
        let transition = ImageTransition::depth(
            vk::Image::from_raw(7),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            3,
        );
        let barrier = transition.barrier();
        assert_eq!(barrier.src_queue_family_index, 3);
        assert_eq!(barrier.dst_queue_family_index, 3);
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
    }
}
