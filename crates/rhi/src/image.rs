//! Images, views and samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::deletion::{DeletionQueue, PendingRelease, ReleaseId};
use crate::device::Device;
use crate::error::RhiResult;

/// An image and its default view, both released by the deletion queue.
#[derive(Clone, Copy, Debug)]
pub struct AllocatedImage {
    pub(crate) handle: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) format: vk::Format,
    pub(crate) extent: vk::Extent3D,
    pub(crate) token: ReleaseId,
}

impl AllocatedImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Width and height of the image.
    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    /// Deletion queue entry holding the allocation.
    #[inline]
    pub fn token(&self) -> ReleaseId {
        self.token
    }
}

/// Full single-mip, single-layer subresource range for `aspect`.
pub fn full_subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Creates a 2D view over `image` and registers it for release.
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    deletion: &mut DeletionQueue,
) -> RhiResult<vk::ImageView> {
    deletion.ensure_open()?;

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(full_subresource_range(aspect));

    let view = unsafe { device.handle().create_image_view(&view_info, None)? };
    deletion.push(PendingRelease::ImageView(view))?;
    Ok(view)
}

/// Creates the linear, repeating sampler shared by all mesh textures.
pub fn create_linear_sampler(
    device: &Arc<Device>,
    deletion: &mut DeletionQueue,
) -> RhiResult<vk::Sampler> {
    deletion.ensure_open()?;

    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .max_lod(vk::LOD_CLAMP_NONE);

    let sampler = unsafe { device.handle().create_sampler(&sampler_info, None)? };
    deletion.push(PendingRelease::Sampler(sampler))?;
    debug!("Created linear sampler");
    Ok(sampler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_full_subresource_range() {
        let range = full_subresource_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
        assert_eq!(range.base_mip_level, 0);
    }

    #[test]
    fn test_extent_2d_drops_depth() {
        let image = AllocatedImage {
            handle: vk::Image::from_raw(1),
            view: vk::ImageView::from_raw(2),
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 640,
                height: 480,
                depth: 1,
            },
            token: ReleaseId::from_index(3),
        };
        assert_eq!(
            image.extent_2d(),
            vk::Extent2D {
                width: 640,
                height: 480
            }
        );
        assert_eq!(image.token().index(), 3);
    }
}
