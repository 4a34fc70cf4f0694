//! Swapchain creation, image acquisition and presentation.
//!
//! Swapchain images are never rendered to directly: the frame's compute
//! output is copied into them, so they are created with `TRANSFER_DST`
//! usage. The swapchain and its views are released by the deletion queue.
//! Recreation on resize is not supported.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::deletion::{DeletionQueue, PendingRelease};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::create_image_view;

/// Surface formats in order of preference. Both are copy compatible with the
/// offscreen targets, which use the swapchain's format.
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

/// What the surface supports on the selected GPU.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }
}

/// The presentation swapchain. Dropping it releases nothing.
pub struct Swapchain {
    device: Arc<Device>,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain of the requested size on `surface`.
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        requested: vk::Extent2D,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Self> {
        deletion.ensure_open()?;

        let support = SurfaceSupport::query(device.physical_device(), surface, surface_loader)?;
        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::SwapchainError("surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, requested);
        let image_count = choose_image_count(&support.capabilities);

        if !support
            .capabilities
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::TRANSFER_DST)
        {
            return Err(RhiError::SwapchainError(
                "surface images cannot be copy destinations".to_string(),
            ));
        }

        let families = device.queue_families();
        let family_indices = [families.graphics, families.present];
        let (sharing_mode, shared_families) = if families.graphics != families.present {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let loader = device.swapchain_loader();
        let handle = unsafe { loader.create_swapchain(&create_info, None)? };
        deletion.push(PendingRelease::Swapchain(handle))?;

        let images = unsafe { loader.get_swapchain_images(handle)? };
        let views = images
            .iter()
            .map(|&image| {
                create_image_view(
                    &device,
                    image,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                    deletion,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Swapchain created: {}x{} {:?} {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            images.len()
        );

        Ok(Self {
            device,
            handle,
            images,
            views,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Blocks until an image is available, signalling `semaphore`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<u32> {
        let (index, suboptimal) = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.handle,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )?
        };
        if suboptimal {
            debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<()> {
        let swapchains = [self.handle];
        let indices = [image_index];
        let wait = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);

        unsafe {
            self.device
                .swapchain_loader()
                .queue_present(self.device.queues().present, &present_info)?
        };
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Image at `index`, as returned by [`acquire_next_image`](Self::acquire_next_image).
    pub fn image(&self, index: u32) -> RhiResult<vk::Image> {
        self.images.get(index as usize).copied().ok_or_else(|| {
            RhiError::SwapchainError(format!(
                "image index {} out of range ({} images)",
                index,
                self.images.len()
            ))
        })
    }

    #[inline]
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    for preferred in PREFERRED_FORMATS {
        if let Some(format) = formats.iter().find(|f| {
            f.format == preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            return Some(*format);
        }
    }
    let fallback = formats.first().copied();
    if let Some(format) = fallback {
        warn!("Using first available surface format {:?}", format.format);
    }
    fallback
}

fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // Always available.
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_format_preference() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::R8G8B8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert_eq!(
            choose_surface_format(&formats[..2]).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_UNORM)
        );
        assert_eq!(
            choose_surface_format(&formats[..1]).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_mailbox_preferred_over_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_follows_surface_or_clamps() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 2048,
                height: 2048,
            },
            ..Default::default()
        };
        let requested = vk::Extent2D {
            width: 4000,
            height: 10,
        };
        assert_eq!(choose_extent(&capabilities, requested).width, 1280);

        capabilities.current_extent.width = u32::MAX;
        let extent = choose_extent(&capabilities, requested);
        assert_eq!((extent.width, extent.height), (2048, 64));
    }

    #[test]
    fn test_image_count_respects_maximum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&unbounded), 3);
    }
}
