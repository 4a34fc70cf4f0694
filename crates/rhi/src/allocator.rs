//! Buffer and image creation on top of gpu-allocator.
//!
//! Every object created here is registered with the [`DeletionQueue`] in the
//! same call, so the caller never holds memory that has no release record.
//! If a later step of a creation fails, the pieces made so far are destroyed
//! immediately and nothing is registered.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::buffer::{AllocatedBuffer, BufferUsage};
use crate::deletion::{DeletionQueue, PendingRelease};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{AllocatedImage, full_subresource_range};

/// Rounds `size` up to the next multiple of `alignment`.
///
/// An alignment of zero leaves the size unchanged.
#[inline]
pub const fn pad_to_alignment(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        size
    } else {
        size.div_ceil(alignment) * alignment
    }
}

/// Creates GPU buffers and images and records their release.
pub struct ResourceAllocator {
    device: Arc<Device>,
    min_uniform_alignment: vk::DeviceSize,
}

impl ResourceAllocator {
    pub fn new(device: Arc<Device>) -> Self {
        let min_uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;
        debug!(
            "Resource allocator ready (uniform alignment {} bytes)",
            min_uniform_alignment
        );
        Self {
            device,
            min_uniform_alignment,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn min_uniform_alignment(&self) -> vk::DeviceSize {
        self.min_uniform_alignment
    }

    /// Rounds `size` up to the device's dynamic uniform offset alignment.
    #[inline]
    pub fn pad_uniform_buffer_size(&self, size: usize) -> vk::DeviceSize {
        pad_to_alignment(size as u64, self.min_uniform_alignment)
    }

    /// Creates a buffer, binds memory in `location` and registers its release.
    pub fn create_buffer(
        &self,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<AllocatedBuffer> {
        deletion.ensure_open()?;

        if size == 0 {
            return Err(RhiError::InvalidResource(format!(
                "buffer '{}' has zero size",
                name
            )));
        }

        let device = self.device.handle();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };

        let allocation = match self.allocate(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(handle, None) };
                return Err(e);
            }
        };

        if let Err(e) =
            unsafe { device.bind_buffer_memory(handle, allocation.memory(), allocation.offset()) }
        {
            self.free(allocation);
            unsafe { device.destroy_buffer(handle, None) };
            return Err(e.into());
        }

        let mapped = allocation.mapped_ptr().map(|ptr| ptr.cast::<u8>());
        let token = deletion.push(PendingRelease::Buffer { handle, allocation })?;

        debug!(
            "Created buffer '{}': {} bytes, {:?}, {:?}",
            name, size, usage, location
        );

        Ok(AllocatedBuffer {
            handle,
            token,
            size,
            mapped,
        })
    }

    /// Shorthand for [`create_buffer`](Self::create_buffer) with a preset role.
    pub fn create_buffer_for(
        &self,
        name: &str,
        size: vk::DeviceSize,
        usage: BufferUsage,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<AllocatedBuffer> {
        self.create_buffer(
            name,
            size,
            usage.to_vk_usage(),
            usage.memory_location(),
            deletion,
        )
    }

    /// Creates a device-local 2D image plus a view over `aspect`.
    ///
    /// The image is registered before its view, so the view is released
    /// first.
    pub fn create_image(
        &self,
        name: &str,
        format: vk::Format,
        extent: vk::Extent3D,
        aspect: vk::ImageAspectFlags,
        usage: vk::ImageUsageFlags,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<AllocatedImage> {
        deletion.ensure_open()?;

        if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
            return Err(RhiError::InvalidResource(format!(
                "image '{}' has an empty extent {}x{}x{}",
                name, extent.width, extent.height, extent.depth
            )));
        }

        let device = self.device.handle();
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = unsafe { device.create_image(&image_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(handle) };

        let allocation = match self.allocate(name, requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(handle, None) };
                return Err(e);
            }
        };

        if let Err(e) =
            unsafe { device.bind_image_memory(handle, allocation.memory(), allocation.offset()) }
        {
            self.free(allocation);
            unsafe { device.destroy_image(handle, None) };
            return Err(e.into());
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(full_subresource_range(aspect));

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                self.free(allocation);
                unsafe { device.destroy_image(handle, None) };
                return Err(e.into());
            }
        };

        let token = deletion.push(PendingRelease::Image { handle, allocation })?;
        deletion.push(PendingRelease::ImageView(view))?;

        debug!(
            "Created image '{}': {}x{} {:?}",
            name, extent.width, extent.height, format
        );

        Ok(AllocatedImage {
            handle,
            view,
            format,
            extent,
            token,
        })
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> RhiResult<Allocation> {
        let allocation = self.device.lock_allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    fn free(&self, allocation: Allocation) {
        if let Err(e) = self.device.lock_allocator().free(allocation) {
            error!("Failed to free allocation after a failed creation: {:?}", e);
        }
    }
}
