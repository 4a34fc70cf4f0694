//! Blocking uploads through the transfer queue.
//!
//! The [`UploadContext`] owns one command buffer and one fence on the
//! transfer family. Each [`immediate_submit`](UploadContext::immediate_submit)
//! records a closure, submits it and waits for completion. It is only used at
//! load time.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::allocator::ResourceAllocator;
use crate::barrier::ImageTransition;
use crate::buffer::{AllocatedBuffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::deletion::DeletionQueue;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::AllocatedImage;
use crate::sync::Fence;

pub struct UploadContext {
    device: Arc<Device>,
    cmd: CommandBuffer,
    fence: Fence,
    queue_family: u32,
}

impl UploadContext {
    pub fn new(device: Arc<Device>, deletion: &mut DeletionQueue) -> RhiResult<Self> {
        let queue_family = device.queue_families().transfer;
        let pool = CommandPool::new(device.clone(), queue_family, deletion)?;
        let cmd = pool.allocate()?;
        let fence = Fence::new(device.clone(), false, deletion)?;
        debug!("Upload context ready on queue family {}", queue_family);
        Ok(Self {
            device,
            cmd,
            fence,
            queue_family,
        })
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Records `record` into the upload command buffer, submits it to the
    /// transfer queue and blocks until it has executed.
    pub fn immediate_submit<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        self.cmd.reset()?;
        self.cmd.begin()?;
        record(&self.cmd)?;
        self.cmd.end()?;

        let command_buffers = [self.cmd.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        self.device.submit_transfer(&[submit], self.fence.handle())?;

        self.fence.wait(u64::MAX)?;
        self.fence.reset()
    }

    /// Creates a device-local buffer filled with `bytes` through a staging
    /// copy. Both buffers are registered with `deletion`.
    pub fn upload_buffer(
        &self,
        allocator: &ResourceAllocator,
        name: &str,
        bytes: &[u8],
        usage: BufferUsage,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<AllocatedBuffer> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = self.staging(allocator, name, bytes, deletion)?;
        let buffer = allocator.create_buffer_for(name, size, usage, deletion)?;

        self.immediate_submit(|cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), size);
            Ok(())
        })?;

        debug!("Uploaded {} bytes to {} buffer '{}'", size, usage.name(), name);
        Ok(buffer)
    }

    /// Creates a sampled 2D image from tightly packed RGBA8 texels and leaves
    /// it in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_rgba8(
        &self,
        allocator: &ResourceAllocator,
        name: &str,
        texels: &[u8],
        extent: vk::Extent2D,
        format: vk::Format,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<AllocatedImage> {
        let expected = extent.width as usize * extent.height as usize * 4;
        if texels.len() != expected {
            return Err(RhiError::InvalidResource(format!(
                "texture '{}' has {} bytes, expected {} for {}x{} RGBA8",
                name,
                texels.len(),
                expected,
                extent.width,
                extent.height
            )));
        }

        let staging = self.staging(allocator, name, texels, deletion)?;
        let image_extent = vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        };
        let image = allocator.create_image(
            name,
            format,
            image_extent,
            vk::ImageAspectFlags::COLOR,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            deletion,
        )?;

        let family = self.queue_family;
        self.immediate_submit(|cmd| {
            ImageTransition::color(
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                family,
            )
            .record(cmd);

            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(image_extent);
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                region,
            );

            ImageTransition::color(
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                family,
            )
            .record(cmd);
            Ok(())
        })?;

        debug!(
            "Uploaded texture '{}' ({}x{})",
            name, extent.width, extent.height
        );
        Ok(image)
    }

    fn staging(
        &self,
        allocator: &ResourceAllocator,
        name: &str,
        bytes: &[u8],
        deletion: &mut DeletionQueue,
    ) -> RhiResult<AllocatedBuffer> {
        let staging_name = format!("{} (staging)", name);
        let staging = allocator.create_buffer_for(
            &staging_name,
            bytes.len() as vk::DeviceSize,
            BufferUsage::Staging,
            deletion,
        )?;
        staging.write(0, bytes)?;
        Ok(staging)
    }
}
