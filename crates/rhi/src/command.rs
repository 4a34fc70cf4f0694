//! Command pools and command buffer recording.
//!
//! [`CommandPool`] handles are released by the deletion queue, which also
//! frees every buffer allocated from them. [`CommandBuffer`] wraps the
//! recording calls the renderer and the upload context use.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::deletion::{DeletionQueue, PendingRelease};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A command pool bound to one queue family.
#[derive(Clone)]
pub struct CommandPool {
    device: Arc<Device>,
    handle: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a pool whose buffers can be reset individually.
    pub fn new(
        device: Arc<Device>,
        queue_family_index: u32,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Self> {
        deletion.ensure_open()?;

        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let handle = unsafe { device.handle().create_command_pool(&create_info, None)? };
        deletion.push(PendingRelease::CommandPool(handle))?;

        debug!("Created command pool for queue family {}", queue_family_index);

        Ok(Self {
            device,
            handle,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates one primary command buffer.
    pub fn allocate(&self) -> RhiResult<CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        let buffer = buffers.into_iter().next().ok_or_else(|| {
            RhiError::InvalidResource("driver returned no command buffer".to_string())
        })?;

        Ok(CommandBuffer {
            device: self.device.clone(),
            buffer,
        })
    }
}

/// A primary command buffer.
#[derive(Clone)]
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Begins a one-time-submit recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?
        };
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// Returns the buffer to the initial state so it can be re-recorded.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    // Dynamic rendering

    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo<'_>) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info)
        };
    }

    pub fn end_rendering(&self) {
        unsafe { self.device.handle().cmd_end_rendering(self.buffer) };
    }

    // Binding

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_pipeline(self.buffer, bind_point, pipeline)
        };
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0])
        };
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(self.buffer, buffer, 0, index_type)
        };
    }

    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                bind_point,
                layout,
                0,
                sets,
                dynamic_offsets,
            )
        };
    }

    // Work

    pub fn draw_indexed(&self, index_count: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0)
        };
    }

    pub fn dispatch(&self, groups: [u32; 3]) {
        unsafe {
            self.device
                .handle()
                .cmd_dispatch(self.buffer, groups[0], groups[1], groups[2])
        };
    }

    // Synchronization

    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                memory_barriers,
                &[],
                image_barriers,
            )
        };
    }

    // Copies

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, &[region])
        };
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::BufferImageCopy,
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer_to_image(self.buffer, src, dst, dst_layout, &[region])
        };
    }

    /// Copies texels between images. Use [`image_copy_region`] to build a
    /// validated region.
    ///
    /// [`image_copy_region`]: crate::barrier::image_copy_region
    pub fn copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::ImageCopy,
    ) {
        unsafe {
            self.device.handle().cmd_copy_image(
                self.buffer,
                src,
                src_layout,
                dst,
                dst_layout,
                &[region],
            )
        };
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("handle", &self.buffer)
            .finish()
    }
}
