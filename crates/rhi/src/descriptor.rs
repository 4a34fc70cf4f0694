//! Descriptor set layouts, pools and writes.
//!
//! Layouts and pools are registered with the deletion queue; sets are freed
//! with their pool.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::deletion::{DeletionQueue, PendingRelease};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Creates a set layout from `bindings`.
pub fn create_set_layout(
    device: &Device,
    bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    deletion: &mut DeletionQueue,
) -> RhiResult<vk::DescriptorSetLayout> {
    deletion.ensure_open()?;
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
    let layout = unsafe {
        device
            .handle()
            .create_descriptor_set_layout(&create_info, None)?
    };
    deletion.push(PendingRelease::DescriptorSetLayout(layout))?;
    debug!("Created descriptor set layout with {} binding(s)", bindings.len());
    Ok(layout)
}

/// Single-descriptor layout bindings.
pub mod binding {
    use ash::vk;

    fn single(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stages)
    }

    pub fn uniform_buffer_dynamic(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        single(binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, stages)
    }

    pub fn combined_image_sampler(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        single(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stages)
    }

    pub fn storage_image(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        single(binding, vk::DescriptorType::STORAGE_IMAGE, stages)
    }
}

/// A descriptor pool sized up front for every set the renderer allocates.
pub struct DescriptorPool {
    device: Arc<Device>,
    handle: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Self> {
        deletion.ensure_open()?;
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let handle = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        deletion.push(PendingRelease::DescriptorPool(handle))?;
        debug!(
            "Created descriptor pool: max_sets={}, {} pool size(s)",
            max_sets,
            pool_sizes.len()
        );
        Ok(Self { device, handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    /// Allocates one set with `layout`.
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.handle)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        sets.into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidResource("driver returned no descriptor set".to_string()))
    }
}

/// Accumulates descriptor writes for one set and applies them together.
pub struct DescriptorWriter {
    set: vk::DescriptorSet,
    buffers: Vec<(u32, vk::DescriptorType, vk::DescriptorBufferInfo)>,
    images: Vec<(u32, vk::DescriptorType, vk::DescriptorImageInfo)>,
}

impl DescriptorWriter {
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            buffers: Vec::new(),
            images: Vec::new(),
        }
    }

    /// A dynamic uniform buffer window of `range` bytes starting at offset 0.
    pub fn uniform_buffer_dynamic(mut self, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        let info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        };
        self.buffers
            .push((binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, info));
        self
    }

    pub fn storage_image(mut self, binding: u32, view: vk::ImageView) -> Self {
        let info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::GENERAL,
        };
        self.images
            .push((binding, vk::DescriptorType::STORAGE_IMAGE, info));
        self
    }

    pub fn combined_image_sampler(
        mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        self.images
            .push((binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, info));
        self
    }

    /// Number of pending writes.
    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write(self, device: &Device) {
        let buffer_writes = self.buffers.iter().map(|(binding, ty, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(*binding)
                .descriptor_type(*ty)
                .buffer_info(std::slice::from_ref(info))
        });
        let image_writes = self.images.iter().map(|(binding, ty, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(*binding)
                .descriptor_type(*ty)
                .image_info(std::slice::from_ref(info))
        });
        let writes: Vec<vk::WriteDescriptorSet<'_>> = buffer_writes.chain(image_writes).collect();

        if !writes.is_empty() {
            unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_binding_helpers() {
        let b = binding::uniform_buffer_dynamic(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(b.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
        assert_eq!(b.descriptor_count, 1);
        assert_eq!(b.stage_flags, vk::ShaderStageFlags::VERTEX);

        let b = binding::storage_image(1, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(b.binding, 1);
        assert_eq!(b.descriptor_type, vk::DescriptorType::STORAGE_IMAGE);

        let b = binding::combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(b.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }

    #[test]
    fn test_writer_collects_writes() {
        let writer = DescriptorWriter::new(vk::DescriptorSet::from_raw(1))
            .storage_image(0, vk::ImageView::from_raw(2))
            .storage_image(1, vk::ImageView::from_raw(3))
            .uniform_buffer_dynamic(2, vk::Buffer::from_raw(4), 32);
        assert_eq!(writer.len(), 3);
        assert!(!writer.is_empty());
        assert_eq!(writer.images[1].2.image_layout, vk::ImageLayout::GENERAL);
        assert_eq!(writer.buffers[0].2.range, 32);
    }
}
