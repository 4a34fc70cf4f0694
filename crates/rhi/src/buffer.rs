//! GPU buffers created through the [`ResourceAllocator`](crate::allocator::ResourceAllocator).
//!
//! - [`BufferUsage`] bundles the Vulkan usage flags with a memory location
//! - [`AllocatedBuffer`] is the non-owning view of a created buffer; its
//!   memory is released by the deletion queue

use std::ptr::NonNull;

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::deletion::ReleaseId;
use crate::error::{RhiError, RhiResult};

/// Common buffer roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled through a staging copy
    Vertex,
    /// Device-local 16-bit index data, filled through a staging copy
    Index,
    /// Host-visible dynamic uniform data rewritten every frame
    Uniform,
    /// Host-visible upload source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Memory location the allocator should place the buffer in.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// A buffer whose memory is owned by the deletion queue.
///
/// The struct is a plain description: dropping it releases nothing. Host
/// visible buffers keep the persistent mapping reported by the allocator.
#[derive(Debug)]
pub struct AllocatedBuffer {
    pub(crate) handle: vk::Buffer,
    pub(crate) token: ReleaseId,
    pub(crate) size: vk::DeviceSize,
    pub(crate) mapped: Option<NonNull<u8>>,
}

impl AllocatedBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Deletion queue entry holding the allocation.
    #[inline]
    pub fn token(&self) -> ReleaseId {
        self.token
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Copies `data` into the mapped memory at `offset`.
    ///
    /// The caller must make sure no in-flight submission reads the range,
    /// which the frame ring guarantees for the current slot's region.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        offset
            .checked_add(data.len() as vk::DeviceSize)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| {
                RhiError::InvalidResource(format!(
                    "write of {} bytes at offset {} exceeds buffer size {}",
                    data.len(),
                    offset,
                    self.size
                ))
            })?;

        let mapped = self
            .mapped
            .ok_or_else(|| RhiError::InvalidResource("buffer memory is not mapped".to_string()))?;

        // SAFETY: the range was checked against the buffer size and the
        // mapping stays valid until the deletion queue frees the allocation.
        unsafe {
            let dst = mapped.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Writes a `Pod` value at `offset`.
    pub fn write_pod<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, value: &T) -> RhiResult<()> {
        self.write(offset, bytemuck::bytes_of(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn host_buffer(storage: &mut [u8]) -> AllocatedBuffer {
        AllocatedBuffer {
            handle: vk::Buffer::from_raw(1),
            token: ReleaseId::from_index(0),
            size: storage.len() as vk::DeviceSize,
            mapped: NonNull::new(storage.as_mut_ptr()),
        }
    }

    #[test]
    fn test_usage_flags() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_memory_locations() {
        assert_eq!(BufferUsage::Vertex.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::Uniform.memory_location(), MemoryLocation::CpuToGpu);
        assert_eq!(BufferUsage::Staging.memory_location(), MemoryLocation::CpuToGpu);
    }

    #[test]
    fn test_write_within_bounds() {
        let mut storage = [0u8; 16];
        let buffer = host_buffer(&mut storage);
        buffer.write(4, &[1, 2, 3, 4]).unwrap();
        buffer.write_pod(12, &7u32).unwrap();
        drop(buffer);
        assert_eq!(&storage[4..8], &[1, 2, 3, 4]);
        assert_eq!(&storage[12..16], &7u32.to_ne_bytes());
    }

    #[test]
    fn test_write_out_of_bounds_rejected() {
        let mut storage = [0u8; 8];
        let buffer = host_buffer(&mut storage);
        assert!(matches!(
            buffer.write(6, &[0; 4]),
            Err(RhiError::InvalidResource(_))
        ));
        assert!(buffer.write(u64::MAX, &[0]).is_err());
    }

    #[test]
    fn test_write_unmapped_rejected() {
        let buffer = AllocatedBuffer {
            handle: vk::Buffer::null(),
            token: ReleaseId::from_index(0),
            size: 64,
            mapped: None,
        };
        assert!(buffer.write(0, &[1]).is_err());
        assert!(buffer.write(0, &[]).is_ok());
    }
}
