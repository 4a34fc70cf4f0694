//! Uniform data written by the CPU every frame, and where it lives.
//!
//! Both uniform buffers are split into one region per frame slot. A slot only
//! writes its own region, and the frame ring only reuses a slot after its
//! fence has signaled, so no region is written while the GPU reads it.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use ember_rhi::vk;

/// Per-node matrices for `model.vert` (set 0, binding 0).
///
/// - Offset 0: model
/// - Offset 64: view
/// - Offset 128: proj (Y already flipped for Vulkan)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RenderMat {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl RenderMat {
    pub const SIZE: usize = size_of::<Self>();

    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self { model, view, proj }
    }
}

/// Resolutions read by `postprocess.comp` (binding 2).
///
/// std140 places each `vec3` on a 16-byte boundary: input at 0, output at 16.
/// `z` is always 1.
///
/// Both vectors live in one record per frame slot, bound through a single
/// dynamic offset. `postprocess.comp` declares them as one block with the
/// same layout, so the pair never sits at two separately padded offsets.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ComputeParams {
    pub input: Vec4,
    pub output: Vec4,
}

impl ComputeParams {
    pub const SIZE: usize = size_of::<Self>();

    pub fn new(input: vk::Extent2D, output: vk::Extent2D) -> Self {
        Self {
            input: Vec4::new(input.width as f32, input.height as f32, 1.0, 0.0),
            output: Vec4::new(output.width as f32, output.height as f32, 1.0, 0.0),
        }
    }
}

/// Placement of equally sized records in a dynamic uniform buffer:
/// `frames` regions of `records` aligned slots each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformLayout {
    stride: vk::DeviceSize,
    records: usize,
    frames: usize,
}

impl UniformLayout {
    /// `stride` is the padded record size.
    pub fn new(stride: vk::DeviceSize, records: usize, frames: usize) -> Self {
        Self {
            stride,
            records,
            frames,
        }
    }

    #[inline]
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Buffer size covering every frame region. Never zero, so an empty scene
    /// still gets a valid buffer.
    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.stride * (self.records * self.frames).max(1) as vk::DeviceSize
    }

    /// Byte offset of `record` in the region of frame slot `frame`.
    pub fn offset(&self, frame: usize, record: usize) -> vk::DeviceSize {
        (frame * self.records + record) as vk::DeviceSize * self.stride
    }

    /// [`offset`](Self::offset) as a dynamic descriptor offset.
    pub fn dynamic_offset(&self, frame: usize, record: usize) -> Option<u32> {
        u32::try_from(self.offset(frame, record)).ok()
    }
}
