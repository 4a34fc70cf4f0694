//! Mesh upload.

use tracing::{debug, info};

use ember_resources::{MeshData, TextureData};
use ember_rhi::descriptor::{DescriptorPool, DescriptorWriter};
use ember_rhi::vertex::Vertex;
use ember_rhi::{
    AllocatedBuffer, AllocatedImage, BufferUsage, DeletionQueue, ResourceAllocator, RhiResult,
    UploadContext, vk,
};

/// Format of every mesh texture.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Interleaves the attribute streams of `mesh` into vertices.
///
/// The streams are equally long after loading; extra entries are ignored.
pub fn interleave(mesh: &MeshData) -> Vec<Vertex> {
    mesh.positions
        .iter()
        .zip(&mesh.normals)
        .zip(&mesh.tex_coords)
        .map(|((&position, &normal), &tex_coord)| Vertex::new(position, normal, tex_coord))
        .collect()
}

/// A mesh resident on the GPU.
pub struct GpuMesh {
    pub vertex_buffer: AllocatedBuffer,
    pub index_buffer: AllocatedBuffer,
    pub index_count: u32,
    pub texture: AllocatedImage,
    /// Set 1 of the graphics pipeline: the texture and the shared sampler.
    pub texture_set: vk::DescriptorSet,
}

/// Everything needed to move meshes to the GPU.
pub struct MeshUploader<'a> {
    pub allocator: &'a ResourceAllocator,
    pub upload: &'a UploadContext,
    pub descriptor_pool: &'a DescriptorPool,
    pub texture_layout: vk::DescriptorSetLayout,
    pub sampler: vk::Sampler,
}

impl MeshUploader<'_> {
    /// Uploads every mesh. Meshes without a texture share one white texel.
    pub fn upload_all(
        &self,
        meshes: &[MeshData],
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Vec<GpuMesh>> {
        let mut default_texture: Option<AllocatedImage> = None;

        let mut uploaded = Vec::with_capacity(meshes.len());
        for (index, mesh) in meshes.iter().enumerate() {
            let texture = match (&mesh.texture, default_texture) {
                (Some(texture), _) => {
                    self.upload_texture(&format!("mesh {} texture", index), texture, deletion)?
                }
                (None, Some(default)) => default,
                (None, None) => {
                    let default =
                        self.upload_texture("default white", &TextureData::white(), deletion)?;
                    default_texture = Some(default);
                    default
                }
            };
            uploaded.push(self.upload(index, mesh, texture, deletion)?);
        }

        info!("Uploaded {} meshes", uploaded.len());
        Ok(uploaded)
    }

    fn upload(
        &self,
        index: usize,
        mesh: &MeshData,
        texture: AllocatedImage,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<GpuMesh> {
        let vertices = interleave(mesh);
        let vertex_buffer = self.upload.upload_buffer(
            self.allocator,
            &format!("mesh {} vertices", index),
            bytemuck::cast_slice(&vertices),
            BufferUsage::Vertex,
            deletion,
        )?;
        let index_buffer = self.upload.upload_buffer(
            self.allocator,
            &format!("mesh {} indices", index),
            bytemuck::cast_slice(&mesh.indices),
            BufferUsage::Index,
            deletion,
        )?;

        let texture_set = self.descriptor_pool.allocate(self.texture_layout)?;
        DescriptorWriter::new(texture_set)
            .combined_image_sampler(0, texture.view(), self.sampler)
            .write(self.allocator.device());

        debug!(
            "Mesh {} '{}' resident: {} vertices, {} indices",
            index,
            mesh.name,
            vertices.len(),
            mesh.indices.len()
        );

        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            texture,
            texture_set,
        })
    }

    fn upload_texture(
        &self,
        name: &str,
        texture: &TextureData,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<AllocatedImage> {
        self.upload.upload_rgba8(
            self.allocator,
            name,
            &texture.rgba,
            vk::Extent2D {
                width: texture.width,
                height: texture.height,
            },
            TEXTURE_FORMAT,
            deletion,
        )
    }
}
