//! Scene node drawing.

use glam::Mat4;

use ember_rhi::command::CommandBuffer;
use ember_rhi::pipeline::Pipeline;
use ember_rhi::{AllocatedBuffer, vk};
use ember_scene::DrawItem;

use crate::error::{RendererError, RendererResult};
use crate::mesh::GpuMesh;
use crate::ubo::{RenderMat, UniformLayout};

/// Sink for the commands of one node draw.
pub trait DrawEncoder {
    fn bind_pipeline(&mut self);

    /// Binds the vertex and 16-bit index buffers of `mesh`.
    fn bind_mesh(&mut self, mesh: usize) -> RendererResult<()>;

    fn write_render_mat(&mut self, offset: vk::DeviceSize, mat: &RenderMat) -> RendererResult<()>;

    /// Binds the matrix set at `dynamic_offset` and the texture set of `mesh`.
    fn bind_sets(&mut self, mesh: usize, dynamic_offset: u32) -> RendererResult<()>;

    fn draw_indexed(&mut self, mesh: usize) -> RendererResult<()>;
}

/// Camera matrices and uniform placement shared by every draw of a frame.
#[derive(Clone, Copy, Debug)]
pub struct DrawParams {
    pub view: Mat4,
    pub proj: Mat4,
    pub layout: UniformLayout,
    pub frame_slot: usize,
}

/// Encodes one draw per item and returns the number of draws.
pub fn draw_nodes<E: DrawEncoder>(
    encoder: &mut E,
    items: &[DrawItem],
    params: &DrawParams,
) -> RendererResult<usize> {
    for item in items {
        let offset = params.layout.offset(params.frame_slot, item.slot);
        let dynamic_offset = params
            .layout
            .dynamic_offset(params.frame_slot, item.slot)
            .ok_or_else(|| {
                RendererError::Draw(format!(
                    "uniform offset {} of node {} does not fit a dynamic offset",
                    offset, item.slot
                ))
            })?;

        encoder.bind_pipeline();
        encoder.bind_mesh(item.mesh)?;
        encoder.write_render_mat(offset, &RenderMat::new(item.model, params.view, params.proj))?;
        encoder.bind_sets(item.mesh, dynamic_offset)?;
        encoder.draw_indexed(item.mesh)?;
    }
    Ok(items.len())
}

/// [`DrawEncoder`] recording into a command buffer.
pub struct CommandEncoder<'a> {
    pub cmd: &'a CommandBuffer,
    pub pipeline: &'a Pipeline,
    pub meshes: &'a [GpuMesh],
    pub render_mats: &'a AllocatedBuffer,
    pub render_mat_set: vk::DescriptorSet,
}

impl CommandEncoder<'_> {
    fn mesh(&self, mesh: usize) -> RendererResult<&GpuMesh> {
        self.meshes.get(mesh).ok_or_else(|| {
            RendererError::Draw(format!(
                "mesh {} requested, {} uploaded",
                mesh,
                self.meshes.len()
            ))
        })
    }
}

impl DrawEncoder for CommandEncoder<'_> {
    fn bind_pipeline(&mut self) {
        self.cmd
            .bind_pipeline(self.pipeline.bind_point, self.pipeline.handle);
    }

    fn bind_mesh(&mut self, mesh: usize) -> RendererResult<()> {
        let mesh = self.mesh(mesh)?;
        self.cmd.bind_vertex_buffer(mesh.vertex_buffer.handle());
        self.cmd
            .bind_index_buffer(mesh.index_buffer.handle(), vk::IndexType::UINT16);
        Ok(())
    }

    fn write_render_mat(&mut self, offset: vk::DeviceSize, mat: &RenderMat) -> RendererResult<()> {
        self.render_mats.write_pod(offset, mat)?;
        Ok(())
    }

    fn bind_sets(&mut self, mesh: usize, dynamic_offset: u32) -> RendererResult<()> {
        let texture_set = self.mesh(mesh)?.texture_set;
        self.cmd.bind_descriptor_sets(
            self.pipeline.bind_point,
            self.pipeline.layout,
            &[self.render_mat_set, texture_set],
            &[dynamic_offset],
        );
        Ok(())
    }

    fn draw_indexed(&mut self, mesh: usize) -> RendererResult<()> {
        let index_count = self.mesh(mesh)?.index_count;
        self.cmd.draw_indexed(index_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_resources::load_scene_from_slice;
    use ember_scene::{Node, SceneGraph};
    use glam::Vec3;

    /// Counts draws and remembers the matrices written.
    #[derive(Default)]
    struct CountingEncoder {
        pipeline_binds: usize,
        draws: Vec<usize>,
        writes: Vec<(vk::DeviceSize, RenderMat)>,
        offsets: Vec<u32>,
    }

    impl DrawEncoder for CountingEncoder {
        fn bind_pipeline(&mut self) {
            self.pipeline_binds += 1;
        }

        fn bind_mesh(&mut self, _mesh: usize) -> RendererResult<()> {
            Ok(())
        }

        fn write_render_mat(&mut self, offset: vk::DeviceSize, mat: &RenderMat) -> RendererResult<()> {
            self.writes.push((offset, *mat));
            Ok(())
        }

        fn bind_sets(&mut self, _mesh: usize, dynamic_offset: u32) -> RendererResult<()> {
            self.offsets.push(dynamic_offset);
            Ok(())
        }

        fn draw_indexed(&mut self, mesh: usize) -> RendererResult<()> {
            self.draws.push(mesh);
            Ok(())
        }
    }

    fn params(records: usize, frame_slot: usize) -> DrawParams {
        DrawParams {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            layout: UniformLayout::new(256, records, 2),
            frame_slot,
        }
    }

    #[test]
    fn test_one_draw_per_mesh_node() {
        let graph = SceneGraph::new(vec![
            Node::new("group").with_children([1, 2]),
            Node::new("a").with_mesh(0),
            Node::new("b").with_mesh(1),
        ])
        .unwrap();
        let items = graph.draw_list().unwrap();

        let mut encoder = CountingEncoder::default();
        let count = draw_nodes(&mut encoder, &items, &params(graph.len(), 0)).unwrap();

        assert_eq!(count, 2);
        assert_eq!(encoder.draws, vec![0, 1]);
        assert_eq!(encoder.pipeline_binds, 2);
        assert_eq!(encoder.offsets, vec![256, 512]);
    }

    #[test]
    fn test_frame_slot_selects_region() {
        let items = [DrawItem {
            slot: 1,
            mesh: 0,
            model: Mat4::from_translation(Vec3::X),
        }];
        let mut encoder = CountingEncoder::default();
        draw_nodes(&mut encoder, &items, &params(3, 1)).unwrap();

        // frame 1 starts after 3 records of frame 0
        assert_eq!(encoder.writes[0].0, 256 * 4);
        assert_eq!(encoder.writes[0].1.model, items[0].model);
    }

    #[test]
    fn test_matrices_are_fresh_per_draw() {
        let items = [
            DrawItem {
                slot: 0,
                mesh: 0,
                model: Mat4::from_translation(Vec3::X),
            },
            DrawItem {
                slot: 1,
                mesh: 0,
                model: Mat4::from_translation(Vec3::Y),
            },
        ];
        let view = Mat4::from_translation(Vec3::Z);
        let mut draw_params = params(2, 0);
        draw_params.view = view;

        let mut encoder = CountingEncoder::default();
        draw_nodes(&mut encoder, &items, &draw_params).unwrap();

        assert_eq!(encoder.writes.len(), 2);
        assert!(encoder.writes.iter().all(|(_, mat)| mat.view == view));
        assert_ne!(encoder.writes[0].1.model, encoder.writes[1].1.model);
    }

    #[test]
    fn test_empty_scene_draws_nothing() {
        let scene = load_scene_from_slice(&[]);
        let items = scene.graph.draw_list().unwrap();
        let mut encoder = CountingEncoder::default();
        assert_eq!(draw_nodes(&mut encoder, &items, &params(0, 0)).unwrap(), 0);
        assert!(encoder.draws.is_empty());
    }
}
