//! A loaded GLB scene driven through node drawing.
//!
//! The scene is assembled in memory: an empty root whose child holds one
//! triangle with 16-bit indices.

use approx::assert_relative_eq;
use ember_renderer::RendererResult;
use ember_renderer::draw::{DrawEncoder, DrawParams, draw_nodes};
use ember_renderer::ubo::{RenderMat, UniformLayout};
use ember_resources::{MeshData, load_scene_from_slice};
use ember_rhi::vk;
use glam::{Mat4, Vec3};

const GLB_MAGIC: u32 = 0x4654_6C67;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Uniform stride used by the tests, as padded for a 256-byte alignment.
const STRIDE: vk::DeviceSize = 256;

fn two_node_glb() -> Vec<u8> {
    let mut bin = Vec::new();
    for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        p.iter().for_each(|v| bin.extend_from_slice(&v.to_le_bytes()));
    }
    for _ in 0..3 {
        [0.0f32, 0.0, 1.0]
            .iter()
            .for_each(|v| bin.extend_from_slice(&v.to_le_bytes()));
    }
    for uv in [[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]] {
        uv.iter().for_each(|v| bin.extend_from_slice(&v.to_le_bytes()));
    }
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let json = format!(
        r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [
    {{"name": "root", "children": [1]}},
    {{"name": "triangle", "mesh": 0, "translation": [0.0, 2.0, 0.0]}}
  ],
  "meshes": [{{"name": "tri", "primitives": [{{"attributes": {{"POSITION": 0, "NORMAL": 1, "TEXCOORD_0": 2}}, "indices": 3}}]}}],
  "buffers": [{{"byteLength": {buffer_len}}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 72, "byteLength": 24}},
    {{"buffer": 0, "byteOffset": 96, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"}},
    {{"bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC2"}},
    {{"bufferView": 3, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ]
}}"#,
        buffer_len = bin.len(),
    );
    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    glb.extend_from_slice(&bin);
    glb
}

/// Records what a command buffer would receive, using the loaded meshes for
/// index counts.
struct CountingEncoder<'a> {
    meshes: &'a [MeshData],
    bound_meshes: Vec<usize>,
    /// (mesh, index count)
    draws: Vec<(usize, usize)>,
    writes: Vec<(vk::DeviceSize, RenderMat)>,
    dynamic_offsets: Vec<u32>,
}

impl<'a> CountingEncoder<'a> {
    fn new(meshes: &'a [MeshData]) -> Self {
        Self {
            meshes,
            bound_meshes: Vec::new(),
            draws: Vec::new(),
            writes: Vec::new(),
            dynamic_offsets: Vec::new(),
        }
    }
}

impl DrawEncoder for CountingEncoder<'_> {
    fn bind_pipeline(&mut self) {}

    fn bind_mesh(&mut self, mesh: usize) -> RendererResult<()> {
        self.bound_meshes.push(mesh);
        Ok(())
    }

    fn write_render_mat(&mut self, offset: vk::DeviceSize, mat: &RenderMat) -> RendererResult<()> {
        self.writes.push((offset, *mat));
        Ok(())
    }

    fn bind_sets(&mut self, _mesh: usize, dynamic_offset: u32) -> RendererResult<()> {
        self.dynamic_offsets.push(dynamic_offset);
        Ok(())
    }

    fn draw_indexed(&mut self, mesh: usize) -> RendererResult<()> {
        self.draws.push((mesh, self.meshes[mesh].indices.len()));
        Ok(())
    }
}

fn params(records: usize, frame_slot: usize) -> DrawParams {
    DrawParams {
        view: Mat4::IDENTITY,
        proj: Mat4::IDENTITY,
        layout: UniformLayout::new(STRIDE, records, 2),
        frame_slot,
    }
}

#[test]
fn test_two_node_glb_draws_its_triangle_once() {
    let scene = load_scene_from_slice(&two_node_glb());
    assert_eq!(scene.graph.len(), 2);
    assert_eq!(scene.meshes.len(), 1);

    let items = scene.graph.draw_list().unwrap();
    let mut encoder = CountingEncoder::new(&scene.meshes);
    let count = draw_nodes(&mut encoder, &items, &params(scene.graph.len(), 0)).unwrap();

    assert_eq!(count, 1);
    assert_eq!(encoder.bound_meshes, vec![0]);
    assert_eq!(encoder.draws, vec![(0, 3)]);
    // The child is node 1, so its record sits one padded stride in.
    assert_eq!(encoder.dynamic_offsets, vec![STRIDE as u32]);
    assert_eq!(encoder.writes[0].0, STRIDE);
    let origin = encoder.writes[0].1.model.transform_point3(Vec3::ZERO);
    assert_relative_eq!(origin.y, 2.0);
}

#[test]
fn test_second_frame_slot_uses_its_own_region() {
    let scene = load_scene_from_slice(&two_node_glb());
    let items = scene.graph.draw_list().unwrap();

    let mut encoder = CountingEncoder::new(&scene.meshes);
    draw_nodes(&mut encoder, &items, &params(scene.graph.len(), 1)).unwrap();

    // Slot 1 starts after the two records of slot 0.
    assert_eq!(encoder.dynamic_offsets, vec![3 * STRIDE as u32]);
    assert_eq!(encoder.draws, vec![(0, 3)]);
}
