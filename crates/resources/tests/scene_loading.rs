//! Integration tests for GLB scene loading.
//!
//! The GLB files are assembled in memory so the tests need no assets.

use approx::assert_relative_eq;
use ember_resources::{ResourceError, load_scene_from_slice, try_load_scene_from_slice};
use glam::Vec3;

const GLB_MAGIC: u32 = 0x4654_6C67;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Options for the single-triangle test scene.
struct TriangleScene {
    with_normals: bool,
    wide_indices: [u32; 3],
    child_translation: Option<[f32; 3]>,
}

impl Default for TriangleScene {
    fn default() -> Self {
        Self {
            with_normals: true,
            wide_indices: [0, 1, 2],
            child_translation: None,
        }
    }
}

impl TriangleScene {
    /// Two nodes: an empty root whose only child holds the triangle mesh.
    fn glb(&self) -> Vec<u8> {
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

        let wide = self.wide_indices.iter().any(|&i| i > u32::from(u16::MAX));
        let (index_component, index_len) = if wide {
            self.wide_indices
                .iter()
                .for_each(|i| bin.extend_from_slice(&i.to_le_bytes()));
            (5125, 12)
        } else {
            self.wide_indices
                .iter()
                .for_each(|&i| bin.extend_from_slice(&(i as u16).to_le_bytes()));
            (5123, 6)
        };
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let normal_attribute = if self.with_normals { r#","NORMAL":1"# } else { "" };
        let child_transform = match self.child_translation {
            Some([x, y, z]) => format!(r#","translation":[{x:.1},{y:.1},{z:.1}]"#),
            None => String::new(),
        };

        let json = format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [
    {{"name": "root", "children": [1]}},
    {{"name": "triangle", "mesh": 0{child_transform}}}
  ],
  "meshes": [{{"name": "tri", "primitives": [{{"attributes": {{"POSITION": 0{normal_attribute}, "TEXCOORD_0": 2}}, "indices": 3}}]}}],
  "buffers": [{{"byteLength": {buffer_len}}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 72, "byteLength": 24}},
    {{"buffer": 0, "byteOffset": 96, "byteLength": {index_len}}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"}},
    {{"bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC2"}},
    {{"bufferView": 3, "componentType": {index_component}, "count": 3, "type": "SCALAR"}}
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
}

#[test]
fn test_two_node_scene_produces_one_draw() {
    let scene = load_scene_from_slice(&TriangleScene::default().glb());

    assert_eq!(scene.graph.len(), 2);
    assert_eq!(scene.meshes.len(), 1);

    let draws = scene.graph.draw_list().unwrap();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].slot, 1);
    assert_eq!(draws[0].mesh, 0);
    assert_eq!(draws[0].model, glam::Mat4::IDENTITY);
}

#[test]
fn test_mesh_attributes_are_read() {
    let scene = load_scene_from_slice(&TriangleScene::default().glb());
    let mesh = &scene.meshes[0];

    assert_eq!(mesh.name, "tri");
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.positions[1], Vec3::X);
    assert_eq!(mesh.normals[2], Vec3::Z);
    assert_relative_eq!(mesh.tex_coords[2].y, 1.0);
    assert_eq!(mesh.indices, vec![0, 1, 2]);
    assert!(mesh.texture.is_none());
    assert_eq!(scene.triangle_count(), 1);
}

#[test]
fn test_node_translation_reaches_draw() {
    let glb = TriangleScene {
        child_translation: Some([2.0, 0.0, -1.0]),
        ..Default::default()
    }
    .glb();
    let scene = load_scene_from_slice(&glb);
    let draws = scene.graph.draw_list().unwrap();

    let origin = draws[0].model.transform_point3(Vec3::ZERO);
    assert_relative_eq!(origin.x, 2.0);
    assert_relative_eq!(origin.z, -1.0);
}

#[test]
fn test_missing_normals_yield_empty_scene() {
    let glb = TriangleScene {
        with_normals: false,
        ..Default::default()
    }
    .glb();

    assert!(matches!(
        try_load_scene_from_slice(&glb),
        Err(ResourceError::MissingAttribute {
            attribute: "NORMAL",
            ..
        })
    ));
    assert!(load_scene_from_slice(&glb).is_empty());
}

#[test]
fn test_wide_indices_yield_empty_scene() {
    let glb = TriangleScene {
        wide_indices: [0, 1, 70_000],
        ..Default::default()
    }
    .glb();

    assert!(matches!(
        try_load_scene_from_slice(&glb),
        Err(ResourceError::IndexOverflow { index: 70_000, .. })
    ));
    assert!(load_scene_from_slice(&glb).is_empty());
}

#[test]
fn test_index_past_last_vertex_yields_empty_scene() {
    let glb = TriangleScene {
        wide_indices: [0, 1, 3],
        ..Default::default()
    }
    .glb();

    assert!(matches!(
        try_load_scene_from_slice(&glb),
        Err(ResourceError::IndexOutOfRange {
            index: 3,
            vertex_count: 3,
            ..
        })
    ));
    assert!(load_scene_from_slice(&glb).is_empty());
}
