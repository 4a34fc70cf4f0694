//! CPU-side mesh and texture data.

use glam::{Vec2, Vec3};

/// Tightly packed RGBA8 texels, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    /// A single opaque white texel.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![0xff; 4],
        }
    }
}

/// Geometry of one glTF mesh (its first primitive).
///
/// The attribute arrays all have one entry per vertex.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub indices: Vec<u16>,
    /// Base color texture, if the material has one
    pub texture: Option<TextureData>,
}

impl MeshData {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_count_rounds_down() {
        let mesh = MeshData {
            indices: vec![0, 1, 2, 2, 1],
            ..Default::default()
        };
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_white_texture() {
        let white = TextureData::white();
        assert_eq!(white.rgba.len(), (white.width * white.height * 4) as usize);
    }
}
