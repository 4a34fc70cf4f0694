//! glTF / GLB scene loading.
//!
//! Every node of the document becomes a [`Node`]; every mesh contributes its
//! first primitive as a [`MeshData`]. The node array is put in topological
//! order once here, so the renderer can flatten it every frame without
//! re-checking.
//!
//! [`load_scene`] and [`load_scene_from_slice`] never fail: errors are logged
//! and produce an empty [`SceneData`].

use std::path::Path;

use ember_scene::{Node, SceneGraph, Transform};
use glam::{Mat4, Vec2, Vec3};
use gltf::image::Format;
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use tracing::{debug, error, info, warn};

use crate::error::{ResourceError, ResourceResult};
use crate::mesh::{MeshData, TextureData};

/// A loaded scene: sorted nodes plus the meshes they reference.
#[derive(Clone, Debug, Default)]
pub struct SceneData {
    pub graph: SceneGraph,
    pub meshes: Vec<MeshData>,
}

impl SceneData {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty() && self.meshes.is_empty()
    }

    /// Triangles drawn per frame: each node with a mesh counts that mesh once.
    pub fn triangle_count(&self) -> usize {
        self.graph
            .nodes()
            .iter()
            .filter_map(|node| node.mesh)
            .filter_map(|mesh| self.meshes.get(mesh))
            .map(MeshData::triangle_count)
            .sum()
    }
}

/// Loads a `.gltf` or `.glb` file, logging any failure and returning an empty
/// scene in that case.
pub fn load_scene(path: &Path) -> SceneData {
    match try_load_scene(path) {
        Ok(scene) => {
            info!(
                "{} loaded: {} nodes, {} meshes",
                path.display(),
                scene.graph.len(),
                scene.meshes.len()
            );
            scene
        }
        Err(e) => {
            error!("Failed to load scene {}: {}", path.display(), e);
            SceneData::default()
        }
    }
}

/// Loads a scene from in-memory glTF or GLB bytes, logging any failure and
/// returning an empty scene in that case.
pub fn load_scene_from_slice(bytes: &[u8]) -> SceneData {
    try_load_scene_from_slice(bytes).unwrap_or_else(|e| {
        error!("Failed to load scene from memory: {}", e);
        SceneData::default()
    })
}

pub fn try_load_scene(path: &Path) -> ResourceResult<SceneData> {
    debug!("Importing glTF {:?}", path);
    let (document, buffers, images) = gltf::import(path)?;
    build_scene(&document, &buffers, &images)
}

pub fn try_load_scene_from_slice(bytes: &[u8]) -> ResourceResult<SceneData> {
    let (document, buffers, images) = gltf::import_slice(bytes)?;
    build_scene(&document, &buffers, &images)
}

fn build_scene(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> ResourceResult<SceneData> {
    let nodes: Vec<Node> = document.nodes().map(|node| convert_node(&node)).collect();
    let graph = SceneGraph::new(nodes)?;

    let meshes = document
        .meshes()
        .map(|mesh| convert_mesh(&mesh, buffers, images))
        .collect::<ResourceResult<Vec<_>>>()?;

    graph.check_meshes(meshes.len())?;
    Ok(SceneData { graph, meshes })
}

fn convert_node(node: &gltf::Node<'_>) -> Node {
    let transform = match node.transform() {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => Transform::from_trs(translation, rotation, scale).matrix(),
    };

    Node {
        name: node.name().unwrap_or_default().to_string(),
        mesh: node.mesh().map(|mesh| mesh.index()),
        transform,
        children: node.children().map(|child| child.index()).collect(),
    }
}

fn convert_mesh(
    mesh: &gltf::Mesh<'_>,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> ResourceResult<MeshData> {
    let index = mesh.index();
    let primitive = mesh
        .primitives()
        .next()
        .ok_or(ResourceError::NoPrimitives { mesh: index })?;
    if mesh.primitives().len() > 1 {
        warn!(
            "Mesh {} has {} primitives, only the first is used",
            index,
            mesh.primitives().len()
        );
    }

    let reader = primitive.reader(|buffer| {
        buffers
            .get(buffer.index())
            .map(|data| data.0.as_slice())
    });
    let missing = |attribute| ResourceError::MissingAttribute {
        mesh: index,
        attribute,
    };

    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or_else(|| missing("POSITION"))?
        .map(Vec3::from_array)
        .collect();
    let normals: Vec<Vec3> = reader
        .read_normals()
        .ok_or_else(|| missing("NORMAL"))?
        .map(Vec3::from_array)
        .collect();
    let tex_coords: Vec<Vec2> = reader
        .read_tex_coords(0)
        .ok_or_else(|| missing("TEXCOORD_0"))?
        .into_f32()
        .map(Vec2::from_array)
        .collect();

    check_count(index, "NORMAL", positions.len(), normals.len())?;
    check_count(index, "TEXCOORD_0", positions.len(), tex_coords.len())?;

    // Non-indexed primitives draw their vertices in order.
    let wide_indices: Vec<u32> = match reader.read_indices() {
        Some(read) => read.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    let indices = wide_indices
        .into_iter()
        .map(|i| {
            let narrow = u16::try_from(i)
                .map_err(|_| ResourceError::IndexOverflow { mesh: index, index: i })?;
            if i as usize >= positions.len() {
                return Err(ResourceError::IndexOutOfRange {
                    mesh: index,
                    index: i,
                    vertex_count: positions.len(),
                });
            }
            Ok(narrow)
        })
        .collect::<ResourceResult<Vec<u16>>>()?;

    let texture = match primitive
        .material()
        .pbr_metallic_roughness()
        .base_color_texture()
    {
        Some(info) => {
            let image = info.texture().source().index();
            match images.get(image) {
                Some(data) => to_rgba8(image, data)?,
                None => None,
            }
        }
        None => None,
    };

    debug!(
        "Mesh {} '{}': {} vertices, {} triangles, texture: {}",
        index,
        mesh.name().unwrap_or_default(),
        positions.len(),
        indices.len() / 3,
        texture.is_some()
    );

    Ok(MeshData {
        name: mesh.name().unwrap_or_default().to_string(),
        positions,
        normals,
        tex_coords,
        indices,
        texture,
    })
}

fn check_count(
    mesh: usize,
    attribute: &'static str,
    expected: usize,
    found: usize,
) -> ResourceResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ResourceError::AttributeCountMismatch {
            mesh,
            attribute,
            expected,
            found,
        })
    }
}

/// Converts a decoded glTF image to RGBA8. Formats wider than 8 bits per
/// channel are skipped with a warning; the mesh then uses the default texture.
fn to_rgba8(index: usize, data: &gltf::image::Data) -> ResourceResult<Option<TextureData>> {
    let (width, height) = (data.width, data.height);
    let pixels = data.pixels.clone();

    let decoded = match data.format {
        Format::R8 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        Format::R8G8 => {
            GrayAlphaImage::from_raw(width, height, pixels).map(DynamicImage::ImageLumaA8)
        }
        Format::R8G8B8 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        Format::R8G8B8A8 => {
            RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
        }
        other => {
            warn!("Image {} has unsupported format {:?}, ignoring it", index, other);
            return Ok(None);
        }
    };

    let image = decoded.ok_or(ResourceError::TruncatedImage {
        image: index,
        len: data.pixels.len(),
        width,
        height,
    })?;

    Ok(Some(TextureData {
        width,
        height,
        rgba: image.into_rgba8().into_raw(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_data(format: Format, pixels: Vec<u8>) -> gltf::image::Data {
        gltf::image::Data {
            pixels,
            format,
            width: 1,
            height: 2,
        }
    }

    #[test]
    fn test_rgb_expands_to_opaque_rgba() {
        let data = image_data(Format::R8G8B8, vec![10, 20, 30, 40, 50, 60]);
        let texture = to_rgba8(0, &data).unwrap().unwrap();
        assert_eq!(texture.rgba, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_truncated_image_is_an_error() {
        let data = image_data(Format::R8G8B8A8, vec![0; 4]);
        assert!(matches!(
            to_rgba8(3, &data),
            Err(ResourceError::TruncatedImage { image: 3, .. })
        ));
    }

    #[test]
    fn test_wide_formats_are_skipped() {
        let data = image_data(Format::R16G16B16A16, vec![0; 16]);
        assert_eq!(to_rgba8(0, &data).unwrap(), None);
    }

    #[test]
    fn test_garbage_yields_empty_scene() {
        let scene = load_scene_from_slice(b"definitely not gltf");
        assert!(scene.is_empty());
        assert_eq!(scene.triangle_count(), 0);
    }

    #[test]
    fn test_missing_file_yields_empty_scene() {
        let scene = load_scene(Path::new("does/not/exist.glb"));
        assert!(scene.is_empty());
    }
}
