//! Asset loading for the renderer.
//!
//! Reads glTF / GLB scenes into CPU-side [`MeshData`] plus a topologically
//! sorted [`ember_scene::SceneGraph`]. Nothing here touches the GPU.

mod error;

pub mod gltf_loader;
pub mod mesh;

pub use error::{ResourceError, ResourceResult};
pub use gltf_loader::{
    SceneData, load_scene, load_scene_from_slice, try_load_scene, try_load_scene_from_slice,
};
pub use mesh::{MeshData, TextureData};
