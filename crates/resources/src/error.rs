//! Error types for scene loading.

use ember_scene::SceneError;
use thiserror::Error;

/// Error type for scene loading.
///
/// The public loaders log these and return an empty scene; the `try_*`
/// variants hand them to the caller.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The file could not be read or parsed as glTF.
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("mesh {mesh} has no primitives")]
    NoPrimitives { mesh: usize },

    /// A required vertex attribute accessor is absent.
    #[error("mesh {mesh} has no {attribute} attribute")]
    MissingAttribute {
        mesh: usize,
        attribute: &'static str,
    },

    #[error("mesh {mesh}: {attribute} has {found} elements, POSITION has {expected}")]
    AttributeCountMismatch {
        mesh: usize,
        attribute: &'static str,
        expected: usize,
        found: usize,
    },

    /// Indices are stored as 16-bit values on the GPU.
    #[error("mesh {mesh} uses index {index}, which does not fit in 16 bits")]
    IndexOverflow { mesh: usize, index: u32 },

    #[error("mesh {mesh} uses index {index} but has only {vertex_count} vertices")]
    IndexOutOfRange {
        mesh: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("image {image} has {len} bytes, too few for {width}x{height}")]
    TruncatedImage {
        image: usize,
        len: usize,
        width: u32,
        height: u32,
    },

    /// The node hierarchy could not be put in topological order.
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
