//! Scene description for the renderer.
//!
//! - [`Node`] arrays and their topological ordering ([`SceneGraph`])
//! - world matrix flattening and the per-frame [`DrawItem`] list
//! - [`Transform`] composition and the free-flying [`Camera`]

pub mod camera;
pub mod node;
pub mod transform;

pub use camera::Camera;
pub use node::{DrawItem, Node, SceneError, SceneGraph, flatten, validate};
pub use transform::Transform;
