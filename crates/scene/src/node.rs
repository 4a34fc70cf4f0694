//! Scene nodes, topological validation and transform flattening.
//!
//! Nodes live in a flat array and refer to their children by index. Flattening
//! walks that array once, so it requires topological order: every child index
//! is greater than its parent's, and no node has two parents. [`flatten`]
//! checks this up front. [`SceneGraph::new`] establishes it for input in any
//! order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use glam::Mat4;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("node {parent} lists child {child}, but the scene has {len} nodes")]
    OutOfRange {
        parent: usize,
        child: usize,
        len: usize,
    },

    #[error("node {parent} lists child {child}, which does not come after it")]
    NotTopological { parent: usize, child: usize },

    #[error("node {child} has two parents: {first} and {second}")]
    MultipleParents {
        child: usize,
        first: usize,
        second: usize,
    },

    #[error("scene graph has a cycle through {remaining} nodes")]
    Cycle { remaining: usize },

    #[error("node {node} uses mesh {mesh}, but only {count} meshes are loaded")]
    MeshOutOfRange {
        node: usize,
        mesh: usize,
        count: usize,
    },
}

/// A scene node. `transform` is relative to the parent.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub mesh: Option<usize>,
    pub transform: Mat4,
    pub children: Vec<usize>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh: None,
            transform: Mat4::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = usize>) -> Self {
        self.children = children.into_iter().collect();
        self
    }
}

/// One mesh draw: the node's uniform slot, its mesh and its world matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub slot: usize,
    pub mesh: usize,
    pub model: Mat4,
}

/// Returns each node's parent, rejecting out-of-range children and nodes with
/// more than one parent.
fn parents(nodes: &[Node]) -> Result<Vec<Option<usize>>, SceneError> {
    let len = nodes.len();
    let mut parent_of = vec![None; len];
    for (parent, node) in nodes.iter().enumerate() {
        for &child in &node.children {
            if child >= len {
                return Err(SceneError::OutOfRange { parent, child, len });
            }
            if let Some(first) = parent_of[child] {
                return Err(SceneError::MultipleParents {
                    child,
                    first,
                    second: parent,
                });
            }
            parent_of[child] = Some(parent);
        }
    }
    Ok(parent_of)
}

/// Checks that `nodes` is in topological order.
pub fn validate(nodes: &[Node]) -> Result<(), SceneError> {
    parents(nodes)?;
    for (parent, node) in nodes.iter().enumerate() {
        if let Some(&child) = node.children.iter().find(|&&child| child <= parent) {
            return Err(SceneError::NotTopological { parent, child });
        }
    }
    Ok(())
}

/// Computes world matrices: each child becomes `parent * child`, visiting
/// nodes in array order.
pub fn flatten(nodes: &[Node]) -> Result<Vec<Mat4>, SceneError> {
    validate(nodes)?;

    let mut world: Vec<Mat4> = nodes.iter().map(|node| node.transform).collect();
    for (index, node) in nodes.iter().enumerate() {
        let parent = world[index];
        for &child in &node.children {
            world[child] = parent * world[child];
        }
    }
    Ok(world)
}

/// Nodes in topological order.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
}

impl SceneGraph {
    /// Sorts `nodes` topologically (Kahn's algorithm, lowest ready index
    /// first) and remaps child indices. Input that is already in order keeps
    /// its indices.
    pub fn new(nodes: Vec<Node>) -> Result<Self, SceneError> {
        let parent_of = parents(&nodes)?;

        let mut ready: BinaryHeap<Reverse<usize>> = parent_of
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            ready.extend(nodes[index].children.iter().map(|&child| Reverse(child)));
        }

        if order.len() < nodes.len() {
            return Err(SceneError::Cycle {
                remaining: nodes.len() - order.len(),
            });
        }

        let mut new_index = vec![0; nodes.len()];
        for (position, &old) in order.iter().enumerate() {
            new_index[old] = position;
        }

        let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let sorted: Vec<Node> = order
            .iter()
            .filter_map(|&old| slots[old].take())
            .map(|mut node| {
                for child in &mut node.children {
                    *child = new_index[*child];
                }
                node
            })
            .collect();

        debug!("Scene graph sorted: {} nodes", sorted.len());
        Ok(Self { nodes: sorted })
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks every mesh reference against the number of loaded meshes.
    pub fn check_meshes(&self, count: usize) -> Result<(), SceneError> {
        for (node, entry) in self.nodes.iter().enumerate() {
            if let Some(mesh) = entry.mesh.filter(|&mesh| mesh >= count) {
                return Err(SceneError::MeshOutOfRange { node, mesh, count });
            }
        }
        Ok(())
    }

    pub fn world_transforms(&self) -> Result<Vec<Mat4>, SceneError> {
        flatten(&self.nodes)
    }

    /// One [`DrawItem`] per node that has a mesh, in node order.
    pub fn draw_list(&self) -> Result<Vec<DrawItem>, SceneError> {
        let world = self.world_transforms()?;
        Ok(self
            .nodes
            .iter()
            .zip(world)
            .enumerate()
            .filter_map(|(slot, (node, model))| {
                node.mesh.map(|mesh| DrawItem { slot, mesh, model })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn translate_x(name: &str) -> Node {
        Node::new(name).with_transform(Mat4::from_translation(Vec3::X))
    }

    fn origin(m: Mat4) -> Vec3 {
        m.transform_point3(Vec3::ZERO)
    }

    #[test]
    fn test_flatten_chain_accumulates_translation() {
        let nodes = vec![
            translate_x("root").with_children([1]),
            translate_x("child").with_children([2]),
            translate_x("grandchild"),
        ];
        let world = flatten(&nodes).unwrap();
        let p = origin(world[2]);
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 0.0);
        assert_relative_eq!(p.z, 0.0);
        assert_relative_eq!(origin(world[1]).x, 2.0);
    }

    #[test]
    fn test_flatten_applies_parent_on_the_left() {
        let nodes = vec![
            Node::new("scaled")
                .with_transform(Mat4::from_scale(Vec3::splat(2.0)))
                .with_children([1]),
            translate_x("child"),
        ];
        let world = flatten(&nodes).unwrap();
        assert_relative_eq!(origin(world[1]).x, 2.0);
    }

    #[test]
    fn test_flatten_rejects_backward_child() {
        let nodes = vec![Node::new("a"), Node::new("b").with_children([0])];
        assert_eq!(
            flatten(&nodes),
            Err(SceneError::NotTopological { parent: 1, child: 0 })
        );
    }

    #[test]
    fn test_flatten_rejects_self_reference() {
        let nodes = vec![Node::new("a").with_children([0])];
        assert!(matches!(
            flatten(&nodes),
            Err(SceneError::NotTopological { .. })
        ));
    }

    #[test]
    fn test_flatten_rejects_out_of_range_child() {
        let nodes = vec![Node::new("a").with_children([4])];
        assert_eq!(
            flatten(&nodes),
            Err(SceneError::OutOfRange {
                parent: 0,
                child: 4,
                len: 1
            })
        );
    }

    #[test]
    fn test_flatten_rejects_shared_child() {
        let nodes = vec![
            Node::new("a").with_children([2]),
            Node::new("b").with_children([2]),
            Node::new("c"),
        ];
        assert_eq!(
            flatten(&nodes),
            Err(SceneError::MultipleParents {
                child: 2,
                first: 0,
                second: 1
            })
        );
    }

    #[test]
    fn test_scene_graph_keeps_sorted_input() {
        let nodes = vec![
            Node::new("a").with_children([2]),
            Node::new("b"),
            Node::new("c").with_mesh(0),
        ];
        let graph = SceneGraph::new(nodes.clone()).unwrap();
        assert_eq!(graph.nodes(), nodes.as_slice());
    }

    #[test]
    fn test_scene_graph_reorders_and_remaps() {
        // grandchild, child, root
        let nodes = vec![
            translate_x("grandchild"),
            translate_x("child").with_children([0]),
            translate_x("root").with_children([1]),
        ];
        let graph = SceneGraph::new(nodes).unwrap();

        let names: Vec<&str> = graph.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["root", "child", "grandchild"]);
        assert_eq!(graph.nodes()[0].children, vec![1]);
        assert_eq!(graph.nodes()[1].children, vec![2]);

        let world = graph.world_transforms().unwrap();
        assert_relative_eq!(origin(world[2]).x, 3.0);
    }

    #[test]
    fn test_scene_graph_detects_cycle() {
        let nodes = vec![
            Node::new("root"),
            Node::new("a").with_children([2]),
            Node::new("b").with_children([1]),
        ];
        assert_eq!(
            SceneGraph::new(nodes).unwrap_err(),
            SceneError::Cycle { remaining: 2 }
        );
    }

    #[test]
    fn test_draw_list_skips_nodes_without_mesh() {
        let nodes = vec![
            Node::new("empty").with_children([1]),
            Node::new("mesh").with_mesh(0),
        ];
        let graph = SceneGraph::new(nodes).unwrap();
        let draws = graph.draw_list().unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].slot, 1);
        assert_eq!(draws[0].mesh, 0);
        assert_eq!(draws[0].model, Mat4::IDENTITY);
    }

    #[test]
    fn test_check_meshes() {
        let graph = SceneGraph::new(vec![Node::new("a").with_mesh(3)]).unwrap();
        assert!(graph.check_meshes(4).is_ok());
        assert_eq!(
            graph.check_meshes(3),
            Err(SceneError::MeshOutOfRange {
                node: 0,
                mesh: 3,
                count: 3
            })
        );
    }

    #[test]
    fn test_empty_scene() {
        let graph = SceneGraph::new(Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.draw_list().unwrap().is_empty());
    }
}
