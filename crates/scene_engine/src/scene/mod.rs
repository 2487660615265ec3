//! Scene graph
//!
//! Spatial nodes in an arena, hierarchical transform propagation and the
//! node payloads the renderer consumes.
//!
//! ## Architecture
//!
//! ```text
//! SceneGraph (arena of Node)
//!      ↓  update_world_matrix_tree
//! world matrices
//!      ↓  Renderer::render
//! RenderList + LightAggregate
//! ```

mod camera;
mod culling;
mod drawable;
mod graph;
mod node;
mod transform;

pub use camera::{Camera, Projection};
pub use culling::{Aabb, BoundingSphere, Frustum, Plane};
pub use drawable::Drawable;
pub use graph::{SceneGraph, TraverseControl};
pub use node::{Node, NodeEvent, NodeEventKind, NodeId, NodeKind};
pub use transform::NodeTransform;
