//! Whole-frame tests against the recording context

mod lifecycle;
mod resource_lifetime;

use crate::core::RendererConfig;
use crate::render::geometry::Geometry;
use crate::render::headless::RecordingContext;
use crate::render::material::Material;
use crate::render::pipeline::Renderer;
use crate::scene::{Camera, Drawable, Node, NodeId, SceneGraph};

/// Scene with a camera at z = 5 looking down -Z
fn scene_with_camera() -> (SceneGraph, NodeId) {
    let mut scene = SceneGraph::new();
    let root = scene.root();
    let camera = scene
        .create_child(
            root,
            Node::camera("camera", Camera::perspective(60.0, 1.0, 0.1, 100.0)).with_position(0.0, 0.0, 5.0),
        )
        .unwrap();
    (scene, camera)
}

fn add_cube(scene: &mut SceneGraph, parent: NodeId, name: &str, material: Material) -> NodeId {
    let drawable = Drawable::new(Geometry::cube(1.0).into_shared(), material.into_shared());
    scene.create_child(parent, Node::mesh(name, drawable)).unwrap()
}

fn ready_renderer(config: RendererConfig) -> Renderer<RecordingContext> {
    let mut renderer = Renderer::new(RecordingContext::new(), config);
    renderer.initialize().unwrap();
    renderer
}
