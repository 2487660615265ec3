//! Lazy creation, refresh and end-of-frame collection of GPU objects

use super::{add_cube, ready_renderer, scene_with_camera};
use crate::core::RendererConfig;
use crate::render::geometry::{attribute_names, Geometry};
use crate::render::headless::{GpuCall, ObjectKind};
use crate::render::material::Material;
use crate::scene::{Drawable, Node};

#[test]
fn test_removed_subtree_is_collected_next_frame() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    let group = scene.create_child(root, Node::group("props")).unwrap();
    add_cube(&mut scene, group, "cube", Material::lambert());
    let mut renderer = ready_renderer(RendererConfig::default());

    renderer.render(&mut scene, camera);
    assert_eq!(renderer.gpu().live_count(ObjectKind::Program), 1);
    assert!(renderer.gpu().live_count(ObjectKind::Buffer) >= 2);

    assert_eq!(scene.remove_subtree(group), 2);
    let stats = renderer.render(&mut scene, camera);

    let gpu = renderer.gpu();
    assert_eq!(stats.drawables, 0);
    assert!(stats.resources_collected > 0);
    assert_eq!(gpu.live_count(ObjectKind::Program), 0);
    assert_eq!(gpu.live_count(ObjectKind::Buffer), 0);
    assert_eq!(gpu.live_count(ObjectKind::VertexArray), 0);
    assert_eq!(gpu.count(|c| matches!(c, GpuCall::DeleteProgram(_))), 1);
    assert!(renderer.pools().is_empty());
    assert_eq!(renderer.resolver().header_count(), 0);
    assert_eq!(renderer.resolver().variant_count(), 0);
}

#[test]
fn test_culled_drawable_keeps_its_resources() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    let cube = add_cube(&mut scene, root, "cube", Material::basic());
    let mut renderer = ready_renderer(RendererConfig::default());

    renderer.render(&mut scene, camera);
    let live = renderer.pools().len();

    scene.node_mut(cube).unwrap().set_position(0.0, 0.0, 20.0);
    for _ in 0..3 {
        let stats = renderer.render(&mut scene, camera);
        assert_eq!(stats.drawables, 0);
        assert_eq!(stats.resources_collected, 0);
    }
    assert_eq!(renderer.pools().len(), live);

    // Back in view: nothing is recreated or recompiled
    scene.node_mut(cube).unwrap().set_position(0.0, 0.0, 0.0);
    renderer.gpu_mut().clear_calls();
    let stats = renderer.render(&mut scene, camera);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.programs_compiled, 0);
    assert_eq!(renderer.gpu().count(|c| matches!(c, GpuCall::CreateBuffer { .. })), 0);
}

#[test]
fn test_hidden_drawable_is_collected() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    let cube = add_cube(&mut scene, root, "cube", Material::basic());
    let mut renderer = ready_renderer(RendererConfig::default());

    renderer.render(&mut scene, camera);
    scene.node_mut(cube).unwrap().visible = false;
    let stats = renderer.render(&mut scene, camera);

    assert!(stats.resources_collected > 0);
    assert_eq!(renderer.gpu().live_count(ObjectKind::Buffer), 0);
}

#[test]
fn test_changed_attribute_data_updates_buffer() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    let geometry = Geometry::cube(1.0).into_shared();
    let drawable = Drawable::new(geometry.clone(), Material::basic().into_shared());
    scene.create_child(root, Node::mesh("cube", drawable)).unwrap();
    let mut renderer = ready_renderer(RendererConfig::default());

    renderer.render(&mut scene, camera);
    {
        let mut geometry = geometry.borrow_mut();
        let position = geometry.attribute_mut(attribute_names::POSITION).unwrap();
        let scaled: Vec<f32> = position.data().iter().map(|v| v * 2.0).collect();
        position.set_data(scaled);
    }
    renderer.gpu_mut().clear_calls();
    renderer.render(&mut scene, camera);

    let gpu = renderer.gpu();
    assert_eq!(gpu.count(|c| matches!(c, GpuCall::UpdateBuffer { .. })), 1);
    assert_eq!(gpu.count(|c| matches!(c, GpuCall::CreateBuffer { .. })), 0);
    assert_eq!(gpu.draw_count(), 1);
}

#[test]
fn test_disabled_gc_keeps_everything() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    let cube = add_cube(&mut scene, root, "cube", Material::basic());
    let config = RendererConfig {
        gc_enabled: false,
        ..RendererConfig::default()
    };
    let mut renderer = ready_renderer(config);

    renderer.render(&mut scene, camera);
    let live = renderer.pools().len();
    scene.remove_subtree(cube);
    let stats = renderer.render(&mut scene, camera);

    assert_eq!(stats.resources_collected, 0);
    assert_eq!(renderer.pools().len(), live);
    assert_eq!(renderer.gpu().live_count(ObjectKind::Program), 1);
}
