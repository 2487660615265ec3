//! Renderer status transitions: failed compilation and context loss

use std::cell::RefCell;
use std::rc::Rc;

use super::{add_cube, ready_renderer, scene_with_camera};
use crate::core::RendererConfig;
use crate::events::Propagation;
use crate::render::headless::GpuCall;
use crate::render::material::Material;
use crate::render::pipeline::{FrameStats, RendererEvent, RendererEventKind, RendererStatus};

fn record(log: &Rc<RefCell<Vec<RendererEvent>>>) -> impl FnMut(&RendererEvent) -> Propagation + 'static {
    let log = Rc::clone(log);
    move |event: &RendererEvent| {
        log.borrow_mut().push(event.clone());
        Propagation::Continue
    }
}

#[test]
fn test_compile_failure_disables_until_reinitialized() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    add_cube(&mut scene, root, "cube", Material::lambert());
    let mut renderer = ready_renderer(RendererConfig::default());
    let events = Rc::new(RefCell::new(Vec::new()));
    renderer.on(RendererEventKind::InitFailed, record(&events));

    renderer.gpu_mut().set_compile_failure(Some("0:1: syntax error".to_string()));
    let stats = renderer.render(&mut scene, camera);
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(renderer.status(), RendererStatus::Disabled);
    assert_eq!(events.borrow().len(), 1);
    match &events.borrow()[0] {
        RendererEvent::InitFailed { reason } => assert!(reason.contains("syntax error")),
        other => panic!("unexpected event {other:?}"),
    }

    // Disabled frames do nothing, even once the shader would compile
    renderer.gpu_mut().set_compile_failure(None);
    renderer.gpu_mut().clear_calls();
    assert_eq!(renderer.render(&mut scene, camera), FrameStats::default());
    assert!(renderer.gpu().calls().is_empty());

    renderer.reinitialize().unwrap();
    assert_eq!(renderer.status(), RendererStatus::Ready);
    let stats = renderer.render(&mut scene, camera);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.programs_compiled, 1);
}

#[test]
fn test_context_loss_skips_frames_and_recovers() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    add_cube(&mut scene, root, "cube", Material::basic());
    let mut renderer = ready_renderer(RendererConfig::default());
    let events = Rc::new(RefCell::new(Vec::new()));
    renderer.on(RendererEventKind::ContextLost, record(&events));
    renderer.on(RendererEventKind::ContextRestored, record(&events));

    assert_eq!(renderer.render(&mut scene, camera).draw_calls, 1);
    assert!(!renderer.pools().is_empty());

    renderer.gpu_mut().lose_context();
    assert_eq!(renderer.render(&mut scene, camera), FrameStats::default());
    assert_eq!(renderer.render(&mut scene, camera), FrameStats::default());
    assert_eq!(renderer.status(), RendererStatus::ContextLost);
    assert!(renderer.pools().is_empty());
    assert_eq!(*events.borrow(), vec![RendererEvent::ContextLost]);

    renderer.gpu_mut().restore_context();
    renderer.gpu_mut().clear_calls();
    let stats = renderer.render(&mut scene, camera);

    assert_eq!(renderer.status(), RendererStatus::Ready);
    assert_eq!(*events.borrow(), vec![RendererEvent::ContextLost, RendererEvent::ContextRestored]);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.programs_compiled, 1);
    assert!(renderer.gpu().count(|c| matches!(c, GpuCall::CreateBuffer { .. })) > 0);
}

#[test]
fn test_frame_events_carry_stats() {
    let (mut scene, camera) = scene_with_camera();
    let root = scene.root();
    add_cube(&mut scene, root, "cube", Material::basic());
    let mut renderer = ready_renderer(RendererConfig::default());
    let events = Rc::new(RefCell::new(Vec::new()));
    renderer.on(RendererEventKind::BeforeRender, record(&events));
    renderer.on(RendererEventKind::AfterRender, record(&events));

    let stats = renderer.render(&mut scene, camera);

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], RendererEvent::BeforeRender { frame: 1 });
    assert_eq!(events[1], RendererEvent::AfterRender { frame: 1, stats });
    assert_eq!(renderer.frame(), 1);
}
