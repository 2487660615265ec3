//! Scene demo application
//!
//! Builds a small scene (a spinning cube orbited by a transparent plane, two
//! lights, one hidden group) and renders a few frames against the recording
//! GPU context, logging the statistics of every frame.
//!
//! Usage: `scene_demo [config.toml|config.ron]`

use std::cell::Cell;
use std::rc::Rc;

use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use scene_engine::render::headless::GpuCall;
use thiserror::Error;

const FRAMES: u32 = 8;

#[derive(Error, Debug)]
enum DemoError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("Scene setup failed: {0}")]
    Scene(&'static str),
}

struct DemoApp {
    scene: SceneGraph,
    renderer: Renderer<RecordingContext>,
    camera: NodeId,
    cube: NodeId,
    orbit: NodeId,
    total_rotation: f32,
    collected: Rc<Cell<usize>>,
}

impl DemoApp {
    fn new(config: RendererConfig) -> Result<Self, DemoError> {
        log::info!("Creating scene...");
        let mut scene = SceneGraph::new();
        let root = scene.root();

        let camera = scene
            .create_child(
                root,
                Node::camera("camera", Camera::perspective(45.0, 800.0 / 600.0, 0.1, 100.0))
                    .with_position(0.0, 1.0, 8.0),
            )
            .ok_or(DemoError::Scene("camera"))?;

        let cube_material = Material::lambert().with_color(0.8, 0.7, 0.5, 1.0).into_shared();
        let cube = scene
            .create_child(
                root,
                Node::mesh("cube", Drawable::new(Geometry::cube(1.5).into_shared(), cube_material)),
            )
            .ok_or(DemoError::Scene("cube"))?;

        let orbit = scene.create_child(root, Node::group("orbit")).ok_or(DemoError::Scene("orbit"))?;
        let glass = Material::basic()
            .with_color(0.2, 0.4, 0.9, 0.5)
            .with_transparent(true)
            .into_shared();
        scene
            .create_child(
                orbit,
                Node::mesh("glass", Drawable::new(Geometry::plane(2.0, 2.0).into_shared(), glass))
                    .with_position(3.0, 0.0, 0.0),
            )
            .ok_or(DemoError::Scene("glass"))?;

        scene.create_child(root, Node::light("ambient", Light::ambient(Vec3::new(1.0, 1.0, 1.0), 0.2)));
        scene.create_child(
            root,
            Node::light("sun", Light::directional(Vec3::new(1.0, 0.95, 0.9), 1.0)).with_rotation(-45.0, 30.0, 0.0),
        );

        let hidden = scene.create_child(root, Node::group("hidden")).ok_or(DemoError::Scene("hidden"))?;
        scene.create_child(
            hidden,
            Node::mesh(
                "never drawn",
                Drawable::new(Geometry::cube(1.0).into_shared(), Material::basic().into_shared()),
            ),
        );
        if let Some(node) = scene.node_mut(hidden) {
            node.visible = false;
        }

        log::info!("Creating renderer...");
        let mut renderer = Renderer::new(RecordingContext::new(), config);
        renderer.set_size(800, 600);
        renderer.initialize()?;

        let collected = Rc::new(Cell::new(0usize));
        let total = Rc::clone(&collected);
        renderer.on(RendererEventKind::AfterRender, move |event| {
            if let RendererEvent::AfterRender { stats, .. } = event {
                total.set(total.get() + stats.resources_collected);
            }
            Propagation::Continue
        });

        Ok(Self {
            scene,
            renderer,
            camera,
            cube,
            orbit,
            total_rotation: 0.0,
            collected,
        })
    }

    fn update_scene(&mut self, delta_time: f32) {
        // 45 degrees per second
        self.total_rotation += 45.0 * delta_time;
        if let Some(cube) = self.scene.node_mut(self.cube) {
            cube.set_rotation(self.total_rotation, self.total_rotation * 0.5, 0.0);
        }
        if let Some(orbit) = self.scene.node_mut(self.orbit) {
            orbit.set_rotation(0.0, -self.total_rotation, 0.0);
        }
    }

    fn run(&mut self) {
        let delta_time = 1.0 / 60.0;
        for _ in 0..FRAMES {
            self.update_scene(delta_time);
            let stats = self.renderer.render(&mut self.scene, self.camera);
            log::info!(
                "Frame {}: {} drawables, {} lights, {} draw calls, {} faces, state {}/{} (issued/elided), {} programs compiled",
                self.renderer.frame(),
                stats.drawables,
                stats.lights,
                stats.draw_calls,
                stats.faces,
                stats.state_calls_issued,
                stats.state_calls_elided,
                stats.programs_compiled
            );
        }

        let gpu = self.renderer.gpu();
        log::info!(
            "Recorded {} GPU calls, {} draws, {} live pooled resources, {} collected",
            gpu.calls().len(),
            gpu.count(GpuCall::is_draw),
            self.renderer.pools().len(),
            self.collected.get()
        );
    }
}

fn load_config() -> Result<RendererConfig, DemoError> {
    match std::env::args().nth(1) {
        Some(path) => Ok(RendererConfig::load_from_file(&path)?),
        None => Ok(RendererConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_level(&config.log_level);

    log::info!("Starting scene demo");
    let mut app = DemoApp::new(config)?;
    log::info!("Running {FRAMES} frames...");
    app.run();
    log::info!("Scene demo finished");
    Ok(())
}
