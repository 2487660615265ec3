//! Frame pipeline
//!
//! [`Renderer::render`] turns a scene graph into GPU calls:
//!
//! ```text
//! update world matrices → camera → traverse (cull, collect lights)
//!   → sort → pack lights → draw each item → clear dirty flags → collect
//! ```
//!
//! Drawing one item resolves its shader variant, fetches (or compiles) the
//! program, applies material state through the [`GpuStateCache`], binds
//! attributes and uniforms by name through the [`SemanticRegistry`] and
//! issues the draw call. Every GPU object touched is marked used by the
//! drawable's node so the end-of-frame collection keeps it.

use std::borrow::Cow;
use std::collections::HashSet;
use std::rc::Rc;

use super::geometry::{BufferId, Geometry};
use super::gpu::{
    ActiveUniform, AttributeLayout, BufferTarget, BufferUsage, Capability, CompiledProgram,
    GpuCapabilities, GpuContext, GpuError, IndexType, RawHandle, StateCommand, StateSlot,
    UniformValue,
};
use super::light::{LightAggregate, LightManager};
use super::material::{Material, MaterialId};
use super::render_list::{RenderItem, RenderList};
use super::resource_pool::{
    BufferResource, ResourceKey, ResourceOwner, ResourcePools, TextureResource, VertexArrayKey,
    VertexArrayResource,
};
use super::semantic::{FrameUniforms, SemanticContext, SemanticRegistry, SemanticValue};
use super::shader::{ShaderVariant, ShaderVariantResolver, VariantId};
use super::state_cache::GpuStateCache;
use super::texture::SharedTexture;
use super::{RenderError, RenderResult};
use crate::core::{ClearMask, Config, RendererConfig};
use crate::events::{Event, EventChannel, ListenerId, Propagation};
use crate::foundation::math::Mat4Ext;
use crate::scene::{Frustum, Node, NodeId, NodeKind, SceneGraph, TraverseControl};

/// Lifecycle state of a [`Renderer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererStatus {
    /// `initialize` not called yet
    Uninitialized,
    /// Frames are rendered
    Ready,
    /// Initialization or shader compilation failed; frames are skipped until
    /// [`Renderer::reinitialize`]
    Disabled,
    /// The GPU context is gone; frames are skipped until it comes back
    ContextLost,
}

/// Per-frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Drawables in the render list
    pub drawables: usize,
    /// Lights packed for the frame
    pub lights: usize,
    /// Draw calls issued
    pub draw_calls: usize,
    /// Primitives submitted
    pub faces: usize,
    /// State calls forwarded to the GPU
    pub state_calls_issued: u64,
    /// State calls dropped as redundant
    pub state_calls_elided: u64,
    /// Programs compiled during the frame
    pub programs_compiled: u64,
    /// GPU objects destroyed by the end-of-frame collection
    pub resources_collected: usize,
}

/// Renderer lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// The GPU context was lost; every GPU object is gone
    ContextLost,
    /// The GPU context is back; resources are recreated on demand
    ContextRestored,
    /// Initialization or shader compilation failed
    InitFailed {
        /// Human readable cause
        reason: String,
    },
    /// A frame is about to be drawn
    BeforeRender {
        /// Frame number, starting at 1
        frame: u64,
    },
    /// A frame was drawn
    AfterRender {
        /// Frame number, starting at 1
        frame: u64,
        /// Counters of that frame
        stats: FrameStats,
    },
}

/// Listener key for [`RendererEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererEventKind {
    /// See [`RendererEvent::ContextLost`]
    ContextLost,
    /// See [`RendererEvent::ContextRestored`]
    ContextRestored,
    /// See [`RendererEvent::InitFailed`]
    InitFailed,
    /// See [`RendererEvent::BeforeRender`]
    BeforeRender,
    /// See [`RendererEvent::AfterRender`]
    AfterRender,
}

impl Event for RendererEvent {
    type Kind = RendererEventKind;

    fn kind(&self) -> RendererEventKind {
        match self {
            Self::ContextLost => RendererEventKind::ContextLost,
            Self::ContextRestored => RendererEventKind::ContextRestored,
            Self::InitFailed { .. } => RendererEventKind::InitFailed,
            Self::BeforeRender { .. } => RendererEventKind::BeforeRender,
            Self::AfterRender { .. } => RendererEventKind::AfterRender,
        }
    }
}

/// Output rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Left edge
    pub x: i32,
    /// Bottom edge
    pub y: i32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
        }
    }
}

/// Retained-mode scene renderer
///
/// Owns every GPU object it creates. Geometry, materials and textures stay
/// owned by the application and are uploaded lazily.
///
/// ## Design Notes
///
/// `render` never returns an error. Failures are reported through
/// [`Renderer::status`] and the event channel, and the frame is skipped.
pub struct Renderer<G: GpuContext> {
    gpu: G,
    config: RendererConfig,
    status: RendererStatus,
    capabilities: GpuCapabilities,
    state: GpuStateCache,
    pools: ResourcePools,
    resolver: ShaderVariantResolver,
    semantics: SemanticRegistry,
    lights: LightManager,
    render_list: RenderList,
    events: EventChannel<RendererEvent>,
    viewport: Viewport,
    frame: u64,
}

impl<G: GpuContext> Renderer<G> {
    /// Create an uninitialized renderer
    ///
    /// # Arguments
    /// * `gpu` - Device every call is issued to
    /// * `config` - Pipeline switches, validated by [`Self::initialize`]
    pub fn new(gpu: G, config: RendererConfig) -> Self {
        Self {
            gpu,
            resolver: ShaderVariantResolver::new(config.shader_precision),
            lights: LightManager::new(config.max_lights_per_category),
            config,
            status: RendererStatus::Uninitialized,
            capabilities: GpuCapabilities::default(),
            state: GpuStateCache::new(),
            pools: ResourcePools::new(),
            semantics: SemanticRegistry::new(),
            render_list: RenderList::new(),
            events: EventChannel::new(),
            viewport: Viewport::default(),
            frame: 0,
        }
    }

    /// Validate the configuration and query device capabilities.
    ///
    /// On failure the renderer is `Disabled`, an `InitFailed` event is fired
    /// and the error is returned.
    pub fn initialize(&mut self) -> RenderResult<()> {
        let result = self
            .config
            .validate()
            .map_err(RenderError::from)
            .and_then(|()| self.gpu.capabilities().map_err(RenderError::from));

        match result {
            Ok(capabilities) => {
                self.capabilities = capabilities;
                self.status = RendererStatus::Ready;
                log::info!(
                    "Renderer initialized ({} texture units, vertex arrays: {})",
                    capabilities.max_texture_units,
                    capabilities.vertex_array_objects
                );
                Ok(())
            }
            Err(err) => {
                self.disable(err.to_string());
                Err(RenderError::InitializationFailed(err.to_string()))
            }
        }
    }

    /// Leave the `Disabled` state: reset GPU state tracking and initialize again
    pub fn reinitialize(&mut self) -> RenderResult<()> {
        log::info!("Reinitializing renderer");
        self.state.reset();
        self.status = RendererStatus::Uninitialized;
        self.initialize()
    }

    /// Current lifecycle state
    pub fn status(&self) -> RendererStatus {
        self.status
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Capabilities reported at initialization
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Device
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    /// Mutable device access. State changed here behind the renderer's back
    /// must be followed by [`Self::invalidate_state`].
    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    /// Forget the shadowed GPU state so every following state call is issued
    pub fn invalidate_state(&mut self) {
        self.state.reset();
    }

    /// Renderer event channel
    pub fn events_mut(&mut self) -> &mut EventChannel<RendererEvent> {
        &mut self.events
    }

    /// Subscribe to renderer events
    pub fn on<F>(&mut self, kind: RendererEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&RendererEvent) -> Propagation + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Pooled GPU resources
    pub fn pools(&self) -> &ResourcePools {
        &self.pools
    }

    /// Shader variant caches
    pub fn resolver(&self) -> &ShaderVariantResolver {
        &self.resolver
    }

    /// Semantic binding table
    pub fn semantics(&self) -> &SemanticRegistry {
        &self.semantics
    }

    /// Frames rendered so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Output rectangle
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Set the output rectangle
    pub fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Viewport { x, y, width, height };
    }

    /// Resize the output, anchored at the origin
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.set_viewport(0, 0, width, height);
    }

    /// The GPU context is gone: drop the state shadow and every pooled object
    /// without touching the device, then fire `ContextLost`.
    pub fn handle_context_lost(&mut self) {
        if self.status == RendererStatus::ContextLost {
            return;
        }
        log::warn!("GPU context lost, dropping {} pooled resources", self.pools.len());
        self.state.reset();
        self.pools.forget_all();
        self.status = RendererStatus::ContextLost;
        self.events.fire(&RendererEvent::ContextLost);
    }

    /// The GPU context is back: query capabilities again and resume.
    /// Resources are recreated lazily by the next frames.
    pub fn handle_context_restored(&mut self) {
        if self.status != RendererStatus::ContextLost {
            return;
        }
        self.state.reset();
        match self.gpu.capabilities() {
            Ok(capabilities) => {
                self.capabilities = capabilities;
                self.status = RendererStatus::Ready;
                log::warn!("GPU context restored");
                self.events.fire(&RendererEvent::ContextRestored);
            }
            Err(err) => self.disable(format!("context restore failed: {err}")),
        }
    }

    fn disable(&mut self, reason: String) {
        log::error!("Renderer disabled: {reason}");
        self.status = RendererStatus::Disabled;
        self.events.fire(&RendererEvent::InitFailed { reason });
    }

    /// Draw one frame of `scene` as seen from the `camera` node.
    ///
    /// Skipped (all-zero stats) unless the renderer is `Ready` and the
    /// context is available.
    pub fn render(&mut self, scene: &mut SceneGraph, camera: NodeId) -> FrameStats {
        if self.status == RendererStatus::Ready && self.gpu.is_context_lost() {
            self.handle_context_lost();
        }
        if self.status == RendererStatus::ContextLost {
            if self.gpu.is_context_lost() {
                log::trace!("Skipping frame, GPU context lost");
                return FrameStats::default();
            }
            self.handle_context_restored();
        }
        if self.status != RendererStatus::Ready {
            log::trace!("Skipping frame, renderer {:?}", self.status);
            return FrameStats::default();
        }

        self.frame += 1;
        let frame = self.frame;
        self.events.fire(&RendererEvent::BeforeRender { frame });

        scene.update_world_matrix_tree(scene.root(), false);
        let Some((uniforms, frustum)) = self.update_camera(scene, camera) else {
            log::warn!("Node {camera:?} is not a camera, skipping frame");
            return FrameStats::default();
        };

        self.clear();
        let keep_alive = self.collect(scene, &uniforms, &frustum);
        self.render_list.sort(self.config.sort_transparent);

        let compiled_before = self.pools.programs.compiled_count();
        let mut stats = FrameStats {
            drawables: self.render_list.len(),
            ..FrameStats::default()
        };

        let mut failure = None;
        {
            let lights = self.lights.update(&uniforms.view);
            stats.lights = lights.light_count();
            let mut pass = DrawPass {
                gpu: &mut self.gpu,
                config: &self.config,
                capabilities: self.capabilities,
                state: &mut self.state,
                pools: &mut self.pools,
                resolver: &mut self.resolver,
                semantics: &mut self.semantics,
                lights,
                frame: &uniforms,
                current_material: None,
                shared_uploaded: HashSet::new(),
                draw_calls: 0,
                faces: 0,
            };

            for item in self.render_list.iter() {
                let mut used = Vec::new();
                if let Err(err) = pass.draw(item, &mut used) {
                    failure = Some(err);
                    break;
                }
                if let Some(drawable) = scene.node_mut(item.node).and_then(Node::drawable_mut) {
                    drawable.used_resources = used;
                }
            }
            stats.draw_calls = pass.draw_calls;
            stats.faces = pass.faces;
        }

        if let Some(err) = failure {
            match err {
                RenderError::ContextLost | RenderError::Gpu(GpuError::ContextLost) => {
                    self.handle_context_lost();
                }
                other => self.disable(other.to_string()),
            }
            self.state.take_stats();
            return stats;
        }

        for item in self.render_list.iter() {
            item.geometry.borrow_mut().clear_dirty();
            item.material.borrow_mut().clear_dirty();
        }

        if self.config.gc_enabled {
            for (owner, keys) in &keep_alive {
                for key in keys {
                    self.pools.mark_used(key, *owner);
                }
            }
            stats.resources_collected = self.pools.collect_unused(&mut self.gpu);
            if stats.resources_collected > 0 {
                log::debug!("Collected {} unused GPU resources", stats.resources_collected);
            }
            let pruned = self.resolver.collect_unused(&self.pools.programs);
            if pruned > 0 {
                log::trace!("Pruned {pruned} shader cache entries");
            }
        }

        let state_stats = self.state.take_stats();
        stats.state_calls_issued = state_stats.issued;
        stats.state_calls_elided = state_stats.elided;
        stats.programs_compiled = self.pools.programs.compiled_count() - compiled_before;

        log::trace!("Frame {frame}: {stats:?}");
        self.events.fire(&RendererEvent::AfterRender { frame, stats });
        stats
    }

    fn update_camera(&self, scene: &mut SceneGraph, camera: NodeId) -> Option<(FrameUniforms, Frustum)> {
        // A camera outside the tree is not reached by the root update
        if camera != scene.root() && scene.node(camera)?.parent().is_none() {
            scene.update_world_matrix_tree(camera, false);
        }

        let node = scene.node_mut(camera)?;
        let world = *node.world_matrix();
        let cam = node.as_camera_mut()?;
        cam.update_view(&world);

        let v = self.viewport;
        let uniforms = FrameUniforms {
            view: *cam.view_matrix(),
            view_inverse: world,
            projection: *cam.projection_matrix(),
            projection_inverse: cam.projection_matrix().inverse_or_identity(),
            view_projection: *cam.view_projection(),
            camera_position: cam.world_position(),
            near: cam.near(),
            far: cam.far(),
            viewport: [v.x as f32, v.y as f32, v.width as f32, v.height as f32],
        };
        Some((uniforms, cam.frustum().clone()))
    }

    fn clear(&mut self) {
        let gpu: &mut dyn GpuContext = &mut self.gpu;
        let v = self.viewport;
        self.state.apply(gpu, StateCommand::BindFramebuffer(None));
        self.state.viewport(gpu, v.x, v.y, v.width, v.height);
        self.state.clear_color(gpu, self.config.clear_color);
        if self.config.clear_mask.contains(ClearMask::DEPTH) {
            self.state.depth_mask(gpu, true);
        }
        gpu.clear(self.config.clear_mask);
    }

    /// Walk the scene into the render list and the light manager. Returns the
    /// resources of drawables that were reached but culled.
    fn collect(
        &mut self,
        scene: &mut SceneGraph,
        uniforms: &FrameUniforms,
        frustum: &Frustum,
    ) -> Vec<(ResourceOwner, Vec<ResourceKey>)> {
        self.render_list.reset();
        self.lights.reset();

        let render_list = &mut self.render_list;
        let lights = &mut self.lights;
        let culling = self.config.frustum_culling;
        let mut keep_alive = Vec::new();
        let mut culled = 0usize;

        scene.traverse(scene.root(), false, |id, node| {
            if !node.visible {
                return TraverseControl::StopChildren;
            }
            match &node.kind {
                NodeKind::Light(light) => lights.add(light, node.world_matrix()),
                NodeKind::Mesh(drawable) => {
                    let (Some(geometry), Some(material)) = (&drawable.geometry, &drawable.material) else {
                        log::trace!("Skipping incomplete drawable '{}'", node.name);
                        return TraverseControl::Continue;
                    };

                    if culling && node.frustum_test {
                        let bounds = geometry.borrow_mut().bounding_sphere();
                        if let Some(sphere) = bounds {
                            if !frustum.intersects_sphere(&sphere.transformed(node.world_matrix())) {
                                culled += 1;
                                keep_alive.push((id, drawable.used_resources.clone()));
                                return TraverseControl::Continue;
                            }
                        }
                    }

                    let material_ref = material.borrow();
                    let depth = -(uniforms.view * node.world_matrix()).translation_part().z;
                    render_list.add(
                        RenderItem {
                            node: id,
                            geometry: Rc::clone(geometry),
                            material: Rc::clone(material),
                            world_matrix: *node.world_matrix(),
                            depth,
                            render_order: material_ref.render_order(),
                        },
                        material_ref.transparent(),
                    );
                }
                NodeKind::Group | NodeKind::Camera(_) => {}
            }
            TraverseControl::Continue
        });

        log::trace!(
            "Collected {} drawables ({} culled), {} lights",
            render_list.len(),
            culled,
            lights.collected_count()
        );
        keep_alive
    }
}

impl<G: GpuContext> Drop for Renderer<G> {
    fn drop(&mut self) {
        if !self.gpu.is_context_lost() {
            self.pools.destroy_all(&mut self.gpu);
        }
    }
}

/// Borrowed renderer parts for drawing the items of one frame
struct DrawPass<'a> {
    gpu: &'a mut dyn GpuContext,
    config: &'a RendererConfig,
    capabilities: GpuCapabilities,
    state: &'a mut GpuStateCache,
    pools: &'a mut ResourcePools,
    resolver: &'a mut ShaderVariantResolver,
    semantics: &'a mut SemanticRegistry,
    lights: &'a LightAggregate,
    frame: &'a FrameUniforms,
    current_material: Option<MaterialId>,
    // Programs whose drawable-invariant uniforms were set this frame
    shared_uploaded: HashSet<VariantId>,
    draw_calls: usize,
    faces: usize,
}

impl DrawPass<'_> {
    fn draw(&mut self, item: &RenderItem, used: &mut Vec<ResourceKey>) -> RenderResult<()> {
        let owner = item.node;
        let mut geometry = item.geometry.borrow_mut();
        let material = item.material.borrow();

        let header = self.resolver.resolve_header(&mut geometry, &material, self.lights);
        let variant = self.resolver.resolve_variant(&material, &header);
        let program = self.pools.programs.get_or_compile(self.gpu, &variant, owner)?;
        used.push(ResourceKey::Program(variant.id()));
        self.state.use_program(self.gpu, Some(program.handle));

        if self.current_material != Some(material.id()) || material.is_dirty() {
            self.apply_material_state(&material);
            self.current_material = Some(material.id());
        }

        let ctx = SemanticContext {
            frame: self.frame,
            model: &item.world_matrix,
            material: &material,
            lights: self.lights,
        };

        self.bind_vertex_input(&program, &variant, &mut geometry, &ctx, owner, used)?;
        let Some(index_type) = self.bind_indices(&geometry, owner, used)? else {
            return Ok(());
        };
        self.bind_uniforms(&program, &variant, &ctx, owner, used)?;

        let count = geometry.draw_count();
        if count == 0 {
            return Ok(());
        }
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        match index_type {
            Some(index_type) => self.gpu.draw_elements(geometry.mode(), count, index_type, 0),
            None => self.gpu.draw_arrays(geometry.mode(), 0, count),
        }
        self.draw_calls += 1;
        self.faces += geometry.face_count();
        Ok(())
    }

    fn apply_material_state(&mut self, material: &Material) {
        let gpu = &mut *self.gpu;
        let state = &mut *self.state;

        state.set_enabled(gpu, Capability::DepthTest, material.depth_test());
        if material.depth_test() {
            state.depth_func(gpu, material.depth_func());
        }
        state.depth_mask(gpu, material.depth_mask());

        state.set_enabled(gpu, Capability::CullFace, material.cull_face());
        if material.cull_face() {
            state.cull_face(gpu, material.cull_type());
        }
        state.front_face(gpu, material.front_face());

        state.set_enabled(gpu, Capability::Blend, material.blend());
        if material.blend() {
            let blend = material.blend_state();
            state.apply(
                gpu,
                StateCommand::BlendFuncSeparate {
                    src_rgb: blend.src_rgb,
                    dst_rgb: blend.dst_rgb,
                    src_alpha: blend.src_alpha,
                    dst_alpha: blend.dst_alpha,
                },
            );
            state.apply(
                gpu,
                StateCommand::BlendEquationSeparate {
                    rgb: blend.equation_rgb,
                    alpha: blend.equation_alpha,
                },
            );
        }
    }

    /// Bind attribute buffers, through a vertex array object when enabled
    fn bind_vertex_input(
        &mut self,
        program: &CompiledProgram,
        variant: &ShaderVariant,
        geometry: &mut Geometry,
        ctx: &SemanticContext<'_>,
        owner: ResourceOwner,
        used: &mut Vec<ResourceKey>,
    ) -> RenderResult<()> {
        if !(self.config.use_vertex_arrays && self.capabilities.vertex_array_objects) {
            return self.bind_attributes(program, geometry, ctx, owner, used, true);
        }

        let key = VertexArrayKey {
            geometry: geometry.id(),
            variant: variant.id(),
        };
        let layout = format!(
            "{}@{}#{}",
            geometry.shader_key(),
            ctx.material.id().0,
            ctx.material.version()
        );
        let handle = match self.pools.vertex_arrays.get(&key) {
            Some(vao) => vao.handle,
            None => {
                let handle = self.gpu.create_vertex_array()?;
                log::debug!("Created vertex array {handle:?} for {key:?}");
                self.pools.vertex_arrays.add(
                    key,
                    VertexArrayResource {
                        handle,
                        layout: String::new(),
                    },
                );
                handle
            }
        };
        let record = self
            .pools
            .vertex_arrays
            .get(&key)
            .map_or(true, |vao| vao.layout != layout);

        self.state.bind_vertex_array(self.gpu, Some(handle));
        self.bind_attributes(program, geometry, ctx, owner, used, record)?;

        if let Some(vao) = self.pools.vertex_arrays.get_mut(&key) {
            vao.layout = layout;
        }
        self.pools.vertex_arrays.mark_used(&key, owner);
        used.push(ResourceKey::VertexArray(key));
        Ok(())
    }

    /// Upload attribute buffers and, when `record` is set or a buffer was
    /// recreated, point the program's attribute locations at them
    fn bind_attributes(
        &mut self,
        program: &CompiledProgram,
        geometry: &Geometry,
        ctx: &SemanticContext<'_>,
        owner: ResourceOwner,
        used: &mut Vec<ResourceKey>,
        record: bool,
    ) -> RenderResult<()> {
        for input in &program.attributes {
            let descriptor = self.semantics.descriptor_for(&input.name, ctx.material.attributes());
            let Some(SemanticValue::Attribute(source)) = self.semantics.resolve(&descriptor, ctx) else {
                continue;
            };
            let Some(attribute) = geometry.attribute(&source) else {
                log::trace!("Geometry has no '{source}' attribute for '{}'", input.name);
                continue;
            };

            let (handle, created) = self.upload_buffer(
                BufferTarget::Array,
                attribute.id(),
                attribute.version(),
                None,
                owner,
                || Cow::Borrowed(bytemuck::cast_slice(attribute.data())),
            )?;
            used.push(ResourceKey::Buffer(attribute.id()));

            if record || created {
                self.state.bind_buffer(self.gpu, BufferTarget::Array, Some(handle));
                self.gpu.vertex_attrib_pointer(
                    input.location,
                    &AttributeLayout {
                        item_size: attribute.item_size(),
                        normalized: attribute.is_normalized(),
                        stride: 0,
                        offset: 0,
                    },
                );
            }
        }
        Ok(())
    }

    /// Upload and bind the index buffer. `Ok(None)` means the draw must be
    /// skipped, `Ok(Some(None))` means a non-indexed draw.
    fn bind_indices(
        &mut self,
        geometry: &Geometry,
        owner: ResourceOwner,
        used: &mut Vec<ResourceKey>,
    ) -> RenderResult<Option<Option<IndexType>>> {
        let Some(indices) = geometry.indices() else {
            return Ok(Some(None));
        };

        let index_type = if indices.fits_u16() {
            IndexType::U16
        } else if self.capabilities.uint_indices {
            IndexType::U32
        } else {
            log::warn!("Geometry {:?} needs 32-bit indices, which the device lacks", geometry.id());
            return Ok(None);
        };

        let (handle, _) = self.upload_buffer(
            BufferTarget::ElementArray,
            indices.id(),
            indices.version(),
            Some(index_type),
            owner,
            || match index_type {
                IndexType::U16 => {
                    let narrow: Vec<u16> = indices.data().iter().map(|&i| i as u16).collect();
                    Cow::Owned(bytemuck::cast_slice(&narrow).to_vec())
                }
                IndexType::U32 => Cow::Borrowed(bytemuck::cast_slice(indices.data())),
            },
        )?;
        used.push(ResourceKey::Buffer(indices.id()));
        self.state.bind_buffer(self.gpu, BufferTarget::ElementArray, Some(handle));

        let stored = self.pools.buffers.get(&indices.id()).and_then(|b| b.index_type);
        Ok(Some(stored.or(Some(index_type))))
    }

    /// Create or refresh a pooled buffer. Returns its handle and whether it
    /// was created by this call.
    fn upload_buffer<'d>(
        &mut self,
        target: BufferTarget,
        id: BufferId,
        version: u64,
        index_type: Option<IndexType>,
        owner: ResourceOwner,
        bytes: impl FnOnce() -> Cow<'d, [u8]>,
    ) -> RenderResult<(RawHandle, bool)> {
        if let Some(buffer) = self.pools.buffers.get_mut(&id) {
            let handle = buffer.handle;
            if buffer.version != version || buffer.index_type != index_type {
                let data = bytes();
                self.state.bind_buffer(self.gpu, target, Some(handle));
                self.gpu.update_buffer(handle, target, &data);
                buffer.version = version;
                buffer.index_type = index_type;
                log::trace!("Updated buffer {id:?} to version {version}");
            }
            self.pools.buffers.mark_used(&id, owner);
            return Ok((handle, false));
        }

        let data = bytes();
        let handle = self.gpu.create_buffer(target, &data, BufferUsage::Static)?;
        // Creation leaves the new buffer bound
        self.state.invalidate(StateSlot::Buffer(target));
        log::debug!("Created {target:?} buffer {handle:?} ({} bytes) for {id:?}", data.len());
        self.pools.buffers.add(
            id,
            BufferResource {
                handle,
                target,
                version,
                index_type,
            },
        );
        self.pools.buffers.mark_used(&id, owner);
        Ok((handle, true))
    }

    /// Write the program's uniforms. Drawable-invariant values are written
    /// once per program per frame; samplers are bound for every draw.
    fn bind_uniforms(
        &mut self,
        program: &CompiledProgram,
        variant: &ShaderVariant,
        ctx: &SemanticContext<'_>,
        owner: ResourceOwner,
        used: &mut Vec<ResourceKey>,
    ) -> RenderResult<()> {
        let first_use = self.shared_uploaded.insert(variant.id());
        let mut unit = 0;

        for uniform in &program.uniforms {
            let descriptor = self.semantics.descriptor_for(&uniform.name, ctx.material.uniforms());
            let sampler = uniform.kind.is_sampler();
            if !sampler && !first_use && !self.semantics.depends_on_drawable(&descriptor) {
                continue;
            }
            let Some(value) = self.semantics.resolve(&descriptor, ctx) else {
                continue;
            };

            match value {
                SemanticValue::Uniform(value) if !sampler => self.gpu.set_uniform(uniform.location, &value),
                SemanticValue::Texture(texture) => {
                    unit = self.bind_sampler(uniform, std::slice::from_ref(&texture), unit, owner, used)?;
                }
                SemanticValue::Textures(textures) => {
                    unit = self.bind_sampler(uniform, &textures, unit, owner, used)?;
                }
                _ => log::trace!("Value of '{}' does not fit its declared type", uniform.name),
            }
        }
        Ok(())
    }

    /// Bind textures to consecutive units starting at `unit` and point the
    /// sampler uniform at them. Returns the next free unit.
    fn bind_sampler(
        &mut self,
        uniform: &ActiveUniform,
        textures: &[SharedTexture],
        mut unit: u32,
        owner: ResourceOwner,
        used: &mut Vec<ResourceKey>,
    ) -> RenderResult<u32> {
        let mut units = Vec::with_capacity(textures.len());
        for texture in textures.iter().take(uniform.array_size as usize) {
            if unit >= self.capabilities.max_texture_units {
                log::warn!(
                    "Out of texture units ({}) binding '{}'",
                    self.capabilities.max_texture_units,
                    uniform.name
                );
                break;
            }
            let handle = self.texture_handle(texture, owner)?;
            used.push(ResourceKey::Texture(texture.id()));
            self.state.bind_texture(self.gpu, unit, texture.target, Some(handle));
            units.push(unit as i32);
            unit += 1;
        }

        if units.is_empty() {
            return Ok(unit);
        }
        let value = if uniform.array_size == 1 {
            UniformValue::Int(units[0])
        } else {
            UniformValue::IntArray(units)
        };
        self.gpu.set_uniform(uniform.location, &value);
        Ok(unit)
    }

    fn texture_handle(&mut self, texture: &SharedTexture, owner: ResourceOwner) -> RenderResult<RawHandle> {
        let id = texture.id();
        if let Some(resource) = self.pools.textures.get(&id) {
            let handle = resource.handle;
            self.pools.textures.mark_used(&id, owner);
            return Ok(handle);
        }

        let handle = self.gpu.create_texture(&texture.descriptor())?;
        log::debug!(
            "Uploaded texture {:?} '{}' ({}x{})",
            id,
            texture.name.as_deref().unwrap_or(""),
            texture.width,
            texture.height
        );
        self.pools.textures.add(id, TextureResource { handle });
        self.pools.textures.mark_used(&id, owner);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::geometry::Geometry;
    use crate::render::headless::{GpuCall, RecordingContext};
    use crate::render::material::Material;
    use crate::scene::{Camera, Drawable};
    use std::cell::RefCell;

    fn scene_with_cube() -> (SceneGraph, NodeId, NodeId) {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let camera = scene
            .create_child(
                root,
                Node::camera("camera", Camera::perspective(60.0, 1.0, 0.1, 100.0)).with_position(0.0, 0.0, 5.0),
            )
            .unwrap();
        let drawable = Drawable::new(Geometry::cube(1.0).into_shared(), Material::basic().into_shared());
        let mesh = scene.create_child(root, Node::mesh("cube", drawable)).unwrap();
        (scene, camera, mesh)
    }

    fn ready_renderer() -> Renderer<RecordingContext> {
        let mut renderer = Renderer::new(RecordingContext::new(), RendererConfig::default());
        renderer.initialize().unwrap();
        renderer
    }

    #[test]
    fn test_frame_before_initialize_is_skipped() {
        let (mut scene, camera, _) = scene_with_cube();
        let mut renderer = Renderer::new(RecordingContext::new(), RendererConfig::default());
        assert_eq!(renderer.render(&mut scene, camera), FrameStats::default());
        assert!(renderer.gpu().calls().is_empty());
    }

    #[test]
    fn test_single_cube_frame() {
        let (mut scene, camera, mesh) = scene_with_cube();
        let mut renderer = ready_renderer();

        let stats = renderer.render(&mut scene, camera);
        assert_eq!(stats.drawables, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.faces, 12);
        assert_eq!(stats.programs_compiled, 1);
        assert!(renderer.gpu().calls().contains(&GpuCall::DrawElements {
            mode: crate::render::gpu::DrawMode::Triangles,
            count: 36,
            index_type: IndexType::U16,
            offset: 0,
        }));

        let used = &scene.node(mesh).unwrap().drawable().unwrap().used_resources;
        assert!(used.iter().any(|k| matches!(k, ResourceKey::Program(_))));
        assert!(used.iter().any(|k| matches!(k, ResourceKey::VertexArray(_))));
    }

    #[test]
    fn test_init_failure_disables_and_fires_event() {
        let mut gpu = RecordingContext::new();
        gpu.fail_capabilities(Some(GpuError::Unsupported("webgl".to_string())));
        let mut renderer = Renderer::new(gpu, RendererConfig::default());
        let failures = Rc::new(RefCell::new(0));
        let counter = failures.clone();
        renderer.on(RendererEventKind::InitFailed, move |_| {
            *counter.borrow_mut() += 1;
            Propagation::Continue
        });

        assert!(matches!(renderer.initialize(), Err(RenderError::InitializationFailed(_))));
        assert_eq!(renderer.status(), RendererStatus::Disabled);
        assert_eq!(*failures.borrow(), 1);

        renderer.gpu_mut().fail_capabilities(None);
        renderer.reinitialize().unwrap();
        assert_eq!(renderer.status(), RendererStatus::Ready);
    }

    #[test]
    fn test_non_camera_node_skips_frame() {
        let (mut scene, _, mesh) = scene_with_cube();
        let mut renderer = ready_renderer();
        let stats = renderer.render(&mut scene, mesh);
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(renderer.gpu().draw_count(), 0);
    }
}
