//! Material system for rendering
//!
//! A material is a bag of fixed-function render state, a shading model and
//! two name-keyed binding tables: shader attribute names and shader uniform
//! names mapped to [`SemanticDescriptor`]s. The renderer never hard-codes
//! which uniform receives which value; it asks the material.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::gpu::{BlendEquation, BlendFactor, CompareFunc, Face, FrontFace};
use super::semantic::{Semantic, SemanticDescriptor};
use super::shader::{RenderOptions, ShaderTemplate, TemplateId};
use super::texture::SharedTexture;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Material shared between drawables
pub type SharedMaterial = Rc<RefCell<Material>>;

/// Unique material identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// Which polygon sides are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// Front faces only
    #[default]
    Front,
    /// Back faces only
    Back,
    /// Both sides
    FrontAndBack,
}

/// Shading model, selects the shader template
#[derive(Debug, Clone, Default)]
pub enum ShadingModel {
    /// Unlit base color
    Basic,
    /// Diffuse only
    Lambert,
    /// Diffuse + specular
    Phong,
    /// Metallic/roughness
    #[default]
    Pbr,
    /// Caller supplied template
    Custom(Rc<ShaderTemplate>),
}

impl ShadingModel {
    /// Identity used as the variant cache key
    pub fn template_id(&self) -> TemplateId {
        match self {
            Self::Basic => TemplateId::BASIC,
            Self::Lambert => TemplateId::LAMBERT,
            Self::Phong => TemplateId::PHONG,
            Self::Pbr => TemplateId::PBR,
            Self::Custom(template) => template.id(),
        }
    }

    /// Source template
    pub fn template(&self) -> Rc<ShaderTemplate> {
        match self {
            Self::Basic => Rc::new(ShaderTemplate::basic()),
            Self::Lambert => Rc::new(ShaderTemplate::lambert()),
            Self::Phong => Rc::new(ShaderTemplate::phong()),
            Self::Pbr => Rc::new(ShaderTemplate::pbr()),
            Self::Custom(template) => Rc::clone(template),
        }
    }

    /// Whether the model consumes lights
    pub fn is_lit(&self) -> bool {
        match self {
            Self::Basic => false,
            Self::Lambert | Self::Phong | Self::Pbr => true,
            Self::Custom(template) => template.lit,
        }
    }
}

/// Blend function and equation pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Source RGB factor
    pub src_rgb: BlendFactor,
    /// Destination RGB factor
    pub dst_rgb: BlendFactor,
    /// Source alpha factor
    pub src_alpha: BlendFactor,
    /// Destination alpha factor
    pub dst_alpha: BlendFactor,
    /// RGB equation
    pub equation_rgb: BlendEquation,
    /// Alpha equation
    pub equation_alpha: BlendEquation,
}

impl BlendState {
    /// Classic non-premultiplied alpha blending
    pub const ALPHA: Self = Self {
        src_rgb: BlendFactor::SrcAlpha,
        dst_rgb: BlendFactor::OneMinusSrcAlpha,
        src_alpha: BlendFactor::SrcAlpha,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        equation_rgb: BlendEquation::Add,
        equation_alpha: BlendEquation::Add,
    };

    /// Alpha blending for premultiplied colors
    pub const PREMULTIPLIED: Self = Self {
        src_rgb: BlendFactor::One,
        dst_rgb: BlendFactor::OneMinusSrcAlpha,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        equation_rgb: BlendEquation::Add,
        equation_alpha: BlendEquation::Add,
    };
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            src_rgb: BlendFactor::One,
            dst_rgb: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            equation_rgb: BlendEquation::Add,
            equation_alpha: BlendEquation::Add,
        }
    }
}

/// Texture reference with a per-material scale
#[derive(Debug, Clone)]
pub struct TextureSlot {
    /// Texture
    pub texture: SharedTexture,
    /// Strength (normal maps) or ignored
    pub scale: f32,
}

/// Material properties for rendering a drawable
///
/// Render-state setters mark the material dirty so the renderer re-applies
/// state on the next frame, and bump [`Material::version`], which keys the
/// shader header and vertex array caches.
///
/// Cloning yields a new material: it gets a fresh id and starts dirty.
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    /// Optional debug name
    pub name: Option<String>,

    depth_test: bool,
    depth_mask: bool,
    depth_func: CompareFunc,
    cull_face: bool,
    cull_type: Face,
    front_face: FrontFace,
    side: Side,
    blend: bool,
    blend_state: BlendState,
    transparent: bool,
    premultiplied_alpha: bool,
    alpha_cutoff: Option<f32>,
    render_order: i32,

    shading: ShadingModel,
    base_color: [f32; 4],
    metallic: f32,
    roughness: f32,
    base_color_map: Option<SharedTexture>,
    normal_map: Option<TextureSlot>,
    vertex_colors: bool,
    lighting: bool,

    attributes: HashMap<String, SemanticDescriptor>,
    uniforms: HashMap<String, SemanticDescriptor>,

    dirty: bool,
    version: u64,
}

impl Clone for Material {
    fn clone(&self) -> Self {
        Self {
            id: next_material_id(),
            name: self.name.clone(),
            depth_test: self.depth_test,
            depth_mask: self.depth_mask,
            depth_func: self.depth_func,
            cull_face: self.cull_face,
            cull_type: self.cull_type,
            front_face: self.front_face,
            side: self.side,
            blend: self.blend,
            blend_state: self.blend_state,
            transparent: self.transparent,
            premultiplied_alpha: self.premultiplied_alpha,
            alpha_cutoff: self.alpha_cutoff,
            render_order: self.render_order,
            shading: self.shading.clone(),
            base_color: self.base_color,
            metallic: self.metallic,
            roughness: self.roughness,
            base_color_map: self.base_color_map.clone(),
            normal_map: self.normal_map.clone(),
            vertex_colors: self.vertex_colors,
            lighting: self.lighting,
            attributes: self.attributes.clone(),
            uniforms: self.uniforms.clone(),
            dirty: true,
            version: 0,
        }
    }
}

fn next_material_id() -> MaterialId {
    MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
}

impl Material {
    /// Create a material with default state for a shading model
    pub fn new(shading: ShadingModel) -> Self {
        Self {
            id: next_material_id(),
            name: None,
            depth_test: true,
            depth_mask: true,
            depth_func: CompareFunc::LessEqual,
            cull_face: true,
            cull_type: Face::Back,
            front_face: FrontFace::Ccw,
            side: Side::Front,
            blend: false,
            blend_state: BlendState::default(),
            transparent: false,
            premultiplied_alpha: false,
            alpha_cutoff: None,
            render_order: 0,
            shading,
            base_color: [1.0, 1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 0.5,
            base_color_map: None,
            normal_map: None,
            vertex_colors: false,
            lighting: true,
            attributes: default_attribute_table(),
            uniforms: default_uniform_table(),
            dirty: true,
            version: 0,
        }
    }

    /// Unlit material
    pub fn basic() -> Self {
        Self::new(ShadingModel::Basic)
    }

    /// Diffuse-lit material
    pub fn lambert() -> Self {
        Self::new(ShadingModel::Lambert)
    }

    /// Diffuse + specular material
    pub fn phong() -> Self {
        Self::new(ShadingModel::Phong)
    }

    /// Metallic/roughness material
    pub fn pbr() -> Self {
        Self::new(ShadingModel::Pbr)
    }

    /// Set the base color
    pub fn with_color(mut self, r: f32, g: f32, b: f32, a: f32) -> Self {
        self.set_base_color([r, g, b, a]);
        self
    }

    /// Set the debug name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set transparency
    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.set_transparent(transparent);
        self
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedMaterial {
        Rc::new(RefCell::new(self))
    }

    /// Identity
    pub fn id(&self) -> MaterialId {
        self.id
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.version += 1;
    }

    /// Whether state changed since the renderer last consumed it
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag a change made outside the setters
    pub fn mark_dirty(&mut self) {
        self.touch();
    }

    /// Counter bumped by every state change; unlike the dirty flag it is
    /// never reset, so caches can tell whether they saw the latest state
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Called by the renderer at the end of a frame
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    // Depth

    /// Depth testing enabled
    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    /// Enable or disable depth testing
    pub fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
        self.touch();
    }

    /// Depth writes enabled
    pub fn depth_mask(&self) -> bool {
        self.depth_mask
    }

    /// Enable or disable depth writes
    pub fn set_depth_mask(&mut self, enabled: bool) {
        self.depth_mask = enabled;
        self.touch();
    }

    /// Depth comparison
    pub fn depth_func(&self) -> CompareFunc {
        self.depth_func
    }

    /// Set the depth comparison
    pub fn set_depth_func(&mut self, func: CompareFunc) {
        self.depth_func = func;
        self.touch();
    }

    // Culling

    /// Face culling enabled
    pub fn cull_face(&self) -> bool {
        self.cull_face
    }

    /// Enable or disable culling. Disabling renders both sides.
    pub fn set_cull_face(&mut self, enabled: bool) {
        self.cull_face = enabled;
        if !enabled {
            self.side = Side::FrontAndBack;
        } else if self.side == Side::FrontAndBack {
            self.side = if self.cull_type == Face::Front { Side::Back } else { Side::Front };
        }
        self.touch();
    }

    /// Faces removed when culling
    pub fn cull_type(&self) -> Face {
        self.cull_type
    }

    /// Set which faces are culled
    pub fn set_cull_type(&mut self, face: Face) {
        self.cull_type = face;
        self.touch();
    }

    /// Front-facing winding
    pub fn front_face(&self) -> FrontFace {
        self.front_face
    }

    /// Set the front-facing winding
    pub fn set_front_face(&mut self, front_face: FrontFace) {
        self.front_face = front_face;
        self.touch();
    }

    /// Rendered side
    pub fn side(&self) -> Side {
        self.side
    }

    /// Set the rendered side, keeping the cull flag and cull type consistent
    pub fn set_side(&mut self, side: Side) {
        self.side = side;
        match side {
            Side::Front => {
                self.cull_face = true;
                self.cull_type = Face::Back;
            }
            Side::Back => {
                self.cull_face = true;
                self.cull_type = Face::Front;
            }
            Side::FrontAndBack => self.cull_face = false,
        }
        self.touch();
    }

    // Blending

    /// Blending enabled
    pub fn blend(&self) -> bool {
        self.blend
    }

    /// Enable or disable blending
    pub fn set_blend(&mut self, enabled: bool) {
        self.blend = enabled;
        self.touch();
    }

    /// Blend functions and equations
    pub fn blend_state(&self) -> BlendState {
        self.blend_state
    }

    /// Override the blend functions and equations
    pub fn set_blend_state(&mut self, state: BlendState) {
        self.blend_state = state;
        self.touch();
    }

    /// Transparent materials are sorted back to front
    pub fn transparent(&self) -> bool {
        self.transparent
    }

    /// Toggle transparency. Turning it on configures default alpha blending
    /// with depth writes off; turning it off restores opaque state. Later
    /// explicit blend/depth setters override either.
    pub fn set_transparent(&mut self, transparent: bool) {
        self.transparent = transparent;
        if transparent {
            self.blend = true;
            self.depth_mask = false;
            self.blend_state = if self.premultiplied_alpha {
                BlendState::PREMULTIPLIED
            } else {
                BlendState::ALPHA
            };
        } else {
            self.blend = false;
            self.depth_mask = true;
        }
        self.touch();
    }

    /// Colors are premultiplied by alpha
    pub fn premultiplied_alpha(&self) -> bool {
        self.premultiplied_alpha
    }

    /// Toggle premultiplied alpha, updating the default transparent blend
    pub fn set_premultiplied_alpha(&mut self, premultiplied: bool) {
        self.premultiplied_alpha = premultiplied;
        if self.transparent {
            self.blend_state = if premultiplied {
                BlendState::PREMULTIPLIED
            } else {
                BlendState::ALPHA
            };
        }
        self.touch();
    }

    /// Alpha test threshold
    pub fn alpha_cutoff(&self) -> Option<f32> {
        self.alpha_cutoff
    }

    /// Set or clear the alpha test threshold
    pub fn set_alpha_cutoff(&mut self, cutoff: Option<f32>) {
        self.alpha_cutoff = cutoff;
        self.touch();
    }

    /// Primary sort key, lower draws first
    pub fn render_order(&self) -> i32 {
        self.render_order
    }

    /// Set the primary sort key
    pub fn set_render_order(&mut self, order: i32) {
        self.render_order = order;
    }

    // Shading

    /// Shading model
    pub fn shading(&self) -> &ShadingModel {
        &self.shading
    }

    /// Replace the shading model
    pub fn set_shading(&mut self, shading: ShadingModel) {
        self.shading = shading;
        self.touch();
    }

    /// Whether lights contribute to this material
    pub fn is_lit(&self) -> bool {
        self.lighting && self.shading.is_lit()
    }

    /// Disable lighting without changing the shading model
    pub fn set_lighting(&mut self, enabled: bool) {
        self.lighting = enabled;
        self.touch();
    }

    /// Base color (RGBA)
    pub fn base_color(&self) -> [f32; 4] {
        self.base_color
    }

    /// Set the base color. Uniform values do not affect the shader variant.
    pub fn set_base_color(&mut self, color: [f32; 4]) {
        self.base_color = color;
    }

    /// Metallic factor
    pub fn metallic(&self) -> f32 {
        self.metallic
    }

    /// Set metallic factor (0..=1)
    pub fn set_metallic(&mut self, metallic: f32) {
        self.metallic = metallic.clamp(0.0, 1.0);
    }

    /// Roughness factor
    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    /// Set roughness factor (0..=1)
    pub fn set_roughness(&mut self, roughness: f32) {
        self.roughness = roughness.clamp(0.0, 1.0);
    }

    /// Base color texture
    pub fn base_color_map(&self) -> Option<&SharedTexture> {
        self.base_color_map.as_ref()
    }

    /// Set or clear the base color texture
    pub fn set_base_color_map(&mut self, texture: Option<SharedTexture>) {
        self.base_color_map = texture;
        self.touch();
    }

    /// Normal map
    pub fn normal_map(&self) -> Option<&TextureSlot> {
        self.normal_map.as_ref()
    }

    /// Set or clear the normal map
    pub fn set_normal_map(&mut self, texture: Option<SharedTexture>, scale: f32) {
        self.normal_map = texture.map(|texture| TextureSlot { texture, scale });
        self.touch();
    }

    /// Whether vertex colors are multiplied in
    pub fn vertex_colors(&self) -> bool {
        self.vertex_colors
    }

    /// Request vertex colors
    pub fn set_vertex_colors(&mut self, enabled: bool) {
        self.vertex_colors = enabled;
        self.touch();
    }

    // Binding tables

    /// Shader attribute bindings
    pub fn attributes(&self) -> &HashMap<String, SemanticDescriptor> {
        &self.attributes
    }

    /// Shader uniform bindings
    pub fn uniforms(&self) -> &HashMap<String, SemanticDescriptor> {
        &self.uniforms
    }

    /// Bind a shader attribute name
    pub fn set_attribute(&mut self, name: impl Into<String>, descriptor: SemanticDescriptor) {
        self.attributes.insert(name.into(), descriptor);
        self.touch();
    }

    /// Bind a shader uniform name
    pub fn set_uniform(&mut self, name: impl Into<String>, descriptor: SemanticDescriptor) {
        self.uniforms.insert(name.into(), descriptor);
        self.touch();
    }

    /// Contribute material feature defines
    pub fn render_options(&self, options: &mut RenderOptions) {
        match self.side {
            Side::Front => {}
            Side::Back => options.add("SIDE_BACK"),
            Side::FrontAndBack => options.add("DOUBLE_SIDED"),
        }
        if self.alpha_cutoff.is_some() {
            options.add("ALPHA_CUTOFF");
        }
        if let Some(slot) = &self.normal_map {
            options.add("HAS_NORMAL_MAP");
            if (slot.scale - 1.0).abs() > f32::EPSILON {
                options.add("NORMAL_MAP_SCALE");
            }
        }
        if self.base_color_map.is_some() {
            options.add("HAS_BASE_COLOR_MAP");
        }
        if self.premultiplied_alpha {
            options.add("PREMULTIPLIED_ALPHA");
        }
        if self.vertex_colors {
            options.add("USE_VERTEX_COLOR");
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(ShadingModel::default())
    }
}

fn default_attribute_table() -> HashMap<String, SemanticDescriptor> {
    [
        ("a_position", Semantic::Position),
        ("a_normal", Semantic::Normal),
        ("a_uv", Semantic::Texcoord0),
        ("a_uv1", Semantic::Texcoord1),
        ("a_tangent", Semantic::Tangent),
        ("a_color", Semantic::Color0),
        ("a_joints", Semantic::Joints0),
        ("a_weights", Semantic::Weights0),
    ]
    .into_iter()
    .map(|(name, semantic)| (name.to_string(), SemanticDescriptor::Semantic(semantic)))
    .collect()
}

fn default_uniform_table() -> HashMap<String, SemanticDescriptor> {
    [
        ("u_model", Semantic::Model),
        ("u_modelView", Semantic::ModelView),
        ("u_modelViewProjection", Semantic::ModelViewProjection),
        ("u_normalMatrix", Semantic::ModelViewInverseTranspose),
        ("u_view", Semantic::View),
        ("u_projection", Semantic::Projection),
        ("u_viewProjection", Semantic::ViewProjection),
        ("u_cameraPosition", Semantic::CameraPosition),
        ("u_cameraNear", Semantic::CameraNear),
        ("u_cameraFar", Semantic::CameraFar),
        ("u_viewport", Semantic::Viewport),
        ("u_baseColor", Semantic::BaseColor),
        ("u_baseColorMap", Semantic::BaseColorMap),
        ("u_metallicRoughness", Semantic::MetallicRoughness),
        ("u_normalMap", Semantic::NormalMap),
        ("u_normalScale", Semantic::NormalScale),
        ("u_alphaCutoff", Semantic::AlphaCutoff),
        ("u_ambientLightColor", Semantic::AmbientLightColor),
        ("u_directionalLightColor", Semantic::DirectionalLightColor),
        ("u_directionalLightDirection", Semantic::DirectionalLightDirection),
        ("u_pointLightColor", Semantic::PointLightColor),
        ("u_pointLightPosition", Semantic::PointLightPosition),
        ("u_pointLightRange", Semantic::PointLightRange),
        ("u_pointLightAttenuation", Semantic::PointLightAttenuation),
        ("u_spotLightColor", Semantic::SpotLightColor),
        ("u_spotLightPosition", Semantic::SpotLightPosition),
        ("u_spotLightDirection", Semantic::SpotLightDirection),
        ("u_spotLightCutoff", Semantic::SpotLightCutoff),
        ("u_spotLightAttenuation", Semantic::SpotLightAttenuation),
        ("u_shadowMap", Semantic::ShadowMaps),
        ("u_shadowMatrix", Semantic::ShadowMatrices),
        ("u_shadowBias", Semantic::ShadowBias),
    ]
    .into_iter()
    .map(|(name, semantic)| (name.to_string(), SemanticDescriptor::Semantic(semantic)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::BlendFactor;

    #[test]
    fn test_transparent_toggle_restores_opaque_state() {
        let mut material = Material::phong();
        material.set_transparent(true);
        assert!(material.blend());
        assert!(!material.depth_mask());
        assert_eq!(material.blend_state(), BlendState::ALPHA);

        material.set_transparent(false);
        assert!(!material.blend());
        assert!(material.depth_mask());
    }

    #[test]
    fn test_premultiplied_transparency_blend() {
        let mut material = Material::basic();
        material.set_premultiplied_alpha(true);
        material.set_transparent(true);
        assert_eq!(material.blend_state().src_rgb, BlendFactor::One);
        assert_eq!(material.blend_state().dst_rgb, BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_explicit_override_after_transparent() {
        let mut material = Material::basic();
        material.set_transparent(true);
        material.set_depth_mask(true);
        assert!(material.depth_mask());
        assert!(material.blend());
    }

    #[test]
    fn test_cull_face_and_side_stay_consistent() {
        let mut material = Material::lambert();
        material.set_cull_face(false);
        assert_eq!(material.side(), Side::FrontAndBack);

        material.set_side(Side::Back);
        assert!(material.cull_face());
        assert_eq!(material.cull_type(), Face::Front);

        material.set_side(Side::FrontAndBack);
        assert!(!material.cull_face());
    }

    #[test]
    fn test_render_options_follow_state() {
        let mut material = Material::pbr();
        material.set_alpha_cutoff(Some(0.5));
        material.set_side(Side::FrontAndBack);

        let mut options = RenderOptions::new();
        material.render_options(&mut options);
        assert!(options.contains("ALPHA_CUTOFF"));
        assert!(options.contains("DOUBLE_SIDED"));
        assert!(!options.contains("HAS_NORMAL_MAP"));
    }

    #[test]
    fn test_uniform_values_do_not_dirty() {
        let mut material = Material::basic();
        material.clear_dirty();
        material.set_base_color([1.0, 0.0, 0.0, 1.0]);
        assert!(!material.is_dirty());
        material.set_depth_test(false);
        assert!(material.is_dirty());
    }

    #[test]
    fn test_clone_is_a_distinct_material() {
        let mut original = Material::lambert().with_name("hull");
        original.set_alpha_cutoff(Some(0.25));
        original.clear_dirty();

        let mut copy = original.clone();
        assert_ne!(copy.id(), original.id());
        assert!(copy.is_dirty());
        assert_eq!(copy.alpha_cutoff(), Some(0.25));
        assert_eq!(copy.name.as_deref(), Some("hull"));

        copy.set_depth_test(false);
        assert!(original.depth_test());
        assert!(!original.is_dirty());
    }

    #[test]
    fn test_version_survives_clear_dirty() {
        let mut material = Material::basic();
        let start = material.version();
        material.set_alpha_cutoff(Some(0.5));
        material.clear_dirty();
        assert_eq!(material.version(), start + 1);

        material.set_metallic(1.0);
        assert_eq!(material.version(), start + 1);
        material.mark_dirty();
        assert_eq!(material.version(), start + 2);
    }
}
