//! Semantic binding layer
//!
//! Shader inputs are wired to data by name through a closed set of
//! [`Semantic`]s. Each semantic maps to a plain function pointer that pulls
//! its value out of a [`SemanticContext`] (per-frame camera data, the current
//! drawable's world matrix, its material and the light aggregate).
//!
//! Names that resolve to nothing bind to [`Semantic::Blank`], which yields no
//! value: the input is skipped instead of failing the draw.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use log::warn;

use super::geometry::attribute_names;
use super::gpu::UniformValue;
use super::light::LightAggregate;
use super::material::Material;
use super::texture::SharedTexture;
use crate::foundation::math::{Mat3, Mat4, Mat4Ext, Vec3};

/// Symbolic data source for a shader attribute or uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum Semantic {
    /// Yields no value
    #[default]
    Blank,

    // Vertex attributes
    Position,
    Normal,
    Texcoord0,
    Texcoord1,
    Tangent,
    Color0,
    Joints0,
    Weights0,

    // Drawable transforms
    Model,
    ModelView,
    ModelViewProjection,
    ModelInverse,
    ModelViewInverse,
    ModelInverseTranspose,
    ModelViewInverseTranspose,

    // Camera
    View,
    ViewInverse,
    Projection,
    ProjectionInverse,
    ViewProjection,
    CameraPosition,
    CameraNear,
    CameraFar,
    Viewport,

    // Lights
    AmbientLightColor,
    DirectionalLightColor,
    DirectionalLightDirection,
    PointLightColor,
    PointLightPosition,
    PointLightRange,
    PointLightAttenuation,
    SpotLightColor,
    SpotLightPosition,
    SpotLightDirection,
    SpotLightCutoff,
    SpotLightAttenuation,
    ShadowMaps,
    ShadowMatrices,
    ShadowBias,

    // Material
    BaseColor,
    BaseColorMap,
    MetallicRoughness,
    NormalMap,
    NormalScale,
    AlphaCutoff,
}

const NAMES: &[(Semantic, &str)] = &[
    (Semantic::Position, "POSITION"),
    (Semantic::Normal, "NORMAL"),
    (Semantic::Texcoord0, "TEXCOORD_0"),
    (Semantic::Texcoord1, "TEXCOORD_1"),
    (Semantic::Tangent, "TANGENT"),
    (Semantic::Color0, "COLOR_0"),
    (Semantic::Joints0, "JOINTS_0"),
    (Semantic::Weights0, "WEIGHTS_0"),
    (Semantic::Model, "MODEL"),
    (Semantic::ModelView, "MODELVIEW"),
    (Semantic::ModelViewProjection, "MODELVIEWPROJECTION"),
    (Semantic::ModelInverse, "MODELINVERSE"),
    (Semantic::ModelViewInverse, "MODELVIEWINVERSE"),
    (Semantic::ModelInverseTranspose, "MODELINVERSETRANSPOSE"),
    (Semantic::ModelViewInverseTranspose, "MODELVIEWINVERSETRANSPOSE"),
    (Semantic::View, "VIEW"),
    (Semantic::ViewInverse, "VIEWINVERSE"),
    (Semantic::Projection, "PROJECTION"),
    (Semantic::ProjectionInverse, "PROJECTIONINVERSE"),
    (Semantic::ViewProjection, "VIEWPROJECTION"),
    (Semantic::CameraPosition, "CAMERAPOSITION"),
    (Semantic::CameraNear, "CAMERANEAR"),
    (Semantic::CameraFar, "CAMERAFAR"),
    (Semantic::Viewport, "VIEWPORT"),
    (Semantic::AmbientLightColor, "AMBIENTLIGHTCOLOR"),
    (Semantic::DirectionalLightColor, "DIRECTIONALLIGHTCOLOR"),
    (Semantic::DirectionalLightDirection, "DIRECTIONALLIGHTDIRECTION"),
    (Semantic::PointLightColor, "POINTLIGHTCOLOR"),
    (Semantic::PointLightPosition, "POINTLIGHTPOSITION"),
    (Semantic::PointLightRange, "POINTLIGHTRANGE"),
    (Semantic::PointLightAttenuation, "POINTLIGHTATTENUATION"),
    (Semantic::SpotLightColor, "SPOTLIGHTCOLOR"),
    (Semantic::SpotLightPosition, "SPOTLIGHTPOSITION"),
    (Semantic::SpotLightDirection, "SPOTLIGHTDIRECTION"),
    (Semantic::SpotLightCutoff, "SPOTLIGHTCUTOFF"),
    (Semantic::SpotLightAttenuation, "SPOTLIGHTATTENUATION"),
    (Semantic::ShadowMaps, "SHADOWMAPS"),
    (Semantic::ShadowMatrices, "SHADOWMATRICES"),
    (Semantic::ShadowBias, "SHADOWBIAS"),
    (Semantic::BaseColor, "BASECOLOR"),
    (Semantic::BaseColorMap, "BASECOLORMAP"),
    (Semantic::MetallicRoughness, "METALLICROUGHNESS"),
    (Semantic::NormalMap, "NORMALMAP"),
    (Semantic::NormalScale, "NORMALSCALE"),
    (Semantic::AlphaCutoff, "ALPHACUTOFF"),
];

impl Semantic {
    /// Look up a semantic by its glTF-style name. Unknown names map to `Blank`.
    pub fn from_name(name: &str) -> Self {
        NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map_or(Self::Blank, |(s, _)| *s)
    }

    /// glTF-style name, empty for `Blank`
    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(s, _)| *s == self)
            .map_or("", |(_, n)| n)
    }
}

/// Data produced by a semantic getter
#[derive(Debug, Clone)]
pub enum SemanticValue {
    /// Written with `set_uniform`
    Uniform(UniformValue),
    /// Bound to a texture unit, unit index written to the sampler
    Texture(SharedTexture),
    /// Sampler array
    Textures(Vec<SharedTexture>),
    /// Name of a geometry attribute to bind
    Attribute(Cow<'static, str>),
}

/// Per-frame camera values shared by every drawable
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUniforms {
    /// World to view
    pub view: Mat4,
    /// View to world
    pub view_inverse: Mat4,
    /// View to clip
    pub projection: Mat4,
    /// Clip to view
    pub projection_inverse: Mat4,
    /// World to clip
    pub view_projection: Mat4,
    /// Camera position in world space
    pub camera_position: Vec3,
    /// Near plane
    pub near: f32,
    /// Far plane
    pub far: f32,
    /// x, y, width, height
    pub viewport: [f32; 4],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::identity(),
            view_inverse: Mat4::identity(),
            projection: Mat4::identity(),
            projection_inverse: Mat4::identity(),
            view_projection: Mat4::identity(),
            camera_position: Vec3::zeros(),
            near: 0.1,
            far: 1000.0,
            viewport: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

/// Everything a getter may read while one drawable is drawn
#[derive(Debug, Clone, Copy)]
pub struct SemanticContext<'a> {
    /// Camera data
    pub frame: &'a FrameUniforms,
    /// World matrix of the drawable
    pub model: &'a Mat4,
    /// Material of the drawable
    pub material: &'a Material,
    /// Packed lights for this frame
    pub lights: &'a LightAggregate,
}

/// Custom value source supplied by a material
pub type CustomGetter = Rc<dyn Fn(&SemanticContext<'_>) -> Option<SemanticValue>>;

/// Entry of a material binding table
#[derive(Clone)]
pub enum SemanticDescriptor {
    /// Built-in semantic
    Semantic(Semantic),
    /// Caller supplied getter
    Custom {
        /// Value source
        getter: CustomGetter,
        /// Refresh per drawable instead of once per program per frame
        depends_on_drawable: bool,
    },
}

impl SemanticDescriptor {
    /// Wrap a closure
    pub fn custom<F>(depends_on_drawable: bool, getter: F) -> Self
    where
        F: Fn(&SemanticContext<'_>) -> Option<SemanticValue> + 'static,
    {
        Self::Custom {
            getter: Rc::new(getter),
            depends_on_drawable,
        }
    }
}

impl fmt::Debug for SemanticDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic(s) => f.debug_tuple("Semantic").field(s).finish(),
            Self::Custom { depends_on_drawable, .. } => f
                .debug_struct("Custom")
                .field("depends_on_drawable", depends_on_drawable)
                .finish_non_exhaustive(),
        }
    }
}

/// Getter signature for built-in semantics
pub type SemanticGetter = fn(&SemanticContext<'_>) -> Option<SemanticValue>;

/// Registry entry
#[derive(Debug, Clone, Copy)]
pub struct SemanticEntry {
    /// Value source
    pub getter: SemanticGetter,
    /// Whether the value changes from drawable to drawable
    pub depends_on_drawable: bool,
}

fn mat4(m: &Mat4) -> Option<SemanticValue> {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    Some(SemanticValue::Uniform(UniformValue::Mat4(out)))
}

fn mat3(m: &Mat3) -> Option<SemanticValue> {
    let mut out = [0.0; 9];
    out.copy_from_slice(m.as_slice());
    Some(SemanticValue::Uniform(UniformValue::Mat3(out)))
}

fn float(v: f32) -> Option<SemanticValue> {
    Some(SemanticValue::Uniform(UniformValue::Float(v)))
}

fn array(count: usize, data: &[f32]) -> Option<SemanticValue> {
    (count > 0).then(|| SemanticValue::Uniform(UniformValue::FloatArray(data.to_vec())))
}

fn attribute(name: &'static str) -> Option<SemanticValue> {
    Some(SemanticValue::Attribute(Cow::Borrowed(name)))
}

fn add(
    entries: &mut HashMap<Semantic, SemanticEntry>,
    semantic: Semantic,
    depends_on_drawable: bool,
    getter: SemanticGetter,
) {
    entries.insert(semantic, SemanticEntry { getter, depends_on_drawable });
}

/// Built-in semantic table plus once-only reporting of unknown names
pub struct SemanticRegistry {
    entries: HashMap<Semantic, SemanticEntry>,
    warned: HashSet<String>,
}

impl SemanticRegistry {
    /// Build the table of built-in semantics
    pub fn new() -> Self {
        let mut entries = HashMap::new();

        add(&mut entries, Semantic::Position, true, |_| attribute(attribute_names::POSITION));
        add(&mut entries, Semantic::Normal, true, |_| attribute(attribute_names::NORMAL));
        add(&mut entries, Semantic::Texcoord0, true, |_| attribute(attribute_names::UV));
        add(&mut entries, Semantic::Texcoord1, true, |_| attribute(attribute_names::UV1));
        add(&mut entries, Semantic::Tangent, true, |_| attribute(attribute_names::TANGENT));
        add(&mut entries, Semantic::Color0, true, |_| attribute(attribute_names::COLOR));
        add(&mut entries, Semantic::Joints0, true, |_| attribute(attribute_names::SKIN_INDICES));
        add(&mut entries, Semantic::Weights0, true, |_| attribute(attribute_names::SKIN_WEIGHTS));

        add(&mut entries, Semantic::Model, true, |ctx| mat4(ctx.model));
        add(&mut entries, Semantic::ModelView, true, |ctx| mat4(&(ctx.frame.view * ctx.model)));
        add(&mut entries, Semantic::ModelViewProjection, true, |ctx| {
            mat4(&(ctx.frame.view_projection * ctx.model))
        });
        add(&mut entries, Semantic::ModelInverse, true, |ctx| mat4(&ctx.model.inverse_or_identity()));
        add(&mut entries, Semantic::ModelViewInverse, true, |ctx| {
            mat4(&(ctx.frame.view * ctx.model).inverse_or_identity())
        });
        add(&mut entries, Semantic::ModelInverseTranspose, true, |ctx| mat3(&ctx.model.normal_matrix()));
        add(&mut entries, Semantic::ModelViewInverseTranspose, true, |ctx| {
            mat3(&(ctx.frame.view * ctx.model).normal_matrix())
        });

        add(&mut entries, Semantic::View, false, |ctx| mat4(&ctx.frame.view));
        add(&mut entries, Semantic::ViewInverse, false, |ctx| mat4(&ctx.frame.view_inverse));
        add(&mut entries, Semantic::Projection, false, |ctx| mat4(&ctx.frame.projection));
        add(&mut entries, Semantic::ProjectionInverse, false, |ctx| mat4(&ctx.frame.projection_inverse));
        add(&mut entries, Semantic::ViewProjection, false, |ctx| mat4(&ctx.frame.view_projection));
        add(&mut entries, Semantic::CameraPosition, false, |ctx| {
            let p = ctx.frame.camera_position;
            Some(SemanticValue::Uniform(UniformValue::Vec3([p.x, p.y, p.z])))
        });
        add(&mut entries, Semantic::CameraNear, false, |ctx| float(ctx.frame.near));
        add(&mut entries, Semantic::CameraFar, false, |ctx| float(ctx.frame.far));
        add(&mut entries, Semantic::Viewport, false, |ctx| {
            Some(SemanticValue::Uniform(UniformValue::Vec4(ctx.frame.viewport)))
        });

        add(&mut entries, Semantic::AmbientLightColor, false, |ctx| {
            ctx.lights
                .has_ambient()
                .then(|| SemanticValue::Uniform(UniformValue::Vec3(ctx.lights.ambient_color)))
        });
        add(&mut entries, Semantic::DirectionalLightColor, false, |ctx| {
            array(ctx.lights.directional_count, &ctx.lights.directional_color)
        });
        add(&mut entries, Semantic::DirectionalLightDirection, false, |ctx| {
            array(ctx.lights.directional_count, &ctx.lights.directional_direction)
        });
        add(&mut entries, Semantic::PointLightColor, false, |ctx| {
            array(ctx.lights.point_count, &ctx.lights.point_color)
        });
        add(&mut entries, Semantic::PointLightPosition, false, |ctx| {
            array(ctx.lights.point_count, &ctx.lights.point_position)
        });
        add(&mut entries, Semantic::PointLightRange, false, |ctx| {
            array(ctx.lights.point_count, &ctx.lights.point_range)
        });
        add(&mut entries, Semantic::PointLightAttenuation, false, |ctx| {
            array(ctx.lights.point_count, &ctx.lights.point_attenuation)
        });
        add(&mut entries, Semantic::SpotLightColor, false, |ctx| {
            array(ctx.lights.spot_count, &ctx.lights.spot_color)
        });
        add(&mut entries, Semantic::SpotLightPosition, false, |ctx| {
            array(ctx.lights.spot_count, &ctx.lights.spot_position)
        });
        add(&mut entries, Semantic::SpotLightDirection, false, |ctx| {
            array(ctx.lights.spot_count, &ctx.lights.spot_direction)
        });
        add(&mut entries, Semantic::SpotLightCutoff, false, |ctx| {
            array(ctx.lights.spot_count, &ctx.lights.spot_cutoff)
        });
        add(&mut entries, Semantic::SpotLightAttenuation, false, |ctx| {
            array(ctx.lights.spot_count, &ctx.lights.spot_attenuation)
        });
        add(&mut entries, Semantic::ShadowMaps, false, |ctx| {
            (!ctx.lights.shadow_maps.is_empty())
                .then(|| SemanticValue::Textures(ctx.lights.shadow_maps.clone()))
        });
        add(&mut entries, Semantic::ShadowMatrices, false, |ctx| {
            array(ctx.lights.shadow_maps.len(), &ctx.lights.shadow_matrices)
        });
        add(&mut entries, Semantic::ShadowBias, false, |ctx| {
            array(ctx.lights.shadow_maps.len(), &ctx.lights.shadow_bias)
        });

        add(&mut entries, Semantic::BaseColor, true, |ctx| {
            Some(SemanticValue::Uniform(UniformValue::Vec4(ctx.material.base_color())))
        });
        add(&mut entries, Semantic::BaseColorMap, true, |ctx| {
            ctx.material.base_color_map().cloned().map(SemanticValue::Texture)
        });
        add(&mut entries, Semantic::MetallicRoughness, true, |ctx| {
            Some(SemanticValue::Uniform(UniformValue::Vec2([
                ctx.material.metallic(),
                ctx.material.roughness(),
            ])))
        });
        add(&mut entries, Semantic::NormalMap, true, |ctx| {
            ctx.material
                .normal_map()
                .map(|slot| SemanticValue::Texture(slot.texture.clone()))
        });
        add(&mut entries, Semantic::NormalScale, true, |ctx| {
            ctx.material.normal_map().and_then(|slot| float(slot.scale))
        });
        add(&mut entries, Semantic::AlphaCutoff, true, |ctx| ctx.material.alpha_cutoff().and_then(float));

        Self {
            entries,
            warned: HashSet::new(),
        }
    }

    /// Registered entry of a built-in semantic
    pub fn entry(&self, semantic: Semantic) -> Option<&SemanticEntry> {
        self.entries.get(&semantic)
    }

    /// Descriptor for a shader input name: the material table entry, else a
    /// semantic whose glTF name equals the input name, else `Blank`.
    ///
    /// Unknown names are reported once per registry lifetime.
    pub fn descriptor_for(
        &mut self,
        name: &str,
        table: &HashMap<String, SemanticDescriptor>,
    ) -> SemanticDescriptor {
        if let Some(descriptor) = table.get(name) {
            return descriptor.clone();
        }

        let semantic = Semantic::from_name(name);
        if semantic == Semantic::Blank && self.warned.insert(name.to_string()) {
            warn!("No semantic bound to shader input '{name}', it will be left unset");
        }
        SemanticDescriptor::Semantic(semantic)
    }

    /// Pull the value for a descriptor
    pub fn resolve(
        &self,
        descriptor: &SemanticDescriptor,
        ctx: &SemanticContext<'_>,
    ) -> Option<SemanticValue> {
        match descriptor {
            SemanticDescriptor::Semantic(semantic) => {
                self.entries.get(semantic).and_then(|entry| (entry.getter)(ctx))
            }
            SemanticDescriptor::Custom { getter, .. } => getter(ctx),
        }
    }

    /// Whether a descriptor must be refreshed for every drawable
    pub fn depends_on_drawable(&self, descriptor: &SemanticDescriptor) -> bool {
        match descriptor {
            SemanticDescriptor::Semantic(semantic) => self
                .entries
                .get(semantic)
                .is_some_and(|entry| entry.depends_on_drawable),
            SemanticDescriptor::Custom { depends_on_drawable, .. } => *depends_on_drawable,
        }
    }

    /// Number of distinct unknown names reported so far
    pub fn warned_count(&self) -> usize {
        self.warned.len()
    }
}

impl Default for SemanticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SemanticRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticRegistry")
            .field("entries", &self.entries.len())
            .field("warned", &self.warned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn with_context<R>(f: impl FnOnce(&SemanticContext<'_>) -> R) -> R {
        let frame = FrameUniforms::default();
        let model = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let material = Material::basic();
        let lights = LightAggregate::default();
        f(&SemanticContext {
            frame: &frame,
            model: &model,
            material: &material,
            lights: &lights,
        })
    }

    #[test]
    fn test_from_name_never_fails() {
        assert_eq!(Semantic::from_name("MODELVIEWPROJECTION"), Semantic::ModelViewProjection);
        assert_eq!(Semantic::from_name("TEXCOORD_0"), Semantic::Texcoord0);
        assert_eq!(Semantic::from_name("not a semantic"), Semantic::Blank);
        assert_eq!(Semantic::Texcoord0.name(), "TEXCOORD_0");
    }

    #[test]
    fn test_unknown_name_yields_no_value_and_warns_once() {
        let mut registry = SemanticRegistry::new();
        let table = HashMap::new();

        let first = registry.descriptor_for("u_mystery", &table);
        let second = registry.descriptor_for("u_mystery", &table);
        assert!(matches!(first, SemanticDescriptor::Semantic(Semantic::Blank)));
        assert!(matches!(second, SemanticDescriptor::Semantic(Semantic::Blank)));
        assert_eq!(registry.warned_count(), 1);

        with_context(|ctx| assert!(registry.resolve(&first, ctx).is_none()));
    }

    #[test]
    fn test_model_matrix_resolves_from_context() {
        let registry = SemanticRegistry::new();
        let descriptor = SemanticDescriptor::Semantic(Semantic::Model);
        assert!(registry.depends_on_drawable(&descriptor));

        with_context(|ctx| match registry.resolve(&descriptor, ctx) {
            Some(SemanticValue::Uniform(UniformValue::Mat4(m))) => {
                assert_relative_eq!(m[12], 1.0);
                assert_relative_eq!(m[13], 2.0);
                assert_relative_eq!(m[14], 3.0);
            }
            other => panic!("unexpected value {other:?}"),
        });
    }

    #[test]
    fn test_camera_values_are_drawable_invariant() {
        let registry = SemanticRegistry::new();
        assert!(!registry.depends_on_drawable(&SemanticDescriptor::Semantic(Semantic::View)));
        assert!(!registry.depends_on_drawable(&SemanticDescriptor::Semantic(Semantic::Blank)));
    }

    #[test]
    fn test_custom_getter() {
        let mut registry = SemanticRegistry::new();
        let mut table = HashMap::new();
        table.insert(
            "u_time".to_string(),
            SemanticDescriptor::custom(false, |_| {
                Some(SemanticValue::Uniform(UniformValue::Float(4.5)))
            }),
        );

        let descriptor = registry.descriptor_for("u_time", &table);
        assert!(!registry.depends_on_drawable(&descriptor));
        with_context(|ctx| {
            assert!(matches!(
                registry.resolve(&descriptor, ctx),
                Some(SemanticValue::Uniform(UniformValue::Float(v))) if (v - 4.5).abs() < f32::EPSILON
            ));
        });
        assert_eq!(registry.warned_count(), 0);
    }

    #[test]
    fn test_empty_light_arrays_yield_nothing() {
        let registry = SemanticRegistry::new();
        with_context(|ctx| {
            let d = SemanticDescriptor::Semantic(Semantic::PointLightColor);
            assert!(registry.resolve(&d, ctx).is_none());
        });
    }
}
