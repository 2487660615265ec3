//! Lighting system
//!
//! Lights are discovered during scene traversal, handed to the
//! [`LightManager`] together with their world matrix, and packed into a
//! [`LightAggregate`] once per frame. Arrays are sized to what was actually
//! found, so the shader variant depends on the light counts, not on a fixed
//! maximum.

use std::fmt::Write as _;

use log::trace;

use super::shader::RenderOptions;
use super::texture::SharedTexture;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Point3, Vec3};

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Uniform light from every direction
    Ambient,
    /// Directional light (like sunlight), shines down the node's -Z
    Directional,
    /// Point light (like a lightbulb)
    Point,
    /// Spot light (like a flashlight), shines down the node's -Z
    Spot,
}

/// Shadow map rendered elsewhere and sampled by lit materials
#[derive(Debug, Clone)]
pub struct ShadowBinding {
    /// Depth texture
    pub map: SharedTexture,
    /// World to light clip space
    pub matrix: Mat4,
    /// Depth bias applied when sampling
    pub bias: f32,
}

/// Light source attached to a scene node
#[derive(Debug, Clone)]
pub struct Light {
    /// Light type
    pub kind: LightKind,
    /// Linear RGB color
    pub color: Vec3,
    /// Intensity multiplier
    pub amount: f32,
    /// Cut-off distance for point/spot lights, 0 for infinite
    pub range: f32,
    /// Constant attenuation term
    pub constant_attenuation: f32,
    /// Linear attenuation term
    pub linear_attenuation: f32,
    /// Quadratic attenuation term
    pub quadratic_attenuation: f32,
    /// Spot inner cone angle in degrees
    pub inner_cutoff: f32,
    /// Spot outer cone angle in degrees
    pub outer_cutoff: f32,
    /// Optional shadow map
    pub shadow: Option<ShadowBinding>,
}

impl Light {
    fn with_kind(kind: LightKind, color: Vec3, amount: f32) -> Self {
        Self {
            kind,
            color,
            amount,
            range: 0.0,
            constant_attenuation: 1.0,
            linear_attenuation: 0.0,
            quadratic_attenuation: 0.0,
            inner_cutoff: 0.0,
            outer_cutoff: 0.0,
            shadow: None,
        }
    }

    /// Ambient light
    pub fn ambient(color: Vec3, amount: f32) -> Self {
        Self::with_kind(LightKind::Ambient, color, amount)
    }

    /// Directional light
    pub fn directional(color: Vec3, amount: f32) -> Self {
        Self::with_kind(LightKind::Directional, color, amount)
    }

    /// Point light
    pub fn point(color: Vec3, amount: f32, range: f32) -> Self {
        Self {
            range,
            ..Self::with_kind(LightKind::Point, color, amount)
        }
    }

    /// Spot light with cone angles in degrees
    pub fn spot(color: Vec3, amount: f32, range: f32, inner_cutoff: f32, outer_cutoff: f32) -> Self {
        Self {
            range,
            inner_cutoff,
            outer_cutoff,
            ..Self::with_kind(LightKind::Spot, color, amount)
        }
    }

    /// Set the attenuation terms
    pub fn with_attenuation(mut self, constant: f32, linear: f32, quadratic: f32) -> Self {
        self.constant_attenuation = constant;
        self.linear_attenuation = linear;
        self.quadratic_attenuation = quadratic;
        self
    }

    /// Attach a shadow map
    pub fn with_shadow(mut self, shadow: ShadowBinding) -> Self {
        self.shadow = Some(shadow);
        self
    }

    fn scaled_color(&self) -> [f32; 3] {
        let c = self.color * self.amount;
        [c.x, c.y, c.z]
    }
}

/// Per-frame packed light arrays, every vector in view space
#[derive(Debug, Clone, Default)]
pub struct LightAggregate {
    /// Sum of every ambient light
    pub ambient_color: [f32; 3],
    /// Number of ambient lights folded into `ambient_color`
    pub ambient_count: usize,

    /// Directional light count
    pub directional_count: usize,
    /// vec3 per light
    pub directional_color: Vec<f32>,
    /// vec3 per light, direction the light travels
    pub directional_direction: Vec<f32>,

    /// Point light count
    pub point_count: usize,
    /// vec3 per light
    pub point_color: Vec<f32>,
    /// vec3 per light
    pub point_position: Vec<f32>,
    /// float per light
    pub point_range: Vec<f32>,
    /// vec3 (constant, linear, quadratic) per light
    pub point_attenuation: Vec<f32>,

    /// Spot light count
    pub spot_count: usize,
    /// vec3 per light
    pub spot_color: Vec<f32>,
    /// vec3 per light
    pub spot_position: Vec<f32>,
    /// vec3 per light
    pub spot_direction: Vec<f32>,
    /// vec2 (cos inner, cos outer) per light
    pub spot_cutoff: Vec<f32>,
    /// vec3 (constant, linear, quadratic) per light
    pub spot_attenuation: Vec<f32>,

    /// Shadow maps in light order (directional, then point, then spot)
    pub shadow_maps: Vec<SharedTexture>,
    /// mat4 per shadow map
    pub shadow_matrices: Vec<f32>,
    /// float per shadow map
    pub shadow_bias: Vec<f32>,

    info_id: String,
}

impl LightAggregate {
    /// Whether any ambient light was found
    pub fn has_ambient(&self) -> bool {
        self.ambient_count > 0
    }

    /// Total number of lights packed
    pub fn light_count(&self) -> usize {
        self.ambient_count + self.directional_count + self.point_count + self.spot_count
    }

    /// Compact description of the counts; equal ids produce equal defines
    pub fn info_id(&self) -> &str {
        &self.info_id
    }

    /// Contribute `LIGHT_*` defines for non-empty categories
    pub fn render_options(&self, options: &mut RenderOptions) {
        if self.has_ambient() {
            options.add("LIGHT_AMBIENT");
        }
        let counts = [
            ("LIGHT_DIRECTIONAL_COUNT", self.directional_count),
            ("LIGHT_POINT_COUNT", self.point_count),
            ("LIGHT_SPOT_COUNT", self.spot_count),
            ("LIGHT_SHADOW_COUNT", self.shadow_maps.len()),
        ];
        for (name, count) in counts {
            if count > 0 {
                options.set(name, count as i64);
            }
        }
    }
}

/// Collects lights during traversal and packs them once per frame
#[derive(Debug, Default)]
pub struct LightManager {
    collected: Vec<(Light, Mat4)>,
    max_per_category: usize,
    aggregate: LightAggregate,
}

impl LightManager {
    /// Manager with an optional per-category cap (0 = unbounded)
    pub fn new(max_per_category: usize) -> Self {
        Self {
            max_per_category,
            ..Self::default()
        }
    }

    /// Change the per-category cap
    pub fn set_max_per_category(&mut self, max: usize) {
        self.max_per_category = max;
    }

    /// Drop everything collected for the previous frame
    pub fn reset(&mut self) {
        self.collected.clear();
    }

    /// Record a light found at `world_matrix`
    pub fn add(&mut self, light: &Light, world_matrix: &Mat4) {
        self.collected.push((light.clone(), *world_matrix));
    }

    /// Lights collected so far this frame
    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }

    fn accepts(&self, count: usize) -> bool {
        self.max_per_category == 0 || count < self.max_per_category
    }

    /// Pack the collected lights into view-space arrays
    pub fn update(&mut self, view_matrix: &Mat4) -> &LightAggregate {
        let mut agg = LightAggregate::default();

        let mut ordered: Vec<&(Light, Mat4)> = self.collected.iter().collect();
        // Shadow order: directional, point, spot
        ordered.sort_by_key(|(light, _)| light.kind as u8);

        for (light, world) in ordered {
            let position = view_matrix
                .transform_point(&Point3::from(world.translation_part()))
                .coords;
            let direction = {
                let world_dir = world.transform_vector(&-Vec3::z());
                let view_dir = view_matrix.transform_vector(&world_dir);
                view_dir.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z())
            };
            let attenuation = [
                light.constant_attenuation,
                light.linear_attenuation,
                light.quadratic_attenuation,
            ];

            let packed = match light.kind {
                LightKind::Ambient => {
                    let c = light.scaled_color();
                    for (sum, v) in agg.ambient_color.iter_mut().zip(c) {
                        *sum += v;
                    }
                    agg.ambient_count += 1;
                    false
                }
                LightKind::Directional if self.accepts(agg.directional_count) => {
                    agg.directional_color.extend_from_slice(&light.scaled_color());
                    agg.directional_direction.extend_from_slice(direction.as_slice());
                    agg.directional_count += 1;
                    true
                }
                LightKind::Point if self.accepts(agg.point_count) => {
                    agg.point_color.extend_from_slice(&light.scaled_color());
                    agg.point_position.extend_from_slice(position.as_slice());
                    agg.point_range.push(light.range);
                    agg.point_attenuation.extend_from_slice(&attenuation);
                    agg.point_count += 1;
                    true
                }
                LightKind::Spot if self.accepts(agg.spot_count) => {
                    agg.spot_color.extend_from_slice(&light.scaled_color());
                    agg.spot_position.extend_from_slice(position.as_slice());
                    agg.spot_direction.extend_from_slice(direction.as_slice());
                    agg.spot_cutoff.extend_from_slice(&[
                        utils::deg_to_rad(light.inner_cutoff).cos(),
                        utils::deg_to_rad(light.outer_cutoff).cos(),
                    ]);
                    agg.spot_attenuation.extend_from_slice(&attenuation);
                    agg.spot_count += 1;
                    true
                }
                _ => {
                    trace!("Light cap reached, dropping {:?} light", light.kind);
                    false
                }
            };

            if packed {
                if let Some(shadow) = &light.shadow {
                    agg.shadow_maps.push(shadow.map.clone());
                    agg.shadow_matrices.extend_from_slice(shadow.matrix.as_slice());
                    agg.shadow_bias.push(shadow.bias);
                }
            }
        }

        let _ = write!(
            agg.info_id,
            "A{}D{}P{}S{}H{}",
            u8::from(agg.has_ambient()),
            agg.directional_count,
            agg.point_count,
            agg.spot_count,
            agg.shadow_maps.len()
        );

        self.aggregate = agg;
        &self.aggregate
    }

    /// Aggregate produced by the last [`update`](Self::update)
    pub fn aggregate(&self) -> &LightAggregate {
        &self.aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::texture::Texture;
    use approx::assert_relative_eq;

    #[test]
    fn test_arrays_sized_to_discovered_lights() {
        let mut manager = LightManager::new(0);
        manager.reset();
        for _ in 0..3 {
            manager.add(&Light::point(Vec3::new(1.0, 1.0, 1.0), 1.0, 10.0), &Mat4::identity());
        }
        manager.add(&Light::directional(Vec3::new(1.0, 0.0, 0.0), 2.0), &Mat4::identity());

        let agg = manager.update(&Mat4::identity());
        assert_eq!(agg.point_count, 3);
        assert_eq!(agg.point_position.len(), 9);
        assert_eq!(agg.point_range.len(), 3);
        assert_eq!(agg.directional_count, 1);
        assert_eq!(agg.directional_color, vec![2.0, 0.0, 0.0]);
        assert_eq!(agg.spot_count, 0);
        assert!(agg.spot_color.is_empty());
        assert_eq!(agg.info_id(), "A0D1P3S0H0");
    }

    #[test]
    fn test_cap_limits_each_category() {
        let mut manager = LightManager::new(2);
        for _ in 0..5 {
            manager.add(&Light::point(Vec3::new(1.0, 1.0, 1.0), 1.0, 10.0), &Mat4::identity());
        }
        assert_eq!(manager.update(&Mat4::identity()).point_count, 2);
    }

    #[test]
    fn test_ambient_colors_are_summed() {
        let mut manager = LightManager::new(0);
        manager.add(&Light::ambient(Vec3::new(0.1, 0.2, 0.3), 1.0), &Mat4::identity());
        manager.add(&Light::ambient(Vec3::new(0.1, 0.0, 0.0), 2.0), &Mat4::identity());
        let agg = manager.update(&Mat4::identity());
        assert_relative_eq!(agg.ambient_color[0], 0.3);
        assert_relative_eq!(agg.ambient_color[1], 0.2);
        assert!(agg.has_ambient());
    }

    #[test]
    fn test_positions_are_in_view_space() {
        let mut manager = LightManager::new(0);
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0));
        manager.add(&Light::point(Vec3::new(1.0, 1.0, 1.0), 1.0, 10.0), &world);
        // Camera at z = 5
        let view = Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0));
        let agg = manager.update(&view);
        assert_relative_eq!(agg.point_position[2], -10.0);
    }

    #[test]
    fn test_render_options_and_shadows() {
        let mut manager = LightManager::new(0);
        let shadow = ShadowBinding {
            map: Texture::depth(256, 256).into_shared(),
            matrix: Mat4::identity(),
            bias: 0.005,
        };
        manager.add(&Light::directional(Vec3::new(1.0, 1.0, 1.0), 1.0).with_shadow(shadow), &Mat4::identity());
        let agg = manager.update(&Mat4::identity());
        assert_eq!(agg.shadow_maps.len(), 1);
        assert_eq!(agg.shadow_matrices.len(), 16);

        let mut options = RenderOptions::new();
        agg.render_options(&mut options);
        let header = options.to_header();
        assert!(header.contains("#define LIGHT_DIRECTIONAL_COUNT 1\n"));
        assert!(header.contains("#define LIGHT_SHADOW_COUNT 1\n"));
        assert!(!header.contains("LIGHT_POINT_COUNT"));
    }
}
