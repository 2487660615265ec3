//! Geometry + material pair attached to a mesh node

use crate::render::geometry::SharedGeometry;
use crate::render::material::SharedMaterial;
use crate::render::resource_pool::ResourceKey;

/// Renderable payload of a mesh node.
///
/// Geometry and material are owned by the application and may be shared by
/// several drawables. A drawable missing either one is skipped.
#[derive(Debug, Clone, Default)]
pub struct Drawable {
    /// Vertex data
    pub geometry: Option<SharedGeometry>,
    /// Render state + shading
    pub material: Option<SharedMaterial>,
    /// GPU resources this drawable used in the last frame it was drawn
    pub used_resources: Vec<ResourceKey>,
}

impl Drawable {
    /// Drawable with both halves set
    pub fn new(geometry: SharedGeometry, material: SharedMaterial) -> Self {
        Self {
            geometry: Some(geometry),
            material: Some(material),
            used_resources: Vec::new(),
        }
    }

    /// Whether both geometry and material are present
    pub fn is_complete(&self) -> bool {
        self.geometry.is_some() && self.material.is_some()
    }
}
