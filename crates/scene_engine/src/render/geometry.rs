//! Geometry: vertex attributes, indices and the feature flags they imply
//!
//! Geometry is owned by the application and shared between drawables. The
//! renderer reads it to build GPU buffers (keyed by attribute id + version)
//! and to derive the geometry part of a shader variant key.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::gpu::DrawMode;
use super::shader::RenderOptions;
use crate::scene::BoundingSphere;

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Well-known attribute names
pub mod attribute_names {
    /// xyz positions
    pub const POSITION: &str = "position";
    /// xyz normals
    pub const NORMAL: &str = "normal";
    /// First uv set
    pub const UV: &str = "uv";
    /// Second uv set
    pub const UV1: &str = "uv1";
    /// xyzw tangents
    pub const TANGENT: &str = "tangent";
    /// Vertex colors
    pub const COLOR: &str = "color";
    /// Joint indices
    pub const SKIN_INDICES: &str = "skinIndices";
    /// Joint weights
    pub const SKIN_WEIGHTS: &str = "skinWeights";
}

/// Geometry shared between drawables
pub type SharedGeometry = Rc<RefCell<Geometry>>;

/// Identity of a geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u64);

/// Identity of an attribute or index array, used as its buffer pool key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

fn next_buffer_id() -> BufferId {
    BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
}

/// One float vertex attribute
///
/// A clone is a separate buffer source with its own id.
#[derive(Debug, PartialEq)]
pub struct VertexAttribute {
    id: BufferId,
    version: u64,
    data: Vec<f32>,
    item_size: u8,
    normalized: bool,
}

impl Clone for VertexAttribute {
    fn clone(&self) -> Self {
        Self {
            id: next_buffer_id(),
            version: 0,
            data: self.data.clone(),
            item_size: self.item_size,
            normalized: self.normalized,
        }
    }
}

impl VertexAttribute {
    /// Packed data with `item_size` floats per vertex
    pub fn new(data: Vec<f32>, item_size: u8) -> Self {
        Self {
            id: next_buffer_id(),
            version: 0,
            data,
            item_size,
            normalized: false,
        }
    }

    /// Mark the data as normalized
    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    /// Buffer pool key
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Bumped on every data change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Packed data
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Components per vertex
    pub fn item_size(&self) -> u8 {
        self.item_size
    }

    /// Normalize flag
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Number of vertices
    pub fn count(&self) -> usize {
        if self.item_size == 0 {
            0
        } else {
            self.data.len() / usize::from(self.item_size)
        }
    }

    /// Replace the data; the GPU copy is refreshed on next use
    pub fn set_data(&mut self, data: Vec<f32>) {
        self.data = data;
        self.version += 1;
    }
}

/// Element indices
#[derive(Debug, PartialEq)]
pub struct IndexData {
    id: BufferId,
    version: u64,
    data: Vec<u32>,
}

impl Clone for IndexData {
    fn clone(&self) -> Self {
        Self::new(self.data.clone())
    }
}

impl IndexData {
    /// Wrap index data
    pub fn new(data: Vec<u32>) -> Self {
        Self { id: next_buffer_id(), version: 0, data }
    }

    /// Buffer pool key
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Bumped on every data change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Indices
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    /// Whether every index fits in 16 bits
    pub fn fits_u16(&self) -> bool {
        self.data.iter().all(|&i| i <= u32::from(u16::MAX))
    }

    /// Replace the indices
    pub fn set_data(&mut self, data: Vec<u32>) {
        self.data = data;
        self.version += 1;
    }
}

/// Morph targets declared on a geometry (animation is not handled here)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MorphTargets {
    /// Number of targets
    pub count: u8,
    /// Targets include normal deltas
    pub has_normals: bool,
}

/// Vertex/index data plus shader-relevant flags
///
/// Cloning copies the data under fresh geometry and buffer ids, so the copy
/// never shares GPU objects with its source.
#[derive(Debug)]
pub struct Geometry {
    id: GeometryId,
    /// Optional debug name
    pub name: Option<String>,
    mode: DrawMode,
    attributes: BTreeMap<String, VertexAttribute>,
    indices: Option<IndexData>,
    morph_targets: Option<MorphTargets>,
    joint_count: Option<u32>,
    dirty: bool,
    shader_key: Option<String>,
    bounds: Option<BoundingSphere>,
}

impl Clone for Geometry {
    fn clone(&self) -> Self {
        Self {
            id: next_geometry_id(),
            name: self.name.clone(),
            mode: self.mode,
            attributes: self.attributes.clone(),
            indices: self.indices.clone(),
            morph_targets: self.morph_targets,
            joint_count: self.joint_count,
            dirty: true,
            shader_key: self.shader_key.clone(),
            bounds: self.bounds,
        }
    }
}

fn next_geometry_id() -> GeometryId {
    GeometryId(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
}

impl Geometry {
    /// Empty geometry with a draw mode
    pub fn new(mode: DrawMode) -> Self {
        Self {
            id: next_geometry_id(),
            name: None,
            mode,
            attributes: BTreeMap::new(),
            indices: None,
            morph_targets: None,
            joint_count: None,
            dirty: true,
            shader_key: None,
            bounds: None,
        }
    }

    /// Builder: attach an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, attribute: VertexAttribute) -> Self {
        self.set_attribute(name, attribute);
        self
    }

    /// Builder: attach indices
    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.set_indices(Some(indices));
        self
    }

    /// Builder: set the debug name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedGeometry {
        Rc::new(RefCell::new(self))
    }

    /// Identity
    pub fn id(&self) -> GeometryId {
        self.id
    }

    /// Primitive topology
    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    /// Add or replace an attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: VertexAttribute) {
        let name = name.into();
        if name == attribute_names::POSITION {
            self.bounds = None;
        }
        self.attributes.insert(name, attribute);
        self.mark_dirty();
    }

    /// Remove an attribute
    pub fn remove_attribute(&mut self, name: &str) -> Option<VertexAttribute> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    /// Look up an attribute
    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.get(name)
    }

    /// Mutable attribute access. Data edits go through
    /// [`VertexAttribute::set_data`] which bumps the version.
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut VertexAttribute> {
        if name == attribute_names::POSITION {
            self.bounds = None;
        }
        self.attributes.get_mut(name)
    }

    /// Attributes in name order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &VertexAttribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set or clear indices
    pub fn set_indices(&mut self, indices: Option<Vec<u32>>) {
        self.indices = indices.map(IndexData::new);
        self.mark_dirty();
    }

    /// Index data
    pub fn indices(&self) -> Option<&IndexData> {
        self.indices.as_ref()
    }

    /// Declare morph targets
    pub fn set_morph_targets(&mut self, morph_targets: Option<MorphTargets>) {
        self.morph_targets = morph_targets;
        self.mark_dirty();
    }

    /// Declare skinning with `joint_count` joints
    pub fn set_skinning(&mut self, joint_count: Option<u32>) {
        self.joint_count = joint_count;
        self.mark_dirty();
    }

    /// Whether the shader-relevant layout changed since the last frame
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag a layout change
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.shader_key = None;
    }

    /// Called by the renderer after a frame consumed the change
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Vertices to draw (position count)
    pub fn vertex_count(&self) -> usize {
        self.attribute(attribute_names::POSITION)
            .map_or(0, VertexAttribute::count)
    }

    /// Elements passed to the draw call
    pub fn draw_count(&self) -> usize {
        self.indices
            .as_ref()
            .map_or_else(|| self.vertex_count(), |i| i.data().len())
    }

    /// Primitives produced by one draw
    pub fn face_count(&self) -> usize {
        let n = self.draw_count();
        match self.mode {
            DrawMode::Triangles => n / 3,
            DrawMode::TriangleStrip | DrawMode::TriangleFan => n.saturating_sub(2),
            DrawMode::Lines => n / 2,
            DrawMode::LineStrip => n.saturating_sub(1),
            DrawMode::LineLoop | DrawMode::Points => n,
        }
    }

    /// Local-space bounding sphere, cached until positions change
    pub fn bounding_sphere(&mut self) -> Option<BoundingSphere> {
        if self.bounds.is_none() {
            self.bounds = self
                .attribute(attribute_names::POSITION)
                .and_then(|p| BoundingSphere::from_positions(p.data()));
        }
        self.bounds
    }

    /// Cache-relevant summary of everything that influences shader variants
    pub fn shader_key(&mut self) -> &str {
        if self.shader_key.is_none() {
            let mut key = format!("{:?}", self.mode);
            for name in self.attributes.keys() {
                let _ = write!(key, "|{name}");
            }
            if let Some(morph) = self.morph_targets {
                let _ = write!(key, "|morph{}{}", morph.count, if morph.has_normals { "n" } else { "" });
            }
            if let Some(joints) = self.joint_count {
                let _ = write!(key, "|skin{joints}");
            }
            self.shader_key = Some(key);
        }
        self.shader_key.as_deref().unwrap_or_default()
    }

    /// Contribute geometry feature defines
    pub fn render_options(&self, options: &mut RenderOptions) {
        let has = |name: &str| self.attributes.contains_key(name);
        if has(attribute_names::NORMAL) {
            options.add("HAS_NORMAL");
        }
        if has(attribute_names::UV) {
            options.add("HAS_TEXCOORD0");
        }
        if has(attribute_names::UV1) {
            options.add("HAS_TEXCOORD1");
        }
        if has(attribute_names::TANGENT) {
            options.add("HAS_TANGENT");
        }
        if has(attribute_names::COLOR) {
            options.add("HAS_VERTEX_COLOR");
        }
        if let Some(morph) = self.morph_targets {
            options.set("HAS_MORPH_TARGETS", i64::from(morph.count));
            if morph.has_normals {
                options.add("MORPH_HAS_NORMAL");
            }
        }
        if let Some(joints) = self.joint_count {
            options.add("HAS_SKINNING");
            options.set("JOINT_COUNT", i64::from(joints));
        }
    }

    /// Unit-less axis-aligned box centered on the origin
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let corners = [(-1.0, -1.0, 0.0, 0.0), (1.0, -1.0, 1.0, 0.0), (1.0, 1.0, 1.0, 1.0), (-1.0, 1.0, 0.0, 1.0)];

        let mut positions = Vec::with_capacity(72);
        let mut normals = Vec::with_capacity(72);
        let mut uvs = Vec::with_capacity(48);
        let mut indices = Vec::with_capacity(36);

        for (face, (n, u, v)) in faces.iter().enumerate() {
            for (su, sv, tu, tv) in corners {
                for axis in 0..3 {
                    positions.push(h * (n[axis] + su * u[axis] + sv * v[axis]));
                }
                normals.extend_from_slice(n);
                uvs.extend_from_slice(&[tu, tv]);
            }
            let base = (face * 4) as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(DrawMode::Triangles)
            .with_attribute(attribute_names::POSITION, VertexAttribute::new(positions, 3))
            .with_attribute(attribute_names::NORMAL, VertexAttribute::new(normals, 3))
            .with_attribute(attribute_names::UV, VertexAttribute::new(uvs, 2))
            .with_indices(indices)
    }

    /// Quad in the XY plane facing +Z
    pub fn plane(width: f32, height: f32) -> Self {
        let (w, h) = (width * 0.5, height * 0.5);
        Self::new(DrawMode::Triangles)
            .with_attribute(
                attribute_names::POSITION,
                VertexAttribute::new(vec![-w, -h, 0.0, w, -h, 0.0, w, h, 0.0, -w, h, 0.0], 3),
            )
            .with_attribute(
                attribute_names::NORMAL,
                VertexAttribute::new(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0], 3),
            )
            .with_attribute(
                attribute_names::UV,
                VertexAttribute::new(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0], 2),
            )
            .with_indices(vec![0, 1, 2, 0, 2, 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = Geometry::cube(2.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.draw_count(), 36);
        assert_eq!(cube.face_count(), 12);
    }

    #[test]
    fn test_clone_gets_fresh_buffer_ids() {
        let mut original = Geometry::cube(1.0);
        original.clear_dirty();
        let copy = original.clone();

        assert_ne!(copy.id(), original.id());
        assert!(copy.is_dirty());
        let (Some(a), Some(b)) = (
            original.attribute(attribute_names::POSITION),
            copy.attribute(attribute_names::POSITION),
        ) else {
            panic!("cube has positions");
        };
        assert_ne!(a.id(), b.id());
        assert_eq!(a.data(), b.data());
        assert_ne!(copy.indices().map(IndexData::id), original.indices().map(IndexData::id));
        assert_eq!(copy.draw_count(), original.draw_count());
    }

    #[test]
    fn test_shader_key_tracks_layout() {
        let mut geometry = Geometry::plane(1.0, 1.0);
        let before = geometry.shader_key().to_string();

        geometry.set_attribute(attribute_names::COLOR, VertexAttribute::new(vec![1.0; 16], 4));
        assert!(geometry.is_dirty());
        let after = geometry.shader_key().to_string();
        assert_ne!(before, after);
        assert!(after.contains("color"));
    }

    #[test]
    fn test_render_options_from_layout() {
        let mut geometry = Geometry::plane(1.0, 1.0);
        geometry.set_morph_targets(Some(MorphTargets { count: 2, has_normals: true }));
        geometry.set_skinning(Some(16));

        let mut options = RenderOptions::new();
        geometry.render_options(&mut options);
        let header = options.to_header();

        assert!(header.contains("#define HAS_NORMAL\n"));
        assert!(header.contains("#define HAS_TEXCOORD0\n"));
        assert!(header.contains("#define HAS_MORPH_TARGETS 2\n"));
        assert!(header.contains("#define JOINT_COUNT 16\n"));
        assert!(!header.contains("HAS_VERTEX_COLOR"));
    }

    #[test]
    fn test_attribute_version_bumps() {
        let mut attribute = VertexAttribute::new(vec![0.0; 3], 3);
        let id = attribute.id();
        attribute.set_data(vec![1.0; 6]);
        assert_eq!(attribute.version(), 1);
        assert_eq!(attribute.id(), id);
        assert_eq!(attribute.count(), 2);
    }

    #[test]
    fn test_bounds_cached_until_positions_change() {
        let mut geometry = Geometry::cube(2.0);
        let sphere = geometry.bounding_sphere().unwrap();
        assert!((sphere.radius - 3.0_f32.sqrt()).abs() < 1e-5);

        geometry
            .attribute_mut(attribute_names::POSITION)
            .unwrap()
            .set_data(vec![0.0, 0.0, 0.0, 4.0, 0.0, 0.0]);
        let sphere = geometry.bounding_sphere().unwrap();
        assert!((sphere.radius - 2.0).abs() < 1e-5);
    }
}
