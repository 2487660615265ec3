//! GPU resource pools with frame-based garbage collection
//!
//! Every GPU object the renderer creates (buffers, vertex arrays, textures,
//! programs) lives in a [`ResourcePool`] under a stable key. Drawables mark
//! the resources they use each frame; at the end of the frame
//! [`ResourcePool::collect_unused`] destroys whatever nobody marked since the
//! previous collection. That is the only place GPU objects are destroyed
//! during normal operation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use super::geometry::BufferId;
use super::gpu::{BufferTarget, GpuContext, IndexType, RawHandle};
use super::shader::{ProgramCache, VariantId};
use super::texture::TextureId;
use crate::scene::NodeId;

/// Who marked a resource as used: the drawable's node
pub type ResourceOwner = NodeId;

/// A pooled GPU object
pub trait GpuResource {
    /// Release the GPU side
    fn destroy(&self, gpu: &mut dyn GpuContext);
}

struct PoolEntry<R> {
    resource: R,
    used_by: HashSet<ResourceOwner>,
}

/// Key to resource mapping with per-frame usage marks
pub struct ResourcePool<K, R> {
    entries: HashMap<K, PoolEntry<R>>,
}

impl<K, R> ResourcePool<K, R>
where
    K: Copy + Eq + Hash + fmt::Debug,
    R: GpuResource,
{
    /// Empty pool
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up a resource. Never frees anything.
    pub fn get(&self, key: &K) -> Option<&R> {
        self.entries.get(key).map(|e| &e.resource)
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, key: &K) -> Option<&mut R> {
        self.entries.get_mut(key).map(|e| &mut e.resource)
    }

    /// Whether the key is present
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a resource. A replaced resource is returned, not destroyed.
    pub fn add(&mut self, key: K, resource: R) -> Option<R> {
        self.entries
            .insert(
                key,
                PoolEntry {
                    resource,
                    used_by: HashSet::new(),
                },
            )
            .map(|e| e.resource)
    }

    /// Remove without destroying
    pub fn remove(&mut self, key: &K) -> Option<R> {
        self.entries.remove(key).map(|e| e.resource)
    }

    /// Record that `owner` used the resource this frame
    pub fn mark_used(&mut self, key: &K, owner: ResourceOwner) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.used_by.insert(owner);
                true
            }
            None => false,
        }
    }

    /// Whether anything marked the resource since the last collection
    pub fn is_used(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|e| !e.used_by.is_empty())
    }

    /// Destroy every resource not marked since the last collection, then
    /// clear the marks of the survivors. Returns the number destroyed.
    pub fn collect_unused(&mut self, gpu: &mut dyn GpuContext) -> usize {
        let unused: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.used_by.is_empty())
            .map(|(k, _)| *k)
            .collect();

        for key in &unused {
            if let Some(entry) = self.entries.remove(key) {
                log::trace!("Collecting unused resource {key:?}");
                entry.resource.destroy(gpu);
            }
        }

        for entry in self.entries.values_mut() {
            entry.used_by.clear();
        }
        unused.len()
    }

    /// Drop every entry without touching the GPU (handles already invalid)
    pub fn forget_all(&mut self) {
        self.entries.clear();
    }

    /// Destroy every entry
    pub fn destroy_all(&mut self, gpu: &mut dyn GpuContext) {
        for (_, entry) in self.entries.drain() {
            entry.resource.destroy(gpu);
        }
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys of every live resource
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

impl<K, R> Default for ResourcePool<K, R>
where
    K: Copy + Eq + Hash + fmt::Debug,
    R: GpuResource,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, R> fmt::Debug for ResourcePool<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Vertex or index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferResource {
    /// GPU buffer
    pub handle: RawHandle,
    /// Binding point it was created for
    pub target: BufferTarget,
    /// Source version uploaded last
    pub version: u64,
    /// Index width, for element buffers
    pub index_type: Option<IndexType>,
}

impl GpuResource for BufferResource {
    fn destroy(&self, gpu: &mut dyn GpuContext) {
        gpu.delete_buffer(self.handle);
    }
}

/// Key of a vertex array: attribute locations differ per program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayKey {
    /// Geometry the bindings read from
    pub geometry: super::geometry::GeometryId,
    /// Program whose attribute locations are bound
    pub variant: VariantId,
}

/// Vertex array object with the layout it was recorded for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexArrayResource {
    /// GPU vertex array
    pub handle: RawHandle,
    /// Geometry shader key plus material id and version at recording time,
    /// empty before the first setup
    pub layout: String,
}

impl GpuResource for VertexArrayResource {
    fn destroy(&self, gpu: &mut dyn GpuContext) {
        gpu.delete_vertex_array(self.handle);
    }
}

/// Uploaded texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureResource {
    /// GPU texture
    pub handle: RawHandle,
}

impl GpuResource for TextureResource {
    fn destroy(&self, gpu: &mut dyn GpuContext) {
        gpu.delete_texture(self.handle);
    }
}

/// Resource key recorded on a drawable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Attribute or index buffer
    Buffer(BufferId),
    /// Vertex array
    VertexArray(VertexArrayKey),
    /// Texture
    Texture(TextureId),
    /// Program
    Program(VariantId),
}

/// Every pool the renderer owns
#[derive(Debug, Default)]
pub struct ResourcePools {
    /// Attribute and index buffers
    pub buffers: ResourcePool<BufferId, BufferResource>,
    /// Vertex arrays
    pub vertex_arrays: ResourcePool<VertexArrayKey, VertexArrayResource>,
    /// Textures
    pub textures: ResourcePool<TextureId, TextureResource>,
    /// Programs
    pub programs: ProgramCache,
}

impl ResourcePools {
    /// Empty pools
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the resource behind a drawable's recorded key as used
    pub fn mark_used(&mut self, key: &ResourceKey, owner: ResourceOwner) -> bool {
        match key {
            ResourceKey::Buffer(id) => self.buffers.mark_used(id, owner),
            ResourceKey::VertexArray(key) => self.vertex_arrays.mark_used(key, owner),
            ResourceKey::Texture(id) => self.textures.mark_used(id, owner),
            ResourceKey::Program(id) => self.programs.mark_used(id, owner),
        }
    }

    /// Collect every pool. Vertex arrays go first since they reference buffers.
    pub fn collect_unused(&mut self, gpu: &mut dyn GpuContext) -> usize {
        self.vertex_arrays.collect_unused(gpu)
            + self.buffers.collect_unused(gpu)
            + self.textures.collect_unused(gpu)
            + self.programs.collect_unused(gpu)
    }

    /// Forget every resource (context loss)
    pub fn forget_all(&mut self) {
        self.vertex_arrays.forget_all();
        self.buffers.forget_all();
        self.textures.forget_all();
        self.programs.forget_all();
    }

    /// Destroy every resource
    pub fn destroy_all(&mut self, gpu: &mut dyn GpuContext) {
        self.vertex_arrays.destroy_all(gpu);
        self.buffers.destroy_all(gpu);
        self.textures.destroy_all(gpu);
        self.programs.destroy_all(gpu);
    }

    /// Live resources across every pool
    pub fn len(&self) -> usize {
        self.vertex_arrays.len() + self.buffers.len() + self.textures.len() + self.programs.len()
    }

    /// Whether every pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
