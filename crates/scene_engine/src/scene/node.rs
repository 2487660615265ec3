//! Scene nodes
//!
//! A node is a transform plus a payload ([`NodeKind`]). Hierarchy links are
//! ids into the owning [`SceneGraph`](super::SceneGraph); the graph is the
//! only place they change.

use std::fmt;

use super::camera::Camera;
use super::drawable::Drawable;
use super::transform::NodeTransform;
use crate::events::{Event, EventChannel, ListenerId, Propagation};
use crate::foundation::math::{EulerOrder, Mat4, Mat4Ext, Quat, Vec3};
use crate::render::light::Light;

slotmap::new_key_type! {
    /// Index of a node in its scene graph
    pub struct NodeId;
}

/// Transform notifications fired by a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeEvent {
    /// New local position
    PositionUpdate(Vec3),
    /// New local scale
    ScaleUpdate(Vec3),
    /// New Euler rotation in degrees
    RotationUpdate(Vec3),
    /// New pivot
    PivotUpdate(Vec3),
    /// Local matrix recomputed, carries the new version
    MatrixUpdate(u64),
}

/// Listener key for [`NodeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEventKind {
    /// See [`NodeEvent::PositionUpdate`]
    PositionUpdate,
    /// See [`NodeEvent::ScaleUpdate`]
    ScaleUpdate,
    /// See [`NodeEvent::RotationUpdate`]
    RotationUpdate,
    /// See [`NodeEvent::PivotUpdate`]
    PivotUpdate,
    /// See [`NodeEvent::MatrixUpdate`]
    MatrixUpdate,
}

impl Event for NodeEvent {
    type Kind = NodeEventKind;

    fn kind(&self) -> NodeEventKind {
        match self {
            Self::PositionUpdate(_) => NodeEventKind::PositionUpdate,
            Self::ScaleUpdate(_) => NodeEventKind::ScaleUpdate,
            Self::RotationUpdate(_) => NodeEventKind::RotationUpdate,
            Self::PivotUpdate(_) => NodeEventKind::PivotUpdate,
            Self::MatrixUpdate(_) => NodeEventKind::MatrixUpdate,
        }
    }
}

/// Payload of a node
#[derive(Debug)]
pub enum NodeKind {
    /// Plain grouping node
    Group,
    /// Geometry + material pair
    Mesh(Drawable),
    /// Light source
    Light(Light),
    /// Viewpoint
    Camera(Camera),
}

/// Spatial node
pub struct Node {
    /// Name used by lookups
    pub name: String,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    transform: NodeTransform,
    pub(super) world_matrix: Mat4,
    /// Invisible nodes are skipped with their whole subtree
    pub visible: bool,
    /// Recompute this node's matrices during tree updates
    pub auto_update_world_matrix: bool,
    /// Descend into children during tree updates
    pub auto_update_child_world_matrix: bool,
    /// Use the parent's world matrix verbatim, ignoring the local transform
    pub inherit_parent_transform: bool,
    /// Subject to frustum culling
    pub frustum_test: bool,
    /// Payload
    pub kind: NodeKind,
    events: EventChannel<NodeEvent>,
}

impl Node {
    /// Detached node with an identity transform
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            transform: NodeTransform::new(),
            world_matrix: Mat4::identity(),
            visible: true,
            auto_update_world_matrix: true,
            auto_update_child_world_matrix: true,
            inherit_parent_transform: false,
            frustum_test: true,
            kind,
            events: EventChannel::new(),
        }
    }

    /// Grouping node
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    /// Mesh node
    pub fn mesh(name: impl Into<String>, drawable: Drawable) -> Self {
        Self::new(name, NodeKind::Mesh(drawable))
    }

    /// Light node
    pub fn light(name: impl Into<String>, light: Light) -> Self {
        Self::new(name, NodeKind::Light(light))
    }

    /// Camera node
    pub fn camera(name: impl Into<String>, camera: Camera) -> Self {
        Self::new(name, NodeKind::Camera(camera))
    }

    /// Builder: local position
    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.set_position(x, y, z);
        self
    }

    /// Builder: Euler rotation in degrees
    pub fn with_rotation(mut self, x: f32, y: f32, z: f32) -> Self {
        self.set_rotation(x, y, z);
        self
    }

    /// Builder: local scale
    pub fn with_scale(mut self, x: f32, y: f32, z: f32) -> Self {
        self.set_scale(x, y, z);
        self
    }

    /// Parent node
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in draw order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Local transform state
    pub fn transform(&self) -> &NodeTransform {
        &self.transform
    }

    /// World matrix as of the last update pass
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// World-space translation as of the last update pass
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation_part()
    }

    /// Set local position
    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.transform.set_position(x, y, z);
        self.events.fire(&NodeEvent::PositionUpdate(Vec3::new(x, y, z)));
    }

    /// Set local scale
    pub fn set_scale(&mut self, x: f32, y: f32, z: f32) {
        self.transform.set_scale(x, y, z);
        self.events.fire(&NodeEvent::ScaleUpdate(Vec3::new(x, y, z)));
    }

    /// Set Euler rotation in degrees
    pub fn set_rotation(&mut self, x: f32, y: f32, z: f32) {
        self.transform.set_rotation(x, y, z);
        self.events.fire(&NodeEvent::RotationUpdate(Vec3::new(x, y, z)));
    }

    /// Change the Euler order
    pub fn set_rotation_order(&mut self, order: EulerOrder) {
        self.transform.set_rotation_order(order);
    }

    /// Set the rotation/scale origin
    pub fn set_pivot(&mut self, x: f32, y: f32, z: f32) {
        self.transform.set_pivot(x, y, z);
        self.events.fire(&NodeEvent::PivotUpdate(Vec3::new(x, y, z)));
    }

    /// Set rotation from a quaternion
    pub fn set_quaternion(&mut self, quaternion: Quat) {
        self.transform.set_quaternion(quaternion);
        let r = self.transform.rotation();
        self.events.fire(&NodeEvent::RotationUpdate(Vec3::new(r.x, r.y, r.z)));
    }

    /// Replace the local transform with a decomposed matrix
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.transform.set_matrix(matrix);
        self.events
            .fire(&NodeEvent::MatrixUpdate(self.transform.matrix_version()));
    }

    /// Re-derive the quaternion if the Euler angles changed
    pub fn update_quaternion(&mut self) -> bool {
        self.transform.update_quaternion()
    }

    /// Recompute the local matrix if dirty. Returns whether it recomputed.
    pub fn update_matrix(&mut self) -> bool {
        let updated = self.transform.update_matrix();
        if updated {
            self.events
                .fire(&NodeEvent::MatrixUpdate(self.transform.matrix_version()));
        }
        updated
    }

    /// Subscribe to transform events
    pub fn on<F>(&mut self, kind: NodeEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&NodeEvent) -> Propagation + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Subscribe to the next event of a kind
    pub fn once<F>(&mut self, kind: NodeEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&NodeEvent) -> Propagation + 'static,
    {
        self.events.once(kind, listener)
    }

    /// Unsubscribe one listener
    pub fn off(&mut self, kind: NodeEventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    /// Drawable payload
    pub fn drawable(&self) -> Option<&Drawable> {
        match &self.kind {
            NodeKind::Mesh(drawable) => Some(drawable),
            _ => None,
        }
    }

    /// Mutable drawable payload
    pub fn drawable_mut(&mut self) -> Option<&mut Drawable> {
        match &mut self.kind {
            NodeKind::Mesh(drawable) => Some(drawable),
            _ => None,
        }
    }

    /// Light payload
    pub fn as_light(&self) -> Option<&Light> {
        match &self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    /// Camera payload
    pub fn as_camera(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Mutable camera payload
    pub fn as_camera_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("visible", &self.visible)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
