//! Local transform state for scene nodes
//!
//! Two-phase: setters only record the new value and mark the state dirty,
//! [`NodeTransform::update_matrix`] commits. `matrix_version` counts commits,
//! not mutations.

use crate::foundation::math::{self, Euler, EulerOrder, Mat4, Quat, Vec3};

/// Position/rotation/scale/pivot of a node relative to its parent
#[derive(Debug, Clone)]
pub struct NodeTransform {
    position: Vec3,
    rotation: Euler,
    scale: Vec3,
    pivot: Vec3,
    quaternion: Quat,
    matrix: Mat4,
    matrix_dirty: bool,
    quaternion_dirty: bool,
    matrix_version: u64,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Euler::default(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            pivot: Vec3::zeros(),
            quaternion: Quat::identity(),
            matrix: Mat4::identity(),
            matrix_dirty: false,
            quaternion_dirty: false,
            matrix_version: 0,
        }
    }
}

impl NodeTransform {
    /// Identity transform
    pub fn new() -> Self {
        Self::default()
    }

    /// Local position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Euler rotation in degrees
    pub fn rotation(&self) -> Euler {
        self.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Rotation/scale origin
    pub fn pivot(&self) -> Vec3 {
        self.pivot
    }

    /// Quaternion as of the last [`update_quaternion`](Self::update_quaternion)
    pub fn quaternion(&self) -> Quat {
        self.quaternion
    }

    /// Local matrix as of the last commit
    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    /// Number of committed local matrix recomputations
    pub fn matrix_version(&self) -> u64 {
        self.matrix_version
    }

    /// Whether a commit is pending
    pub fn is_matrix_dirty(&self) -> bool {
        self.matrix_dirty
    }

    /// Whether the quaternion lags behind the Euler angles
    pub fn is_quaternion_dirty(&self) -> bool {
        self.quaternion_dirty
    }

    /// Set position
    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.position = Vec3::new(x, y, z);
        self.matrix_dirty = true;
    }

    /// Set scale
    pub fn set_scale(&mut self, x: f32, y: f32, z: f32) {
        self.scale = Vec3::new(x, y, z);
        self.matrix_dirty = true;
    }

    /// Set Euler rotation in degrees, keeping the current order
    pub fn set_rotation(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Euler::new(x, y, z, self.rotation.order);
        self.quaternion_dirty = true;
        self.matrix_dirty = true;
    }

    /// Change the Euler axis order
    pub fn set_rotation_order(&mut self, order: EulerOrder) {
        self.rotation.order = order;
        self.quaternion_dirty = true;
        self.matrix_dirty = true;
    }

    /// Set pivot
    pub fn set_pivot(&mut self, x: f32, y: f32, z: f32) {
        self.pivot = Vec3::new(x, y, z);
        self.matrix_dirty = true;
    }

    /// Set rotation directly; Euler angles follow the quaternion
    pub fn set_quaternion(&mut self, quaternion: Quat) {
        self.quaternion = quaternion;
        self.rotation = Euler::from_quaternion(&quaternion, self.rotation.order);
        self.quaternion_dirty = false;
        self.matrix_dirty = true;
    }

    /// Replace the local state by decomposing `matrix` around the current pivot.
    ///
    /// The matrix is committed as-is and counts as one recomputation.
    pub fn set_matrix(&mut self, matrix: Mat4) {
        let (position, quaternion, scale) = math::decompose(&matrix, &self.pivot);
        self.position = position;
        self.scale = scale;
        self.quaternion = quaternion;
        self.rotation = Euler::from_quaternion(&quaternion, self.rotation.order);
        self.quaternion_dirty = false;
        self.matrix = matrix;
        self.matrix_dirty = false;
        self.matrix_version += 1;
    }

    /// Re-derive the quaternion from the Euler angles if they changed
    pub fn update_quaternion(&mut self) -> bool {
        if !self.quaternion_dirty {
            return false;
        }
        self.quaternion = self.rotation.to_quaternion();
        self.quaternion_dirty = false;
        true
    }

    /// Recompute the local matrix if dirty. Returns whether it recomputed.
    pub fn update_matrix(&mut self) -> bool {
        if !self.matrix_dirty {
            return false;
        }
        self.update_quaternion();
        self.matrix = math::compose(&self.position, &self.quaternion, &self.scale, &self.pivot);
        self.matrix_dirty = false;
        self.matrix_version += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_setters_only_mark_dirty() {
        let mut t = NodeTransform::new();
        t.set_position(1.0, 2.0, 3.0);
        t.set_rotation(0.0, 90.0, 0.0);

        assert!(t.is_matrix_dirty());
        assert!(t.is_quaternion_dirty());
        assert_eq!(t.matrix(), &Mat4::identity());
        assert_eq!(t.matrix_version(), 0);
    }

    #[test]
    fn test_version_counts_commits_not_mutations() {
        let mut t = NodeTransform::new();
        t.set_position(1.0, 0.0, 0.0);
        t.set_scale(2.0, 2.0, 2.0);
        t.set_pivot(0.5, 0.0, 0.0);

        assert!(t.update_matrix());
        assert_eq!(t.matrix_version(), 1);

        assert!(!t.update_matrix());
        assert!(!t.update_matrix());
        assert_eq!(t.matrix_version(), 1);

        t.set_position(0.0, 0.0, 0.0);
        assert!(t.update_matrix());
        assert_eq!(t.matrix_version(), 2);
    }

    #[test]
    fn test_update_quaternion_idempotent() {
        let mut t = NodeTransform::new();
        t.set_rotation(0.0, 0.0, 90.0);
        assert!(t.update_quaternion());
        let q = t.quaternion();
        assert!(!t.update_quaternion());
        assert_eq!(t.quaternion(), q);
    }

    #[test]
    fn test_set_matrix_round_trips() {
        let mut source = NodeTransform::new();
        source.set_pivot(0.0, 1.0, 0.0);
        source.set_position(3.0, -1.0, 2.0);
        source.set_rotation(10.0, 20.0, 30.0);
        source.set_scale(1.0, 2.0, 3.0);
        source.update_matrix();

        let mut target = NodeTransform::new();
        target.set_pivot(0.0, 1.0, 0.0);
        target.update_matrix();
        target.set_matrix(*source.matrix());

        assert_relative_eq!(target.position(), source.position(), epsilon = 1e-4);
        assert_relative_eq!(target.scale(), source.scale(), epsilon = 1e-4);
        assert_relative_eq!(target.rotation().x, 10.0, epsilon = 1e-2);
        assert_relative_eq!(target.rotation().y, 20.0, epsilon = 1e-2);
        assert_relative_eq!(target.rotation().z, 30.0, epsilon = 1e-2);
    }
}
