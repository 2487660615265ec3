//! Cameras
//!
//! The projection matrix is rebuilt only when a projection parameter changed.
//! The view matrix is the inverse of the node's world matrix and is refreshed
//! every frame by the renderer.

use super::culling::Frustum;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection, `fov` is the vertical field of view in degrees
    Perspective {
        /// Vertical field of view in degrees
        fov: f32,
        /// Width / height
        aspect: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Left plane
        left: f32,
        /// Right plane
        right: f32,
        /// Bottom plane
        bottom: f32,
        /// Top plane
        top: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
}

/// Camera payload of a node
#[derive(Debug, Clone)]
pub struct Camera {
    projection: Projection,
    projection_dirty: bool,
    projection_matrix: Mat4,
    view_matrix: Mat4,
    view_projection: Mat4,
    frustum: Frustum,
    world_position: Vec3,
}

impl Camera {
    /// Camera with the given projection
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            projection_dirty: true,
            projection_matrix: Mat4::identity(),
            view_matrix: Mat4::identity(),
            view_projection: Mat4::identity(),
            frustum: Frustum::from_matrix(&Mat4::identity()),
            world_position: Vec3::zeros(),
        }
    }

    /// Perspective camera
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective { fov, aspect, near, far })
    }

    /// Orthographic camera
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic { left, right, bottom, top, near, far })
    }

    /// Projection parameters
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Replace the projection parameters
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.projection_dirty = true;
    }

    /// Change the vertical field of view. No-op for orthographic cameras.
    pub fn set_fov(&mut self, value: f32) {
        if let Projection::Perspective { fov, .. } = &mut self.projection {
            *fov = value;
            self.projection_dirty = true;
        }
    }

    /// Change the aspect ratio. No-op for orthographic cameras.
    pub fn set_aspect(&mut self, value: f32) {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            *aspect = value;
            self.projection_dirty = true;
        }
    }

    /// Change the near plane
    pub fn set_near(&mut self, value: f32) {
        match &mut self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => *near = value,
        }
        self.projection_dirty = true;
    }

    /// Change the far plane
    pub fn set_far(&mut self, value: f32) {
        match &mut self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => *far = value,
        }
        self.projection_dirty = true;
    }

    /// Near plane distance
    pub fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    /// Far plane distance
    pub fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    /// Whether the projection needs rebuilding
    pub fn is_projection_dirty(&self) -> bool {
        self.projection_dirty
    }

    /// Rebuild the projection matrix if a parameter changed
    pub fn update_projection_matrix(&mut self) -> bool {
        if !self.projection_dirty {
            return false;
        }
        self.projection_matrix = match self.projection {
            Projection::Perspective { fov, aspect, near, far } => Mat4::perspective_gl(fov, aspect, near, far),
            Projection::Orthographic { left, right, bottom, top, near, far } => {
                Mat4::orthographic_gl(left, right, bottom, top, near, far)
            }
        };
        self.projection_dirty = false;
        true
    }

    /// Refresh view-dependent matrices from the camera node's world matrix
    pub fn update_view(&mut self, world_matrix: &Mat4) {
        self.update_projection_matrix();
        self.view_matrix = world_matrix.inverse_or_identity();
        self.view_projection = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(&self.view_projection);
        self.world_position = world_matrix.translation_part();
    }

    /// Projection matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// World to view
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    /// World to clip
    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Frustum of the last view update
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Eye position in world space
    pub fn world_position(&self) -> Vec3 {
        self.world_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perspective_layout() {
        let (near, far) = (0.1, 100.0);
        let mut camera = Camera::perspective(60.0, 1.5, near, far);
        assert!(camera.update_projection_matrix());
        assert!(!camera.update_projection_matrix());

        let m = camera.projection_matrix();
        assert_relative_eq!(m[(3, 2)], -1.0);
        assert_relative_eq!(m[(3, 3)], 0.0);
        assert_relative_eq!(m[(2, 2)], (near + far) / (near - far), epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_column_major_values() {
        let mut camera = Camera::perspective(50.0, 1.0, 0.1, 100.0);
        camera.update_projection_matrix();
        let m = camera.projection_matrix().as_slice();

        assert_relative_eq!(m[0], 2.144_507, epsilon = 1e-5);
        assert_relative_eq!(m[5], 2.144_507, epsilon = 1e-5);
        assert_relative_eq!(m[10], -1.002_002, epsilon = 1e-5);
        assert_relative_eq!(m[11], -1.0);
        assert_relative_eq!(m[14], -0.200_2, epsilon = 1e-5);
        assert_relative_eq!(m[15], 0.0);
    }

    #[test]
    fn test_setter_marks_projection_dirty() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 10.0);
        camera.update_projection_matrix();
        camera.set_fov(45.0);
        assert!(camera.is_projection_dirty());
        camera.set_far(50.0);
        assert!(camera.update_projection_matrix());
        assert_relative_eq!(camera.far(), 50.0);
    }

    #[test]
    fn test_view_is_world_inverse() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 10.0);
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0));
        camera.update_view(&world);
        assert_relative_eq!(camera.view_matrix() * world, Mat4::identity(), epsilon = 1e-5);
        assert_relative_eq!(camera.world_position(), Vec3::new(0.0, 0.0, 5.0));
    }
}
