//! Bounding volumes and frustum tests used during visibility gathering

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point of a packed xyz array.
    /// Returns `None` for fewer than one point.
    pub fn from_positions(positions: &[f32]) -> Option<Self> {
        let mut points = positions.chunks_exact(3);
        let first = points.next()?;
        let mut min = Vec3::new(first[0], first[1], first[2]);
        let mut max = min;
        for p in points {
            let v = Vec3::new(p[0], p[1], p[2]);
            min = min.inf(&v);
            max = max.sup(&v);
        }
        Some(Self { min, max })
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }
}

/// Sphere in local or world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center
    pub center: Vec3,
    /// Radius
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere around a packed xyz position array, centered on its AABB
    pub fn from_positions(positions: &[f32]) -> Option<Self> {
        let center = Aabb::from_positions(positions)?.center();
        let radius_sq = positions
            .chunks_exact(3)
            .map(|p| (Vec3::new(p[0], p[1], p[2]) - center).norm_squared())
            .fold(0.0_f32, f32::max);
        Some(Self { center, radius: radius_sq.sqrt() })
    }

    /// Transform into another space. The radius grows by the largest axis scale.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point(&Point3::from(self.center)).coords;
        let scale = (0..3)
            .map(|i| matrix.fixed_view::<3, 1>(0, i).norm())
            .fold(0.0_f32, f32::max);
        Self { center, radius: self.radius * scale }
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a normalized plane from `a*x + b*y + c*z + d = 0`
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let normal = Vec3::new(a, b, c);
        let length = normal.norm();
        if length == 0.0 {
            return Self { normal, distance: d };
        }
        Self { normal: normal / length, distance: d / length }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six inward-facing planes (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix (Gribb-Hartmann,
    /// GL clip space)
    pub fn from_matrix(vp: &Mat4) -> Self {
        let row = |i: usize| vp.row(i).transpose();
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let plane = |v: nalgebra::Vector4<f32>| Plane::from_coefficients(v.x, v.y, v.z, v.w);

        Self {
            planes: [
                plane(r3 + r0),
                plane(r3 - r0),
                plane(r3 + r1),
                plane(r3 - r1),
                plane(r3 + r2),
                plane(r3 - r2),
            ],
        }
    }

    /// Whether any part of the sphere lies inside
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_from_positions() {
        let aabb = Aabb::from_positions(&[0.0, 0.0, 0.0, 2.0, -1.0, 4.0]).unwrap();
        assert_eq!(aabb.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(2.0, 0.0, 4.0));
        assert!(aabb.contains_point(Vec3::new(1.0, -0.5, 2.0)));
        assert!(Aabb::from_positions(&[]).is_none());
    }

    #[test]
    fn test_sphere_transform_scales_radius() {
        let sphere = BoundingSphere { center: Vec3::zeros(), radius: 1.0 };
        let m = Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 3.0, 1.0));
        let world = sphere.transformed(&m);
        assert_relative_eq!(world.center, Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(world.radius, 3.0);
    }

    #[test]
    fn test_frustum_culls_spheres_behind_camera() {
        // Camera at origin looking down -Z
        let frustum = Frustum::from_matrix(&Mat4::perspective_gl(60.0, 1.0, 0.1, 100.0));

        let ahead = BoundingSphere { center: Vec3::new(0.0, 0.0, -10.0), radius: 1.0 };
        let behind = BoundingSphere { center: Vec3::new(0.0, 0.0, 10.0), radius: 1.0 };
        let beyond_far = BoundingSphere { center: Vec3::new(0.0, 0.0, -200.0), radius: 1.0 };

        assert!(frustum.intersects_sphere(&ahead));
        assert!(!frustum.intersects_sphere(&behind));
        assert!(!frustum.intersects_sphere(&beyond_far));
        assert!(frustum.intersects_aabb(&Aabb::new(
            Vec3::new(-1.0, -1.0, -11.0),
            Vec3::new(1.0, 1.0, -9.0),
        )));
    }
}
