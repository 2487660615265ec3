//! Math utilities and types
//!
//! Thin layer over `nalgebra`. The renderer core only needs a handful of
//! operations from here: TRS(+pivot) composition and decomposition, Euler to
//! quaternion conversion and GL-convention projection matrices.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion, UnitQuaternion,
    Unit,
};

use serde::{Deserialize, Serialize};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type (column-major, matches the GPU upload layout)
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Axis application order for Euler angles.
///
/// `Xyz` means the rotation matrix is `Rx * Ry * Rz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EulerOrder {
    /// Rx * Ry * Rz
    Xyz,
    /// Rx * Rz * Ry
    Xzy,
    /// Ry * Rx * Rz
    Yxz,
    /// Ry * Rz * Rx
    Yzx,
    /// Rz * Rx * Ry
    Zxy,
    /// Rz * Ry * Rx
    #[default]
    Zyx,
}

impl EulerOrder {
    fn axes(self) -> [usize; 3] {
        match self {
            Self::Xyz => [0, 1, 2],
            Self::Xzy => [0, 2, 1],
            Self::Yxz => [1, 0, 2],
            Self::Yzx => [1, 2, 0],
            Self::Zxy => [2, 0, 1],
            Self::Zyx => [2, 1, 0],
        }
    }
}

/// Euler angles in degrees with an explicit axis order
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Euler {
    /// Rotation about X in degrees
    pub x: f32,
    /// Rotation about Y in degrees
    pub y: f32,
    /// Rotation about Z in degrees
    pub z: f32,
    /// Axis order
    pub order: EulerOrder,
}

impl Euler {
    /// Create Euler angles in degrees
    pub fn new(x: f32, y: f32, z: f32, order: EulerOrder) -> Self {
        Self { x, y, z, order }
    }

    /// Convert to a unit quaternion
    pub fn to_quaternion(&self) -> Quat {
        let angles = [
            utils::deg_to_rad(self.x),
            utils::deg_to_rad(self.y),
            utils::deg_to_rad(self.z),
        ];
        self.order
            .axes()
            .iter()
            .fold(Quat::identity(), |acc, &axis| acc * axis_rotation(axis, angles[axis]))
    }

    /// Derive angles from a pure rotation matrix, keeping `order`
    pub fn from_rotation_matrix(m: &Mat3, order: EulerOrder) -> Self {
        let m11 = m[(0, 0)];
        let m12 = m[(0, 1)];
        let m13 = m[(0, 2)];
        let m21 = m[(1, 0)];
        let m22 = m[(1, 1)];
        let m23 = m[(1, 2)];
        let m31 = m[(2, 0)];
        let m32 = m[(2, 1)];
        let m33 = m[(2, 2)];
        const GIMBAL: f32 = 0.999_999_9;

        let (x, y, z) = match order {
            EulerOrder::Xyz => {
                let y = m13.clamp(-1.0, 1.0).asin();
                if m13.abs() < GIMBAL {
                    ((-m23).atan2(m33), y, (-m12).atan2(m11))
                } else {
                    (m32.atan2(m22), y, 0.0)
                }
            }
            EulerOrder::Yxz => {
                let x = (-m23.clamp(-1.0, 1.0)).asin();
                if m23.abs() < GIMBAL {
                    (x, m13.atan2(m33), m21.atan2(m22))
                } else {
                    (x, (-m31).atan2(m11), 0.0)
                }
            }
            EulerOrder::Zxy => {
                let x = m32.clamp(-1.0, 1.0).asin();
                if m32.abs() < GIMBAL {
                    (x, (-m31).atan2(m33), (-m12).atan2(m22))
                } else {
                    (x, 0.0, m21.atan2(m11))
                }
            }
            EulerOrder::Zyx => {
                let y = (-m31.clamp(-1.0, 1.0)).asin();
                if m31.abs() < GIMBAL {
                    (m32.atan2(m33), y, m21.atan2(m11))
                } else {
                    (0.0, y, (-m12).atan2(m22))
                }
            }
            EulerOrder::Yzx => {
                let z = m21.clamp(-1.0, 1.0).asin();
                if m21.abs() < GIMBAL {
                    ((-m23).atan2(m22), (-m31).atan2(m11), z)
                } else {
                    (0.0, m13.atan2(m33), z)
                }
            }
            EulerOrder::Xzy => {
                let z = (-m12.clamp(-1.0, 1.0)).asin();
                if m12.abs() < GIMBAL {
                    (m32.atan2(m22), m13.atan2(m11), z)
                } else {
                    ((-m23).atan2(m33), 0.0, z)
                }
            }
        };

        Self {
            x: utils::rad_to_deg(x),
            y: utils::rad_to_deg(y),
            z: utils::rad_to_deg(z),
            order,
        }
    }

    /// Derive angles from a quaternion, keeping `order`
    pub fn from_quaternion(q: &Quat, order: EulerOrder) -> Self {
        Self::from_rotation_matrix(q.to_rotation_matrix().matrix(), order)
    }
}

fn axis_rotation(axis: usize, angle: f32) -> Quat {
    match axis {
        0 => Quat::from_axis_angle(&Vec3::x_axis(), angle),
        1 => Quat::from_axis_angle(&Vec3::y_axis(), angle),
        _ => Quat::from_axis_angle(&Vec3::z_axis(), angle),
    }
}

/// Compose a local matrix: `T(position) * T(pivot) * R * S * T(-pivot)`.
///
/// The pivot is the origin rotation and scale happen about.
pub fn compose(position: &Vec3, rotation: &Quat, scale: &Vec3, pivot: &Vec3) -> Mat4 {
    let rs = rotation.to_homogeneous() * Mat4::new_nonuniform_scaling(scale);
    Mat4::new_translation(&(position + pivot)) * rs * Mat4::new_translation(&(-pivot))
}

/// Inverse of [`compose`] for a known pivot.
///
/// Negative determinants are folded into the X scale.
pub fn decompose(matrix: &Mat4, pivot: &Vec3) -> (Vec3, Quat, Vec3) {
    let linear: Mat3 = matrix.fixed_view::<3, 3>(0, 0).into_owned();

    let mut sx = linear.column(0).norm();
    let sy = linear.column(1).norm();
    let sz = linear.column(2).norm();
    if linear.determinant() < 0.0 {
        sx = -sx;
    }
    let scale = Vec3::new(sx, sy, sz);

    let mut rotation = linear;
    for (i, s) in [sx, sy, sz].into_iter().enumerate() {
        if s != 0.0 {
            rotation.column_mut(i).scale_mut(1.0 / s);
        }
    }
    let rotation = Quat::from_rotation_matrix(
        &nalgebra::Rotation3::from_matrix_unchecked(rotation),
    );

    let translation = Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
    let position = translation - pivot + linear * pivot;

    (position, rotation, scale)
}

/// Math utility functions
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians.to_degrees()
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// GL-convention perspective projection (clip z in [-w, w])
    fn perspective_gl(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// GL-convention orthographic projection
    fn orthographic_gl(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Translation column as a vector
    fn translation_part(&self) -> Vec3;

    /// Inverse, falling back to identity for singular matrices
    fn inverse_or_identity(&self) -> Mat4;

    /// Upper-left 3x3 inverse transpose, used for normal transforms
    fn normal_matrix(&self) -> Mat3;
}

impl Mat4Ext for Mat4 {
    fn perspective_gl(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect, utils::deg_to_rad(fov_y_degrees), near, far)
    }

    fn orthographic_gl(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_orthographic(left, right, bottom, top, near, far)
    }

    fn translation_part(&self) -> Vec3 {
        Vec3::new(self[(0, 3)], self[(1, 3)], self[(2, 3)])
    }

    fn inverse_or_identity(&self) -> Mat4 {
        self.try_inverse().unwrap_or_else(Mat4::identity)
    }

    fn normal_matrix(&self) -> Mat3 {
        let linear: Mat3 = self.fixed_view::<3, 3>(0, 0).into_owned();
        linear
            .try_inverse()
            .map_or_else(Mat3::identity, |inv| inv.transpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compose_decompose_round_trip() {
        let position = Vec3::new(1.5, -2.0, 3.25);
        let rotation = Euler::new(30.0, -45.0, 10.0, EulerOrder::Zyx).to_quaternion();
        let scale = Vec3::new(2.0, 0.5, 1.5);
        let pivot = Vec3::new(0.25, 1.0, -0.5);

        let matrix = compose(&position, &rotation, &scale, &pivot);
        let (p, r, s) = decompose(&matrix, &pivot);

        assert_relative_eq!(p, position, epsilon = 1e-4);
        assert_relative_eq!(s, scale, epsilon = 1e-4);
        assert!(r.angle_to(&rotation) < 1e-3);
    }

    #[test]
    fn test_pivot_is_fixed_point_of_rotation() {
        let pivot = Vec3::new(1.0, 0.0, 0.0);
        let rotation = Euler::new(0.0, 0.0, 90.0, EulerOrder::Xyz).to_quaternion();
        let matrix = compose(&Vec3::zeros(), &rotation, &Vec3::new(1.0, 1.0, 1.0), &pivot);

        let moved = matrix.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved.coords, pivot, epsilon = 1e-5);
    }

    #[test]
    fn test_euler_round_trip_all_orders() {
        let orders = [
            EulerOrder::Xyz,
            EulerOrder::Xzy,
            EulerOrder::Yxz,
            EulerOrder::Yzx,
            EulerOrder::Zxy,
            EulerOrder::Zyx,
        ];
        for order in orders {
            let euler = Euler::new(20.0, 35.0, -60.0, order);
            let back = Euler::from_quaternion(&euler.to_quaternion(), order);
            assert_relative_eq!(back.x, euler.x, epsilon = 1e-3);
            assert_relative_eq!(back.y, euler.y, epsilon = 1e-3);
            assert_relative_eq!(back.z, euler.z, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_perspective_gl_layout() {
        let (near, far) = (0.1_f32, 100.0_f32);
        let m = Mat4::perspective_gl(50.0, 1.0, near, far);
        let elements = m.as_slice();
        assert_relative_eq!(elements[11], -1.0);
        assert_relative_eq!(elements[15], 0.0);
        assert_relative_eq!(elements[10], (near + far) / (near - far), epsilon = 1e-6);
    }
}
