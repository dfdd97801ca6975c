//! Math utilities and types
//!
//! Provides fundamental math types for 3D scene management, built on
//! nalgebra. All coordinates follow Y-up right-handed conventions.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Largest scale factor a matrix applies to any direction.
///
/// Conservative bound used when transforming spherical bounds: the radius
/// is scaled by the longest of the three basis-column lengths.
pub fn max_column_scale(matrix: &Mat4) -> f32 {
    let sx = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
    let sy = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
    let sz = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
    sx.max(sy).max(sz)
}

/// Check whether a matrix is the identity within `epsilon` per element.
pub fn is_identity(matrix: &Mat4, epsilon: f32) -> bool {
    let identity = Mat4::identity();
    matrix
        .iter()
        .zip(identity.iter())
        .all(|(a, b)| (a - b).abs() <= epsilon)
}
