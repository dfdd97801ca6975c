//! Node transform: a 4x4 affine matrix with change tracking
//!
//! Owned by exactly one placement (transform) group. Every write marks the
//! change flag so a renderer can detect edits without diffing matrices.

use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::scene::change::ChangeFlag;

/// A placement group's transform
///
/// Wraps a column-major 4x4 matrix. Convenience operations compose in
/// local space (post-multiplication), matching the parent-to-child
/// composition order used for world transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTransform {
    matrix: Mat4,
    changed: ChangeFlag,
}

impl NodeTransform {
    /// Create an identity transform
    pub fn identity() -> Self {
        Self {
            matrix: Mat4::identity(),
            changed: ChangeFlag::default(),
        }
    }

    /// Create from an explicit matrix
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self {
            matrix,
            changed: ChangeFlag::default(),
        }
    }

    /// The current matrix
    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    /// Replace the matrix wholesale
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix = matrix;
        self.changed.mark();
    }

    /// Post-multiply a translation
    pub fn translate(&mut self, offset: Vec3) {
        self.matrix *= Mat4::new_translation(&offset);
        self.changed.mark();
    }

    /// Post-multiply an axis-angle rotation (radians)
    pub fn rotate(&mut self, axis: Vec3, angle: f32) {
        self.matrix *= Mat4::new_rotation(axis.normalize() * angle);
        self.changed.mark();
    }

    /// Post-multiply a non-uniform scale
    pub fn scale(&mut self, factors: Vec3) {
        self.matrix *= Mat4::new_nonuniform_scaling(&factors);
        self.changed.mark();
    }

    /// Replace with a right-handed look-at view matrix
    pub fn set_look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.matrix = Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up);
        self.changed.mark();
    }

    /// Replace with a right-handed perspective projection
    pub fn set_perspective(&mut self, aspect: f32, fovy: f32, znear: f32, zfar: f32) {
        self.matrix = Mat4::new_perspective(aspect, fovy, znear, zfar);
        self.changed.mark();
    }

    /// Replace with an orthographic projection
    pub fn set_orthographic(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        znear: f32,
        zfar: f32,
    ) {
        self.matrix = Mat4::new_orthographic(left, right, bottom, top, znear, zfar);
        self.changed.mark();
    }

    /// Change flag accessor
    pub fn change_flag(&self) -> &ChangeFlag {
        &self.changed
    }

    /// Mutable change flag accessor (for commit)
    pub(crate) fn change_flag_mut(&mut self) -> &mut ChangeFlag {
        &mut self.changed
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::identity()
    }
}
