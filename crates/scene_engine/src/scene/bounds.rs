//! Bounding volumes for spatial nodes
//!
//! Pure value types with no tree awareness: an axis-aligned box, a sphere,
//! and a tagged union over both. Bounds aggregation up the scene graph and
//! octree cell placement are both expressed in terms of these types.

use crate::foundation::math::{max_column_scale, Mat4, Point3, Vec3};
use crate::scene::error::SceneError;
use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// The empty box sentinel: `min` above `max` on every axis.
    ///
    /// Combining anything into the empty box yields the other operand, so
    /// a group with no eligible children collapses to this value rather
    /// than an error.
    pub fn empty() -> Self {
        Self {
            min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given half-extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Whether this box holds no volume (the empty sentinel)
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
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
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another AABB
    ///
    /// The empty box is contained by everything.
    pub fn contains_aabb(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Grow this box to enclose another
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min: Vec3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vec3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Grow this box to enclose a point
    pub fn expand_to_point(&self, point: Vec3) -> Self {
        self.union(&Self::new(point, point))
    }

    /// Apply an affine transform, returning the enclosing box of the
    /// transformed corners
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return Self::empty();
        }
        let mut result = Self::empty();
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point(&Point3::from(corner));
            result = result.expand_to_point(p.coords);
        }
        result
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere
    pub center: Vec3,
    /// Radius of the sphere
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere from center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Whether the sphere holds no volume
    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Minimal sphere enclosing both operands
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let offset = other.center - self.center;
        let distance = offset.magnitude();

        // One sphere already encloses the other
        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }

        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = if distance > f32::EPSILON {
            self.center + offset * ((radius - self.radius) / distance)
        } else {
            self.center
        };
        Self { center, radius }
    }

    /// Apply an affine transform: the center is mapped exactly, the radius
    /// is scaled by the largest scale factor of the matrix
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            center: matrix.transform_point(&Point3::from(self.center)).coords,
            radius: self.radius * max_column_scale(matrix),
        }
    }

    /// Smallest AABB enclosing this sphere
    pub fn enclosing_aabb(&self) -> Aabb {
        if self.is_empty() {
            return Aabb::empty();
        }
        let r = Vec3::new(self.radius, self.radius, self.radius);
        Aabb::new(self.center - r, self.center + r)
    }
}

/// Shape tag for bounding volumes
///
/// Used as a construction hint (default bounds for new nodes) and in
/// configuration files. `Polytope` is declared for completeness but is not
/// supported by this engine; requesting it fails fast at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsKind {
    /// No bounds; the node is permanently excluded from bounds aggregation
    None,
    /// Spherical bounds
    Sphere,
    /// Axis-aligned box bounds
    Aabb,
    /// Convex polytope bounds (unsupported)
    Polytope,
}

/// A node's geometric extent: sphere, box, or an explicit opt-out
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    /// No bounds: the node never participates in bounds computation
    None,
    /// Spherical bounds
    Sphere(Sphere),
    /// Axis-aligned box bounds
    Aabb(Aabb),
}

impl BoundingVolume {
    /// An empty (zero-content) box volume, the aggregation seed
    pub fn empty() -> Self {
        Self::Aabb(Aabb::empty())
    }

    /// Construct the default volume for a shape tag.
    ///
    /// # Errors
    ///
    /// `SceneError::UnsupportedBoundsKind` for `BoundsKind::Polytope`.
    pub fn of_kind(kind: BoundsKind) -> Result<Self, SceneError> {
        match kind {
            BoundsKind::None => Ok(Self::None),
            BoundsKind::Sphere => Ok(Self::Sphere(Sphere::new(Vec3::zeros(), -1.0))),
            BoundsKind::Aabb => Ok(Self::empty()),
            BoundsKind::Polytope => Err(SceneError::UnsupportedBoundsKind(kind)),
        }
    }

    /// The shape tag of this volume
    pub fn kind(&self) -> BoundsKind {
        match self {
            Self::None => BoundsKind::None,
            Self::Sphere(_) => BoundsKind::Sphere,
            Self::Aabb(_) => BoundsKind::Aabb,
        }
    }

    /// Whether this volume contributes nothing to aggregation
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Sphere(s) => s.is_empty(),
            Self::Aabb(b) => b.is_empty(),
        }
    }

    /// Grow this volume to enclose another.
    ///
    /// One total, order-independent rule set: `None` and empty volumes
    /// absorb the other operand; sphere∪sphere stays a sphere; mixed
    /// shapes degrade to an AABB union.
    pub fn combine(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        *self = match (&*self, other) {
            (Self::Sphere(a), Self::Sphere(b)) => Self::Sphere(a.union(b)),
            (a, b) => {
                // as_aabb is Some for every non-empty volume
                let ab = a.as_aabb().unwrap_or(Aabb::empty());
                let bb = b.as_aabb().unwrap_or(Aabb::empty());
                Self::Aabb(ab.union(&bb))
            }
        };
    }

    /// Replace this volume with another
    pub fn set(&mut self, other: &Self) {
        *self = *other;
    }

    /// Apply an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        match self {
            Self::None => Self::None,
            Self::Sphere(s) => Self::Sphere(s.transformed(matrix)),
            Self::Aabb(b) => Self::Aabb(b.transformed(matrix)),
        }
    }

    /// The enclosing AABB, if the volume has extent
    pub fn as_aabb(&self) -> Option<Aabb> {
        match self {
            Self::None => None,
            Self::Sphere(s) => {
                if s.is_empty() {
                    None
                } else {
                    Some(s.enclosing_aabb())
                }
            }
            Self::Aabb(b) => {
                if b.is_empty() {
                    None
                } else {
                    Some(*b)
                }
            }
        }
    }
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self::empty()
    }
}
