//! Frustum culling over the octree partition
//!
//! Classifies cells against a six-plane frustum, pruning subtrees that
//! fall fully outside and suppressing further tests for subtrees fully
//! inside (containment is transitive). With extended cells enabled, the
//! merged face/edge regions are tested before descending so a single box
//! test can reject several octants at once.

use crate::foundation::math::{Mat4, Vec3};
use crate::scene::{Aabb, BoundingVolume, NodeKey, Sphere};
use crate::spatial::octree::{CellId, OctreePartition};
use crate::spatial::regions::{region_bounds, EXTENDED_REGIONS};

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance; the normal is
    /// normalized and the distance rescaled to match
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let len = normal.magnitude();
        Self {
            normal: normal / len,
            distance: distance / len,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Result of classifying a volume against the frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Fully inside every plane
    Inside,
    /// Fully outside at least one plane
    Outside,
    /// Neither fully inside nor fully outside
    Intersecting,
}

/// View frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes with inward-facing normals
    /// (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix using the
    /// Gribb-Hartmann method
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let m = view_projection;
        let row = |i: usize| {
            Vec3::new(m[(i, 0)], m[(i, 1)], m[(i, 2)])
        };
        let w = |i: usize| m[(i, 3)];

        let planes = [
            Plane::new(row(3) + row(0), w(3) + w(0)), // left
            Plane::new(row(3) - row(0), w(3) - w(0)), // right
            Plane::new(row(3) + row(1), w(3) + w(1)), // bottom
            Plane::new(row(3) - row(1), w(3) - w(1)), // top
            Plane::new(row(3) + row(2), w(3) + w(2)), // near
            Plane::new(row(3) - row(2), w(3) - w(2)), // far
        ];
        Self { planes }
    }

    /// Three-way AABB classification using the positive/negative vertex
    /// test: the corner nearest each plane decides full rejection, the
    /// farthest decides full containment
    pub fn classify_aabb(&self, aabb: &Aabb) -> Containment {
        if aabb.is_empty() {
            return Containment::Outside;
        }
        let mut result = Containment::Inside;
        for plane in &self.planes {
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.distance_to_point(positive) < 0.0 {
                return Containment::Outside;
            }
            let negative = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.min.x } else { aabb.max.x },
                if plane.normal.y >= 0.0 { aabb.min.y } else { aabb.max.y },
                if plane.normal.z >= 0.0 { aabb.min.z } else { aabb.max.z },
            );
            if plane.distance_to_point(negative) < 0.0 {
                result = Containment::Intersecting;
            }
        }
        result
    }

    /// Three-way sphere classification by signed center distance
    pub fn classify_sphere(&self, sphere: &Sphere) -> Containment {
        if sphere.is_empty() {
            return Containment::Outside;
        }
        let mut result = Containment::Inside;
        for plane in &self.planes {
            let distance = plane.distance_to_point(sphere.center);
            if distance < -sphere.radius {
                return Containment::Outside;
            }
            if distance < sphere.radius {
                result = Containment::Intersecting;
            }
        }
        result
    }

    /// Classify a bounding volume, dispatching on its shape
    pub fn classify(&self, volume: &BoundingVolume) -> Containment {
        match volume {
            BoundingVolume::None => Containment::Outside,
            BoundingVolume::Sphere(s) => self.classify_sphere(s),
            BoundingVolume::Aabb(b) => self.classify_aabb(b),
        }
    }
}

impl OctreePartition {
    /// Lazily enumerate nodes visible in the frustum.
    ///
    /// The sequence is finite and not restartable; re-invoke to cull
    /// again. Collect with [`OctreePartition::query_visible`] when a
    /// materialized set is more convenient.
    pub fn cull<'a>(&'a self, frustum: &'a Frustum) -> VisibleNodes<'a> {
        VisibleNodes {
            partition: self,
            frustum,
            stack: vec![CullFrame {
                cell: 0,
                suppressed: false,
            }],
            pending: Vec::new(),
        }
    }

    /// Collect the visible node set for this frame
    pub fn query_visible(&self, frustum: &Frustum) -> Vec<NodeKey> {
        self.cull(frustum).collect()
    }
}

struct CullFrame {
    cell: CellId,
    /// Culling suppression: an enclosing cell already classified fully
    /// inside, so this subtree is enumerated without further tests
    suppressed: bool,
}

/// Lazy iterator over the nodes visible in a frustum
///
/// Created by [`OctreePartition::cull`]. Cells classified outside
/// terminate their subtree; cells classified inside switch the subtree to
/// enumeration-only. Nodes filed directly in a visited cell are tested
/// (or enumerated, under suppression) exactly once.
pub struct VisibleNodes<'a> {
    partition: &'a OctreePartition,
    frustum: &'a Frustum,
    stack: Vec<CullFrame>,
    pending: Vec<NodeKey>,
}

impl VisibleNodes<'_> {
    /// Process one cell: buffer its passing residents and push child
    /// frames per the extended-region skip mask
    fn visit_cell(&mut self, frame: &CullFrame) {
        let cell = &self.partition.cells[frame.cell];
        let mut suppressed = frame.suppressed;

        if !suppressed {
            match self.frustum.classify_aabb(&cell.bounds) {
                Containment::Outside => {
                    // Deeper cells fully contain their residents, so an
                    // outside cell ends the subtree. The root can also
                    // hold nodes filed outside the fixed world volume;
                    // those still get their individual test.
                    if frame.cell == 0 {
                        for entry in &cell.entries {
                            if self.frustum.classify(&entry.volume) != Containment::Outside {
                                self.pending.push(entry.key);
                            }
                        }
                    }
                    return;
                }
                Containment::Inside => suppressed = true,
                Containment::Intersecting => {}
            }
        }

        for entry in &cell.entries {
            if suppressed || self.frustum.classify(&entry.volume) != Containment::Outside {
                self.pending.push(entry.key);
            }
        }

        let Some(children) = cell.children else {
            return;
        };

        let mut skip: u8 = 0;
        if !suppressed && self.partition.config.extended_cells {
            for region in &EXTENDED_REGIONS {
                // Octants already rejected by an earlier region need no
                // further coverage.
                if skip & region.octant_mask == region.octant_mask {
                    continue;
                }
                let bounds = region_bounds(&cell.bounds, region);
                if self.frustum.classify_aabb(&bounds) == Containment::Outside {
                    skip |= region.octant_mask;
                }
            }
        }

        for (octant, &child) in children.iter().enumerate().rev() {
            if skip & (1 << octant) == 0 {
                self.stack.push(CullFrame {
                    cell: child,
                    suppressed,
                });
            }
        }
    }
}

impl Iterator for VisibleNodes<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        loop {
            if let Some(key) = self.pending.pop() {
                return Some(key);
            }
            let frame = self.stack.pop()?;
            self.visit_cell(&frame);
        }
    }
}
