//! Extended-cell region table
//!
//! A cell's 8 octants can be merged into larger regions sharing the same
//! center split: 6 face regions (4 octants each, one axis constrained)
//! and 12 edge regions (2 octants each, two axes constrained). During
//! culling, a merged region that classifies fully outside the frustum
//! rejects every octant it covers in one box test.
//!
//! Octant index bit layout follows the storage octree: x = bit 0,
//! y = bit 1, z = bit 2 (bit set = upper half).

use crate::foundation::math::Vec3;
use crate::scene::Aabb;

/// Per-axis selection of a region within its cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AxisSpan {
    /// Lower half of the axis
    Lo,
    /// Upper half of the axis
    Hi,
    /// Whole axis
    Full,
}

/// A merged region: per-axis spans plus the octants it covers
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExtendedRegion {
    pub(crate) spans: [AxisSpan; 3],
    /// One bit per standard octant subsumed by this region
    pub(crate) octant_mask: u8,
}

use AxisSpan::{Full, Hi, Lo};

/// The 18 merged regions: 6 faces then 12 edges.
///
/// Masks are fixed data rather than derived at runtime so the culling
/// logic stays auditable; `test_masks_match_spans` re-derives each mask
/// from its spans.
pub(crate) const EXTENDED_REGIONS: [ExtendedRegion; 18] = [
    // Face regions: one axis constrained, 4 octants each.
    ExtendedRegion { spans: [Lo, Full, Full], octant_mask: 0b0101_0101 },
    ExtendedRegion { spans: [Hi, Full, Full], octant_mask: 0b1010_1010 },
    ExtendedRegion { spans: [Full, Lo, Full], octant_mask: 0b0011_0011 },
    ExtendedRegion { spans: [Full, Hi, Full], octant_mask: 0b1100_1100 },
    ExtendedRegion { spans: [Full, Full, Lo], octant_mask: 0b0000_1111 },
    ExtendedRegion { spans: [Full, Full, Hi], octant_mask: 0b1111_0000 },
    // Edge regions: two axes constrained, 2 octants each.
    ExtendedRegion { spans: [Lo, Lo, Full], octant_mask: 0b0001_0001 },
    ExtendedRegion { spans: [Hi, Lo, Full], octant_mask: 0b0010_0010 },
    ExtendedRegion { spans: [Lo, Hi, Full], octant_mask: 0b0100_0100 },
    ExtendedRegion { spans: [Hi, Hi, Full], octant_mask: 0b1000_1000 },
    ExtendedRegion { spans: [Lo, Full, Lo], octant_mask: 0b0000_0101 },
    ExtendedRegion { spans: [Hi, Full, Lo], octant_mask: 0b0000_1010 },
    ExtendedRegion { spans: [Lo, Full, Hi], octant_mask: 0b0101_0000 },
    ExtendedRegion { spans: [Hi, Full, Hi], octant_mask: 0b1010_0000 },
    ExtendedRegion { spans: [Full, Lo, Lo], octant_mask: 0b0000_0011 },
    ExtendedRegion { spans: [Full, Hi, Lo], octant_mask: 0b0000_1100 },
    ExtendedRegion { spans: [Full, Lo, Hi], octant_mask: 0b0011_0000 },
    ExtendedRegion { spans: [Full, Hi, Hi], octant_mask: 0b1100_0000 },
];

/// The world-space box a region occupies within `cell`
pub(crate) fn region_bounds(cell: &Aabb, region: &ExtendedRegion) -> Aabb {
    let center = cell.center();
    let pick = |span: AxisSpan, min: f32, mid: f32, max: f32| -> (f32, f32) {
        match span {
            AxisSpan::Lo => (min, mid),
            AxisSpan::Hi => (mid, max),
            AxisSpan::Full => (min, max),
        }
    };
    let (x0, x1) = pick(region.spans[0], cell.min.x, center.x, cell.max.x);
    let (y0, y1) = pick(region.spans[1], cell.min.y, center.y, cell.max.y);
    let (z0, z1) = pick(region.spans[2], cell.min.z, center.z, cell.max.z);
    Aabb::new(Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_match_spans() {
        for region in &EXTENDED_REGIONS {
            let mut mask = 0u8;
            for octant in 0..8u8 {
                let bits = [octant & 1 != 0, octant & 2 != 0, octant & 4 != 0];
                let covered = region.spans.iter().zip(bits).all(|(span, hi)| match span {
                    AxisSpan::Lo => !hi,
                    AxisSpan::Hi => hi,
                    AxisSpan::Full => true,
                });
                if covered {
                    mask |= 1 << octant;
                }
            }
            assert_eq!(mask, region.octant_mask, "mask drift for {:?}", region.spans);
        }
    }

    #[test]
    fn test_region_counts() {
        let faces = EXTENDED_REGIONS
            .iter()
            .filter(|r| r.octant_mask.count_ones() == 4)
            .count();
        let edges = EXTENDED_REGIONS
            .iter()
            .filter(|r| r.octant_mask.count_ones() == 2)
            .count();
        assert_eq!(faces, 6);
        assert_eq!(edges, 12);

        // Together the face regions cover every octant exactly three
        // times (once per axis), the edges exactly three times as well.
        let mut face_cover = [0u32; 8];
        let mut edge_cover = [0u32; 8];
        for region in &EXTENDED_REGIONS {
            for octant in 0..8 {
                if region.octant_mask & (1 << octant) != 0 {
                    if region.octant_mask.count_ones() == 4 {
                        face_cover[octant] += 1;
                    } else {
                        edge_cover[octant] += 1;
                    }
                }
            }
        }
        assert_eq!(face_cover, [3; 8]);
        assert_eq!(edge_cover, [3; 8]);
    }

    #[test]
    fn test_region_bounds_face() {
        let cell = Aabb::new(Vec3::new(-2.0, -2.0, -2.0), Vec3::new(2.0, 2.0, 2.0));
        // -X face region spans the lower x half, full y and z.
        let region = &EXTENDED_REGIONS[0];
        let bounds = region_bounds(&cell, region);
        assert_eq!(bounds.min, Vec3::new(-2.0, -2.0, -2.0));
        assert_eq!(bounds.max, Vec3::new(0.0, 2.0, 2.0));
    }

    #[test]
    fn test_region_bounds_edge() {
        let cell = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 4.0, 4.0));
        // (+X, +Y) edge region: upper x, upper y, full z.
        let region = EXTENDED_REGIONS
            .iter()
            .find(|r| r.spans == [Hi, Hi, Full])
            .unwrap();
        let bounds = region_bounds(&cell, region);
        assert_eq!(bounds.min, Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(4.0, 4.0, 4.0));
    }
}
