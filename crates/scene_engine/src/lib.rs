//! # Scene Engine
//!
//! A retained-mode 3D scene description: a mutable tree of spatial nodes
//! whose bounds, world-space placement, and renderer-visible dirty state
//! stay consistent under arbitrary structural edits, with an octree spatial
//! index accelerating per-frame frustum culling.
//!
//! ## Features
//!
//! - **Scene graph**: arena-backed node/group hierarchy with ordered
//!   children, incremental descendant counters, and inherited attributes
//! - **Lazy propagation**: bounds and world transforms are recomputed on
//!   demand, gated by dirty flags
//! - **Octree culling**: spatial partition with extended-cell (face/edge
//!   union) rejection and culling suppression for fully-visible subtrees
//! - **Change tracking**: per-node dirty flags with composite aggregation
//!   and monotonic change ids, consumed once per frame by a renderer
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_engine::prelude::*;
//!
//! let mut graph = SceneGraph::new();
//! let root = graph.add_root(Some("world"));
//! let group = graph.add_transform_group(Some("platform"));
//! let mesh = graph.add_leaf(Some("rock"));
//!
//! graph.set_local_bounds(mesh, BoundingVolume::Aabb(Aabb::from_center_extents(
//!     Vec3::zeros(),
//!     Vec3::new(1.0, 1.0, 1.0),
//! ))).unwrap();
//!
//! graph.add_child(group, mesh, 0).unwrap();
//! graph.add_child(root, group, 0).unwrap();
//! graph.update_bounds(root, false);
//!
//! let world = graph.world_bounds(mesh);
//! assert!(!world.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod scene;
pub mod spatial;

/// Common imports for scene engine users
pub mod prelude {
    pub use crate::{
        foundation::math::{Mat4, Point3, Quat, Vec3},
        config::{Config, ConfigError, SceneSettings},
        scene::{
            Aabb, BoundingVolume, BoundsKind, ChangeFlag, NodeAttribute, NodeFlags, NodeKey,
            NodeTransform, SceneError, SceneGraph, SceneListener, ScenePolicy, Sphere, Visit,
        },
        spatial::{Containment, Frustum, OctreeConfig, OctreePartition, Plane},
    };
}
