//! Octree spatial partitioning structure
//!
//! Indexes scene nodes by their world-space bounds for fast frustum
//! rejection. A cell splits into 8 octants once its resident count
//! exceeds a threshold; cells are created lazily and never merged back,
//! bounding churn cost. Every inserted node lives in exactly one cell:
//! the smallest cell that fully encloses its bounds, which for a node
//! straddling a boundary is an ancestor rather than a leaf.

use crate::foundation::math::Vec3;
use crate::scene::{Aabb, BoundingVolume, NodeKey, SceneError, SceneGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a cell in the partition's arena
pub(crate) type CellId = usize;

/// Configuration for octree behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OctreeConfig {
    /// Maximum resident nodes per cell before subdivision
    pub max_nodes_per_cell: usize,

    /// Maximum subdivision depth; beyond it a cell stays a leaf
    /// regardless of load
    pub max_depth: u32,

    /// Minimum cell edge length (prevents excessive subdivision)
    pub min_cell_size: f32,

    /// Whether culling also tests the 6 face and 12 edge merged regions
    pub extended_cells: bool,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_nodes_per_cell: 8,
            max_depth: 8,
            min_cell_size: 1.0,
            extended_cells: true,
        }
    }
}

/// A node resident in a cell, with the bounds it was filed under
#[derive(Debug, Clone, Copy)]
pub(crate) struct OctreeEntry {
    pub(crate) key: NodeKey,
    pub(crate) volume: BoundingVolume,
    pub(crate) aabb: Aabb,
}

/// Single cell in the octree hierarchy
#[derive(Debug, Clone)]
pub(crate) struct OctreeCell {
    /// World-space bounds of this cell
    pub(crate) bounds: Aabb,

    /// Nodes filed directly in this cell
    pub(crate) entries: Vec<OctreeEntry>,

    /// The 8 octant cells, allocated on first split
    pub(crate) children: Option<[CellId; 8]>,

    /// Parent cell, `None` for the root
    pub(crate) parent: Option<CellId>,

    /// Depth in the tree (0 = root)
    pub(crate) depth: u32,
}

impl OctreeCell {
    fn new(bounds: Aabb, parent: Option<CellId>, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            parent,
            depth,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Octant bounds for index `i`, bit layout x = bit 0, y = bit 1, z = bit 2
fn octant_bounds(cell: &Aabb, octant: usize) -> Aabb {
    let center = cell.center();
    let min = Vec3::new(
        if octant & 1 == 0 { cell.min.x } else { center.x },
        if octant & 2 == 0 { cell.min.y } else { center.y },
        if octant & 4 == 0 { cell.min.z } else { center.z },
    );
    let max = Vec3::new(
        if octant & 1 == 0 { center.x } else { cell.max.x },
        if octant & 2 == 0 { center.y } else { cell.max.y },
        if octant & 4 == 0 { center.z } else { cell.max.z },
    );
    Aabb::new(min, max)
}

/// An external spatial index over scene nodes
///
/// Cells live in a flat arena addressed by index; the root covers a
/// fixed world volume chosen at construction. Nodes whose bounds fall
/// outside the root volume are filed at the root.
#[derive(Debug, Clone)]
pub struct OctreePartition {
    pub(crate) cells: Vec<OctreeCell>,
    node_cell: HashMap<NodeKey, CellId>,
    pub(crate) config: OctreeConfig,
}

impl OctreePartition {
    /// Create a partition covering the given world volume
    pub fn new(world_bounds: Aabb, config: OctreeConfig) -> Self {
        Self {
            cells: vec![OctreeCell::new(world_bounds, None, 0)],
            node_cell: HashMap::new(),
            config,
        }
    }

    /// The fixed world volume this partition covers
    pub fn world_bounds(&self) -> Aabb {
        self.cells[0].bounds
    }

    /// The active configuration
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Number of indexed nodes
    pub fn node_count(&self) -> usize {
        self.node_cell.len()
    }

    /// Check that an anchor group can own this partition.
    ///
    /// The partition stores absolute world coordinates, so nesting it
    /// under a placement chain with a non-identity world transform would
    /// invalidate every stored cell volume.
    ///
    /// # Errors
    ///
    /// `SceneError::OctreeUnderTransform` when the group's world
    /// transform is not the identity; `SceneError::UnknownNode` for a
    /// stale key.
    pub fn validate_anchor(
        &self,
        graph: &mut SceneGraph,
        group: NodeKey,
    ) -> Result<(), SceneError> {
        if graph.node(group).is_none() {
            return Err(SceneError::UnknownNode);
        }
        let world = graph.world_transform(group);
        if crate::foundation::math::is_identity(&world, 1e-6) {
            Ok(())
        } else {
            Err(SceneError::OctreeUnderTransform)
        }
    }

    /// Insert a node with its current world bounds.
    ///
    /// A node already present is re-filed (same as
    /// [`OctreePartition::update_node_position`]). Bounds not enclosed by
    /// the fixed world volume are filed at the root.
    ///
    /// # Errors
    ///
    /// `SceneError::UnsupportedBoundsKind` when the volume has no extent
    /// to index (`BoundingVolume::None` or empty).
    pub fn insert_node(
        &mut self,
        key: NodeKey,
        volume: &BoundingVolume,
    ) -> Result<(), SceneError> {
        let Some(aabb) = volume.as_aabb() else {
            return Err(SceneError::UnsupportedBoundsKind(volume.kind()));
        };
        if self.node_cell.contains_key(&key) {
            self.remove_node(key);
        }
        let entry = OctreeEntry {
            key,
            volume: *volume,
            aabb,
        };
        self.file_entry(0, entry);
        Ok(())
    }

    /// Remove a node; returns whether it was present
    pub fn remove_node(&mut self, key: NodeKey) -> bool {
        let Some(cell_id) = self.node_cell.remove(&key) else {
            return false;
        };
        let cell = &mut self.cells[cell_id];
        if let Some(pos) = cell.entries.iter().position(|e| e.key == key) {
            cell.entries.swap_remove(pos);
        }
        true
    }

    /// Re-file a node after its bounds moved.
    ///
    /// Walks up from the current cell to the nearest ancestor enclosing
    /// the new bounds, then back down to the smallest enclosing cell, so
    /// small movements stay cheap.
    ///
    /// # Errors
    ///
    /// Same as [`OctreePartition::insert_node`].
    pub fn update_node_position(
        &mut self,
        key: NodeKey,
        volume: &BoundingVolume,
    ) -> Result<(), SceneError> {
        let Some(aabb) = volume.as_aabb() else {
            // Bounds collapsed: the node can no longer be indexed.
            self.remove_node(key);
            return Err(SceneError::UnsupportedBoundsKind(volume.kind()));
        };
        let Some(&current) = self.node_cell.get(&key) else {
            return self.insert_node(key, volume);
        };

        // Detach from the current cell.
        let cell = &mut self.cells[current];
        if let Some(pos) = cell.entries.iter().position(|e| e.key == key) {
            cell.entries.swap_remove(pos);
        }

        // Climb until a cell encloses the new bounds (or we hit the root).
        let mut host = current;
        while host != 0 && !self.cells[host].bounds.contains_aabb(&aabb) {
            host = self.cells[host].parent.unwrap_or(0);
        }

        let entry = OctreeEntry {
            key,
            volume: *volume,
            aabb,
        };
        self.file_entry(host, entry);
        Ok(())
    }

    /// Drop every node and collapse back to a single root cell
    pub fn clear(&mut self) {
        let bounds = self.cells[0].bounds;
        self.cells = vec![OctreeCell::new(bounds, None, 0)];
        self.node_cell.clear();
    }

    /// The cell a node is filed in, if present (test/debug aid)
    #[allow(dead_code)]
    pub(crate) fn cell_of(&self, key: NodeKey) -> Option<CellId> {
        self.node_cell.get(&key).copied()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Descend from `start` to the smallest cell enclosing the entry,
    /// splitting overloaded leaves on the way
    fn file_entry(&mut self, start: CellId, entry: OctreeEntry) {
        let mut cell_id = start;
        loop {
            if self.cells[cell_id].is_leaf() && self.should_split(cell_id) {
                self.split(cell_id);
            }
            match self.child_containing(cell_id, &entry.aabb) {
                Some(child) => cell_id = child,
                None => break,
            }
        }
        self.cells[cell_id].entries.push(entry);
        self.node_cell.insert(entry.key, cell_id);
    }

    /// The octant of `cell_id` that fully encloses `aabb`, if any
    fn child_containing(&self, cell_id: CellId, aabb: &Aabb) -> Option<CellId> {
        let children = self.cells[cell_id].children?;
        // The octant of the AABB's center is the only candidate.
        let center = aabb.center();
        let cell_center = self.cells[cell_id].bounds.center();
        let octant = usize::from(center.x >= cell_center.x)
            | (usize::from(center.y >= cell_center.y) << 1)
            | (usize::from(center.z >= cell_center.z) << 2);
        let child = children[octant];
        self.cells[child].bounds.contains_aabb(aabb).then_some(child)
    }

    fn should_split(&self, cell_id: CellId) -> bool {
        let cell = &self.cells[cell_id];
        cell.entries.len() >= self.config.max_nodes_per_cell
            && cell.depth < self.config.max_depth
            && cell.bounds.extents().x > self.config.min_cell_size
    }

    /// Allocate the 8 octant cells and push down every resident entry
    /// that fully fits in one; straddling entries stay put
    fn split(&mut self, cell_id: CellId) {
        if self.cells[cell_id].children.is_some() {
            return;
        }
        let bounds = self.cells[cell_id].bounds;
        let depth = self.cells[cell_id].depth;

        let mut children = [0; 8];
        for (octant, slot) in children.iter_mut().enumerate() {
            let id = self.cells.len();
            self.cells
                .push(OctreeCell::new(octant_bounds(&bounds, octant), Some(cell_id), depth + 1));
            *slot = id;
        }
        self.cells[cell_id].children = Some(children);
        log::debug!("split octree cell {cell_id} at depth {depth}");

        let entries = std::mem::take(&mut self.cells[cell_id].entries);
        for entry in entries {
            match self.child_containing(cell_id, &entry.aabb) {
                Some(child) => {
                    self.cells[child].entries.push(entry);
                    self.node_cell.insert(entry.key, child);
                }
                None => self.cells[cell_id].entries.push(entry),
            }
        }
    }
}
