//! The scene graph: an arena of spatial nodes
//!
//! A `SceneGraph` exclusively owns its nodes in a slot map; children hold
//! stable keys and each node carries a weak back-reference to its parent.
//! Structural edits keep aggregate counters, inherited attributes, and
//! dirty flags consistent; bounds and world transforms are recomputed
//! lazily on the next read rather than eagerly on every edit.

use crate::foundation::math::Mat4;
use crate::scene::bounds::BoundingVolume;
use crate::scene::error::SceneError;
use crate::scene::events::{NodeChange, SceneListener};
use crate::scene::node::{
    GroupData, NodeAttribute, NodeFlags, NodeKey, NodeKind, SceneNode,
};
use crate::scene::policy::ScenePolicy;
use crate::scene::transform::NodeTransform;
use slotmap::SlotMap;

/// Visitor verdict for [`SceneGraph::traverse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Descend into this node's children
    Continue,
    /// Skip this node's children but continue elsewhere
    SkipSubtree,
    /// Abort the entire traversal
    Stop,
}

/// Recomputation counters, useful for profiling and for asserting that
/// lazy updates actually skip clean subtrees
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStats {
    /// Number of per-node bounds recomputations performed
    pub bounds_recomputed: u64,
}

/// A mutable tree of spatial nodes with lazy bounds/transform propagation
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, SceneNode>,
    policy: ScenePolicy,
    listeners: Vec<Box<dyn SceneListener>>,
    next_change_id: u64,
    stats: GraphStats,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Create an empty scene graph with the default policy
    pub fn new() -> Self {
        Self::with_policy(ScenePolicy::default())
    }

    /// Create an empty scene graph with an explicit creation policy
    pub fn with_policy(policy: ScenePolicy) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            policy,
            listeners: Vec::new(),
            next_change_id: 1,
            stats: GraphStats::default(),
        }
    }

    /// The creation policy
    pub fn policy(&self) -> &ScenePolicy {
        &self.policy
    }

    /// Mutable access to the creation policy
    pub fn policy_mut(&mut self) -> &mut ScenePolicy {
        &mut self.policy
    }

    /// Enter an ignore-bounds scope for the lifetime of the returned
    /// guard; nodes created through it start with `IGNORE_BOUNDS` set.
    ///
    /// The guard dereferences to the graph, so creation calls go through
    /// it directly:
    ///
    /// ```rust
    /// # use scene_engine::prelude::*;
    /// let mut graph = SceneGraph::new();
    /// let helper = {
    ///     let mut scope = graph.ignore_bounds_scope();
    ///     scope.add_leaf(Some("gizmo"))
    /// };
    /// assert!(graph.node(helper).unwrap().flags().contains(NodeFlags::IGNORE_BOUNDS));
    /// ```
    pub fn ignore_bounds_scope(&mut self) -> IgnoreBoundsScope<'_> {
        self.policy.push_ignore_bounds();
        IgnoreBoundsScope { graph: self }
    }

    /// Recomputation counters
    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Register a structural-event listener
    pub fn add_listener(&mut self, listener: Box<dyn SceneListener>) {
        self.listeners.push(listener);
    }

    /// Borrow a node
    pub fn node(&self, key: NodeKey) -> Option<&SceneNode> {
        self.nodes.get(key)
    }

    /// Number of nodes in the arena (attached or detached)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------

    fn new_node(&mut self, name: Option<&str>, kind: NodeKind) -> NodeKey {
        let mut flags = NodeFlags::BOUNDS_DIRTY;
        if self.policy.default_pickable {
            flags |= NodeFlags::PICKABLE;
        }
        if self.policy.default_renderable {
            flags |= NodeFlags::RENDERABLE;
        }
        if self.policy.bounds_ignored() {
            flags |= NodeFlags::IGNORE_BOUNDS;
        }
        let local_bounds = BoundingVolume::of_kind(self.policy.default_bounds_hint())
            .unwrap_or_else(|_| BoundingVolume::empty());
        self.nodes.insert(SceneNode::new(
            name.map(String::from),
            kind,
            local_bounds,
            flags,
        ))
    }

    /// Create a detached leaf node
    pub fn add_leaf(&mut self, name: Option<&str>) -> NodeKey {
        self.new_node(name, NodeKind::Leaf)
    }

    /// Create a detached group node
    pub fn add_group(&mut self, name: Option<&str>) -> NodeKey {
        self.new_node(name, NodeKind::Group(GroupData::new(None, false)))
    }

    /// Create a detached transform (placement) group
    pub fn add_transform_group(&mut self, name: Option<&str>) -> NodeKey {
        self.new_node(
            name,
            NodeKind::Group(GroupData::new(Some(NodeTransform::identity()), false)),
        )
    }

    /// Create a detached root group; roots may not be nested under groups
    pub fn add_root(&mut self, name: Option<&str>) -> NodeKey {
        self.new_node(name, NodeKind::Group(GroupData::new(None, true)))
    }

    /// Destroy a detached node and its subtree, freeing their arena slots.
    ///
    /// # Errors
    ///
    /// `SceneError::AlreadyParented` if the node is still attached;
    /// `SceneError::UnknownNode` for a stale key.
    pub fn destroy(&mut self, key: NodeKey) -> Result<(), SceneError> {
        let node = self.nodes.get(key).ok_or(SceneError::UnknownNode)?;
        if node.parent.is_some() {
            return Err(SceneError::AlreadyParented);
        }
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(n) = self.nodes.remove(k) {
                if let NodeKind::Group(g) = n.kind {
                    stack.extend(g.children);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    /// Attach `child` under `parent` at `index`.
    ///
    /// Existing children at or after `index` shift right. On success the
    /// child's subtree inherits the parent scope's attributes, ancestor
    /// counters are updated by the exact subtree delta, and bounds are
    /// dirtied from the parent up to the root.
    ///
    /// # Errors
    ///
    /// Fails fast, without any partial mutation, when the child already
    /// has a parent, the child is the parent itself or one of its
    /// ancestors, the child is a designated root, the index is out of
    /// `[0, child_count]`, or the parent is not a group.
    pub fn add_child(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        index: usize,
    ) -> Result<(), SceneError> {
        // Validate everything before touching state.
        if parent == child {
            return Err(SceneError::SelfAttachment);
        }
        let child_node = self.nodes.get(child).ok_or(SceneError::UnknownNode)?;
        if child_node.parent.is_some() {
            return Err(SceneError::AlreadyParented);
        }
        if child_node.is_root() {
            return Err(SceneError::RootNested);
        }
        let parent_node = self.nodes.get(parent).ok_or(SceneError::UnknownNode)?;
        let group = parent_node.group().ok_or(SceneError::NotAGroup)?;
        if index > group.children.len() {
            return Err(SceneError::ChildIndexOutOfRange {
                index,
                len: group.children.len(),
            });
        }
        // Attaching an ancestor of `parent` would close a cycle.
        let mut cursor = parent_node.parent;
        while let Some(k) = cursor {
            if k == child {
                return Err(SceneError::SelfAttachment);
            }
            cursor = self.nodes[k].parent;
        }

        // Link.
        if let Some(g) = self.nodes[parent].group_mut() {
            g.children.insert(index, child);
        }
        self.nodes[child].parent = Some(parent);

        // Placement back-references and world staleness for the subtree.
        let placement_above = {
            let p = &self.nodes[parent];
            if p.has_transform() {
                Some(parent)
            } else {
                p.placement
            }
        };
        self.set_placement_subtree(child, placement_above);
        self.mark_world_dirty_subtree(child);

        // Ancestor counters.
        let (d_nodes, d_leaves) = self.subtree_counts(child);
        self.apply_count_delta(parent, d_nodes as i64, d_leaves as i64);

        // Attribute scopes: the subtree joins the parent scope, and a
        // carried attribute on the child starts covering the parent's
        // subtree.
        let carriers = self.scope_carriers(parent);
        self.merge_carriers_into_subtree(child, &carriers);
        if let Some(attr) = self.nodes[child].attribute.clone() {
            self.merge_carriers_into_subtree(parent, &[(child, attr)]);
        }

        self.mark_bounds_dirty_upward(parent);
        self.mark_changed(parent);
        log::debug!("attached node {child:?} under {parent:?} at index {index}");
        self.notify(|l, g| l.on_child_added(g, parent, child, index));
        Ok(())
    }

    /// Detach and return the child at `index` under `parent`.
    ///
    /// Subsequent children shift left; counters, attribute scopes, and
    /// bounds dirtiness are reverted by the exact inverse deltas.
    ///
    /// # Errors
    ///
    /// `SceneError::ChildIndexOutOfRange` when `index >= child_count`,
    /// `SceneError::NotAGroup`/`UnknownNode` for an invalid parent.
    pub fn remove_child(&mut self, parent: NodeKey, index: usize) -> Result<NodeKey, SceneError> {
        let parent_node = self.nodes.get(parent).ok_or(SceneError::UnknownNode)?;
        let group = parent_node.group().ok_or(SceneError::NotAGroup)?;
        if index >= group.children.len() {
            return Err(SceneError::ChildIndexOutOfRange {
                index,
                len: group.children.len(),
            });
        }

        // Scope carriers must be captured while the child is still linked.
        let carriers = self.scope_carriers(parent);
        let child = match self.nodes[parent].group_mut() {
            Some(g) => g.children.remove(index),
            None => return Err(SceneError::NotAGroup),
        };
        self.nodes[child].parent = None;

        let (d_nodes, d_leaves) = self.subtree_counts(child);
        self.apply_count_delta(parent, -(d_nodes as i64), -(d_leaves as i64));

        // The detached subtree leaves every enclosing scope...
        self.unmerge_carriers_from_subtree(child, &carriers);
        // ...and a carried attribute on the child stops covering the
        // parent's remaining subtree.
        if let Some(attr) = self.nodes[child].attribute.clone() {
            self.unmerge_carriers_from_subtree(parent, &[(child, attr)]);
        }

        self.set_placement_subtree(child, None);
        self.mark_world_dirty_subtree(child);
        self.mark_bounds_dirty_upward(parent);
        self.mark_changed(parent);
        log::debug!("detached node {child:?} from {parent:?} at index {index}");
        self.notify(|l, g| l.on_child_removed(g, parent, child, index));
        Ok(child)
    }

    /// Replace the child at `index` with `new_child`, returning the old
    /// child (detached).
    ///
    /// # Errors
    ///
    /// Any error either operand would raise for `remove_child` or
    /// `add_child`; nothing is mutated on failure.
    pub fn replace_child(
        &mut self,
        parent: NodeKey,
        index: usize,
        new_child: NodeKey,
    ) -> Result<NodeKey, SceneError> {
        // Pre-validate the insertion so the removal is not applied alone.
        if parent == new_child {
            return Err(SceneError::SelfAttachment);
        }
        let new_node = self.nodes.get(new_child).ok_or(SceneError::UnknownNode)?;
        if new_node.parent.is_some() {
            return Err(SceneError::AlreadyParented);
        }
        if new_node.is_root() {
            return Err(SceneError::RootNested);
        }
        let parent_node = self.nodes.get(parent).ok_or(SceneError::UnknownNode)?;
        let group = parent_node.group().ok_or(SceneError::NotAGroup)?;
        if index >= group.children.len() {
            return Err(SceneError::ChildIndexOutOfRange {
                index,
                len: group.children.len(),
            });
        }
        let mut cursor = parent_node.parent;
        while let Some(k) = cursor {
            if k == new_child {
                return Err(SceneError::SelfAttachment);
            }
            cursor = self.nodes[k].parent;
        }

        let old = self.remove_child(parent, index)?;
        self.add_child(parent, new_child, index)?;
        Ok(old)
    }

    // ------------------------------------------------------------------
    // Bounds and transforms
    // ------------------------------------------------------------------

    /// Replace a node's own bounds volume.
    ///
    /// # Errors
    ///
    /// `SceneError::UnknownNode` for a stale key.
    pub fn set_local_bounds(
        &mut self,
        key: NodeKey,
        bounds: BoundingVolume,
    ) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(key).ok_or(SceneError::UnknownNode)?;
        node.local_bounds = bounds;
        self.mark_bounds_dirty_upward(key);
        self.mark_changed(key);
        self.notify(|l, g| l.on_node_changed(g, key, NodeChange::Bounds));
        Ok(())
    }

    /// Edit a transform group's placement matrix through a closure.
    ///
    /// World transforms and world bounds of the subtree are invalidated,
    /// and bounds are dirtied upward, exactly once per call.
    ///
    /// # Errors
    ///
    /// `SceneError::NoTransform` when the node is not a transform group,
    /// `SceneError::UnknownNode` for a stale key.
    pub fn edit_transform<F>(&mut self, key: NodeKey, edit: F) -> Result<(), SceneError>
    where
        F: FnOnce(&mut NodeTransform),
    {
        let node = self.nodes.get_mut(key).ok_or(SceneError::UnknownNode)?;
        let group = node.group_mut().ok_or(SceneError::NoTransform)?;
        let transform = group.transform.as_mut().ok_or(SceneError::NoTransform)?;
        edit(transform);
        // The transform's own change flag was marked by the edit; the node
        // composite reports changed through aggregation, per the tracking
        // contract.
        self.mark_world_dirty_subtree(key);
        self.mark_bounds_dirty_upward(key);
        self.notify(|l, g| l.on_node_changed(g, key, NodeChange::Transform));
        Ok(())
    }

    /// Replace a transform group's placement matrix.
    ///
    /// # Errors
    ///
    /// Same as [`SceneGraph::edit_transform`].
    pub fn set_local_transform(&mut self, key: NodeKey, matrix: Mat4) -> Result<(), SceneError> {
        self.edit_transform(key, |t| t.set_matrix(matrix))
    }

    /// Borrow a transform group's placement transform.
    ///
    /// # Errors
    ///
    /// Same as [`SceneGraph::edit_transform`].
    pub fn local_transform(&self, key: NodeKey) -> Result<&NodeTransform, SceneError> {
        let node = self.nodes.get(key).ok_or(SceneError::UnknownNode)?;
        node.group()
            .and_then(|g| g.transform.as_ref())
            .ok_or(SceneError::NoTransform)
    }

    /// The node's transform relative to the scene root, composing every
    /// ancestor placement (and, for transform groups, the node's own)
    pub fn world_transform(&mut self, key: NodeKey) -> Mat4 {
        let Some(node) = self.nodes.get(key) else {
            return Mat4::identity();
        };
        let placement = if node.has_transform() {
            Some(key)
        } else {
            node.placement
        };
        placement.map_or_else(Mat4::identity, |p| self.ensure_world_matrix(p))
    }

    /// Recompute bounds for `key`'s subtree.
    ///
    /// With `only_dirty` set, clean subtrees are skipped entirely; calling
    /// this twice in a row without intervening mutation does no work the
    /// second time. Recomputation is bottom-up: children first, then this
    /// node's untransformed/placed/world bounds.
    pub fn update_bounds(&mut self, key: NodeKey, only_dirty: bool) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let dirty = node
            .flags
            .intersects(NodeFlags::BOUNDS_DIRTY | NodeFlags::WORLD_DIRTY);
        if only_dirty && !dirty {
            return;
        }
        let children = node.children().to_vec();
        for child in children {
            self.update_bounds(child, only_dirty);
        }
        self.recompute_node_bounds(key);
        self.nodes[key]
            .flags
            .remove(NodeFlags::BOUNDS_DIRTY | NodeFlags::WORLD_DIRTY);
    }

    /// The node's bounds relative to the scene root, recomputing lazily
    /// if anything below or above went stale
    pub fn world_bounds(&mut self, key: NodeKey) -> BoundingVolume {
        self.update_bounds(key, true);
        self.nodes
            .get(key)
            .map_or(BoundingVolume::None, |n| n.world_bounds)
    }

    // ------------------------------------------------------------------
    // Flags and attributes
    // ------------------------------------------------------------------

    /// Whether the node participates in rendering
    pub fn is_renderable(&self, key: NodeKey) -> bool {
        self.nodes
            .get(key)
            .is_some_and(|n| n.flags.contains(NodeFlags::RENDERABLE))
    }

    /// Whether the node participates in picking
    pub fn is_pickable(&self, key: NodeKey) -> bool {
        self.nodes
            .get(key)
            .is_some_and(|n| n.flags.contains(NodeFlags::PICKABLE))
    }

    /// Set or clear a state flag.
    ///
    /// Setting `IGNORE_BOUNDS` additionally dirties ancestor bounds, since
    /// the node drops out of (or rejoins) aggregation.
    ///
    /// # Errors
    ///
    /// `SceneError::UnknownNode` for a stale key.
    pub fn set_flag(&mut self, key: NodeKey, flag: NodeFlags, on: bool) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(key).ok_or(SceneError::UnknownNode)?;
        node.flags.set(flag, on);
        if flag.contains(NodeFlags::IGNORE_BOUNDS) {
            self.mark_bounds_dirty_upward(key);
        }
        self.mark_changed(key);
        self.notify(|l, g| l.on_node_changed(g, key, NodeChange::Flags));
        Ok(())
    }

    /// Set or replace the render-state attribute this node carries.
    ///
    /// If the node is attached, the old contribution is unmerged from and
    /// the new one merged into the parent scope's subtree.
    ///
    /// # Errors
    ///
    /// `SceneError::UnknownNode` for a stale key.
    pub fn set_attribute(
        &mut self,
        key: NodeKey,
        attribute: Option<NodeAttribute>,
    ) -> Result<(), SceneError> {
        let node = self.nodes.get(key).ok_or(SceneError::UnknownNode)?;
        let parent = node.parent;
        let old = node.attribute.clone();

        if let (Some(p), Some(old_attr)) = (parent, old) {
            self.unmerge_carriers_from_subtree(p, &[(key, old_attr)]);
        }
        self.nodes[key].attribute = attribute.clone();
        if let (Some(p), Some(new_attr)) = (parent, attribute) {
            self.merge_carriers_into_subtree(p, &[(key, new_attr)]);
        }
        self.mark_changed(key);
        self.notify(|l, g| l.on_node_changed(g, key, NodeChange::Attribute));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Counters, liveness, traversal
    // ------------------------------------------------------------------

    /// Total nodes in the subtree below `key` (0 for leaves)
    pub fn descendant_count(&self, key: NodeKey) -> usize {
        self.nodes
            .get(key)
            .and_then(SceneNode::group)
            .map_or(0, |g| g.descendant_count)
    }

    /// Total leaf nodes in the subtree below `key` (0 for leaves)
    pub fn leaf_count(&self, key: NodeKey) -> usize {
        self.nodes
            .get(key)
            .and_then(SceneNode::group)
            .map_or(0, |g| g.leaf_count)
    }

    /// Whether the node is reachable from a designated root
    pub fn is_live(&self, key: NodeKey) -> bool {
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            let Some(node) = self.nodes.get(k) else {
                return false;
            };
            if node.is_root() {
                return true;
            }
            cursor = node.parent;
        }
        false
    }

    /// Depth-first pre-order traversal.
    ///
    /// The visitor can veto descent into a group (`Visit::SkipSubtree`) or
    /// abort the whole walk (`Visit::Stop`). Cost is O(subtree size); no
    /// memoization.
    pub fn traverse<F>(&self, root: NodeKey, mut visitor: F)
    where
        F: FnMut(NodeKey, &SceneNode) -> Visit,
    {
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            match visitor(key, node) {
                Visit::Stop => return,
                Visit::SkipSubtree => {}
                Visit::Continue => {
                    for &child in node.children().iter().rev() {
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// First node in pre-order with the given name
    pub fn find_by_name(&self, root: NodeKey, name: &str) -> Option<NodeKey> {
        let mut found = None;
        self.traverse(root, |key, node| {
            if node.name() == Some(name) {
                found = Some(key);
                Visit::Stop
            } else {
                Visit::Continue
            }
        });
        found
    }

    // ------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------

    /// Whether the node composite is dirty: its own flag, its transform's,
    /// or its inherited attribute set's
    pub fn is_changed(&self, key: NodeKey) -> bool {
        self.nodes.get(key).is_some_and(|node| {
            node.changed.is_changed()
                || node.inherited.changed.is_changed()
                || node
                    .group()
                    .and_then(|g| g.transform.as_ref())
                    .is_some_and(|t| t.change_flag().is_changed())
        })
    }

    /// Set the node's own dirty flag.
    ///
    /// Does not force-propagate to owners; ancestors re-check
    /// [`SceneGraph::is_changed`] on their own cycle.
    pub fn mark_changed(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.changed.mark();
        }
        self.touch_epoch(key);
    }

    /// Acknowledge the node: clears its own flag and every owned
    /// trackable's flag (transform, inherited attributes)
    pub fn clear_changed(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.changed.clear();
            node.inherited.changed.clear();
            if let Some(t) = node.group_mut().and_then(|g| g.transform.as_mut()) {
                t.change_flag_mut().clear();
            }
            node.epoch.issued = false;
        }
    }

    /// The node's change id: issued on the first dirty observation after a
    /// commit, stable until the next clean-to-dirty transition
    pub fn change_id(&mut self, key: NodeKey) -> u64 {
        if self.is_changed(key) {
            self.touch_epoch(key);
        }
        self.nodes.get(key).map_or(0, |n| n.epoch.id)
    }

    /// Epoch check for renderers: returns the current change id iff it
    /// differs from `last_seen` (meaning cached state must be re-derived)
    pub fn verify_change(&mut self, key: NodeKey, last_seen: u64) -> Option<u64> {
        let id = self.change_id(key);
        (id != last_seen).then_some(id)
    }

    fn touch_epoch(&mut self, key: NodeKey) {
        let next = self.next_change_id;
        if let Some(node) = self.nodes.get_mut(key) {
            if !node.epoch.issued {
                node.epoch.id = next;
                node.epoch.issued = true;
                self.next_change_id += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Nodes and leaves contributed by the subtree rooted at `key`,
    /// including `key` itself
    fn subtree_counts(&self, key: NodeKey) -> (usize, usize) {
        match self.nodes[key].group() {
            Some(g) => (1 + g.descendant_count, g.leaf_count),
            None => (1, 1),
        }
    }

    fn apply_count_delta(&mut self, start: NodeKey, d_nodes: i64, d_leaves: i64) {
        let mut cursor = Some(start);
        while let Some(k) = cursor {
            let node = &mut self.nodes[k];
            if let Some(g) = node.group_mut() {
                g.descendant_count = (g.descendant_count as i64 + d_nodes) as usize;
                g.leaf_count = (g.leaf_count as i64 + d_leaves) as usize;
            }
            cursor = self.nodes[k].parent;
        }
    }

    /// Set the nearest-enclosing-placement back-reference across a subtree
    fn set_placement_subtree(&mut self, root: NodeKey, placement_above: Option<NodeKey>) {
        let mut stack = vec![(root, placement_above)];
        while let Some((key, above)) = stack.pop() {
            let node = &mut self.nodes[key];
            node.placement = above;
            let below = if node.has_transform() { Some(key) } else { above };
            for &child in self.nodes[key].children() {
                stack.push((child, below));
            }
        }
    }

    /// Mark every node in the subtree as world-stale and drop cached world
    /// matrices. Flag-setting only; the actual matrix and bounds work
    /// happens on the next read.
    fn mark_world_dirty_subtree(&mut self, root: NodeKey) {
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let node = &mut self.nodes[key];
            node.flags.insert(NodeFlags::WORLD_DIRTY);
            if let Some(g) = node.group_mut() {
                g.world_valid = false;
            }
            for &child in self.nodes[key].children() {
                stack.push(child);
            }
        }
    }

    /// Mark bounds dirty from `key` up to the root. A node already marked
    /// implies marked ancestors, so the walk can stop early.
    fn mark_bounds_dirty_upward(&mut self, key: NodeKey) {
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            let node = &mut self.nodes[k];
            if node.flags.contains(NodeFlags::BOUNDS_DIRTY) {
                break;
            }
            node.flags.insert(NodeFlags::BOUNDS_DIRTY);
            cursor = node.parent;
        }
    }

    /// Cached world matrix for a transform group, recomputing the
    /// placement chain above it as needed
    fn ensure_world_matrix(&mut self, key: NodeKey) -> Mat4 {
        let (valid, cached, above, local) = {
            let node = &self.nodes[key];
            let group = match node.group() {
                Some(g) => g,
                None => return Mat4::identity(),
            };
            let local = group
                .transform
                .as_ref()
                .map_or_else(Mat4::identity, |t| *t.matrix());
            (group.world_valid, group.world_matrix, node.placement, local)
        };
        if valid {
            return cached;
        }
        let base = above.map_or_else(Mat4::identity, |p| self.ensure_world_matrix(p));
        let world = base * local;
        if let Some(g) = self.nodes[key].group_mut() {
            g.world_matrix = world;
            g.world_valid = true;
        }
        world
    }

    fn recompute_node_bounds(&mut self, key: NodeKey) {
        self.stats.bounds_recomputed += 1;
        let (is_group, children, local) = {
            let node = &self.nodes[key];
            (node.is_group(), node.children().to_vec(), node.local_bounds)
        };

        let untransformed = if is_group {
            let mut combined = BoundingVolume::empty();
            for child in &children {
                let child_node = &self.nodes[*child];
                if child_node.flags.contains(NodeFlags::IGNORE_BOUNDS) {
                    continue;
                }
                combined.combine(&child_node.bounds);
            }
            combined
        } else {
            local
        };

        let own_matrix = self.nodes[key]
            .group()
            .and_then(|g| g.transform.as_ref())
            .map(|t| *t.matrix());
        let bounds = own_matrix.map_or(untransformed, |m| untransformed.transformed(&m));
        let world_matrix = self.world_transform(key);
        let world_bounds = untransformed.transformed(&world_matrix);

        let node = &mut self.nodes[key];
        node.untransformed_bounds = untransformed;
        node.bounds = bounds;
        node.world_bounds = world_bounds;
    }

    /// All attribute carriers whose scope covers `group`'s subtree: the
    /// attributes `group` inherits plus carriers among its direct children
    fn scope_carriers(&self, group: NodeKey) -> Vec<(NodeKey, NodeAttribute)> {
        fn push_carrier(
            nodes: &SlotMap<NodeKey, SceneNode>,
            out: &mut Vec<(NodeKey, NodeAttribute)>,
            key: NodeKey,
        ) {
            if out.iter().any(|(k, _)| *k == key) {
                return;
            }
            if let Some(attr) = nodes.get(key).and_then(|n| n.attribute.clone()) {
                out.push((key, attr));
            }
        }

        let mut out: Vec<(NodeKey, NodeAttribute)> = Vec::new();
        let Some(node) = self.nodes.get(group) else {
            return out;
        };
        for set in [
            &node.inherited.lights,
            &node.inherited.fogs,
            &node.inherited.clip_regions,
            &node.inherited.scissors,
        ] {
            for &carrier in set {
                push_carrier(&self.nodes, &mut out, carrier);
            }
        }
        for &child in node.children() {
            push_carrier(&self.nodes, &mut out, child);
        }
        out
    }

    fn merge_carriers_into_subtree(&mut self, root: NodeKey, carriers: &[(NodeKey, NodeAttribute)]) {
        if carriers.is_empty() {
            return;
        }
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let node = &mut self.nodes[key];
            for (carrier, attr) in carriers {
                node.inherited.merge(*carrier, attr);
            }
            for &child in self.nodes[key].children() {
                stack.push(child);
            }
        }
    }

    fn unmerge_carriers_from_subtree(
        &mut self,
        root: NodeKey,
        carriers: &[(NodeKey, NodeAttribute)],
    ) {
        if carriers.is_empty() {
            return;
        }
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let node = &mut self.nodes[key];
            for (carrier, attr) in carriers {
                node.inherited.unmerge(*carrier, attr);
            }
            for &child in self.nodes[key].children() {
                stack.push(child);
            }
        }
    }

    fn notify<F>(&mut self, event: F)
    where
        F: Fn(&mut dyn SceneListener, &Self),
    {
        if self.listeners.is_empty() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in &mut listeners {
            event(listener.as_mut(), self);
        }
        // Keep listeners registered during dispatch.
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }
}

/// RAII guard for an ignore-bounds scope on a graph
///
/// Created by [`SceneGraph::ignore_bounds_scope`]; dereferences to the
/// graph and pops the scope on drop.
pub struct IgnoreBoundsScope<'a> {
    graph: &'a mut SceneGraph,
}

impl std::ops::Deref for IgnoreBoundsScope<'_> {
    type Target = SceneGraph;

    fn deref(&self) -> &SceneGraph {
        self.graph
    }
}

impl std::ops::DerefMut for IgnoreBoundsScope<'_> {
    fn deref_mut(&mut self) -> &mut SceneGraph {
        self.graph
    }
}

impl Drop for IgnoreBoundsScope<'_> {
    fn drop(&mut self) {
        self.graph.policy.pop_ignore_bounds();
    }
}
