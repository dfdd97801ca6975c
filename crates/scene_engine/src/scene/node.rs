//! Spatial node data
//!
//! The base tree unit stored in the scene graph arena: bounds, flags,
//! parent/placement back-references, carried and inherited render-state
//! attributes, and the group payload for interior nodes.

use crate::foundation::math::{Mat4, Vec3};
use crate::scene::bounds::{Aabb, BoundingVolume};
use crate::scene::change::{ChangeEpoch, ChangeFlag};
use crate::scene::transform::NodeTransform;
use bitflags::bitflags;
use slotmap::new_key_type;

new_key_type! {
    /// Stable handle to a node in a [`SceneGraph`](crate::scene::SceneGraph)
    pub struct NodeKey;
}

bitflags! {
    /// Per-node state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Bounds need recomputation (set upward on edits)
        const BOUNDS_DIRTY = 1 << 0;
        /// World transform / world bounds are stale (set downward on
        /// placement changes)
        const WORLD_DIRTY = 1 << 1;
        /// Excluded from all bounds aggregation
        const IGNORE_BOUNDS = 1 << 2;
        /// Eligible for picking queries
        const PICKABLE = 1 << 3;
        /// Eligible for rendering
        const RENDERABLE = 1 << 4;
        /// Occludes geometry behind it
        const OCCLUDER = 1 << 5;
    }
}

/// A light source carried by a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    /// Light color (linear RGB)
    pub color: Vec3,
    /// Scalar intensity multiplier
    pub intensity: f32,
}

/// Fog state carried by a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogState {
    /// Fog color (linear RGB)
    pub color: Vec3,
    /// Exponential fog density
    pub density: f32,
}

/// A screen-space scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScissorRect {
    /// Left edge in pixels
    pub x: i32,
    /// Top edge in pixels
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// A render-state contribution a node carries into its parent's subtree
///
/// When a carrier is attached to a group, the contribution is merged into
/// the inherited set of every node in that group's subtree; detaching
/// unmerges it.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAttribute {
    /// A light illuminating the scope
    Light(LightSource),
    /// Fog applied across the scope
    Fog(FogState),
    /// A world-space clip region limiting the scope
    ClipRegion(Aabb),
    /// A scissor rectangle limiting the scope
    Scissor(ScissorRect),
}

/// Attributes accumulated from enclosing scopes
///
/// Stores the keys of the carrying nodes; payloads stay with the carriers
/// so an edit to a light is visible everywhere without re-merging.
#[derive(Debug, Clone, Default)]
pub struct InheritedAttributes {
    /// Nodes contributing a light to this node's scope
    pub lights: Vec<NodeKey>,
    /// Nodes contributing fog
    pub fogs: Vec<NodeKey>,
    /// Nodes contributing a clip region
    pub clip_regions: Vec<NodeKey>,
    /// Nodes contributing a scissor rectangle
    pub scissors: Vec<NodeKey>,
    pub(crate) changed: ChangeFlag,
}

impl InheritedAttributes {
    fn set_for(&mut self, attribute: &NodeAttribute) -> &mut Vec<NodeKey> {
        match attribute {
            NodeAttribute::Light(_) => &mut self.lights,
            NodeAttribute::Fog(_) => &mut self.fogs,
            NodeAttribute::ClipRegion(_) => &mut self.clip_regions,
            NodeAttribute::Scissor(_) => &mut self.scissors,
        }
    }

    /// Record a carrier, ignoring duplicates
    pub(crate) fn merge(&mut self, carrier: NodeKey, attribute: &NodeAttribute) {
        let set = self.set_for(attribute);
        if !set.contains(&carrier) {
            set.push(carrier);
            self.changed.mark();
        }
    }

    /// Remove a carrier if present
    pub(crate) fn unmerge(&mut self, carrier: NodeKey, attribute: &NodeAttribute) {
        let set = self.set_for(attribute);
        if let Some(pos) = set.iter().position(|k| *k == carrier) {
            set.remove(pos);
            self.changed.mark();
        }
    }

    /// Change flag accessor
    pub fn change_flag(&self) -> &ChangeFlag {
        &self.changed
    }
}

/// Group payload: ordered children plus incremental aggregate counters
#[derive(Debug, Clone, Default)]
pub struct GroupData {
    /// Ordered children; insertion order is significant and preserved
    pub(crate) children: Vec<NodeKey>,
    /// Total nodes in the subtree below this group
    pub(crate) descendant_count: usize,
    /// Total leaf nodes in the subtree below this group
    pub(crate) leaf_count: usize,
    /// Placement transform, present only for transform groups
    pub(crate) transform: Option<NodeTransform>,
    /// Cached world matrix for transform groups
    pub(crate) world_matrix: Mat4,
    /// Whether `world_matrix` reflects the current placement chain
    pub(crate) world_valid: bool,
    /// Whether this group is a designated root (roots may not be nested)
    pub(crate) is_root: bool,
}

impl GroupData {
    pub(crate) fn new(transform: Option<NodeTransform>, is_root: bool) -> Self {
        Self {
            children: Vec::new(),
            descendant_count: 0,
            leaf_count: 0,
            transform,
            world_matrix: Mat4::identity(),
            world_valid: false,
            is_root,
        }
    }
}

/// Discriminates leaves from interior nodes
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A terminal node with its own geometry bounds
    Leaf,
    /// An interior node owning an ordered child list
    Group(GroupData),
}

/// A node in the scene graph arena
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Optional diagnostic/search name
    pub(crate) name: Option<String>,
    /// Weak back-reference to the owning group
    pub(crate) parent: Option<NodeKey>,
    /// Nearest enclosing transform group, if any
    pub(crate) placement: Option<NodeKey>,
    /// Leaf or group payload
    pub(crate) kind: NodeKind,
    /// The node's own extent, in its parent's frame
    pub(crate) local_bounds: BoundingVolume,
    /// Aggregated child bounds before this node's own transform
    pub(crate) untransformed_bounds: BoundingVolume,
    /// Extent in the parent's frame (untransformed x own transform)
    pub(crate) bounds: BoundingVolume,
    /// Extent relative to the scene root
    pub(crate) world_bounds: BoundingVolume,
    /// State bits
    pub(crate) flags: NodeFlags,
    /// Render-state contribution this node carries, if any
    pub(crate) attribute: Option<NodeAttribute>,
    /// Attributes accumulated from enclosing scopes
    pub(crate) inherited: InheritedAttributes,
    /// The node's own dirty flag
    pub(crate) changed: ChangeFlag,
    /// Change-id bookkeeping
    pub(crate) epoch: ChangeEpoch,
}

impl SceneNode {
    pub(crate) fn new(
        name: Option<String>,
        kind: NodeKind,
        local_bounds: BoundingVolume,
        flags: NodeFlags,
    ) -> Self {
        Self {
            name,
            parent: None,
            placement: None,
            kind,
            local_bounds,
            untransformed_bounds: BoundingVolume::empty(),
            bounds: BoundingVolume::empty(),
            world_bounds: BoundingVolume::empty(),
            flags,
            attribute: None,
            inherited: InheritedAttributes::default(),
            changed: ChangeFlag::default(),
            epoch: ChangeEpoch::default(),
        }
    }

    /// The node's name, if it has one
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The owning group, if attached
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// The nearest enclosing transform group, if any
    pub fn placement(&self) -> Option<NodeKey> {
        self.placement
    }

    /// State bits
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Whether this node is a group
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    /// Whether this node is a designated root group
    pub fn is_root(&self) -> bool {
        matches!(&self.kind, NodeKind::Group(g) if g.is_root)
    }

    /// Whether this node is a transform (placement) group
    pub fn has_transform(&self) -> bool {
        matches!(&self.kind, NodeKind::Group(g) if g.transform.is_some())
    }

    /// The ordered children of a group, empty for leaves
    pub fn children(&self) -> &[NodeKey] {
        match &self.kind {
            NodeKind::Group(g) => &g.children,
            NodeKind::Leaf => &[],
        }
    }

    /// The node's extent in its parent's frame
    pub fn bounds(&self) -> &BoundingVolume {
        &self.bounds
    }

    /// The node's own (pre-aggregation) extent
    pub fn local_bounds(&self) -> &BoundingVolume {
        &self.local_bounds
    }

    /// The carried render-state contribution, if any
    pub fn attribute(&self) -> Option<&NodeAttribute> {
        self.attribute.as_ref()
    }

    /// Attributes accumulated from enclosing scopes
    pub fn inherited(&self) -> &InheritedAttributes {
        &self.inherited
    }

    pub(crate) fn group(&self) -> Option<&GroupData> {
        match &self.kind {
            NodeKind::Group(g) => Some(g),
            NodeKind::Leaf => None,
        }
    }

    pub(crate) fn group_mut(&mut self) -> Option<&mut GroupData> {
        match &mut self.kind {
            NodeKind::Group(g) => Some(g),
            NodeKind::Leaf => None,
        }
    }
}
