//! Structural scene events
//!
//! An optional listener interface a renderer or editor registers on the
//! graph to invalidate caches incrementally instead of polling. Listeners
//! are notified synchronously, after the mutation has fully applied, so
//! they always observe a consistent tree.

use crate::scene::graph::SceneGraph;
use crate::scene::node::NodeKey;

/// Which aspect of a node changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChange {
    /// The placement transform was written
    Transform,
    /// The local bounds were replaced
    Bounds,
    /// State bits (pickable/renderable/...) flipped
    Flags,
    /// The carried render-state attribute changed
    Attribute,
}

/// Listener for structural and render-state-affecting events
///
/// All methods default to no-ops so implementors subscribe only to what
/// they need.
pub trait SceneListener {
    /// A child was inserted at `index` under `parent`
    fn on_child_added(&mut self, graph: &SceneGraph, parent: NodeKey, child: NodeKey, index: usize) {
        let _ = (graph, parent, child, index);
    }

    /// The child previously at `index` under `parent` was detached
    fn on_child_removed(
        &mut self,
        graph: &SceneGraph,
        parent: NodeKey,
        child: NodeKey,
        index: usize,
    ) {
        let _ = (graph, parent, child, index);
    }

    /// A node property affecting render state changed
    fn on_node_changed(&mut self, graph: &SceneGraph, node: NodeKey, change: NodeChange) {
        let _ = (graph, node, change);
    }
}
