//! Scene graph error taxonomy
//!
//! Structural-invariant violations and configuration errors fail fast and
//! synchronously at the call site; no mutation is partially applied. The
//! core never logs failures itself.

use crate::scene::bounds::BoundsKind;
use thiserror::Error;

/// Errors raised by scene graph and octree operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    /// The node is already attached to a group
    #[error("node already has a parent; detach it first")]
    AlreadyParented,

    /// A node cannot be attached to itself
    #[error("cannot attach a node to itself")]
    SelfAttachment,

    /// Root nodes cannot be nested under another group
    #[error("root nodes cannot be nested under another group")]
    RootNested,

    /// A child index was outside the valid range
    #[error("child index {index} out of range (child count {len})")]
    ChildIndexOutOfRange {
        /// The offending index
        index: usize,
        /// The current child count
        len: usize,
    },

    /// A group-only operation was invoked on a leaf node
    #[error("operation requires a group node")]
    NotAGroup,

    /// A transform operation was invoked on a node without a transform
    #[error("operation requires a transform group")]
    NoTransform,

    /// The referenced node does not exist in this graph
    #[error("unknown node key")]
    UnknownNode,

    /// A spatially-indexed group may not sit under a non-identity transform
    #[error("octree-indexed group cannot be nested under a non-identity transform")]
    OctreeUnderTransform,

    /// The requested bounds volume shape is not supported
    #[error("unsupported bounds volume kind: {0:?}")]
    UnsupportedBoundsKind(BoundsKind),
}
