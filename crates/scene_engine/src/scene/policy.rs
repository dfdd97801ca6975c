//! Creation-time defaults as an explicit context object
//!
//! Replaces the process-wide toggles of classic retained-mode APIs
//! (default pickability, default bounds hint, a push/pop "ignore bounds"
//! stack) with a policy value carried by the graph. The ignore-bounds
//! stack becomes an RAII scope guard.

use crate::scene::bounds::BoundsKind;
use crate::scene::error::SceneError;

/// Defaults applied to newly created nodes
#[derive(Debug, Clone)]
pub struct ScenePolicy {
    /// Whether new nodes are pickable
    pub default_pickable: bool,

    /// Whether new nodes are renderable
    pub default_renderable: bool,

    /// Bounds shape given to new nodes
    default_bounds_hint: BoundsKind,

    /// Depth of the active ignore-bounds scope
    ignore_bounds: u32,
}

impl Default for ScenePolicy {
    fn default() -> Self {
        Self {
            default_pickable: true,
            default_renderable: true,
            default_bounds_hint: BoundsKind::Aabb,
            ignore_bounds: 0,
        }
    }
}

impl ScenePolicy {
    /// The bounds shape given to new nodes
    pub fn default_bounds_hint(&self) -> BoundsKind {
        self.default_bounds_hint
    }

    /// Set the bounds shape for new nodes.
    ///
    /// # Errors
    ///
    /// `SceneError::UnsupportedBoundsKind` for `BoundsKind::Polytope`;
    /// validated here so node creation itself stays infallible.
    pub fn set_default_bounds_hint(&mut self, kind: BoundsKind) -> Result<(), SceneError> {
        if kind == BoundsKind::Polytope {
            return Err(SceneError::UnsupportedBoundsKind(kind));
        }
        self.default_bounds_hint = kind;
        Ok(())
    }

    /// Whether an ignore-bounds scope is active
    pub fn bounds_ignored(&self) -> bool {
        self.ignore_bounds > 0
    }

    /// Enter an ignore-bounds scope; nodes created while it is active
    /// start with `IGNORE_BOUNDS` set
    pub fn push_ignore_bounds(&mut self) {
        self.ignore_bounds += 1;
    }

    /// Leave the innermost ignore-bounds scope
    pub fn pop_ignore_bounds(&mut self) {
        self.ignore_bounds = self.ignore_bounds.saturating_sub(1);
    }
}
