//! Configuration system
//!
//! Serializable settings for the octree, culling, and node-creation
//! defaults, loadable from TOML or RON files by extension.

pub use serde::{Deserialize, Serialize};

use crate::scene::{BoundsKind, ScenePolicy, SceneError};
use crate::spatial::OctreeConfig;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// `ConfigError` on IO failure, parse failure, or an unrecognized
    /// file extension.
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// `ConfigError` on IO failure, serialization failure, or an
    /// unrecognized file extension.
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A setting failed validation against the scene contract
    #[error("Invalid setting: {0}")]
    Invalid(#[from] SceneError),
}

/// Node-creation defaults, the serializable face of
/// [`ScenePolicy`](crate::scene::ScenePolicy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Whether new nodes are pickable
    pub default_pickable: bool,
    /// Whether new nodes are renderable
    pub default_renderable: bool,
    /// Bounds shape given to new nodes
    pub default_bounds_hint: BoundsKind,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            default_pickable: true,
            default_renderable: true,
            default_bounds_hint: BoundsKind::Aabb,
        }
    }
}

impl PolicySettings {
    /// Build a runtime policy, validating the bounds hint.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` when the configured bounds hint is not a
    /// supported shape.
    pub fn to_policy(&self) -> Result<ScenePolicy, ConfigError> {
        let mut policy = ScenePolicy::default();
        policy.default_pickable = self.default_pickable;
        policy.default_renderable = self.default_renderable;
        policy.set_default_bounds_hint(self.default_bounds_hint)?;
        Ok(policy)
    }
}

/// Culling behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CullingSettings {
    /// Whether frustum culling runs at all (off = everything visible)
    pub enable_culling: bool,
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self {
            enable_culling: true,
        }
    }
}

/// Top-level engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneSettings {
    /// Octree partition parameters
    pub octree: OctreeConfig,
    /// Culling behavior
    pub culling: CullingSettings,
    /// Node-creation defaults
    pub defaults: PolicySettings,
}

impl Config for SceneSettings {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_toml() {
        let settings = SceneSettings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: SceneSettings = toml::from_str(&text).unwrap();

        assert_eq!(parsed.octree.max_nodes_per_cell, settings.octree.max_nodes_per_cell);
        assert_eq!(parsed.octree.max_depth, settings.octree.max_depth);
        assert_eq!(parsed.culling.enable_culling, settings.culling.enable_culling);
    }

    #[test]
    fn test_parse_partial_toml() {
        let text = r#"
            [octree]
            max_nodes_per_cell = 16
            max_depth = 6
            min_cell_size = 2.0
            extended_cells = false

            [culling]
            enable_culling = true

            [defaults]
            default_pickable = false
            default_renderable = true
            default_bounds_hint = "Sphere"
        "#;
        let parsed: SceneSettings = toml::from_str(text).unwrap();
        assert_eq!(parsed.octree.max_nodes_per_cell, 16);
        assert!(!parsed.octree.extended_cells);
        assert!(!parsed.defaults.default_pickable);
        assert_eq!(parsed.defaults.default_bounds_hint, BoundsKind::Sphere);
    }

    #[test]
    fn test_polytope_hint_fails_validation() {
        let settings = PolicySettings {
            default_bounds_hint: BoundsKind::Polytope,
            ..PolicySettings::default()
        };
        assert!(matches!(
            settings.to_policy(),
            Err(ConfigError::Invalid(SceneError::UnsupportedBoundsKind(_)))
        ));
    }

    #[test]
    fn test_policy_settings_apply() {
        let settings = PolicySettings {
            default_pickable: false,
            default_renderable: false,
            default_bounds_hint: BoundsKind::None,
        };
        let policy = settings.to_policy().unwrap();
        assert!(!policy.default_pickable);
        assert!(!policy.default_renderable);
        assert_eq!(policy.default_bounds_hint(), BoundsKind::None);
    }
}
