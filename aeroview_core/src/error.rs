//! Construction errors.

use crate::config::ConfigError;
use crate::render::AssetError;
use thiserror::Error;

/// Reasons an entity (vehicle or environment piece) could not be added to
/// the scene. Nothing of the failed entity remains in the scene graph.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid configuration for {entity}: {source}")]
    Config {
        entity: String,
        #[source]
        source: ConfigError,
    },

    #[error("Asset for {entity} failed: {source}")]
    Asset {
        entity: String,
        #[source]
        source: AssetError,
    },
}

impl BuildError {
    pub fn config(entity: impl Into<String>, source: ConfigError) -> Self {
        Self::Config {
            entity: entity.into(),
            source,
        }
    }

    pub fn asset(entity: impl Into<String>, source: AssetError) -> Self {
        Self::Asset {
            entity: entity.into(),
            source,
        }
    }

    /// Name of the entity that failed to build.
    pub fn entity(&self) -> &str {
        match self {
            Self::Config { entity, .. } | Self::Asset { entity, .. } => entity,
        }
    }
}
