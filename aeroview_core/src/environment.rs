//! Static environment pieces and lights.
//!
//! Environment models come in wildly different units (a city exported in
//! millimetres next to a room in metres). After the configured scale is
//! applied, a model whose bounding diagonal is absurdly large or small is
//! rescaled so that its diagonal lands near 100 render units.

use crate::config::{EnvironmentConfig, LightConfig};
use crate::error::BuildError;
use crate::pose::Pose;
use crate::render::AssetLoader;
use crate::scene::{EntityId, Payload, SceneGraph};
use nalgebra::Vector3;
use tracing::{info, warn};

/// Diagonal above which a model is considered too large.
pub const MAX_DIAGONAL: f64 = 1e4;

/// Diagonal below which a model is considered too small.
pub const MIN_DIAGONAL: f64 = 1e-2;

/// Diagonal a normalised model is rescaled to.
pub const TARGET_DIAGONAL: f64 = 100.0;

/// Returns the scale to use for a model with the given unit-scale extent.
pub fn normalized_scale(scale: f64, extent: &Vector3<f64>) -> f64 {
    let diagonal = extent.norm() * scale;
    if diagonal > MAX_DIAGONAL {
        scale * TARGET_DIAGONAL / diagonal
    } else if diagonal < MIN_DIAGONAL {
        scale * TARGET_DIAGONAL / diagonal.max(1e-6)
    } else {
        scale
    }
}

/// Loads one environment piece as a root entity carrying a visual payload.
///
/// On failure nothing is added to the scene.
pub fn build_environment(
    scene: &mut SceneGraph,
    loader: &mut dyn AssetLoader,
    config: &EnvironmentConfig,
) -> Result<EntityId, BuildError> {
    config
        .validate()
        .map_err(|e| BuildError::config(&config.name, e))?;

    let asset = loader
        .load(&config.model)
        .map_err(|e| BuildError::asset(&config.name, e))?;

    let requested = config.scale.unwrap_or(1.0);
    let scale = normalized_scale(requested, &asset.extent);
    if scale != requested {
        info!(
            "{}: bounding diagonal {:.3} out of range, scale {} -> {:.6}",
            config.name,
            asset.extent.norm() * requested,
            requested,
            scale
        );
    }

    let id = scene.spawn(&config.name);
    if let Some(entity) = scene.get_mut(id) {
        entity.set_absolute_pose(Pose::from_arrays(
            config.pos.unwrap_or([0.0; 3]),
            config.hpr.unwrap_or([0.0; 3]),
        ));
        entity.set_scale(scale);
        entity.set_payload(Payload::VisualMesh(asset.handle));
    }

    info!("Loaded environment {} from {}", config.name, config.model);
    Ok(id)
}

/// Builds every environment piece; a failing piece is logged and skipped
/// without affecting the others.
pub fn build_environments(
    scene: &mut SceneGraph,
    loader: &mut dyn AssetLoader,
    configs: &[EnvironmentConfig],
) -> Vec<Result<EntityId, BuildError>> {
    configs
        .iter()
        .map(|config| {
            let result = build_environment(scene, loader, config);
            if let Err(err) = &result {
                warn!("Environment {} not added: {}", config.name, err);
            }
            result
        })
        .collect()
}

/// Spawns one root entity per light.
pub fn build_lights(scene: &mut SceneGraph, lights: &[LightConfig]) -> Vec<EntityId> {
    lights
        .iter()
        .map(|light| {
            let id = scene.spawn(&light.name);
            if let Some(entity) = scene.get_mut(id) {
                entity.set_absolute_pose(Pose::from_arrays(light.pos, [0.0; 3]));
                entity.set_payload(Payload::Light(light.params));
            }
            id
        })
        .collect()
}
