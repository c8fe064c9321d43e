//! Viewer configuration schema.
//!
//! One struct per entity kind, every optional field's default declared once
//! through a `default_*` function. `ViewerConfig::from_json_str` parses and
//! validates in one step so that a malformed file never produces a
//! half-built scene.

use crate::pose::Pose;
use crate::render::{LightKind, LightParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors. All of them are raised before any entity exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON syntax error or a missing required field (serde names the field)
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing required field `{field}` in {entity}")]
    MissingField { entity: String, field: &'static str },

    #[error("Invalid value for `{field}` in {entity}: {reason}")]
    Invalid {
        entity: String,
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn missing(entity: &str, field: &'static str) -> Self {
        Self::MissingField {
            entity: entity.to_string(),
            field,
        }
    }

    fn invalid(entity: &str, field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            entity: entity.to_string(),
            field,
            reason: reason.into(),
        }
    }
}

fn default_zero3() -> [f64; 3] {
    [0.0; 3]
}
fn default_motor_channels() -> Vec<usize> {
    vec![0, 1, 2, 3]
}
fn default_rotor_scale() -> f64 {
    200.0
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_gimbal_pitch_rate() -> f64 {
    45.0
}
fn default_mount_fov() -> f64 {
    70.0
}
fn default_near() -> f64 {
    0.1
}
fn default_far() -> f64 {
    1000.0
}
fn default_camera_offset() -> [f64; 3] {
    [-5.0, 0.0, 2.0]
}
fn default_main_fov() -> f64 {
    60.0
}
fn default_lerp_position() -> f64 {
    8.0
}
fn default_lerp_target() -> f64 {
    10.0
}
fn default_toggle_key() -> String {
    "c".to_string()
}
fn default_mode() -> CameraModeConfig {
    CameraModeConfig::Follow
}
fn default_move_speed() -> f64 {
    2.0
}
fn default_yaw_rate() -> f64 {
    60.0
}
fn default_rotor_accel() -> f64 {
    20.0
}
fn default_lights() -> Vec<LightConfig> {
    vec![
        LightConfig {
            name: "hemisphere".to_string(),
            pos: [0.0, 0.0, 20.0],
            params: LightParams {
                kind: LightKind::Hemisphere,
                color: [1.0, 1.0, 1.0],
                intensity: 0.5,
            },
        },
        LightConfig {
            name: "sun".to_string(),
            pos: [-5.0, -5.0, 10.0],
            params: LightParams {
                kind: LightKind::Directional,
                color: [1.0, 1.0, 1.0],
                intensity: 0.8,
            },
        },
    ]
}

/// A visual asset plus the offset that aligns it with the logical pivot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_path: String,

    #[serde(default = "default_zero3")]
    pub pos: [f64; 3],

    #[serde(default = "default_zero3")]
    pub hpr: [f64; 3],
}

impl ModelConfig {
    pub fn offset(&self) -> Pose {
        Pose::from_arrays(self.pos, self.hpr)
    }
}

/// Normalised inset viewport, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsetWindow {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotorConfig {
    pub name: String,
    pub model: ModelConfig,

    #[serde(default = "default_zero3")]
    pub pos: [f64; 3],

    #[serde(default = "default_zero3")]
    pub hpr: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraMountConfig {
    pub name: String,
    pub model: ModelConfig,

    #[serde(default = "default_zero3")]
    pub pos: [f64; 3],

    #[serde(default = "default_zero3")]
    pub hpr: [f64; 3],

    #[serde(default = "default_mount_fov")]
    pub fov: f64,

    #[serde(default = "default_near")]
    pub near: f64,

    #[serde(default = "default_far")]
    pub far: f64,

    /// Renders this mount's view into an inset when present
    #[serde(default)]
    pub window: Option<InsetWindow>,
}

/// Manual fallback tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualTuning {
    /// [m/s]
    #[serde(default = "default_move_speed")]
    pub move_speed: f64,

    /// [deg/s]
    #[serde(default = "default_yaw_rate")]
    pub yaw_rate_deg: f64,

    /// Rotor rate acceleration [rad/s^2]
    #[serde(default = "default_rotor_accel")]
    pub rotor_accel: f64,
}

impl Default for ManualTuning {
    fn default() -> Self {
        Self {
            move_speed: default_move_speed(),
            yaw_rate_deg: default_yaw_rate(),
            rotor_accel: default_rotor_accel(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// Also the telemetry entity id
    pub name: String,
    pub model: ModelConfig,

    #[serde(default)]
    pub pos: Option<[f64; 3]>,

    #[serde(default)]
    pub hpr: Option<[f64; 3]>,

    #[serde(default)]
    pub rotors: Vec<RotorConfig>,

    #[serde(default)]
    pub cameras: Vec<CameraMountConfig>,

    #[serde(default = "default_motor_channels")]
    pub motor_channels: Vec<usize>,

    /// Duty (0..1) -> rotor rate [rad/s]
    #[serde(default = "default_rotor_scale")]
    pub rotor_scale: f64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Inset camera tilt speed while a gimbal button is held [deg/s]
    #[serde(default = "default_gimbal_pitch_rate")]
    pub gimbal_pitch_rate_deg: f64,

    #[serde(default)]
    pub manual: ManualTuning,
}

impl VehicleConfig {
    pub fn initial_pose(&self) -> Pose {
        Pose::from_arrays(self.pos.unwrap_or([0.0; 3]), self.hpr.unwrap_or([0.0; 3]))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let entity = if self.name.is_empty() { "vehicle" } else { self.name.as_str() };
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing(entity, "name"));
        }
        validate_model(entity, &self.model)?;

        if self.motor_channels.is_empty() {
            return Err(ConfigError::invalid(entity, "motor_channels", "at least one channel is required"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(entity, "poll_interval_ms", "must be positive"));
        }
        if !self.rotor_scale.is_finite() {
            return Err(ConfigError::invalid(entity, "rotor_scale", "must be finite"));
        }

        for rotor in &self.rotors {
            if rotor.name.trim().is_empty() {
                return Err(ConfigError::missing(entity, "rotors[].name"));
            }
            validate_model(&rotor.name, &rotor.model)?;
        }

        for camera in &self.cameras {
            if camera.name.trim().is_empty() {
                return Err(ConfigError::missing(entity, "cameras[].name"));
            }
            validate_model(&camera.name, &camera.model)?;
            validate_projection(&camera.name, camera.fov, camera.near, camera.far)?;
            if let Some(window) = &camera.window {
                validate_window(&camera.name, window)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,

    /// Model path (GLB/GLTF/MJCF, opaque to the core)
    pub model: String,

    #[serde(default)]
    pub pos: Option<[f64; 3]>,

    #[serde(default)]
    pub hpr: Option<[f64; 3]>,

    #[serde(default)]
    pub scale: Option<f64>,
}

impl EnvironmentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing("environment", "name"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::missing(&self.name, "model"));
        }
        if let Some(scale) = self.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(ConfigError::invalid(&self.name, "scale", format!("{} is not a positive number", scale)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    pub name: String,

    /// Body-frame position
    #[serde(default = "default_zero3")]
    pub pos: [f64; 3],

    #[serde(flatten)]
    pub params: LightParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraModeConfig {
    Follow,
    #[serde(alias = "fixed")]
    Free,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainCameraConfig {
    /// Body-frame offset from the tracked vehicle
    #[serde(default = "default_camera_offset")]
    pub position: [f64; 3],

    #[serde(default = "default_main_fov")]
    pub fov: f64,

    #[serde(default = "default_near")]
    pub near: f64,

    #[serde(default = "default_far")]
    pub far: f64,

    #[serde(default = "default_mode", alias = "initialMode")]
    pub initial_mode: CameraModeConfig,

    /// Standoff distance; the initial camera/target distance when absent
    #[serde(default, alias = "followDistance")]
    pub follow_distance: Option<f64>,

    #[serde(default = "default_lerp_position", alias = "followLerpPos")]
    pub follow_lerp_pos: f64,

    #[serde(default = "default_lerp_target", alias = "followLerpTarget")]
    pub follow_lerp_target: f64,

    #[serde(default = "default_toggle_key", alias = "followToggleKey")]
    pub follow_toggle_key: String,
}

impl Default for MainCameraConfig {
    fn default() -> Self {
        Self {
            position: default_camera_offset(),
            fov: default_main_fov(),
            near: default_near(),
            far: default_far(),
            initial_mode: default_mode(),
            follow_distance: None,
            follow_lerp_pos: default_lerp_position(),
            follow_lerp_target: default_lerp_target(),
            follow_toggle_key: default_toggle_key(),
        }
    }
}

impl MainCameraConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let entity = "main_camera";
        validate_projection(entity, self.fov, self.near, self.far)?;
        if self.follow_lerp_pos < 0.0 || self.follow_lerp_target < 0.0 {
            return Err(ConfigError::invalid(entity, "follow_lerp", "rate constants must be non-negative"));
        }
        if let Some(distance) = self.follow_distance {
            if !(distance.is_finite() && distance > 0.0) {
                return Err(ConfigError::invalid(entity, "follow_distance", "must be positive"));
            }
        }
        if self.follow_toggle_key.is_empty() {
            return Err(ConfigError::missing(entity, "follow_toggle_key"));
        }
        Ok(())
    }
}

/// Key identifiers for manual control and camera adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub forward: String,
    pub back: String,
    pub left: String,
    pub right: String,
    pub up: String,
    pub down: String,
    pub yaw_left: String,
    pub yaw_right: String,
    pub rotor_slower: String,
    pub rotor_faster: String,
    pub rotor_stop: String,
    pub standoff_closer: String,
    pub standoff_farther: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: "w".into(),
            back: "s".into(),
            left: "a".into(),
            right: "d".into(),
            up: "r".into(),
            down: "f".into(),
            yaw_left: "q".into(),
            yaw_right: "e".into(),
            rotor_slower: "j".into(),
            rotor_faster: "k".into(),
            rotor_stop: "l".into(),
            standoff_closer: "1".into(),
            standoff_farther: "2".into(),
        }
    }
}

/// Top-level viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub drones: Vec<VehicleConfig>,

    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,

    #[serde(default = "default_lights")]
    pub lights: Vec<LightConfig>,

    #[serde(default)]
    pub main_camera: Option<MainCameraConfig>,

    #[serde(default)]
    pub keys: KeyBindings,
}

impl ViewerConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for drone in &self.drones {
            drone.validate()?;
        }
        for env in &self.environments {
            env.validate()?;
        }
        if let Some(camera) = &self.main_camera {
            camera.validate()?;
        }
        Ok(())
    }
}

fn validate_model(entity: &str, model: &ModelConfig) -> Result<(), ConfigError> {
    if model.model_path.trim().is_empty() {
        return Err(ConfigError::missing(entity, "model_path"));
    }
    Ok(())
}

fn validate_projection(entity: &str, fov: f64, near: f64, far: f64) -> Result<(), ConfigError> {
    if !(fov > 0.0 && fov < 180.0) {
        return Err(ConfigError::invalid(entity, "fov", format!("{} is outside (0, 180)", fov)));
    }
    if !(near > 0.0 && near < far) {
        return Err(ConfigError::invalid(entity, "near", format!("need 0 < near ({}) < far ({})", near, far)));
    }
    Ok(())
}

fn validate_window(entity: &str, window: &InsetWindow) -> Result<(), ConfigError> {
    let inside = |v: f64| (0.0..=1.0).contains(&v);
    let fits = inside(window.x)
        && inside(window.y)
        && window.width > 0.0
        && window.height > 0.0
        && window.x + window.width <= 1.0 + 1e-9
        && window.y + window.height <= 1.0 + 1e-9;
    if !fits {
        return Err(ConfigError::invalid(entity, "window", "inset must lie inside the unit square"));
    }
    Ok(())
}
