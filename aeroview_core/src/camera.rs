//! Follow camera layered over a user orbit controller.
//!
//! # Follow Step
//!
//! ```text
//!   before = |position - target|
//!   orbit.update(dt)                      user drag / zoom / pan
//!   after  = |position - target|
//!   |after - before| > threshold  =>  standoff = after
//!
//!   a_t = 1 - exp(-k_target * dt)
//!   a_p = 1 - exp(-k_position * dt)
//!   target   += (tracked - target) * a_t
//!   desired   = target + normalize(position - target) * standoff
//!   position += (desired - position) * a_p
//! ```
//!
//! The exponential blend makes the motion independent of frame rate: two
//! steps of `dt/2` land exactly where one step of `dt` does.

use crate::config::{CameraModeConfig, MainCameraConfig};
use crate::frame;
use crate::render::{CameraView, Projection};
use crate::scene::{EntityId, SceneGraph};
use nalgebra::Vector3;
use tracing::info;

/// Distance change that counts as a user zoom.
pub const ZOOM_THRESHOLD: f64 = 0.01;

/// Standoff floor so the camera never collapses onto its target.
pub const MIN_STANDOFF: f64 = 0.1;

/// Tolerance below which the view direction is considered degenerate.
const DEGENERATE_LENGTH_SQ: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// Blend toward the tracked entity
    Follow,
    /// Orbit controller only
    Free,
}

impl From<CameraModeConfig> for CameraMode {
    fn from(mode: CameraModeConfig) -> Self {
        match mode {
            CameraModeConfig::Follow => CameraMode::Follow,
            CameraModeConfig::Free => CameraMode::Free,
        }
    }
}

/// User-driven orbit controller, render frame.
pub trait OrbitController {
    fn position(&self) -> Vector3<f64>;
    fn target(&self) -> Vector3<f64>;
    fn set_position(&mut self, position: Vector3<f64>);
    fn set_target(&mut self, target: Vector3<f64>);

    /// Applies whatever user input arrived since the last call.
    fn update(&mut self, dt: f64);

    fn distance(&self) -> f64 {
        (self.position() - self.target()).norm()
    }
}

/// Spherical orbit around a target with queued rotate/zoom/pan input.
#[derive(Debug, Clone)]
pub struct OrbitRig {
    position: Vector3<f64>,
    target: Vector3<f64>,

    /// Queued azimuth/elevation [rad]
    pending_rotate: (f64, f64),
    /// Queued distance multiplier
    pending_zoom: f64,
    pending_pan: Vector3<f64>,

    pub min_distance: f64,
    pub max_distance: f64,
}

impl OrbitRig {
    pub fn new(position: Vector3<f64>, target: Vector3<f64>) -> Self {
        Self {
            position,
            target,
            pending_rotate: (0.0, 0.0),
            pending_zoom: 1.0,
            pending_pan: Vector3::zeros(),
            min_distance: MIN_STANDOFF,
            max_distance: 10_000.0,
        }
    }

    /// Queues an orbit around the target.
    pub fn rotate(&mut self, azimuth: f64, elevation: f64) {
        self.pending_rotate.0 += azimuth;
        self.pending_rotate.1 += elevation;
    }

    /// Queues a distance change; `factor > 1` moves away.
    pub fn zoom(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.pending_zoom *= factor;
        }
    }

    /// Queues a translation of both camera and target.
    pub fn pan(&mut self, delta: Vector3<f64>) {
        self.pending_pan += delta;
    }

    fn has_pending(&self) -> bool {
        self.pending_rotate != (0.0, 0.0)
            || self.pending_zoom != 1.0
            || self.pending_pan != Vector3::zeros()
    }
}

impl OrbitController for OrbitRig {
    fn position(&self) -> Vector3<f64> {
        self.position
    }

    fn target(&self) -> Vector3<f64> {
        self.target
    }

    fn set_position(&mut self, position: Vector3<f64>) {
        self.position = position;
    }

    fn set_target(&mut self, target: Vector3<f64>) {
        self.target = target;
    }

    fn update(&mut self, _dt: f64) {
        // Untouched rigs keep their exact distance
        if !self.has_pending() {
            return;
        }

        let offset = self.position - self.target;
        let radius = offset.norm();
        let (azimuth, polar) = if radius > 0.0 {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, 0.0)
        };

        let (d_azimuth, d_elevation) = self.pending_rotate;
        let azimuth = azimuth + d_azimuth;
        let polar = (polar - d_elevation).clamp(1e-3, std::f64::consts::PI - 1e-3);
        let radius = (radius.max(self.min_distance) * self.pending_zoom)
            .clamp(self.min_distance, self.max_distance);

        self.target += self.pending_pan;
        self.position = self.target
            + Vector3::new(
                radius * polar.sin() * azimuth.sin(),
                radius * polar.cos(),
                radius * polar.sin() * azimuth.cos(),
            );

        self.pending_rotate = (0.0, 0.0);
        self.pending_zoom = 1.0;
        self.pending_pan = Vector3::zeros();
    }
}

/// Exponential smoothing factor `1 - e^(-k dt)`.
pub fn smoothing_factor(rate: f64, dt: f64) -> f64 {
    1.0 - (-rate * dt).exp()
}

/// Main camera: an orbit controller plus optional tracking of one entity.
#[derive(Debug, Clone)]
pub struct FollowCamera<O: OrbitController = OrbitRig> {
    orbit: O,
    projection: Projection,

    /// Looked up every frame; a stale id simply stops the follow
    tracked: Option<EntityId>,

    mode: CameraMode,
    standoff: f64,
    lerp_position: f64,
    lerp_target: f64,
    toggle_key: String,
}

impl<O: OrbitController> FollowCamera<O> {
    /// Wraps `orbit`; the standoff starts at the current camera distance.
    pub fn new(orbit: O, projection: Projection) -> Self {
        let standoff = orbit.distance().max(MIN_STANDOFF);
        Self {
            orbit,
            projection,
            tracked: None,
            mode: CameraMode::Follow,
            standoff,
            lerp_position: 8.0,
            lerp_target: 10.0,
            toggle_key: "c".to_string(),
        }
    }

    pub fn with_rates(mut self, lerp_position: f64, lerp_target: f64) -> Self {
        self.lerp_position = lerp_position.max(0.0);
        self.lerp_target = lerp_target.max(0.0);
        self
    }

    pub fn with_toggle_key(mut self, key: impl Into<String>) -> Self {
        self.toggle_key = key.into();
        self
    }

    pub fn with_mode(mut self, mode: CameraMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_standoff(mut self, standoff: f64) -> Self {
        self.standoff = standoff.max(MIN_STANDOFF);
        self
    }

    pub fn update(&mut self, dt: f64, scene: &SceneGraph) {
        let tracked = match self.mode {
            CameraMode::Follow => self.tracked.and_then(|id| scene.world_position(id)),
            CameraMode::Free => None,
        };
        let tracked = match tracked {
            Some(position) => position,
            None => {
                self.orbit.update(dt);
                return;
            }
        };

        let before = self.orbit.distance();
        self.orbit.update(dt);
        let after = self.orbit.distance();
        if (after - before).abs() > ZOOM_THRESHOLD {
            self.standoff = after.max(MIN_STANDOFF);
        }

        let alpha_target = smoothing_factor(self.lerp_target, dt);
        let alpha_position = smoothing_factor(self.lerp_position, dt);

        let target = self.orbit.target();
        let target = target + (tracked - target) * alpha_target;
        self.orbit.set_target(target);

        let position = self.orbit.position();
        let offset = position - target;
        let direction = if offset.norm_squared() < DEGENERATE_LENGTH_SQ {
            Vector3::y()
        } else {
            offset.normalize()
        };
        let desired = target + direction * self.standoff;
        self.orbit.set_position(position + (desired - position) * alpha_position);
    }

    /// Additive standoff change, floored at `MIN_STANDOFF`.
    pub fn adjust_standoff(&mut self, delta: f64) {
        self.standoff = (self.standoff + delta).max(MIN_STANDOFF);
    }

    pub fn set_mode(&mut self, mode: CameraMode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> CameraMode {
        self.mode = match self.mode {
            CameraMode::Follow => CameraMode::Free,
            CameraMode::Free => CameraMode::Follow,
        };
        info!("Camera mode: {:?}", self.mode);
        self.mode
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.set_viewport(width, height);
    }

    pub fn set_tracked(&mut self, tracked: Option<EntityId>) {
        self.tracked = tracked;
    }

    pub fn tracked(&self) -> Option<EntityId> {
        self.tracked
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn standoff(&self) -> f64 {
        self.standoff
    }

    pub fn toggle_key(&self) -> &str {
        &self.toggle_key
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn orbit(&self) -> &O {
        &self.orbit
    }

    pub fn orbit_mut(&mut self) -> &mut O {
        &mut self.orbit
    }

    pub fn view(&self) -> CameraView {
        CameraView::looking_at(self.orbit.position(), self.orbit.target(), self.projection)
    }
}

impl FollowCamera<OrbitRig> {
    /// Places the camera at the tracked entity's world position plus the
    /// configured body-frame offset, looking at the entity.
    pub fn from_config(
        config: &MainCameraConfig,
        scene: &SceneGraph,
        tracked: Option<EntityId>,
        aspect: f64,
    ) -> Self {
        let target = tracked
            .and_then(|id| scene.world_position(id))
            .unwrap_or_else(Vector3::zeros);
        let position = target + frame::to_render_position(&Vector3::from(config.position));

        let projection = Projection::new(config.fov, config.near, config.far, aspect);
        let mut camera = Self::new(OrbitRig::new(position, target), projection)
            .with_rates(config.follow_lerp_pos, config.follow_lerp_target)
            .with_toggle_key(config.follow_toggle_key.clone())
            .with_mode(config.initial_mode.into());
        if let Some(distance) = config.follow_distance {
            camera = camera.with_standoff(distance);
        }
        camera.set_tracked(tracked);
        camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Pose;
    use approx::assert_relative_eq;

    fn scene_with_target(body: [f64; 3]) -> (SceneGraph, EntityId) {
        let mut scene = SceneGraph::new();
        let id = scene.spawn("Drone");
        scene
            .get_mut(id)
            .unwrap()
            .set_absolute_pose(Pose::from_arrays(body, [0.0; 3]));
        (scene, id)
    }

    fn camera(position: Vector3<f64>, target: Vector3<f64>) -> FollowCamera {
        FollowCamera::new(OrbitRig::new(position, target), Projection::new(60.0, 0.1, 1000.0, 1.0))
    }

    #[test]
    fn test_target_step_is_exponential() {
        // Tracked entity 10 units along render -z
        let (scene, id) = scene_with_target([10.0, 0.0, 0.0]);
        let mut cam = camera(Vector3::new(0.0, 5.0, 0.0), Vector3::zeros()).with_rates(8.0, 8.0);
        cam.set_tracked(Some(id));

        cam.update(0.1, &scene);

        let moved = cam.orbit().target().norm();
        assert_relative_eq!(moved, 10.0 * (1.0 - (-0.8f64).exp()), epsilon = 1e-9);
        assert_relative_eq!(moved, 5.507, epsilon = 1e-3);
    }

    #[test]
    fn test_blend_is_frame_rate_independent() {
        let (scene, id) = scene_with_target([10.0, 0.0, 0.0]);
        let start = (Vector3::new(0.0, 5.0, 0.0), Vector3::zeros());

        let mut coarse = camera(start.0, start.1);
        coarse.set_tracked(Some(id));
        coarse.update(0.1, &scene);

        let mut fine = camera(start.0, start.1);
        fine.set_tracked(Some(id));
        fine.update(0.05, &scene);
        fine.update(0.05, &scene);

        assert_relative_eq!(coarse.orbit().target(), fine.orbit().target(), epsilon = 1e-9);
    }

    #[test]
    fn test_standoff_preserved_while_following() {
        let (scene, id) = scene_with_target([10.0, 2.0, 1.0]);
        let mut cam = camera(Vector3::new(0.0, 3.0, 4.0), Vector3::zeros());
        cam.set_tracked(Some(id));
        assert_relative_eq!(cam.standoff(), 5.0);

        for _ in 0..600 {
            cam.update(1.0 / 60.0, &scene);
        }

        let tracked = scene.world_position(id).unwrap();
        assert_relative_eq!(cam.orbit().target(), tracked, epsilon = 1e-6);
        assert_relative_eq!(cam.orbit().distance(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_user_zoom_becomes_standoff() {
        let (scene, id) = scene_with_target([0.0, 0.0, 0.0]);
        let mut cam = camera(Vector3::new(0.0, 0.0, 4.0), Vector3::zeros());
        cam.set_tracked(Some(id));

        cam.orbit_mut().zoom(2.0);
        cam.update(0.016, &scene);

        assert_relative_eq!(cam.standoff(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_free_mode_ignores_tracked_entity() {
        let (scene, id) = scene_with_target([10.0, 0.0, 0.0]);
        let mut cam = camera(Vector3::new(0.0, 5.0, 0.0), Vector3::zeros()).with_mode(CameraMode::Free);
        cam.set_tracked(Some(id));

        cam.update(0.1, &scene);
        assert_eq!(cam.orbit().target(), Vector3::zeros());

        assert_eq!(cam.toggle_mode(), CameraMode::Follow);
        cam.update(0.1, &scene);
        assert!(cam.orbit().target().norm() > 0.0);
    }

    #[test]
    fn test_despawned_target_stops_follow() {
        let (mut scene, id) = scene_with_target([10.0, 0.0, 0.0]);
        let mut cam = camera(Vector3::new(0.0, 5.0, 0.0), Vector3::zeros());
        cam.set_tracked(Some(id));
        scene.despawn(id);

        cam.update(0.1, &scene);
        assert_eq!(cam.orbit().target(), Vector3::zeros());
    }

    #[test]
    fn test_degenerate_direction_falls_back_to_up() {
        let (scene, id) = scene_with_target([0.0, 0.0, 0.0]);
        let mut cam = camera(Vector3::zeros(), Vector3::zeros()).with_rates(1e6, 1e6);
        cam.set_tracked(Some(id));

        cam.update(0.1, &scene);
        assert_relative_eq!(cam.orbit().position(), Vector3::new(0.0, MIN_STANDOFF, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_adjust_standoff_floored() {
        let mut cam = camera(Vector3::new(0.0, 0.0, 2.0), Vector3::zeros());
        cam.adjust_standoff(-0.5);
        assert_relative_eq!(cam.standoff(), 1.5);

        cam.adjust_standoff(-10.0);
        assert_eq!(cam.standoff(), MIN_STANDOFF);
    }

    #[test]
    fn test_from_config_places_camera_behind_vehicle() {
        let (scene, id) = scene_with_target([2.0, 0.0, 1.0]);
        let config = MainCameraConfig {
            position: [-3.0, 0.0, 1.0],
            ..Default::default()
        };

        let mut cam = FollowCamera::from_config(&config, &scene, Some(id), 1.5);
        let vehicle = scene.world_position(id).unwrap();

        assert_relative_eq!(cam.orbit().target(), vehicle);
        // 3 m behind (render +z) and 1 m above
        assert_relative_eq!(cam.orbit().position() - vehicle, Vector3::new(0.0, 1.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(cam.standoff(), 10f64.sqrt(), epsilon = 1e-12);

        cam.resize(800, 400);
        assert_eq!(cam.projection().aspect, 2.0);
    }
}
