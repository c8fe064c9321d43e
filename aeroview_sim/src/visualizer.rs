//! Rerun visualization for simulation runs.
//!
//! Optional, only available with the `visualization` feature. Everything is
//! logged in the body frame (z up), which is also Rerun's default.
//!
//! # What Gets Logged
//!
//! - Each vehicle root as a transform under `world/vehicles/<name>`
//! - Oracle ground truth as green points
//! - Rotor rate per vehicle as a scalar
//! - Link events as text

use aeroview_core::Pose;
#[cfg(feature = "visualization")]
use aeroview_core::frame;
use nalgebra::Vector3;
#[cfg(feature = "visualization")]
use rerun::{Color, Points3D, Position3D, Radius, RecordingStream};

pub struct RerunLogger {
    #[cfg(feature = "visualization")]
    rec: Option<RecordingStream>,

    enabled: bool,
}

impl RerunLogger {
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "visualization")]
            rec: None,
            enabled: false,
        }
    }

    #[cfg(feature = "visualization")]
    pub fn new(name: &str) -> Self {
        match rerun::RecordingStreamBuilder::new(name).spawn() {
            Ok(rec) => {
                tracing::info!("Rerun visualization enabled");
                Self {
                    rec: Some(rec),
                    enabled: true,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to initialize Rerun: {:?}", e);
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn new(_name: &str) -> Self {
        tracing::info!("Rerun visualization not available (compile with --features visualization)");
        Self::disabled()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(feature = "visualization")]
    pub fn set_time(&self, seconds: f64) {
        if let Some(ref rec) = self.rec {
            rec.set_time_seconds("sim_time", seconds);
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn set_time(&self, _seconds: f64) {}

    /// Logs a vehicle root pose.
    #[cfg(feature = "visualization")]
    pub fn log_vehicle(&self, name: &str, pose: &Pose) {
        if let Some(ref rec) = self.rec {
            let q = frame::body_rotation(&pose.rpy_deg);
            let p = pose.position;
            let _ = rec.log(
                format!("world/vehicles/{}", name),
                &rerun::Transform3D::from_translation_rotation(
                    [p.x as f32, p.y as f32, p.z as f32],
                    rerun::Quaternion::from_xyzw([q.i as f32, q.j as f32, q.k as f32, q.w as f32]),
                ),
            );
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_vehicle(&self, _name: &str, _pose: &Pose) {}

    #[cfg(feature = "visualization")]
    pub fn log_ground_truth(&self, positions: &[(String, Vector3<f64>)]) {
        if let Some(ref rec) = self.rec {
            let points: Vec<Position3D> = positions
                .iter()
                .map(|(_, p)| Position3D::new(p.x as f32, p.y as f32, p.z as f32))
                .collect();

            let _ = rec.log(
                "world/ground_truth",
                &Points3D::new(points)
                    .with_colors([Color::from_rgb(0, 255, 0)])
                    .with_radii([Radius::new_scene_units(0.1)]),
            );
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_ground_truth(&self, _positions: &[(String, Vector3<f64>)]) {}

    #[cfg(feature = "visualization")]
    pub fn log_rotor_rate(&self, name: &str, rate: f64) {
        if let Some(ref rec) = self.rec {
            let _ = rec.log(
                format!("metrics/{}/rotor_rate", name),
                &rerun::Scalar::new(rate),
            );
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_rotor_rate(&self, _name: &str, _rate: f64) {}

    #[cfg(feature = "visualization")]
    pub fn log_event(&self, path: &str, message: &str) {
        if let Some(ref rec) = self.rec {
            let _ = rec.log(path, &rerun::TextLog::new(message));
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_event(&self, _path: &str, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_logger() {
        let logger = RerunLogger::disabled();
        assert!(!logger.is_enabled());

        // No-ops
        logger.set_time(1.0);
        logger.log_vehicle("Drone", &Pose::identity());
        logger.log_ground_truth(&[("Drone".to_string(), Vector3::zeros())]);
        logger.log_rotor_rate("Drone", 10.0);
    }
}
