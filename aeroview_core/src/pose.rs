//! Absolute body-frame pose.

use crate::frame;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Position (forward, left, up) plus roll/pitch/yaw in degrees, always
/// expressed in the body frame and always absolute.
///
/// Render-frame values are derived on demand and never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// [forward, left, up] in metres
    pub position: Vector3<f64>,

    /// [roll, pitch, yaw] in degrees
    pub rpy_deg: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Vector3<f64>, rpy_deg: Vector3<f64>) -> Self {
        Self { position, rpy_deg }
    }

    /// Origin, level, facing forward.
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    /// Builds a pose from the array form used in configuration files.
    pub fn from_arrays(position: [f64; 3], rpy_deg: [f64; 3]) -> Self {
        Self::new(Vector3::from(position), Vector3::from(rpy_deg))
    }

    /// Builds a pose from linear metres and angular radians, as telemetry
    /// publishes it.
    pub fn from_linear_angular(linear: Vector3<f64>, angular_rad: Vector3<f64>) -> Self {
        Self::new(linear, angular_rad.map(f64::to_degrees))
    }

    /// Element-wise position increment.
    pub fn translated(&self, delta: &Vector3<f64>) -> Self {
        Self::new(self.position + delta, self.rpy_deg)
    }

    /// Element-wise angle increment.
    ///
    /// Each angle is wrapped into [-180, 180) once it leaves that range so
    /// that long manual sessions do not grow the stored angles without
    /// bound. Wrapping never changes the represented orientation.
    pub fn rotated(&self, delta_deg: &Vector3<f64>) -> Self {
        let rpy = (self.rpy_deg + delta_deg).map(wrap_degrees);
        Self::new(self.position, rpy)
    }

    pub fn render_position(&self) -> Vector3<f64> {
        frame::to_render_position(&self.position)
    }

    pub fn render_rotation(&self) -> UnitQuaternion<f64> {
        frame::to_render_rotation(&self.rpy_deg)
    }
}

/// Wraps an angle into [-180, 180) when it is outside that range.
pub fn wrap_degrees(angle: f64) -> f64 {
    if (-180.0..180.0).contains(&angle) {
        angle
    } else {
        (angle + 180.0).rem_euclid(360.0) - 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_repeated_yaw_equals_single_yaw() {
        let mut stepped = Pose::identity();
        for _ in 0..10 {
            stepped = stepped.rotated(&Vector3::new(0.0, 0.0, 10.0));
        }
        let once = Pose::identity().rotated(&Vector3::new(0.0, 0.0, 100.0));

        assert_relative_eq!(stepped.rpy_deg, once.rpy_deg, epsilon = 1e-9);
    }

    #[test]
    fn test_wrap_keeps_orientation() {
        let pose = Pose::identity().rotated(&Vector3::new(0.0, 0.0, 200.0));
        assert_relative_eq!(pose.rpy_deg.z, -160.0, epsilon = 1e-9);

        let unwrapped = frame::to_render_rotation(&Vector3::new(0.0, 0.0, 200.0));
        assert!(pose.render_rotation().angle_to(&unwrapped) < 1e-9);
    }

    #[test]
    fn test_from_linear_angular_converts_radians() {
        let pose = Pose::from_linear_angular(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, std::f64::consts::FRAC_PI_2, std::f64::consts::PI),
        );

        assert_eq!(pose.position, Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(pose.rpy_deg, Vector3::new(0.0, 90.0, 180.0), epsilon = 1e-9);
    }
}
