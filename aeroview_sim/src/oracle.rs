//! Scripted flight ground truth.
//!
//! The oracle plays the part of the flight simulator: it knows where each
//! vehicle really is at any time `t` and publishes the matching `pos` and
//! `motor` buffers on the transport.

use crate::transport::ScriptedTransport;
use aeroview_core::telemetry::{encode_actuators, encode_pose, ACTUATOR_CHANNEL, POSE_CHANNEL};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Flight path of one vehicle, body frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlightPlan {
    /// Fixed position, fixed heading
    Hover {
        position: [f64; 3],
        yaw_rad: f64,
    },

    /// Counter-clockwise circle, nose along the velocity
    Circuit {
        center: [f64; 3],
        radius: f64,
        /// [rad/s]
        angular_speed: f64,
    },
}

impl FlightPlan {
    /// Returns (linear [m], angular [rad]) at time `t`.
    pub fn state_at(&self, t: f64) -> (Vector3<f64>, Vector3<f64>) {
        match *self {
            FlightPlan::Hover { position, yaw_rad } => {
                (Vector3::from(position), Vector3::new(0.0, 0.0, yaw_rad))
            }
            FlightPlan::Circuit {
                center,
                radius,
                angular_speed,
            } => {
                let phase = angular_speed * t;
                let offset = Vector3::new(radius * phase.cos(), radius * phase.sin(), 0.0);
                let heading = phase + FRAC_PI_2.copysign(angular_speed);
                (Vector3::from(center) + offset, Vector3::new(0.0, 0.0, heading))
            }
        }
    }

    /// Ground speed [m/s].
    pub fn speed(&self) -> f64 {
        match *self {
            FlightPlan::Hover { .. } => 0.0,
            FlightPlan::Circuit {
                radius,
                angular_speed,
                ..
            } => (radius * angular_speed).abs(),
        }
    }
}

/// One vehicle the oracle flies.
#[derive(Debug, Clone)]
pub struct ScriptedVehicle {
    pub name: String,
    pub plan: FlightPlan,

    /// Duty published on every motor channel
    pub duty: f32,

    pub motor_count: usize,
}

/// Ground truth for every scripted vehicle.
#[derive(Debug, Clone, Default)]
pub struct FlightOracle {
    vehicles: Vec<ScriptedVehicle>,
    published: u64,
}

impl FlightOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vehicle(&mut self, name: &str, plan: FlightPlan, duty: f32) {
        self.vehicles.push(ScriptedVehicle {
            name: name.to_string(),
            plan,
            duty,
            motor_count: 4,
        });
    }

    pub fn vehicle(&self, name: &str) -> Option<&ScriptedVehicle> {
        self.vehicles.iter().find(|v| v.name == name)
    }

    pub fn vehicles(&self) -> &[ScriptedVehicle] {
        &self.vehicles
    }

    /// True body-frame position of `name` at `t`.
    pub fn position_at(&self, name: &str, t: f64) -> Option<Vector3<f64>> {
        self.vehicle(name).map(|v| v.plan.state_at(t).0)
    }

    /// Publishes every vehicle's pose and motor buffers for time `t`.
    pub fn publish(&mut self, transport: &ScriptedTransport, t: f64) {
        let time_usec = (t * 1e6) as u64;
        for vehicle in &self.vehicles {
            let (linear, angular) = vehicle.plan.state_at(t);
            transport.publish(&vehicle.name, POSE_CHANNEL, encode_pose(&linear, &angular));

            let duties = vec![vehicle.duty; vehicle.motor_count];
            transport.publish(&vehicle.name, ACTUATOR_CHANNEL, encode_actuators(time_usec, &duties));
        }
        self.published += 1;
    }

    pub fn publish_count(&self) -> u64 {
        self.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_hover_is_static() {
        let plan = FlightPlan::Hover {
            position: [0.0, 0.0, 2.0],
            yaw_rad: 0.3,
        };

        assert_eq!(plan.state_at(0.0), plan.state_at(100.0));
        assert_eq!(plan.speed(), 0.0);
    }

    #[test]
    fn test_circuit_heading_follows_velocity() {
        let plan = FlightPlan::Circuit {
            center: [0.0, 0.0, 3.0],
            radius: 5.0,
            angular_speed: 0.4,
        };

        let (start, heading) = plan.state_at(0.0);
        assert_relative_eq!(start, Vector3::new(5.0, 0.0, 3.0));
        // At phase 0 the vehicle moves along +left, so the nose points left
        assert_relative_eq!(heading.z, FRAC_PI_2);

        let dt = 1e-6;
        let (next, _) = plan.state_at(dt);
        assert_relative_eq!((next - start).norm() / dt, plan.speed(), epsilon = 1e-4);
    }

    proptest! {
        #[test]
        fn prop_circuit_stays_on_circle(
            t in 0.0f64..1000.0,
            radius in 0.5f64..50.0,
            angular_speed in -2.0f64..2.0,
        ) {
            let plan = FlightPlan::Circuit {
                center: [1.0, -2.0, 4.0],
                radius,
                angular_speed,
            };
            let (position, angular) = plan.state_at(t);
            let offset = position - Vector3::new(1.0, -2.0, 4.0);

            prop_assert!((offset.norm() - radius).abs() < 1e-9);
            prop_assert_eq!(offset.z, 0.0);
            prop_assert_eq!(angular.x, 0.0);
        }
    }
}
