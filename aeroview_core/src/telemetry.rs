//! Raw telemetry buffer decoding.
//!
//! # Wire Formats (all little-endian)
//!
//! ```text
//! pos            : f64 x6   linear x,y,z [m], angular x,y,z [rad]
//! motor          : u64      time_usec
//!                  f32 xN   duty per motor channel (N <= 16)
//! hako_cmd_game  : f64 x6   stick axes
//!                  u8  xN   button flags (N <= 15, non-zero = pressed)
//! ```
//!
//! A buffer that is too short to hold its fixed part decodes to `None`,
//! which the poll loop treats as "no update this cycle".

use crate::pose::Pose;
use nalgebra::Vector3;

/// Pose channel name.
pub const POSE_CHANNEL: &str = "pos";

/// Actuator duty channel name.
pub const ACTUATOR_CHANNEL: &str = "motor";

/// Game controller channel name.
pub const GAME_CHANNEL: &str = "hako_cmd_game";

pub const MAX_ACTUATOR_CHANNELS: usize = 16;
pub const MAX_GAME_BUTTONS: usize = 15;

/// Controller button that tilts inset cameras up.
pub const BUTTON_GIMBAL_UP: usize = 11;

/// Controller button that tilts inset cameras down.
pub const BUTTON_GIMBAL_DOWN: usize = 12;

const POSE_LEN: usize = 6 * 8;
const GAME_AXES: usize = 6;

/// Decoded pose sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Body-frame position [m]
    pub linear: Vector3<f64>,

    /// Roll/pitch/yaw [rad]
    pub angular: Vector3<f64>,
}

impl PoseSample {
    pub fn to_pose(&self) -> Pose {
        Pose::from_linear_angular(self.linear, self.angular)
    }
}

/// Decoded actuator command.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorControls {
    pub time_usec: u64,
    pub controls: Vec<f32>,
}

impl ActuatorControls {
    /// Mean duty over the listed channels; channels past the end are skipped.
    ///
    /// Returns `None` when none of the channels is present.
    pub fn average_duty(&self, channels: &[usize]) -> Option<f64> {
        let (sum, count) = channels
            .iter()
            .filter_map(|&idx| self.controls.get(idx))
            .fold((0.0f64, 0usize), |(sum, count), &duty| (sum + duty as f64, count + 1));

        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }
}

/// Decoded game controller state.
#[derive(Debug, Clone, PartialEq)]
pub struct GameControllerOperation {
    pub axes: [f64; GAME_AXES],
    pub buttons: Vec<bool>,
}

impl GameControllerOperation {
    pub fn is_pressed(&self, button: usize) -> bool {
        self.buttons.get(button).copied().unwrap_or(false)
    }

    /// -1 (tilt up), 0, or +1 (tilt down).
    pub fn gimbal_pitch_input(&self) -> f64 {
        let mut input = 0.0;
        if self.is_pressed(BUTTON_GIMBAL_UP) {
            input -= 1.0;
        }
        if self.is_pressed(BUTTON_GIMBAL_DOWN) {
            input += 1.0;
        }
        input
    }
}

fn f64_at(buf: &[u8], offset: usize) -> Option<f64> {
    let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
    Some(f64::from_le_bytes(bytes))
}

pub fn decode_pose(buf: &[u8]) -> Option<PoseSample> {
    if buf.len() < POSE_LEN {
        return None;
    }
    let v = |i: usize| f64_at(buf, i * 8);
    Some(PoseSample {
        linear: Vector3::new(v(0)?, v(1)?, v(2)?),
        angular: Vector3::new(v(3)?, v(4)?, v(5)?),
    })
}

pub fn decode_actuators(buf: &[u8]) -> Option<ActuatorControls> {
    let header: [u8; 8] = buf.get(..8)?.try_into().ok()?;
    let controls: Vec<f32> = buf[8..]
        .chunks_exact(4)
        .take(MAX_ACTUATOR_CHANNELS)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if controls.is_empty() {
        return None;
    }
    Some(ActuatorControls {
        time_usec: u64::from_le_bytes(header),
        controls,
    })
}

pub fn decode_game(buf: &[u8]) -> Option<GameControllerOperation> {
    let mut axes = [0.0; GAME_AXES];
    for (i, axis) in axes.iter_mut().enumerate() {
        *axis = f64_at(buf, i * 8)?;
    }
    let buttons = buf[GAME_AXES * 8..]
        .iter()
        .take(MAX_GAME_BUTTONS)
        .map(|&b| b != 0)
        .collect();
    Some(GameControllerOperation { axes, buttons })
}

pub fn encode_pose(linear: &Vector3<f64>, angular: &Vector3<f64>) -> Vec<u8> {
    linear
        .iter()
        .chain(angular.iter())
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

pub fn encode_actuators(time_usec: u64, controls: &[f32]) -> Vec<u8> {
    let mut buf = time_usec.to_le_bytes().to_vec();
    for duty in controls.iter().take(MAX_ACTUATOR_CHANNELS) {
        buf.extend_from_slice(&duty.to_le_bytes());
    }
    buf
}

pub fn encode_game(axes: &[f64; GAME_AXES], buttons: &[bool]) -> Vec<u8> {
    let mut buf: Vec<u8> = axes.iter().flat_map(|v| v.to_le_bytes()).collect();
    buf.extend(buttons.iter().take(MAX_GAME_BUTTONS).map(|&b| b as u8));
    buf
}
