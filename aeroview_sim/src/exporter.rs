//! JSON export of simulation runs.
//!
//! One frame record per sampled frame: the vehicle as displayed next to the
//! oracle's ground truth, plus link state and rotor rate.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSample {
    pub name: String,

    /// Displayed body-frame position
    pub position: [f64; 3],

    /// Displayed roll/pitch/yaw [deg]
    pub rpy_deg: [f64; 3],

    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth: Option<[f64; 3]>,

    pub online: bool,
    pub rotor_rate: f64,
}

impl VehicleSample {
    /// Distance between displayed and true position, when truth is known.
    pub fn error(&self) -> Option<f64> {
        self.truth
            .map(|t| (Vector3::from(t) - Vector3::from(self.position)).norm())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFrame {
    pub time_sec: f64,

    /// Clamped frame delta
    pub dt: f64,

    pub vehicles: Vec<VehicleSample>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerExport {
    pub scenario: String,
    pub seed: u64,
    pub duration_sec: f64,
    pub frames: Vec<ExportFrame>,
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_error: Option<f64>,
}

impl ViewerExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            max_error: None,
        }
    }

    pub fn add_frame(&mut self, frame: ExportFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool) {
        self.passed = passed;
        self.max_error = self
            .frames
            .iter()
            .flat_map(|f| f.vehicles.iter().filter_map(VehicleSample::error))
            .fold(None, |acc: Option<f64>, e| Some(acc.map_or(e, |a| a.max(e))));
    }

    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
