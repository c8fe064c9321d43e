//! AeroView Core - Telemetry-Driven Vehicle Viewer
//!
//! This library holds everything between a telemetry transport and a
//! renderer:
//! 1. **Frame conversion**: body frame (forward/left/up, degrees) to render
//!    frame (right/up/back) with composed quaternion rotations
//! 2. **Pose hierarchy**: a scene graph whose nodes keep an authoritative
//!    body-frame pose separate from the transient spin of rotating parts
//! 3. **Telemetry mapping**: fixed-cadence polling, actuator duty smoothing
//!    and a manual-control fallback when no link is available
//! 4. **Follow camera**: frame-rate independent tracking layered over a
//!    user-driven orbit controller

pub mod camera;
pub mod config;
pub mod environment;
pub mod error;
pub mod frame;
pub mod frame_loop;
pub mod input;
pub mod poll;
pub mod pose;
pub mod render;
pub mod scene;
pub mod smoother;
pub mod telemetry;
pub mod vehicle;
pub mod viewer;

// Re-export key types for convenience
pub use camera::{CameraMode, FollowCamera, OrbitController, OrbitRig};
pub use config::{ConfigError, ViewerConfig};
pub use error::BuildError;
pub use frame_loop::{clamp_frame_dt, FrameLoop};
pub use input::{InputState, KeyState};
pub use render::{AssetError, AssetLoader, CameraView, PixelRect, Renderer};
pub use pose::Pose;
pub use scene::{EntityId, Payload, PoseEntity, SceneGraph};
pub use smoother::TelemetrySmoother;
pub use vehicle::{InsetCamera, LinkState, PollStats, VehicleController};
pub use viewer::Viewer;
