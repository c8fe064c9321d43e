//! AeroView Deterministic Simulation Harness
//!
//! Runs the complete viewer core headless against a scripted flight
//! simulator, on a virtual clock, from a single 64-bit seed.
//!
//! # What Is Controlled
//!
//! - **Time**: the clock only moves when the session pumps a frame
//! - **Link**: connects can be refused, the link severed, reads dropped
//! - **Frames**: fixed interval or seeded jitter
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ViewerSession                       │
//! │  ┌────────────┐  publish   ┌───────────────────┐         │
//! │  │ FlightOracle├──────────►│ ScriptedTransport │         │
//! │  └────────────┘            └─────────┬─────────┘         │
//! │                                      │ read_raw          │
//! │  ┌───────────────────────────────────▼────────────────┐  │
//! │  │ Viewer: VehicleControllers + FollowCamera + Scene  │  │
//! │  └───────────────────────────────────┬────────────────┘  │
//! │                                      │ render            │
//! │                            ┌─────────▼────────┐          │
//! │                            │ HeadlessRenderer │          │
//! │                            └──────────────────┘          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use aeroview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(5.0)
//!     .run(ScenarioId::Circuit);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
mod renderer;
mod runner;
pub mod scenarios;
mod session;
mod transport;
mod visualizer;

pub use context::SimContext;
pub use exporter::{ExportFrame, VehicleSample, ViewerExport};
pub use oracle::{FlightOracle, FlightPlan, ScriptedVehicle};
pub use renderer::{HeadlessLoader, HeadlessRenderer};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use session::{demo_config, SessionOptions, SessionStats, ViewerSession, DEMO_CONFIG};
pub use transport::{ScriptedTransport, TransportStats};
pub use visualizer::RerunLogger;
