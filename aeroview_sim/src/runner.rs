//! Scenario runner - drives a headless viewer through deterministic runs.

use crate::exporter::ViewerExport;
use crate::oracle::{FlightOracle, FlightPlan};
use crate::renderer::HeadlessLoader;
use crate::scenarios::ScenarioId;
use crate::session::{demo_config, SessionOptions, ViewerSession};
use crate::visualizer::RerunLogger;

use aeroview_core::frame_loop::{MAX_FRAME_DT, MIN_FRAME_DT};
use aeroview_core::{LinkState, ViewerConfig};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Duty every scripted motor reports.
const SCRIPTED_DUTY: f32 = 0.5;

/// Slack on floating-point comparisons [m].
const EPSILON: f64 = 1e-6;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total frames rendered
    pub total_frames: u64,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Vehicles online at the end
    pub final_online: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Frame records, when export was requested
    pub export: Option<ViewerExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    pub frames: u64,

    /// Poll ticks consumed across all vehicles
    pub polls: u64,

    pub pose_updates: u64,

    /// Polls whose pose read came back empty
    pub misses: u64,

    /// Reads the transport dropped on purpose
    pub dropped: u64,

    pub full_renders: u64,
    pub inset_renders: u64,

    /// Largest displayed-vs-truth distance while online [m]
    pub max_error: f64,

    /// Largest age of the displayed pose while online [s]
    pub max_staleness: f64,

    pub min_dt: f64,
    pub max_dt: f64,
}

/// Runs viewer scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Virtual duration in seconds
    duration_secs: f64,

    /// Viewer configuration; the built-in quadcopter when unset
    config: Option<ViewerConfig>,

    /// Sample every n-th frame into the result (0 = no export)
    export_every: u64,

    visualize: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration_secs: 10.0,
            config: None,
            export_every: 0,
            visualize: false,
        }
    }

    /// Sets the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs.max(0.0);
        self
    }

    pub fn with_config(mut self, config: ViewerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_export(mut self, every: u64) -> Self {
        self.export_every = every;
        self
    }

    pub fn with_visualization(mut self, enabled: bool) -> Self {
        self.visualize = enabled;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        // Poll and frame callbacks share one thread, like the viewer itself
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => return self.aborted(scenario, format!("Runtime setup failed: {}", e)),
        };

        let config = match &self.config {
            Some(config) => config.clone(),
            None => match demo_config() {
                Ok(config) => config,
                Err(e) => return self.aborted(scenario, format!("Demo config invalid: {}", e)),
            },
        };

        runtime.block_on(async {
            match scenario {
                ScenarioId::Hover => self.run_hover(&config).await,
                ScenarioId::Circuit => self.run_circuit(&config).await,
                ScenarioId::LinkLoss => self.run_link_loss(&config).await,
                ScenarioId::Offline => self.run_offline(&config).await,
                ScenarioId::Jitter => self.run_jitter(&config).await,
            }
        })
    }

    /// VSIM-001: Hover - every vehicle holds a fixed pose.
    ///
    /// **Assertion**: displayed pose equals truth once the first poll lands,
    /// rotor rate equals duty × scale, every frame renders main view plus
    /// all insets.
    async fn run_hover(&self, config: &ViewerConfig) -> ScenarioResult {
        info!("VSIM-001: Hover");

        let oracle = oracle_for(config, |index| FlightPlan::Hover {
            position: [index as f64 * 3.0, 0.0, 2.0],
            yaw_rad: 0.3,
        });
        let mut session = self.session(ScenarioId::Hover, config, oracle, SessionOptions::default());
        let mut failures = Vec::new();

        let online = session.connect().await;
        if online != config.drones.len() {
            failures.push(format!("{} of {} vehicles online", online, config.drones.len()));
        }

        session.run_for(self.duration());

        if session.stats().max_error > EPSILON {
            failures.push(format!("pose error {:.6}m on a static vehicle", session.stats().max_error));
        }
        for vehicle in &session.viewer().vehicles {
            let expected = SCRIPTED_DUTY as f64 * vehicle.config().rotor_scale;
            if vehicle.latest_pose().is_some() && (vehicle.rotor_rate() - expected).abs() > EPSILON {
                failures.push(format!(
                    "{} rotor rate {:.3}, expected {:.3}",
                    vehicle.name(),
                    vehicle.rotor_rate(),
                    expected
                ));
            }
        }
        check_renders(&session, &mut failures);

        self.finish(ScenarioId::Hover, session, failures).await
    }

    /// VSIM-002: Circuit - vehicles fly circles at 2.5 m/s.
    ///
    /// **Assertion**: the displayed pose is never older than one poll
    /// interval plus one frame, and never further from truth than the
    /// vehicle travels in that time.
    async fn run_circuit(&self, config: &ViewerConfig) -> ScenarioResult {
        info!("VSIM-002: Circuit");

        let oracle = oracle_for(config, circuit_plan);
        let speed = max_speed(&oracle);
        let options = SessionOptions::default();
        let frame_secs = options.frame_interval.as_secs_f64();
        let mut session = self.session(ScenarioId::Circuit, config, oracle, options);
        let mut failures = Vec::new();

        session.connect().await;
        session.run_for(self.duration());

        let stats = session.stats().clone();
        let staleness_bound = max_poll_interval(config) + frame_secs + EPSILON;
        if stats.max_staleness > staleness_bound {
            failures.push(format!(
                "pose {:.3}s stale, bound {:.3}s",
                stats.max_staleness, staleness_bound
            ));
        }
        let error_bound = speed * staleness_bound + EPSILON;
        if stats.max_error > error_bound {
            failures.push(format!("error {:.3}m exceeds {:.3}m", stats.max_error, error_bound));
        }
        check_renders(&session, &mut failures);

        info!(
            "✓ Circuit: max error {:.3}m, max staleness {:.3}s",
            stats.max_error, stats.max_staleness
        );
        self.finish(ScenarioId::Circuit, session, failures).await
    }

    /// VSIM-003: LinkLoss - the simulator disappears halfway through.
    ///
    /// **Assertion**: every vehicle goes offline and stops polling, and the
    /// forward key then moves it at the manual speed.
    async fn run_link_loss(&self, config: &ViewerConfig) -> ScenarioResult {
        info!("VSIM-003: LinkLoss");

        let oracle = oracle_for(config, |index| FlightPlan::Hover {
            position: [index as f64 * 3.0, 0.0, 2.0],
            yaw_rad: 0.0,
        });
        let mut session = self.session(ScenarioId::LinkLoss, config, oracle, SessionOptions::default());
        let mut failures = Vec::new();

        session.connect().await;
        let half = self.duration() / 2;
        session.run_for(half);

        let severed_at = session.now().as_secs_f64();
        session.sever_link();
        session.keys.press(&config.keys.forward);
        session.run_for(half);
        let offline_secs = session.now().as_secs_f64() - severed_at;

        for vehicle in &session.viewer().vehicles {
            if vehicle.link_state() != LinkState::Offline {
                failures.push(format!("{} still online after link loss", vehicle.name()));
            }
            if vehicle.is_polling() {
                failures.push(format!("{} still polling after link loss", vehicle.name()));
            }

            let truth_x = session
                .oracle()
                .position_at(vehicle.name(), severed_at)
                .map_or(0.0, |p| p.x);
            let x = session
                .viewer()
                .scene
                .get(vehicle.root())
                .map_or(truth_x, |e| e.pose().position.x);
            // Loss is only noticed at the next poll tick
            let manual_secs = offline_secs - vehicle.config().poll_interval_ms as f64 / 1000.0 - MAX_FRAME_DT;
            let expected = vehicle.config().manual.move_speed * manual_secs.max(0.0);
            if x - truth_x < expected - EPSILON {
                failures.push(format!(
                    "{} moved {:.3}m under manual control, expected at least {:.3}m",
                    vehicle.name(),
                    x - truth_x,
                    expected
                ));
            }
        }

        self.finish(ScenarioId::LinkLoss, session, failures).await
    }

    /// VSIM-004: Offline - the simulator never answers.
    ///
    /// **Assertion**: no vehicle polls, and holding forward moves each one
    /// by exactly move_speed × Σdt.
    async fn run_offline(&self, config: &ViewerConfig) -> ScenarioResult {
        info!("VSIM-004: Offline");

        let oracle = oracle_for(config, circuit_plan);
        let options = SessionOptions {
            refuse_connect: true,
            ..Default::default()
        };
        let mut session = self.session(ScenarioId::Offline, config, oracle, options);
        let mut failures = Vec::new();

        if session.connect().await != 0 {
            failures.push("a vehicle came online without a link".to_string());
        }

        let start: Vec<f64> = config
            .drones
            .iter()
            .map(|d| d.initial_pose().position.x)
            .collect();
        session.keys.press(&config.keys.forward);
        session.run_for(self.duration());

        let elapsed = session.stats().total_dt;
        for (vehicle, start_x) in session.viewer().vehicles.iter().zip(start) {
            if vehicle.poll_stats().polls > 0 {
                failures.push(format!("{} polled without a link", vehicle.name()));
            }
            let x = session
                .viewer()
                .scene
                .get(vehicle.root())
                .map_or(start_x, |e| e.pose().position.x);
            let expected = vehicle.config().manual.move_speed * elapsed;
            if ((x - start_x) - expected).abs() > EPSILON {
                failures.push(format!(
                    "{} moved {:.6}m, expected {:.6}m",
                    vehicle.name(),
                    x - start_x,
                    expected
                ));
            }
        }
        if session.stats().polls > 0 {
            failures.push(format!("{} polls ran offline", session.stats().polls));
        }

        self.finish(ScenarioId::Offline, session, failures).await
    }

    /// VSIM-005: Jitter - lossy link, erratic frames.
    ///
    /// **Assertion**: every frame delta stays within the clamp, the poll
    /// cadence is unaffected by frame timing, and the display error is
    /// bounded by how long ago the last pose actually arrived.
    async fn run_jitter(&self, config: &ViewerConfig) -> ScenarioResult {
        info!("VSIM-005: Jitter");

        let oracle = oracle_for(config, circuit_plan);
        let speed = max_speed(&oracle);
        let options = SessionOptions {
            frame_jitter: Some((Duration::from_millis(1), Duration::from_millis(120))),
            drop_rate: 0.3,
            ..Default::default()
        };
        let mut session = self.session(ScenarioId::Jitter, config, oracle, options);
        let mut failures = Vec::new();

        session.connect().await;
        session.run_for(self.duration());

        let stats = session.stats().clone();
        if stats.min_dt < MIN_FRAME_DT || stats.max_dt > MAX_FRAME_DT {
            failures.push(format!(
                "frame dt range [{:.5}, {:.5}] escapes the clamp",
                stats.min_dt, stats.max_dt
            ));
        }

        let end = session.now().as_secs_f64();
        for vehicle in &session.viewer().vehicles {
            let interval = vehicle.config().poll_interval_ms.max(1) as f64 / 1000.0;
            let expected = (end / interval + EPSILON).floor() as u64;
            let polls = vehicle.poll_stats().polls;
            if polls.abs_diff(expected) > 1 {
                failures.push(format!("{} ran {} polls, expected {}", vehicle.name(), polls, expected));
            }
        }

        let error_bound = speed * stats.max_staleness + EPSILON;
        if stats.max_error > error_bound {
            failures.push(format!(
                "error {:.3}m exceeds {:.3}m for {:.3}s staleness",
                stats.max_error, error_bound, stats.max_staleness
            ));
        }

        self.finish(ScenarioId::Jitter, session, failures).await
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    fn session(
        &self,
        scenario: ScenarioId,
        config: &ViewerConfig,
        oracle: FlightOracle,
        options: SessionOptions,
    ) -> ViewerSession {
        let options = SessionOptions {
            seed: self.seed,
            export_every: self.export_every,
            ..options
        };
        let logger = if self.visualize {
            RerunLogger::new("aeroview_sim")
        } else {
            RerunLogger::disabled()
        };
        let mut session =
            ViewerSession::new(config, &mut HeadlessLoader::new(), oracle, options).with_logger(logger);
        if self.export_every > 0 {
            session.start_export(scenario.name());
        }
        session
    }

    async fn finish(
        &self,
        scenario: ScenarioId,
        mut session: ViewerSession,
        failures: Vec<String>,
    ) -> ScenarioResult {
        let passed = failures.is_empty();
        let stats = session.stats().clone();
        let final_online = session
            .viewer()
            .vehicles
            .iter()
            .filter(|v| v.link_state() == LinkState::Online)
            .count();

        let mut metrics = ScenarioMetrics {
            frames: stats.frames,
            polls: stats.polls,
            dropped: session.link().transport().stats().dropped,
            full_renders: session.renderer().full_renders,
            inset_renders: session.renderer().inset_renders,
            max_error: stats.max_error,
            max_staleness: stats.max_staleness,
            min_dt: if stats.frames > 0 { stats.min_dt } else { 0.0 },
            max_dt: stats.max_dt,
            ..Default::default()
        };
        for vehicle in &session.viewer().vehicles {
            let poll = vehicle.poll_stats();
            metrics.pose_updates += poll.pose_updates;
            metrics.misses += poll.misses;
        }

        let final_time_secs = session.now().as_secs_f64();
        session.shutdown().await;

        let export = session.take_export().map(|mut export| {
            export.finalize(passed);
            export
        });

        if passed {
            debug!("{} passed after {} frames", scenario.name(), stats.frames);
        } else {
            warn!("{} failed: {}", scenario.name(), failures.join("; "));
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_frames: stats.frames,
            final_time_secs,
            final_online,
            failure_reason: if passed { None } else { Some(failures.join("; ")) },
            metrics,
            export,
        }
    }

    fn aborted(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        warn!("{} aborted: {}", scenario.name(), reason);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_frames: 0,
            final_time_secs: 0.0,
            final_online: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
            export: None,
        }
    }
}

/// One plan per configured vehicle, in config order.
fn oracle_for(config: &ViewerConfig, plan: impl Fn(usize) -> FlightPlan) -> FlightOracle {
    let mut oracle = FlightOracle::new();
    for (index, drone) in config.drones.iter().enumerate() {
        oracle.add_vehicle(&drone.name, plan(index), SCRIPTED_DUTY);
    }
    oracle
}

fn circuit_plan(index: usize) -> FlightPlan {
    FlightPlan::Circuit {
        center: [index as f64 * 30.0, 0.0, 5.0],
        radius: 10.0,
        angular_speed: 0.25,
    }
}

fn max_speed(oracle: &FlightOracle) -> f64 {
    oracle
        .vehicles()
        .iter()
        .map(|v| v.plan.speed())
        .fold(0.0, f64::max)
}

fn max_poll_interval(config: &ViewerConfig) -> f64 {
    config
        .drones
        .iter()
        .map(|d| d.poll_interval_ms as f64 / 1000.0)
        .fold(0.0, f64::max)
}

fn check_renders(session: &ViewerSession, failures: &mut Vec<String>) {
    let frames = session.frames();
    let insets: u64 = session
        .viewer()
        .vehicles
        .iter()
        .map(|v| v.insets().len() as u64)
        .sum();
    let renderer = session.renderer();

    if renderer.full_renders != frames {
        failures.push(format!("{} full renders for {} frames", renderer.full_renders, frames));
    }
    if renderer.inset_renders != frames * insets {
        failures.push(format!(
            "{} inset renders, expected {}",
            renderer.inset_renders,
            frames * insets
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hover_scenario() {
        let runner = ScenarioRunner::new(42).with_duration(1.0);

        let result = runner.run(ScenarioId::Hover);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_online, 1);
        assert!(result.metrics.pose_updates > 0);
        assert_eq!(result.metrics.full_renders, result.total_frames);
    }

    #[test]
    fn test_circuit_scenario() {
        let result = ScenarioRunner::new(42).with_duration(2.0).run(ScenarioId::Circuit);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.max_error > 0.0);
    }

    #[test]
    fn test_link_loss_scenario() {
        let result = ScenarioRunner::new(42).with_duration(2.0).run(ScenarioId::LinkLoss);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_online, 0);
    }

    #[test]
    fn test_offline_scenario() {
        let result = ScenarioRunner::new(7).with_duration(1.0).run(ScenarioId::Offline);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.polls, 0);
    }

    #[test]
    fn test_jitter_deterministic() {
        // Same seed should give the same drops and frame timing
        let runner1 = ScenarioRunner::new(42).with_duration(2.0);
        let runner2 = ScenarioRunner::new(42).with_duration(2.0);

        let result1 = runner1.run(ScenarioId::Jitter);
        let result2 = runner2.run(ScenarioId::Jitter);

        assert!(result1.passed, "{:?}", result1.failure_reason);
        assert_eq!(result1.total_frames, result2.total_frames);
        assert_eq!(result1.metrics.dropped, result2.metrics.dropped);
        assert_eq!(result1.metrics.misses, result2.metrics.misses);
    }

    #[test]
    fn test_export_collects_frames() {
        let result = ScenarioRunner::new(42)
            .with_duration(0.5)
            .with_export(5)
            .run(ScenarioId::Hover);

        let export = result.export.expect("export requested");
        assert!(export.passed);
        assert!(!export.frames.is_empty());
        assert_eq!(export.scenario, "hover");
    }
}
