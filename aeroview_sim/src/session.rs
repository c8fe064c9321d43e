//! A complete viewer running against the virtual clock.
//!
//! # One Pump
//!
//! ```text
//! advance clock by frame interval (fixed or seeded jitter)
//!   oracle.publish(now)          simulator side
//!   viewer.run_due_polls(now)    poll callbacks (0..n)
//!   frame_loop.frame(now)        frame callback
//!   measure displayed vs truth
//! ```
//!
//! Poll and frame callbacks run on one thread in a reproducible order, so
//! any interleaving a seed produces can be replayed exactly.

use crate::context::SimContext;
use crate::exporter::{ExportFrame, VehicleSample, ViewerExport};
use crate::oracle::FlightOracle;
use crate::renderer::HeadlessRenderer;
use crate::transport::ScriptedTransport;
use crate::visualizer::RerunLogger;
use aeroview_core::render::AssetLoader;
use aeroview_core::{ConfigError, FrameLoop, KeyState, LinkState, Viewer, ViewerConfig};
use aeroview_env::{SharedConnection, ViewerContext};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Built-in quadcopter over a ground plane.
pub const DEMO_CONFIG: &str = r#"{
    "environments": [
        { "name": "ground", "model": "assets/ground.glb", "pos": [0, 0, 0] }
    ],
    "drones": [{
        "name": "Drone",
        "model": { "model_path": "assets/drone.glb", "pos": [0, 0, -0.02] },
        "pos": [0, 0, 0.5],
        "rotors": [
            { "name": "rotor1", "model": { "model_path": "assets/rotor.glb" }, "pos": [ 0.1,  0.1, 0.03] },
            { "name": "rotor2", "model": { "model_path": "assets/rotor.glb" }, "pos": [-0.1,  0.1, 0.03] },
            { "name": "rotor3", "model": { "model_path": "assets/rotor.glb" }, "pos": [-0.1, -0.1, 0.03] },
            { "name": "rotor4", "model": { "model_path": "assets/rotor.glb" }, "pos": [ 0.1, -0.1, 0.03] }
        ],
        "cameras": [{
            "name": "front_camera",
            "model": { "model_path": "assets/camera.glb" },
            "pos": [0.12, 0, 0],
            "window": { "x": 0.7, "y": 0.7, "width": 0.25, "height": 0.25 }
        }]
    }],
    "main_camera": { "position": [-4, 0, 1.5], "followLerpPos": 8, "followLerpTarget": 10 }
}"#;

pub fn demo_config() -> Result<ViewerConfig, ConfigError> {
    ViewerConfig::from_json_str(DEMO_CONFIG)
}

/// Knobs of one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub seed: u64,

    /// Nominal frame interval
    pub frame_interval: Duration,

    /// When set, each frame interval is drawn uniformly from this range
    pub frame_jitter: Option<(Duration, Duration)>,

    /// Probability that a telemetry read misses
    pub drop_rate: f64,

    /// Transport refuses every connection
    pub refuse_connect: bool,

    pub viewport: (u32, u32),

    /// Record every n-th frame for export (0 = off)
    pub export_every: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            frame_interval: Duration::from_micros(16_667),
            frame_jitter: None,
            drop_rate: 0.0,
            refuse_connect: false,
            viewport: (1280, 720),
            export_every: 0,
        }
    }
}

/// Aggregates over every pumped frame.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub frames: u64,
    pub polls: u64,
    pub min_dt: f64,
    pub max_dt: f64,

    /// Sum of clamped frame deltas [s]
    pub total_dt: f64,

    /// Largest displayed-vs-truth distance while online [m]
    pub max_error: f64,

    /// Largest time since the last decoded pose while online [s]
    pub max_staleness: f64,
}

pub struct ViewerSession {
    context: Arc<SimContext>,
    link: Arc<SharedConnection<ScriptedTransport>>,
    viewer: Viewer<ScriptedTransport>,
    frame_loop: FrameLoop,
    renderer: HeadlessRenderer,
    oracle: FlightOracle,
    logger: RerunLogger,
    rng: ChaCha8Rng,
    options: SessionOptions,

    /// Held keys fed to every frame
    pub keys: KeyState,

    /// Per vehicle: (pose updates seen, time of the latest one)
    last_pose: HashMap<String, (u64, Duration)>,
    stats: SessionStats,
    export: Option<ViewerExport>,
    pending_events: Vec<String>,
}

impl ViewerSession {
    pub fn new(
        config: &ViewerConfig,
        loader: &mut dyn AssetLoader,
        oracle: FlightOracle,
        options: SessionOptions,
    ) -> Self {
        let context = SimContext::shared(options.seed);
        // Separate streams for the link and for frame jitter
        let transport = ScriptedTransport::new(options.seed ^ 0x5eed_11f7)
            .with_drop_rate(options.drop_rate);
        transport.refuse_connections(options.refuse_connect);

        let renderer = HeadlessRenderer::new(options.viewport.0, options.viewport.1);
        let viewer = Viewer::build(config, loader, renderer.aspect());

        Self {
            context,
            link: SharedConnection::shared(transport),
            viewer,
            frame_loop: FrameLoop::new(config.keys.clone()),
            renderer,
            oracle,
            logger: RerunLogger::disabled(),
            rng: ChaCha8Rng::seed_from_u64(options.seed),
            options,
            keys: KeyState::new(),
            last_pose: HashMap::new(),
            stats: SessionStats {
                min_dt: f64::INFINITY,
                ..Default::default()
            },
            export: None,
            pending_events: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: RerunLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn start_export(&mut self, scenario: &str) {
        self.export = Some(ViewerExport::new(scenario, self.options.seed));
    }

    pub fn take_export(&mut self) -> Option<ViewerExport> {
        self.export.take()
    }

    /// Attaches every vehicle to the scripted link. Returns how many are online.
    pub async fn connect(&mut self) -> usize {
        let online = self.viewer.attach_telemetry(&self.link, self.context.now()).await;
        self.event(format!("{} vehicles online", online));
        online
    }

    /// Drops the link; vehicles notice on their next poll.
    pub fn sever_link(&mut self) {
        self.link.transport().sever();
        self.event("link severed".to_string());
    }

    /// Advances the clock by one frame interval and runs the callbacks due.
    pub fn pump(&mut self) -> f64 {
        let interval = match self.options.frame_jitter {
            Some((lo, hi)) if hi > lo => self.rng.gen_range(lo..=hi),
            _ => self.options.frame_interval,
        };
        self.context.advance_time(interval);
        let now = self.context.now();
        let now_secs = now.as_secs_f64();

        self.oracle.publish(self.link.transport(), now_secs);
        self.stats.polls += self.viewer.run_due_polls(now) as u64;
        self.note_pose_updates(now);

        let dt = self
            .frame_loop
            .frame(now, &mut self.viewer, &mut self.renderer, &self.keys);

        self.stats.frames += 1;
        self.stats.min_dt = self.stats.min_dt.min(dt);
        self.stats.max_dt = self.stats.max_dt.max(dt);
        self.stats.total_dt += dt;
        self.measure(now, dt);
        dt
    }

    /// Pumps frames until `duration` of virtual time has passed.
    pub fn run_for(&mut self, duration: Duration) -> u64 {
        let end = self.context.now() + duration;
        let mut frames = 0;
        while self.context.now() < end {
            self.pump();
            frames += 1;
        }
        debug!("Pumped {} frames to t={:.3}s", frames, self.context.now_secs());
        frames
    }

    /// Tears every vehicle down; the link closes with the last one.
    pub async fn shutdown(&mut self) {
        self.viewer.teardown().await;
        info!("Session shut down at t={:.3}s", self.context.now_secs());
    }

    fn note_pose_updates(&mut self, now: Duration) {
        for vehicle in &self.viewer.vehicles {
            let updates = vehicle.poll_stats().pose_updates;
            let entry = self
                .last_pose
                .entry(vehicle.name().to_string())
                .or_insert((0, now));
            if updates > entry.0 {
                *entry = (updates, now);
            }
        }
    }

    fn measure(&mut self, now: Duration, dt: f64) {
        let now_secs = now.as_secs_f64();
        let mut samples = Vec::with_capacity(self.viewer.vehicles.len());
        let mut truths = Vec::with_capacity(self.viewer.vehicles.len());
        self.logger.set_time(now_secs);

        for vehicle in &self.viewer.vehicles {
            let pose = match self.viewer.scene.get(vehicle.root()) {
                Some(entity) => *entity.pose(),
                None => continue,
            };
            let online = vehicle.link_state() == LinkState::Online;
            let truth = self.oracle.position_at(vehicle.name(), now_secs);
            if let Some(truth) = truth {
                truths.push((vehicle.name().to_string(), truth));
            }

            if let (true, Some(truth), Some(_)) = (online, truth, vehicle.latest_pose()) {
                self.stats.max_error = self.stats.max_error.max((pose.position - truth).norm());
                if let Some((_, at)) = self.last_pose.get(vehicle.name()) {
                    let staleness = now.saturating_sub(*at).as_secs_f64();
                    self.stats.max_staleness = self.stats.max_staleness.max(staleness);
                }
            }

            self.logger.log_vehicle(vehicle.name(), &pose);
            self.logger.log_rotor_rate(vehicle.name(), vehicle.rotor_rate());

            samples.push(VehicleSample {
                name: vehicle.name().to_string(),
                position: pose.position.into(),
                rpy_deg: pose.rpy_deg.into(),
                truth: truth.map(Into::into),
                online,
                rotor_rate: vehicle.rotor_rate(),
            });
        }

        self.logger.log_ground_truth(&truths);

        let every = self.options.export_every.max(1);
        if let Some(export) = self.export.as_mut() {
            if self.stats.frames % every == 0 || !self.pending_events.is_empty() {
                export.add_frame(ExportFrame {
                    time_sec: now_secs,
                    dt,
                    vehicles: samples,
                    events: std::mem::take(&mut self.pending_events),
                });
            }
        }
    }

    fn event(&mut self, message: String) {
        info!("t={:.3}s {}", self.context.now_secs(), message);
        self.logger.log_event("events", &message);
        self.pending_events.push(message);
    }

    pub fn now(&self) -> Duration {
        self.context.now()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn viewer(&self) -> &Viewer<ScriptedTransport> {
        &self.viewer
    }

    pub fn renderer(&self) -> &HeadlessRenderer {
        &self.renderer
    }

    pub fn oracle(&self) -> &FlightOracle {
        &self.oracle
    }

    pub fn link(&self) -> &Arc<SharedConnection<ScriptedTransport>> {
        &self.link
    }

    pub fn frames(&self) -> u64 {
        self.frame_loop.frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FlightPlan;
    use crate::renderer::HeadlessLoader;
    use approx::assert_relative_eq;

    fn hover_oracle() -> FlightOracle {
        let mut oracle = FlightOracle::new();
        oracle.add_vehicle(
            "Drone",
            FlightPlan::Hover {
                position: [1.0, 2.0, 3.0],
                yaw_rad: 0.0,
            },
            0.5,
        );
        oracle
    }

    fn session(options: SessionOptions) -> ViewerSession {
        let config = demo_config().unwrap();
        ViewerSession::new(&config, &mut HeadlessLoader::new(), hover_oracle(), options)
    }

    #[test]
    fn test_demo_config_builds() {
        let session = session(SessionOptions::default());
        let viewer = session.viewer();

        assert_eq!(viewer.vehicles.len(), 1);
        assert_eq!(viewer.environments.len(), 1);
        assert!(viewer.build_errors.is_empty());
        assert_eq!(viewer.vehicles[0].insets().len(), 1);
    }

    #[tokio::test]
    async fn test_hover_converges_to_truth() {
        let mut session = session(SessionOptions::default());
        assert_eq!(session.connect().await, 1);

        session.run_for(Duration::from_secs(2));

        let vehicle = &session.viewer().vehicles[0];
        let pose = session.viewer().scene.get(vehicle.root()).unwrap().pose();
        assert_relative_eq!(pose.position, nalgebra::Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(vehicle.rotor_rate(), 100.0, epsilon = 1e-4);
        assert_eq!(session.renderer().full_renders, session.frames());
        assert_eq!(session.renderer().inset_renders, session.frames());
    }

    #[tokio::test]
    async fn test_jittered_frames_stay_clamped() {
        let mut session = session(SessionOptions {
            frame_jitter: Some((Duration::ZERO, Duration::from_millis(150))),
            ..Default::default()
        });
        session.connect().await;
        session.run_for(Duration::from_secs(3));

        let stats = session.stats();
        assert!(stats.min_dt >= aeroview_core::frame_loop::MIN_FRAME_DT);
        assert!(stats.max_dt <= aeroview_core::frame_loop::MAX_FRAME_DT);
        // 100 ms cadence regardless of frame timing
        assert!((30..=31).contains(&stats.polls), "polls {}", stats.polls);
    }

    #[tokio::test]
    async fn test_frames_record_oracle_truth() {
        let mut session = session(SessionOptions {
            export_every: 1,
            ..Default::default()
        })
        .with_logger(RerunLogger::disabled());
        session.start_export("truth");
        session.connect().await;
        session.run_for(Duration::from_secs(1));

        let export = session.take_export().unwrap();
        assert_eq!(export.frames.len() as u64, session.frames());
        for frame in &export.frames {
            let sample = &frame.vehicles[0];
            let truth = session.oracle().position_at("Drone", frame.time_sec).unwrap();
            assert_eq!(sample.truth, Some(truth.into()));
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_link() {
        let mut session = session(SessionOptions::default());
        session.connect().await;
        assert!(session.link().is_connected());

        session.shutdown().await;
        assert!(!session.link().is_connected());
        assert!(session.viewer().vehicles.is_empty());
    }
}
