//! Per-vehicle controller: scene construction, telemetry polling and the
//! per-frame pose/rotor update.
//!
//! # Modes
//!
//! ```text
//!              attach_telemetry() ok
//!   Offline  ------------------------>  Online
//!  (manual)  <------------------------ (telemetry)
//!              link observed down / teardown
//! ```
//!
//! Online, the poll callback writes the latest decoded pose and feeds
//! actuator duty into the smoother; the frame callback applies both.
//! Offline, held keys drive the root directly and a private integrator
//! drives the rotors.

use crate::config::{InsetWindow, KeyBindings, ModelConfig, VehicleConfig};
use crate::error::BuildError;
use crate::input::{axis, InputState};
use crate::poll::PollTimer;
use crate::pose::Pose;
use crate::render::{AssetLoader, CameraPayload, Projection};
use crate::scene::{EntityId, Payload, SceneGraph};
use crate::smoother::TelemetrySmoother;
use crate::telemetry::{
    decode_actuators, decode_game, decode_pose, ACTUATOR_CHANNEL, GAME_CHANNEL, POSE_CHANNEL,
};
use aeroview_env::{SharedConnection, TelemetryTransport};
use nalgebra::Vector3;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which source drives the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Manual fallback
    Offline,
    /// Telemetry-driven
    Online,
}

/// A camera mount rendered into an inset viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsetCamera {
    /// Entity carrying the `Camera` payload
    pub view: EntityId,

    /// Mount the gimbal input tilts
    pub mount: EntityId,

    pub window: InsetWindow,
}

/// Poll outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub polls: u64,
    pub pose_updates: u64,
    pub actuator_updates: u64,

    /// Polls where the pose channel yielded nothing decodable
    pub misses: u64,
}

pub struct VehicleController<T: TelemetryTransport> {
    name: String,
    config: VehicleConfig,
    keys: KeyBindings,

    root: EntityId,
    rotors: Vec<EntityId>,
    camera_mounts: Vec<EntityId>,
    insets: Vec<InsetCamera>,

    link: Option<Arc<SharedConnection<T>>>,
    link_state: LinkState,
    poll_timer: Option<PollTimer>,

    latest_pose: Option<Pose>,
    smoother: TelemetrySmoother,
    gimbal_input: f64,
    stats: PollStats,

    /// Manual-mode rotor rate [rad/s]
    manual_rotor_rate: f64,
}

struct Parts {
    rotors: Vec<EntityId>,
    camera_mounts: Vec<EntityId>,
    insets: Vec<InsetCamera>,
}

impl<T: TelemetryTransport> VehicleController<T> {
    /// Validates `config` and builds the vehicle's entity tree.
    ///
    /// Any failure leaves the scene exactly as it was.
    pub fn build(
        scene: &mut SceneGraph,
        loader: &mut dyn AssetLoader,
        config: &VehicleConfig,
        keys: &KeyBindings,
    ) -> Result<Self, BuildError> {
        config
            .validate()
            .map_err(|e| BuildError::config(&config.name, e))?;

        let root = scene.spawn(&config.name);
        if let Some(entity) = scene.get_mut(root) {
            entity.set_absolute_pose(config.initial_pose());
        }

        let parts = match populate(scene, loader, root, config) {
            Ok(parts) => parts,
            Err(err) => {
                scene.despawn(root);
                warn!("Vehicle {} not added: {}", config.name, err);
                return Err(err);
            }
        };

        info!(
            "Built vehicle {} ({} rotors, {} camera mounts, {} insets)",
            config.name,
            parts.rotors.len(),
            parts.camera_mounts.len(),
            parts.insets.len()
        );

        Ok(Self {
            name: config.name.clone(),
            config: config.clone(),
            keys: keys.clone(),
            root,
            rotors: parts.rotors,
            camera_mounts: parts.camera_mounts,
            insets: parts.insets,
            link: None,
            link_state: LinkState::Offline,
            poll_timer: None,
            latest_pose: None,
            smoother: TelemetrySmoother::default(),
            gimbal_input: 0.0,
            stats: PollStats::default(),
            manual_rotor_rate: 0.0,
        })
    }

    /// Takes a share of `link` and declares the vehicle's channels.
    ///
    /// A failed connection is not an error for the caller: the vehicle
    /// stays in manual fallback and a warning is logged.
    pub async fn attach_telemetry(
        &mut self,
        link: Arc<SharedConnection<T>>,
        now: Duration,
    ) -> LinkState {
        if self.link.is_some() {
            return self.link_state;
        }

        if let Err(err) = link.acquire().await {
            warn!("{}: telemetry unavailable, using manual control: {}", self.name, err);
            self.link_state = LinkState::Offline;
            return self.link_state;
        }

        for channel in [POSE_CHANNEL, ACTUATOR_CHANNEL] {
            if let Err(err) = link.transport().declare_readable(&self.name, channel).await {
                warn!("{}: cannot read {}, using manual control: {}", self.name, channel, err);
                link.release().await;
                self.link_state = LinkState::Offline;
                return self.link_state;
            }
        }
        // Game controller is optional
        if let Err(err) = link.transport().declare_readable(&self.name, GAME_CHANNEL).await {
            debug!("{}: no game controller channel: {}", self.name, err);
        }

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        self.poll_timer = Some(PollTimer::new(interval, now));
        self.link = Some(link);
        self.link_state = LinkState::Online;
        info!("{}: telemetry attached, polling every {:?}", self.name, interval);
        self.link_state
    }

    /// One poll step. Missing or short buffers leave the previous values in
    /// place. Does nothing unless the vehicle is online.
    pub fn poll(&mut self, now_secs: f64) {
        if self.link_state != LinkState::Online {
            return;
        }
        let link = match &self.link {
            Some(link) => Arc::clone(link),
            None => return,
        };
        if !link.is_connected() {
            self.on_link_lost();
            return;
        }

        self.stats.polls += 1;
        let transport = link.transport();

        match transport
            .read_raw(&self.name, POSE_CHANNEL)
            .as_deref()
            .and_then(decode_pose)
        {
            Some(sample) => {
                self.latest_pose = Some(sample.to_pose());
                self.stats.pose_updates += 1;
            }
            None => self.stats.misses += 1,
        }

        let duty = transport
            .read_raw(&self.name, ACTUATOR_CHANNEL)
            .as_deref()
            .and_then(decode_actuators)
            .and_then(|msg| msg.average_duty(&self.config.motor_channels));
        if let Some(duty) = duty {
            self.smoother.add_sample(duty * self.config.rotor_scale, now_secs);
            self.stats.actuator_updates += 1;
        }

        if let Some(game) = transport
            .read_raw(&self.name, GAME_CHANNEL)
            .as_deref()
            .and_then(decode_game)
        {
            self.gimbal_input = game.gimbal_pitch_input();
        }

        debug!(
            "{}: poll #{} pose={:?} rate={:.2}",
            self.name,
            self.stats.polls,
            self.latest_pose.map(|p| p.position),
            self.smoother.current_rate()
        );
    }

    /// Runs every poll that is due at `now`. Returns how many ran.
    pub fn run_due_polls(&mut self, now: Duration) -> u32 {
        let mut ran = 0;
        while self
            .poll_timer
            .as_mut()
            .map_or(false, |timer| timer.take_due(now))
        {
            self.poll(now.as_secs_f64());
            ran += 1;
        }
        ran
    }

    /// Per-frame update with an already clamped `dt`.
    pub fn update(&mut self, scene: &mut SceneGraph, dt: f64, now_secs: f64, input: &impl InputState) {
        match self.link_state {
            LinkState::Online => self.apply_telemetry(scene, dt, now_secs),
            LinkState::Offline => self.apply_manual(scene, dt, input),
        }
        self.apply_gimbal(scene, dt);
    }

    /// Cancels polling, gives back the connection share and removes the
    /// vehicle's entities.
    pub async fn teardown(mut self, scene: &mut SceneGraph) {
        if let Some(timer) = self.poll_timer.as_mut() {
            timer.cancel();
        }
        if let Some(link) = self.link.take() {
            link.release().await;
        }
        let removed = scene.despawn(self.root);
        info!("{}: torn down ({} entities removed)", self.name, removed);
    }

    fn apply_telemetry(&mut self, scene: &mut SceneGraph, dt: f64, now_secs: f64) {
        if let (Some(pose), Some(root)) = (self.latest_pose, scene.get_mut(self.root)) {
            root.set_absolute_pose(pose);
        }

        self.smoother.purge(now_secs);
        let rate = self.smoother.current_rate();
        if rate == 0.0 {
            return;
        }

        // Alternate direction for counter-rotating pairs
        let d = rate * dt;
        for (index, rotor) in self.rotors.iter().enumerate() {
            let sign = if index % 2 == 0 { -1.0 } else { 1.0 };
            if let Some(entity) = scene.get_mut(*rotor) {
                entity.spin_local(&Vector3::new(0.0, sign * d, 0.0));
            }
        }
    }

    fn apply_manual(&mut self, scene: &mut SceneGraph, dt: f64, input: &impl InputState) {
        let keys = &self.keys;
        let tuning = self.config.manual;

        let step = tuning.move_speed * dt;
        let delta = Vector3::new(
            axis(input, &keys.back, &keys.forward) * step,
            axis(input, &keys.right, &keys.left) * step,
            axis(input, &keys.down, &keys.up) * step,
        );
        let yaw = axis(input, &keys.yaw_right, &keys.yaw_left) * tuning.yaw_rate_deg * dt;

        if let Some(root) = scene.get_mut(self.root) {
            if delta != Vector3::zeros() {
                root.translate(&delta);
            }
            if yaw != 0.0 {
                root.rotate(&Vector3::new(0.0, 0.0, yaw));
            }
        }

        self.manual_rotor_rate +=
            axis(input, &keys.rotor_slower, &keys.rotor_faster) * tuning.rotor_accel * dt;
        if input.is_held(&keys.rotor_stop) {
            self.manual_rotor_rate = 0.0;
        }

        if self.manual_rotor_rate != 0.0 {
            let d = self.manual_rotor_rate * dt;
            for rotor in &self.rotors {
                if let Some(entity) = scene.get_mut(*rotor) {
                    entity.spin_local(&Vector3::new(0.0, d, 0.0));
                }
            }
        }
    }

    fn apply_gimbal(&mut self, scene: &mut SceneGraph, dt: f64) {
        if self.gimbal_input == 0.0 {
            return;
        }
        let pitch = self.gimbal_input * self.config.gimbal_pitch_rate_deg * dt;
        for inset in &self.insets {
            if let Some(mount) = scene.get_mut(inset.mount) {
                mount.rotate(&Vector3::new(0.0, pitch, 0.0));
            }
        }
    }

    fn on_link_lost(&mut self) {
        warn!("{}: telemetry link lost, switching to manual control", self.name);
        self.link_state = LinkState::Offline;
        if let Some(timer) = self.poll_timer.as_mut() {
            timer.cancel();
        }
        self.gimbal_input = 0.0;
        self.smoother.clear();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn rotors(&self) -> &[EntityId] {
        &self.rotors
    }

    pub fn camera_mounts(&self) -> &[EntityId] {
        &self.camera_mounts
    }

    pub fn insets(&self) -> &[InsetCamera] {
        &self.insets
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn latest_pose(&self) -> Option<&Pose> {
        self.latest_pose.as_ref()
    }

    /// Rate currently driving the rotors [rad/s].
    pub fn rotor_rate(&self) -> f64 {
        match self.link_state {
            LinkState::Online => self.smoother.current_rate(),
            LinkState::Offline => self.manual_rotor_rate,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll_timer.as_ref().map_or(false, PollTimer::is_active)
    }

    pub fn poll_stats(&self) -> PollStats {
        self.stats
    }

    /// Overrides the game-controller pitch input (-1..1).
    pub fn set_gimbal_input(&mut self, input: f64) {
        self.gimbal_input = input.clamp(-1.0, 1.0);
    }
}

fn populate(
    scene: &mut SceneGraph,
    loader: &mut dyn AssetLoader,
    root: EntityId,
    config: &VehicleConfig,
) -> Result<Parts, BuildError> {
    attach_model(scene, loader, root, &config.name, &config.model)?;

    let mut rotors = Vec::with_capacity(config.rotors.len());
    for rotor in &config.rotors {
        let id = spawn_mounted(scene, root, &rotor.name, Pose::from_arrays(rotor.pos, rotor.hpr));
        attach_model(scene, loader, id, &rotor.name, &rotor.model)?;
        rotors.push(id);
    }

    let mut camera_mounts = Vec::with_capacity(config.cameras.len());
    let mut insets = Vec::new();
    for camera in &config.cameras {
        let mount = spawn_mounted(scene, root, &camera.name, Pose::from_arrays(camera.pos, camera.hpr));
        attach_model(scene, loader, mount, &camera.name, &camera.model)?;
        camera_mounts.push(mount);

        if let Some(window) = camera.window {
            let view = spawn_mounted(scene, mount, &format!("{}_view", camera.name), Pose::identity());
            if let Some(entity) = scene.get_mut(view) {
                entity.set_payload(Payload::Camera(CameraPayload {
                    projection: Projection::new(camera.fov, camera.near, camera.far, 1.0),
                    inset: Some(window),
                }));
            }
            insets.push(InsetCamera { view, mount, window });
        }
    }

    Ok(Parts {
        rotors,
        camera_mounts,
        insets,
    })
}

fn spawn_mounted(scene: &mut SceneGraph, parent: EntityId, name: &str, pose: Pose) -> EntityId {
    let id = scene.spawn(name);
    scene.add_child(parent, id);
    if let Some(entity) = scene.get_mut(id) {
        entity.set_absolute_pose(pose);
    }
    id
}

/// Loads `model` and hangs it off a `<name>_model` offset child of `parent`.
fn attach_model(
    scene: &mut SceneGraph,
    loader: &mut dyn AssetLoader,
    parent: EntityId,
    entity: &str,
    model: &ModelConfig,
) -> Result<(), BuildError> {
    let asset = loader
        .load(&model.model_path)
        .map_err(|e| BuildError::asset(entity, e))?;

    if let Some(offset) = scene.spawn_model_offset(parent, model.offset()) {
        if let Some(node) = scene.get_mut(offset) {
            node.set_payload(Payload::VisualMesh(asset.handle));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraMountConfig, ManualTuning, RotorConfig};
    use crate::input::KeyState;
    use crate::render::{AssetError, LoadedAsset, VisualHandle};
    use crate::telemetry::{encode_actuators, encode_game, encode_pose, BUTTON_GIMBAL_DOWN};
    use aeroview_env::EnvError;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryTransport {
        connected: AtomicBool,
        refuse: bool,
        buffers: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    impl MemoryTransport {
        fn publish(&self, entity: &str, channel: &str, buf: Vec<u8>) {
            self.buffers
                .lock()
                .unwrap()
                .insert((entity.to_string(), channel.to_string()), buf);
        }

        fn retract(&self, entity: &str, channel: &str) {
            self.buffers
                .lock()
                .unwrap()
                .remove(&(entity.to_string(), channel.to_string()));
        }
    }

    #[async_trait]
    impl TelemetryTransport for MemoryTransport {
        async fn connect(&self) -> Result<(), EnvError> {
            if self.refuse {
                return Err(EnvError::connection("refused"));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        async fn declare_readable(&self, _entity: &str, _channel: &str) -> Result<(), EnvError> {
            Ok(())
        }

        fn read_raw(&self, entity: &str, channel: &str) -> Option<Vec<u8>> {
            self.buffers
                .lock()
                .unwrap()
                .get(&(entity.to_string(), channel.to_string()))
                .cloned()
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct StubLoader {
        fail_on: Option<String>,
        next: u64,
    }

    impl AssetLoader for StubLoader {
        fn load(&mut self, path: &str) -> Result<LoadedAsset, AssetError> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(AssetError::load_failed(path, "not found"));
            }
            self.next += 1;
            Ok(LoadedAsset {
                handle: VisualHandle(self.next),
                extent: Vector3::new(1.0, 1.0, 1.0),
            })
        }
    }

    fn model(path: &str) -> ModelConfig {
        ModelConfig {
            model_path: path.to_string(),
            pos: [0.0; 3],
            hpr: [0.0; 3],
        }
    }

    fn quad() -> VehicleConfig {
        let rotor = |name: &str, x: f64, y: f64| RotorConfig {
            name: name.to_string(),
            model: model("rotor.glb"),
            pos: [x, y, 0.02],
            hpr: [0.0; 3],
        };
        VehicleConfig {
            name: "Drone".to_string(),
            model: model("drone.glb"),
            pos: None,
            hpr: None,
            rotors: vec![
                rotor("rotor1", 0.1, 0.1),
                rotor("rotor2", -0.1, 0.1),
                rotor("rotor3", -0.1, -0.1),
                rotor("rotor4", 0.1, -0.1),
            ],
            cameras: vec![CameraMountConfig {
                name: "front".to_string(),
                model: model("cam.glb"),
                pos: [0.1, 0.0, 0.0],
                hpr: [0.0; 3],
                fov: 70.0,
                near: 0.1,
                far: 1000.0,
                window: Some(InsetWindow {
                    x: 0.7,
                    y: 0.7,
                    width: 0.25,
                    height: 0.25,
                }),
            }],
            motor_channels: vec![0, 1, 2, 3],
            rotor_scale: 200.0,
            poll_interval_ms: 100,
            gimbal_pitch_rate_deg: 45.0,
            manual: ManualTuning::default(),
        }
    }

    fn build(scene: &mut SceneGraph) -> VehicleController<MemoryTransport> {
        VehicleController::build(scene, &mut StubLoader::default(), &quad(), &KeyBindings::default())
            .unwrap()
    }

    #[test]
    fn test_build_creates_tree() {
        let mut scene = SceneGraph::new();
        let vehicle = build(&mut scene);

        // root + model, 4 x (rotor + model), mount + model + view
        assert_eq!(scene.len(), 2 + 8 + 3);
        assert_eq!(vehicle.rotors().len(), 4);
        assert_eq!(vehicle.insets().len(), 1);
        assert_eq!(vehicle.link_state(), LinkState::Offline);

        let view = scene.get(vehicle.insets()[0].view).unwrap();
        assert!(matches!(view.payload(), Payload::Camera(CameraPayload { inset: Some(_), .. })));
        assert!(scene.find_by_name("rotor3_model").is_some());
    }

    #[test]
    fn test_asset_failure_leaves_no_partial_vehicle() {
        let mut scene = SceneGraph::new();
        scene.spawn("ground");
        let mut loader = StubLoader {
            fail_on: Some("cam.glb".to_string()),
            ..Default::default()
        };

        let err = VehicleController::<MemoryTransport>::build(
            &mut scene,
            &mut loader,
            &quad(),
            &KeyBindings::default(),
        )
        .err()
        .unwrap();

        assert_eq!(err.entity(), "front");
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_spawning() {
        let mut scene = SceneGraph::new();
        let mut config = quad();
        config.motor_channels.clear();

        let err = VehicleController::<MemoryTransport>::build(
            &mut scene,
            &mut StubLoader::default(),
            &config,
            &KeyBindings::default(),
        )
        .err()
        .unwrap();

        assert!(matches!(err, BuildError::Config { .. }));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_manual_forward_two_metres_per_second() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let mut keys = KeyState::new();
        keys.press("w");

        let dt = 1.0 / 60.0;
        for frame in 0..60 {
            vehicle.update(&mut scene, dt, frame as f64 * dt, &keys);
        }

        let pose = scene.get(vehicle.root()).unwrap().pose();
        assert_relative_eq!(pose.position.x, 2.0, epsilon = 0.01);
        assert_relative_eq!(pose.position.y, 0.0);
    }

    #[test]
    fn test_manual_rotor_integrator() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let mut keys = KeyState::new();

        keys.press("k");
        for _ in 0..10 {
            vehicle.update(&mut scene, 0.05, 0.0, &keys);
        }
        assert_relative_eq!(vehicle.rotor_rate(), 10.0, epsilon = 1e-9);

        // Same spin on every rotor in manual mode
        let first = *scene.get(vehicle.rotors()[0]).unwrap().spin();
        let second = *scene.get(vehicle.rotors()[1]).unwrap().spin();
        assert!(first.angle_to(&second) < 1e-12);

        keys.release("k");
        keys.press("l");
        vehicle.update(&mut scene, 0.05, 0.0, &keys);
        assert_eq!(vehicle.rotor_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_failed_connect_falls_back_to_manual() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport {
            refuse: true,
            ..Default::default()
        });

        let state = vehicle.attach_telemetry(link.clone(), Duration::ZERO).await;

        assert_eq!(state, LinkState::Offline);
        assert!(!vehicle.is_polling());
        assert_eq!(link.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_polls_apply_pose_and_counter_rotate_rotors() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport::default());
        assert_eq!(
            vehicle.attach_telemetry(link.clone(), Duration::ZERO).await,
            LinkState::Online
        );

        let transport = link.transport();
        transport.publish("Drone", POSE_CHANNEL, encode_pose(&Vector3::new(3.0, 1.0, 2.0), &Vector3::zeros()));
        transport.publish("Drone", ACTUATOR_CHANNEL, encode_actuators(0, &[0.5, 0.5, 0.5, 0.5]));

        // Frame before the first tick keeps the initial pose
        vehicle.update(&mut scene, 0.016, 0.05, &KeyState::new());
        assert_eq!(scene.get(vehicle.root()).unwrap().pose().position, Vector3::zeros());

        assert_eq!(vehicle.run_due_polls(Duration::from_millis(250)), 2);
        vehicle.update(&mut scene, 0.016, 0.25, &KeyState::new());

        let root = scene.get(vehicle.root()).unwrap();
        assert_eq!(root.pose().position, Vector3::new(3.0, 1.0, 2.0));
        assert_relative_eq!(vehicle.rotor_rate(), 100.0, epsilon = 1e-6);

        // Even and odd rotors spin in opposite directions
        let even = scene.get(vehicle.rotors()[0]).unwrap().spin();
        let odd = scene.get(vehicle.rotors()[1]).unwrap().spin();
        assert!(even.angle_to(&odd.inverse()) < 1e-9);
        assert_relative_eq!(even.angle(), 1.6, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_rotor_spin_decays_after_motor_samples_stop() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport::default());
        vehicle.attach_telemetry(link.clone(), Duration::ZERO).await;

        let transport = link.transport();
        transport.publish("Drone", POSE_CHANNEL, encode_pose(&Vector3::zeros(), &Vector3::zeros()));
        transport.publish("Drone", ACTUATOR_CHANNEL, encode_actuators(0, &[0.5, 0.5, 0.5, 0.5]));

        let keys = KeyState::new();
        let mut spins = Vec::new();
        for step in 1..=40u64 {
            // Motor data stops after the 0.4 s poll; pose keeps flowing
            if step == 10 {
                transport.retract("Drone", ACTUATOR_CHANNEL);
            }
            let now = Duration::from_millis(step * 50);
            vehicle.run_due_polls(now);
            vehicle.update(&mut scene, 0.05, now.as_secs_f64(), &keys);
            if step == 9 {
                assert_relative_eq!(vehicle.rotor_rate(), 100.0, epsilon = 1e-6);
            }
            spins.push(*scene.get(vehicle.rotors()[0]).unwrap().spin());
        }

        assert_eq!(vehicle.poll_stats().actuator_updates, 4);
        assert_eq!(vehicle.poll_stats().pose_updates, 20);
        assert_eq!(vehicle.rotor_rate(), 0.0);

        // Window is 1 s, so nothing moves once the 0.4 s sample is older than that
        let settled = &spins[29..];
        assert!(settled.iter().all(|spin| *spin == settled[0]));
        assert_ne!(spins[8], settled[0]);
    }

    #[tokio::test]
    async fn test_undecodable_poll_is_a_no_op() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport::default());
        vehicle.attach_telemetry(link.clone(), Duration::ZERO).await;

        link.transport().publish("Drone", POSE_CHANNEL, vec![1, 2, 3]);
        vehicle.poll(0.1);

        assert!(vehicle.latest_pose().is_none());
        assert_eq!(vehicle.poll_stats().misses, 1);
        assert_eq!(vehicle.link_state(), LinkState::Online);
    }

    #[tokio::test]
    async fn test_link_loss_switches_to_manual() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport::default());
        vehicle.attach_telemetry(link.clone(), Duration::ZERO).await;

        link.transport().disconnect().await;
        vehicle.run_due_polls(Duration::from_millis(100));

        assert_eq!(vehicle.link_state(), LinkState::Offline);
        assert!(!vehicle.is_polling());
        assert_eq!(vehicle.run_due_polls(Duration::from_secs(10)), 0);
    }

    #[tokio::test]
    async fn test_poll_after_link_loss_reads_nothing() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport::default());
        vehicle.attach_telemetry(link.clone(), Duration::ZERO).await;

        link.transport().disconnect().await;
        vehicle.poll(0.1);
        assert_eq!(vehicle.link_state(), LinkState::Offline);

        // Data arriving on a reconnected transport stays unread while offline
        link.transport().connect().await.unwrap();
        link.transport().publish("Drone", POSE_CHANNEL, encode_pose(&Vector3::new(1.0, 2.0, 3.0), &Vector3::zeros()));
        link.transport().publish("Drone", ACTUATOR_CHANNEL, encode_actuators(0, &[0.5, 0.5, 0.5, 0.5]));
        vehicle.poll(0.2);

        assert_eq!(vehicle.poll_stats().polls, 0);
        assert_eq!(vehicle.poll_stats().misses, 0);
        assert!(vehicle.latest_pose().is_none());
        assert_eq!(vehicle.poll_stats().actuator_updates, 0);
    }

    #[tokio::test]
    async fn test_gimbal_button_tilts_inset_mount() {
        let mut scene = SceneGraph::new();
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport::default());
        vehicle.attach_telemetry(link.clone(), Duration::ZERO).await;

        let mut buttons = vec![false; 15];
        buttons[BUTTON_GIMBAL_DOWN] = true;
        link.transport().publish("Drone", GAME_CHANNEL, encode_game(&[0.0; 6], &buttons));
        vehicle.poll(0.1);

        vehicle.update(&mut scene, 0.04, 0.14, &KeyState::new());
        let mount = scene.get(vehicle.insets()[0].mount).unwrap();
        assert_relative_eq!(mount.pose().rpy_deg.y, 1.8, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_teardown_releases_and_despawns() {
        let mut scene = SceneGraph::new();
        let other = build(&mut scene);
        let mut vehicle = build(&mut scene);
        let link = SharedConnection::shared(MemoryTransport::default());
        vehicle.attach_telemetry(link.clone(), Duration::ZERO).await;
        let root = vehicle.root();

        vehicle.teardown(&mut scene).await;

        assert!(!scene.contains(root));
        assert!(scene.contains(other.root()));
        assert_eq!(link.user_count().await, 0);
        assert!(!link.is_connected());
    }
}
