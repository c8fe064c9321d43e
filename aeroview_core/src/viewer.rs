//! Scene assembly from a `ViewerConfig`.

use crate::camera::{FollowCamera, OrbitController, OrbitRig};
use crate::config::ViewerConfig;
use crate::environment::{build_environments, build_lights};
use crate::error::BuildError;
use crate::render::AssetLoader;
use crate::scene::{EntityId, SceneGraph};
use crate::vehicle::{LinkState, VehicleController};
use aeroview_env::{SharedConnection, TelemetryTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything one frame touches: the scene, its vehicles and the main camera.
pub struct Viewer<T: TelemetryTransport, O: OrbitController = OrbitRig> {
    pub scene: SceneGraph,
    pub vehicles: Vec<VehicleController<T>>,
    pub camera: FollowCamera<O>,
    pub environments: Vec<EntityId>,
    pub lights: Vec<EntityId>,

    /// Pieces that could not be added; the rest of the scene is unaffected
    pub build_errors: Vec<BuildError>,
}

impl<T: TelemetryTransport> Viewer<T> {
    /// Builds environments, lights, vehicles and the main camera.
    ///
    /// The camera tracks the first vehicle that built successfully.
    pub fn build(config: &ViewerConfig, loader: &mut dyn AssetLoader, aspect: f64) -> Self {
        let mut scene = SceneGraph::new();
        let mut build_errors = Vec::new();

        let mut environments = Vec::new();
        for result in build_environments(&mut scene, loader, &config.environments) {
            match result {
                Ok(id) => environments.push(id),
                Err(err) => build_errors.push(err),
            }
        }
        let lights = build_lights(&mut scene, &config.lights);

        let mut vehicles = Vec::new();
        for drone in &config.drones {
            match VehicleController::build(&mut scene, loader, drone, &config.keys) {
                Ok(vehicle) => vehicles.push(vehicle),
                Err(err) => build_errors.push(err),
            }
        }

        let tracked = vehicles.first().map(VehicleController::root);
        let camera_config = config.main_camera.clone().unwrap_or_default();
        let camera = FollowCamera::from_config(&camera_config, &scene, tracked, aspect);

        info!(
            "Viewer ready: {} vehicles, {} environments, {} lights, {} failures",
            vehicles.len(),
            environments.len(),
            lights.len(),
            build_errors.len()
        );

        Self {
            scene,
            vehicles,
            camera,
            environments,
            lights,
            build_errors,
        }
    }
}

impl<T: TelemetryTransport, O: OrbitController> Viewer<T, O> {
    /// Attaches every vehicle to the shared link. Returns how many came
    /// online; the others run in manual fallback.
    pub async fn attach_telemetry(&mut self, link: &Arc<SharedConnection<T>>, now: Duration) -> usize {
        let mut online = 0;
        for vehicle in &mut self.vehicles {
            if vehicle.attach_telemetry(Arc::clone(link), now).await == LinkState::Online {
                online += 1;
            }
        }
        if online < self.vehicles.len() {
            warn!("{} of {} vehicles in manual fallback", self.vehicles.len() - online, self.vehicles.len());
        }
        online
    }

    /// Poll callback: runs every vehicle's due polls.
    pub fn run_due_polls(&mut self, now: Duration) -> u32 {
        self.vehicles
            .iter_mut()
            .map(|vehicle| vehicle.run_due_polls(now))
            .sum()
    }

    pub fn vehicle(&self, name: &str) -> Option<&VehicleController<T>> {
        self.vehicles.iter().find(|v| v.name() == name)
    }

    /// Tears down every vehicle. Environments stay.
    pub async fn teardown(&mut self) {
        for vehicle in self.vehicles.drain(..) {
            vehicle.teardown(&mut self.scene).await;
        }
        self.camera.set_tracked(None);
    }
}
