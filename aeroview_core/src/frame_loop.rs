//! Per-display-frame driver.
//!
//! ```text
//! frame(now)
//!   dt = clamp(now - last, MIN_FRAME_DT, MAX_FRAME_DT)
//!   vehicles.update(dt)          telemetry pose / manual keys, rotor spin
//!   standoff keys, toggle key    edge-detected mode switch
//!   camera.update(dt)
//!   renderer.render(full)
//!   renderer.render_inset(...)   one per inset camera, black clear
//! ```

use crate::camera::OrbitController;
use crate::config::KeyBindings;
use crate::input::{axis, InputState};
use crate::render::{CameraView, PixelRect, Renderer};
use crate::scene::{Payload, SceneGraph};
use crate::vehicle::{InsetCamera, VehicleController};
use crate::viewer::Viewer;
use aeroview_env::TelemetryTransport;
use std::time::Duration;
use tracing::debug;

/// Frame delta floor [s].
pub const MIN_FRAME_DT: f64 = 0.0001;

/// Frame delta ceiling [s].
pub const MAX_FRAME_DT: f64 = 0.05;

/// Clear colour of inset viewports.
pub const INSET_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Clamps a raw frame delta into `[MIN_FRAME_DT, MAX_FRAME_DT]`.
pub fn clamp_frame_dt(raw: f64) -> f64 {
    if raw.is_nan() {
        return MIN_FRAME_DT;
    }
    raw.clamp(MIN_FRAME_DT, MAX_FRAME_DT)
}

#[derive(Debug, Clone)]
pub struct FrameLoop {
    last_frame: Option<Duration>,
    toggle_was_held: bool,
    frames: u64,
    keys: KeyBindings,
}

impl FrameLoop {
    pub fn new(keys: KeyBindings) -> Self {
        Self {
            last_frame: None,
            toggle_was_held: false,
            frames: 0,
            keys,
        }
    }

    /// Frame callback at wall-clock `now`. Returns the clamped dt used.
    pub fn frame<T, O>(
        &mut self,
        now: Duration,
        viewer: &mut Viewer<T, O>,
        renderer: &mut dyn Renderer,
        input: &impl InputState,
    ) -> f64
    where
        T: TelemetryTransport,
        O: OrbitController,
    {
        // First frame has no predecessor and gets the floor
        let raw = match self.last_frame {
            Some(last) => now.saturating_sub(last).as_secs_f64(),
            None => 0.0,
        };
        self.last_frame = Some(now);
        self.step(raw, now.as_secs_f64(), viewer, renderer, input)
    }

    /// One frame with an explicit raw delta.
    pub fn step<T, O>(
        &mut self,
        raw_dt: f64,
        now_secs: f64,
        viewer: &mut Viewer<T, O>,
        renderer: &mut dyn Renderer,
        input: &impl InputState,
    ) -> f64
    where
        T: TelemetryTransport,
        O: OrbitController,
    {
        let dt = clamp_frame_dt(raw_dt);

        for vehicle in &mut viewer.vehicles {
            vehicle.update(&mut viewer.scene, dt, now_secs, input);
        }

        let standoff = axis(input, &self.keys.standoff_closer, &self.keys.standoff_farther);
        if standoff != 0.0 {
            viewer.camera.adjust_standoff(standoff * dt);
        }

        let toggle_held = input.is_held(viewer.camera.toggle_key());
        if toggle_held && !self.toggle_was_held {
            viewer.camera.toggle_mode();
        }
        self.toggle_was_held = toggle_held;

        viewer.camera.update(dt, &viewer.scene);

        renderer.render(&viewer.scene, &viewer.camera.view());
        let insets = render_insets(&viewer.scene, &viewer.vehicles, renderer);

        self.frames += 1;
        debug!("frame {} dt={:.4} insets={}", self.frames, dt, insets);
        dt
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

fn render_insets<T: TelemetryTransport>(
    scene: &SceneGraph,
    vehicles: &[VehicleController<T>],
    renderer: &mut dyn Renderer,
) -> usize {
    let (width, height) = renderer.viewport_size();
    let mut rendered = 0;

    for inset in vehicles.iter().flat_map(|v| v.insets()) {
        if let Some((view, rect)) = inset_view(scene, inset, width, height) {
            renderer.render_inset(scene, &view, rect, INSET_CLEAR);
            rendered += 1;
        }
    }
    rendered
}

fn inset_view(
    scene: &SceneGraph,
    inset: &InsetCamera,
    width: u32,
    height: u32,
) -> Option<(CameraView, PixelRect)> {
    let mut projection = match scene.get(inset.view)?.payload() {
        Payload::Camera(camera) => camera.projection,
        _ => return None,
    };

    let rect = inset.window.to_pixels(width, height);
    if rect.is_empty() {
        return None;
    }
    projection.aspect = rect.aspect();

    let world = scene.world_transform(inset.view)?;
    Some((CameraView::from_world_transform(&world, projection), rect))
}
