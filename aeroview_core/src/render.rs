//! Collaborator interfaces for the renderer and the asset loader.
//!
//! The core never draws anything. It hands a `SceneGraph` and a
//! `CameraView` to a `Renderer`, and asks an `AssetLoader` for opaque
//! visual handles when building entities.

use crate::config::InsetWindow;
use crate::scene::SceneGraph;
use nalgebra::{Isometry3, Point3, Similarity3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle to a loaded visual asset (mesh tree, building set, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisualHandle(pub u64);

/// A successfully loaded asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedAsset {
    pub handle: VisualHandle,

    /// Bounding-box size at unit scale, render frame
    pub extent: Vector3<f64>,
}

/// Errors reported by an asset loader.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Failed to load asset {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Unsupported asset format: {0}")]
    UnsupportedFormat(String),
}

impl AssetError {
    pub fn load_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Loads model files into opaque visual handles.
pub trait AssetLoader {
    fn load(&mut self, path: &str) -> Result<LoadedAsset, AssetError>;
}

/// Perspective projection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub fov_deg: f64,
    pub near: f64,
    pub far: f64,
    pub aspect: f64,
}

impl Projection {
    pub fn new(fov_deg: f64, near: f64, far: f64, aspect: f64) -> Self {
        Self {
            fov_deg,
            near,
            far,
            aspect,
        }
    }

    /// Updates the aspect ratio from a pixel size; a zero height is ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f64 / height as f64;
        }
    }
}

/// Light kinds a light payload can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    Hemisphere,
    Directional,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightParams {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

/// Camera attached to an entity, optionally rendered into an inset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPayload {
    pub projection: Projection,
    pub inset: Option<InsetWindow>,
}

/// A pixel-space rectangle, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

impl InsetWindow {
    /// Normalised [0, 1] viewport -> floor-rounded pixel rectangle.
    pub fn to_pixels(&self, full_width: u32, full_height: u32) -> PixelRect {
        let w = full_width as f64;
        let h = full_height as f64;
        PixelRect {
            x: (w * self.x).floor() as u32,
            y: (h * self.y).floor() as u32,
            width: (w * self.width).floor() as u32,
            height: (h * self.height).floor() as u32,
        }
    }
}

/// Everything a renderer needs to draw from one camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// Camera position, render frame
    pub eye: Vector3<f64>,

    /// Look-at point, render frame
    pub target: Vector3<f64>,

    pub up: Vector3<f64>,
    pub projection: Projection,
}

impl CameraView {
    pub fn looking_at(eye: Vector3<f64>, target: Vector3<f64>, projection: Projection) -> Self {
        Self {
            eye,
            target,
            up: Vector3::y(),
            projection,
        }
    }

    /// Camera mounted on an entity: looks down the entity's -z axis.
    pub fn from_world_transform(world: &Similarity3<f64>, projection: Projection) -> Self {
        let eye = world.isometry.translation.vector;
        let rotation = world.isometry.rotation;
        Self {
            eye,
            target: eye + rotation * Vector3::new(0.0, 0.0, -1.0),
            up: rotation * Vector3::y(),
            projection,
        }
    }

    /// World -> camera transform.
    pub fn view_matrix(&self) -> Isometry3<f64> {
        Isometry3::look_at_rh(&Point3::from(self.eye), &Point3::from(self.target), &self.up)
    }
}

/// The external renderer.
pub trait Renderer {
    /// Full drawable size in pixels.
    fn viewport_size(&self) -> (u32, u32);

    /// Draws the whole scene into the full viewport.
    fn render(&mut self, scene: &SceneGraph, view: &CameraView);

    /// Draws the scene into a sub-rectangle after clearing it.
    fn render_inset(&mut self, scene: &SceneGraph, view: &CameraView, rect: PixelRect, clear: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_inset_pixels_floor() {
        let window = InsetWindow {
            x: 0.7,
            y: 0.7,
            width: 0.25,
            height: 0.25,
        };
        let rect = window.to_pixels(1001, 801);

        assert_eq!(rect, PixelRect { x: 700, y: 560, width: 250, height: 200 });
        assert_relative_eq!(rect.aspect(), 1.25);
    }

    #[test]
    fn test_projection_ignores_zero_height() {
        let mut projection = Projection::new(60.0, 0.1, 1000.0, 1.5);
        projection.set_viewport(800, 0);
        assert_eq!(projection.aspect, 1.5);

        projection.set_viewport(800, 400);
        assert_eq!(projection.aspect, 2.0);
    }

    #[test]
    fn test_mounted_camera_looks_down_negative_z() {
        let world = Similarity3::from_parts(
            Translation3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::FRAC_PI_2),
            1.0,
        );
        let view = CameraView::from_world_transform(&world, Projection::new(70.0, 0.1, 100.0, 1.0));

        assert_relative_eq!(view.eye, Vector3::new(1.0, 2.0, 3.0));
        // -z rotated +90 deg about y points along -x
        assert_relative_eq!(view.target - view.eye, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }
}
