//! Headless renderer and asset loader.

use aeroview_core::render::{
    AssetError, AssetLoader, CameraView, LoadedAsset, PixelRect, Renderer, VisualHandle,
};
use aeroview_core::scene::{Payload, SceneGraph};
use nalgebra::Vector3;
use std::collections::{HashMap, HashSet};

/// Records what would have been drawn.
#[derive(Debug, Clone)]
pub struct HeadlessRenderer {
    width: u32,
    height: u32,

    pub full_renders: u64,
    pub inset_renders: u64,

    /// Visual meshes seen in the last full render
    pub last_mesh_count: usize,

    pub last_view: Option<CameraView>,
    pub last_inset: Option<(PixelRect, [f32; 4])>,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            full_renders: 0,
            inset_renders: 0,
            last_mesh_count: 0,
            last_view: None,
            last_inset: None,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

impl Renderer for HeadlessRenderer {
    fn viewport_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn render(&mut self, scene: &SceneGraph, view: &CameraView) {
        self.full_renders += 1;
        self.last_mesh_count = scene
            .iter()
            .filter(|(_, e)| matches!(e.payload(), Payload::VisualMesh(_)))
            .count();
        self.last_view = Some(*view);
    }

    fn render_inset(&mut self, _scene: &SceneGraph, _view: &CameraView, rect: PixelRect, clear: [f32; 4]) {
        self.inset_renders += 1;
        self.last_inset = Some((rect, clear));
    }
}

/// Hands out sequential handles; paths can be made to fail or to report a
/// particular extent.
#[derive(Debug, Clone, Default)]
pub struct HeadlessLoader {
    next: u64,
    failing: HashSet<String>,
    extents: HashMap<String, Vector3<f64>>,
    pub loaded: Vec<String>,
}

impl HeadlessLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn with_extent(mut self, path: &str, extent: Vector3<f64>) -> Self {
        self.extents.insert(path.to_string(), extent);
        self
    }
}

impl AssetLoader for HeadlessLoader {
    fn load(&mut self, path: &str) -> Result<LoadedAsset, AssetError> {
        if self.failing.contains(path) {
            return Err(AssetError::load_failed(path, "scripted failure"));
        }
        self.next += 1;
        self.loaded.push(path.to_string());
        Ok(LoadedAsset {
            handle: VisualHandle(self.next),
            extent: self
                .extents
                .get(path)
                .copied()
                .unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0)),
        })
    }
}
