//! Shared fixtures for the renderer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use deferred_core::RendererConfig;
use deferred_renderer::Renderer;
use deferred_resources::{Material, Model, primitives};
use deferred_rhi::software::{SoftwareBackend, SoftwareDevice};
use deferred_rhi::swapchain::SurfaceHandle;
use glam::{Vec3, Vec4};

/// A renderer on a fresh software backend.
pub struct Harness {
    pub backend: Arc<SoftwareBackend>,
    pub surface: SurfaceHandle,
    pub renderer: Renderer,
}

impl Harness {
    pub fn new(width: u32, height: u32, model: Model) -> Self {
        Self::with_config(width, height, model, test_config())
    }

    pub fn with_config(width: u32, height: u32, model: Model, config: RendererConfig) -> Self {
        let backend = Arc::new(SoftwareBackend::new());
        let surface = backend.create_surface(width, height);
        let renderer = Renderer::with_config(
            backend.clone(),
            surface,
            width,
            height,
            Box::new(model),
            config,
        );
        Self {
            backend,
            surface,
            renderer,
        }
    }

    /// Creates and initializes.
    pub fn initialized(width: u32, height: u32, model: Model) -> Self {
        let mut harness = Self::new(width, height, model);
        harness.renderer.initialize().unwrap();
        harness
    }

    /// The software device behind the renderer.
    pub fn device(&self) -> Arc<SoftwareDevice> {
        self.backend.device(self.surface).unwrap()
    }
}

/// Small shadow maps keep the software device fast.
pub fn test_config() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.shadow.map_size = 64;
    config
}

/// Ambient 0.1, diffuse 0.8.
pub fn grey() -> Material {
    Material::new(Vec4::new(0.1, 0.1, 0.1, 1.0), Vec4::new(0.8, 0.8, 0.8, 1.0))
}

/// A floor plane at y = 0 spanning [-4, 4] on x and z.
pub fn floor_model() -> Model {
    let mut model = Model::default();
    let material = model.push_material(grey());
    model.push_mesh(primitives::plane(0.0, 4.0, material));
    model
}

/// The floor plus a horizontal quad at y = 2.5 covering [-1, 1] on x and z.
pub fn occluded_floor_model() -> Model {
    let mut model = floor_model();
    model.push_mesh(primitives::quad(
        Vec3::new(0.0, 2.5, 0.0),
        Vec3::X,
        Vec3::NEG_Z,
        0,
    ));
    model
}

/// Rec. 709 luma.
pub fn luminance(rgba: [f32; 4]) -> f32 {
    0.2126 * rgba[0] + 0.7152 * rgba[1] + 0.0722 * rgba[2]
}
