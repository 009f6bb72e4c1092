//! Deferred Renderer - Headless Demo
//!
//! Renders a small shadowed scene on the software device for a fixed number
//! of frames, turning the scene under a fixed light, and optionally writes
//! the last presented image as a PNG.

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use glam::{Quat, Vec3, Vec4};
use tracing::{info, warn};

use deferred_core::{RendererConfig, Timer};
use deferred_renderer::Renderer;
use deferred_resources::{Material, Model, ResourceResult, primitives};
use deferred_rhi::software::SoftwareBackend;
use deferred_scene::{Camera, Transform};

#[derive(Parser, Debug)]
#[command(name = "deferred", about = "Render a shadowed demo scene headlessly")]
struct Args {
    /// Number of frames to render
    #[arg(short, long, default_value_t = 60)]
    frames: u32,

    /// Output width in pixels
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Output height in pixels
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Vertical field of view in degrees
    #[arg(long, default_value_t = 45.0)]
    fov: f32,

    /// Renderer configuration in TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the last presented frame to this PNG file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// A floor, a box resting on it and a slab hovering under the light.
fn demo_scene() -> ResourceResult<Model> {
    let mut model = Model::default();
    let floor = model.push_material(Material::new(
        Vec4::new(0.08, 0.08, 0.08, 1.0),
        Vec4::new(0.75, 0.75, 0.7, 1.0),
    ));
    let red = model.push_material(Material::new(
        Vec4::new(0.1, 0.02, 0.02, 1.0),
        Vec4::new(0.8, 0.2, 0.15, 1.0),
    ));
    let blue = model.push_material(Material::new(
        Vec4::new(0.02, 0.02, 0.1, 1.0),
        Vec4::new(0.2, 0.3, 0.85, 1.0),
    ));

    model.push_mesh(primitives::plane(0.0, 6.0, floor));
    model.push_mesh(primitives::cuboid(Vec3::new(1.5, 0.75, 0.5), Vec3::splat(0.75), red));
    model.push_mesh(primitives::cuboid(
        Vec3::new(-1.0, 2.5, -0.5),
        Vec3::new(1.0, 0.1, 1.0),
        blue,
    ));
    model.validate()?;
    Ok(model)
}

fn load_config(path: Option<&PathBuf>) -> Result<RendererConfig> {
    match path {
        Some(path) => RendererConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(RendererConfig::default()),
    }
}

fn main() -> Result<()> {
    deferred_core::init_logging();
    let args = Args::parse();
    if args.width == 0 || args.height == 0 {
        bail!("output size must be non-zero, got {}x{}", args.width, args.height);
    }
    if !(args.fov > 0.0 && args.fov < 180.0) {
        bail!("field of view must be in (0, 180) degrees, got {}", args.fov);
    }

    let config = load_config(args.config.as_ref())?;
    info!(
        "Starting deferred renderer: {}x{}, {} frames in flight, shadow map {}",
        args.width, args.height, config.frames_in_flight, config.shadow.map_size
    );

    let backend = Arc::new(SoftwareBackend::new());
    let surface = backend.create_surface(args.width, args.height);
    let mut renderer = Renderer::with_config(
        backend.clone(),
        surface,
        args.width,
        args.height,
        Box::new(demo_scene),
        config,
    );
    renderer.initialize().context("failed to initialize renderer")?;
    info!("Initialization complete, rendering {} frames", args.frames);

    let aspect = args.width as f32 / args.height as f32;
    let mut camera = Camera::looking_at(Vec3::new(0.0, 5.0, 9.0), Vec3::ZERO, aspect);
    camera.set_perspective(args.fov.to_radians(), aspect, 0.1, 100.0);
    renderer.set_camera(camera);

    let mut timer = Timer::new();
    for frame in 0..args.frames {
        let angle = TAU * frame as f32 / args.frames.max(1) as f32;
        renderer.set_world_transform(Transform::new().with_rotation(Quat::from_rotation_y(angle)));

        renderer
            .render_frame()
            .with_context(|| format!("frame {} failed", frame))?;
        timer.tick();
    }
    renderer.wait_idle()?;

    let stats = renderer.stats();
    info!(
        "Rendered {} frames (last fence {}), average {:.2} ms, slowest {:.2} ms",
        stats.frames_rendered,
        stats.last_fence,
        timer.average_frame_time().as_secs_f64() * 1000.0,
        timer.slowest_frame().as_secs_f64() * 1000.0
    );

    if let Some(path) = &args.output {
        let device = backend
            .device(surface)
            .context("software device missing after initialization")?;
        match device.presented_image(surface) {
            Some((image, presents)) => {
                image::save_buffer(
                    path,
                    &image.to_rgba8(),
                    image.width,
                    image.height,
                    image::ExtendedColorType::Rgba8,
                )
                .with_context(|| format!("failed to write {}", path.display()))?;
                info!("Wrote present #{} to {}", presents, path.display());
            }
            None => warn!("Nothing was presented, skipping {}", path.display()),
        }
    }

    renderer.cleanup()?;
    info!("Shutdown complete");
    Ok(())
}
