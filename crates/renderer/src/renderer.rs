//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`], the public surface of the frame
//! core. It owns the device objects, the frame slots and the three passes,
//! and drives one frame per [`Renderer::render_frame`] call:
//!
//! ```text
//! advance() ──▶ shadow ──▶ geometry ──▶ lighting ──▶ submit() ──▶ present
//!    │                                                   │
//!    └ waits for the slot's previous fence               └ signals the next fence value
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use deferred_renderer::Renderer;
//! use deferred_resources::{Material, Model, primitives};
//! use deferred_rhi::software::SoftwareBackend;
//!
//! let backend = Arc::new(SoftwareBackend::new());
//! let surface = backend.create_surface(32, 32);
//!
//! let mut model = Model::default();
//! let material = model.push_material(Material::default());
//! model.push_mesh(primitives::plane(0.0, 2.0, material));
//!
//! let mut renderer = Renderer::new(backend, surface, 32, 32, Box::new(model));
//! renderer.initialize().unwrap();
//! renderer.render_frame().unwrap();
//! renderer.cleanup().unwrap();
//! ```

use std::sync::Arc;

use deferred_core::RendererConfig;
use deferred_resources::{Model, ModelSource};
use deferred_rhi::buffer::{Buffer, BufferDesc, BufferUsage, IndexFormat};
use deferred_rhi::command::{CommandList, PrimitiveTopology};
use deferred_rhi::descriptor::{DescriptorAllocator, DescriptorHeapCapacities, SamplerDesc};
use deferred_rhi::device::{Backend, Device};
use deferred_rhi::shader::MaterialData;
use deferred_rhi::swapchain::{SurfaceHandle, SwapChain, SwapChainDesc};
use deferred_rhi::sync::FenceValue;
use deferred_rhi::texture::ResourceState;
use deferred_rhi::vertex::Vertex;
use deferred_scene::{Camera, PointLight, Transform};
use glam::{Mat4, Vec3};
use tracing::{debug, error, info, trace, warn};

use crate::constants::frame_footprint;
use crate::context::{DrawCallArgs, FrameContext, FrameMatrices, LightState};
use crate::descriptors::SharedDescriptors;
use crate::error::{InitStage, RenderError, RenderResult};
use crate::frame::{Frame, FrameTargets, PRESENT_FORMAT};
use crate::frame_scheduler::FrameScheduler;
use crate::passes::{GeometryPass, LightingPass, RenderPass, ShadowPass};
use crate::uploader::ResourceUploader;

/// Counters reported by [`Renderer::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames submitted since initialization.
    pub frames_rendered: u64,
    /// Highest fence value handed to the queue.
    pub last_fence: FenceValue,
    /// Number of draws recorded per pass.
    pub draw_count: usize,
    /// Bytes of vertex, index and material data on the device.
    pub geometry_bytes: u64,
    /// Staging buffers not yet reclaimed.
    pub pending_uploads: usize,
}

/// Model geometry and materials on the device.
struct SceneBuffers {
    vertices: Buffer,
    indices: Buffer,
    materials: Buffer,
    draws: Vec<DrawCallArgs>,
}

impl SceneBuffers {
    fn size(&self) -> u64 {
        self.vertices.size() + self.indices.size() + self.materials.size()
    }
}

/// Everything created by [`Renderer::initialize`].
///
/// Fields drop in declaration order; the device goes last.
struct GpuState {
    scheduler: FrameScheduler,
    uploader: ResourceUploader,
    shadow_pass: ShadowPass,
    geometry_pass: GeometryPass,
    lighting_pass: LightingPass,
    frames: Vec<Frame>,
    scene: SceneBuffers,
    shared: SharedDescriptors,
    allocator: DescriptorAllocator,
    swap_chain: SwapChain,
    device: Arc<dyn Device>,
}

impl GpuState {
    /// Drains the queue and reclaims every staging buffer.
    fn idle(&mut self) -> RenderResult<()> {
        self.scheduler.flush_all()?;
        self.uploader.reclaim(self.scheduler.completed_value()?);
        Ok(())
    }
}

/// Deferred renderer with a fixed shadow, geometry and lighting pipeline.
///
/// # Lifecycle
///
/// 1. [`new`](Self::new) stores the collaborators; no device work happens
/// 2. [`initialize`](Self::initialize) creates the device objects, loads the
///    model and submits its uploads
/// 3. [`render_frame`](Self::render_frame) records and submits one frame
/// 4. [`cleanup`](Self::cleanup) waits for the GPU and releases everything;
///    dropping the renderer does the same
pub struct Renderer {
    backend: Arc<dyn Backend>,
    surface: SurfaceHandle,
    width: u32,
    height: u32,
    config: RendererConfig,
    model_source: Box<dyn ModelSource>,

    camera: Camera,
    /// Replaces the camera's matrices when set.
    view_projection: Option<(Mat4, Mat4)>,
    light: PointLight,
    world: Transform,

    state: Option<GpuState>,
    frames_rendered: u64,
}

impl Renderer {
    /// Creates a renderer with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `backend` - Creates the device for `surface`
    /// * `surface` - Surface presented to
    /// * `width` - Initial width in pixels
    /// * `height` - Initial height in pixels
    /// * `model_source` - Supplies the model during initialization
    pub fn new(
        backend: Arc<dyn Backend>,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        model_source: Box<dyn ModelSource>,
    ) -> Self {
        Self::with_config(backend, surface, width, height, model_source, RendererConfig::default())
    }

    /// Creates a renderer with an explicit configuration.
    ///
    /// The configuration is validated by [`initialize`](Self::initialize).
    pub fn with_config(
        backend: Arc<dyn Backend>,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        model_source: Box<dyn ModelSource>,
        config: RendererConfig,
    ) -> Self {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let camera = Camera::looking_at(Vec3::new(0.0, 3.0, 8.0), Vec3::ZERO, aspect);

        Self {
            backend,
            surface,
            width,
            height,
            config,
            model_source,
            camera,
            view_projection: None,
            light: PointLight::default(),
            world: Transform::default(),
            state: None,
            frames_rendered: 0,
        }
    }

    /// Creates the device objects and uploads the model.
    ///
    /// Must be called once before [`render_frame`](Self::render_frame). On
    /// failure everything created so far is released and the renderer stays
    /// uninitialized.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::AlreadyInitialized`] on a second call,
    /// [`RenderError::Config`] for an invalid configuration or a constant
    /// arena smaller than one frame needs, and
    /// [`RenderError::Initialization`] naming the step that failed otherwise.
    pub fn initialize(&mut self) -> RenderResult<()> {
        if self.state.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }
        self.config.validate()?;
        let footprint = frame_footprint();
        if self.config.constant_arena_size < footprint {
            return Err(RenderError::Config(deferred_core::Error::Config(format!(
                "constant_arena_size {} cannot hold one frame's constants ({} bytes)",
                self.config.constant_arena_size, footprint
            ))));
        }

        info!(
            "Initializing renderer on '{}' ({}x{}, {} frames in flight)",
            self.backend.name(),
            self.width,
            self.height,
            self.config.frames_in_flight
        );

        let device = self.backend.create_device(self.surface).stage("device")?;
        let frame_count = self.config.frames_in_flight;

        let swap_chain = SwapChain::new(
            device.clone(),
            SwapChainDesc {
                surface: self.surface,
                width: self.width,
                height: self.height,
                format: PRESENT_FORMAT,
                buffer_count: frame_count as u32,
            },
        )
        .stage("swap chain")?;

        let heaps = &self.config.descriptor_heaps;
        let mut allocator = DescriptorAllocator::new(
            device.clone(),
            &DescriptorHeapCapacities {
                render_target: heaps.render_target,
                depth_stencil: heaps.depth_stencil,
                shader_resource: heaps.shader_resource,
                sampler: heaps.sampler,
            },
        )
        .stage("descriptor heaps")?;

        let mut scheduler = FrameScheduler::new(device.queue(), frame_count).stage("frame scheduler")?;

        let mut frames = Vec::with_capacity(frame_count);
        for index in 0..frame_count {
            let presentable = swap_chain.buffer(index).ok_or_else(|| {
                RenderError::Contract(format!("swap chain has no buffer {}", index))
            })?;
            let frame = Frame::new(
                &device,
                &mut allocator,
                index,
                presentable,
                (self.width, self.height),
                &self.config.shadow,
                self.config.constant_arena_size,
            )
            .stage("frame slots")?;
            frames.push(frame);
        }

        let shared = SharedDescriptors::allocate(&mut allocator).stage("shared descriptors")?;

        let shadow_pass = ShadowPass::new(device.clone()).stage("shadow pipeline")?;
        let geometry_pass = GeometryPass::new(device.clone()).stage("geometry pipeline")?;
        let lighting_pass = LightingPass::new(device.clone()).stage("lighting pipeline")?;

        let model = self.model_source.load_model().stage("model")?;
        model.validate().stage("model")?;

        let mut uploader = ResourceUploader::new(device.clone());
        let mut setup = CommandList::new("initial uploads");
        let scene = upload_model(&device, &mut uploader, &mut setup, &model).stage("model buffers")?;
        shared
            .write(
                &allocator,
                scene.materials.id(),
                model.materials.len() as u32,
                SamplerDesc::default(),
            )
            .stage("shared descriptors")?;

        let fence = scheduler.submit_setup(setup).stage("initial uploads")?;
        let stamped = uploader.mark_submitted(fence);
        debug!("{} uploads submitted with fence {}", stamped, fence);

        info!(
            "Renderer initialized: {} meshes, {} materials, {} vertices, {} indices",
            model.meshes.len(),
            model.materials.len(),
            model.vertex_count(),
            model.index_count()
        );

        self.state = Some(GpuState {
            scheduler,
            uploader,
            shadow_pass,
            geometry_pass,
            lighting_pass,
            frames,
            scene,
            shared,
            allocator,
            swap_chain,
            device,
        });
        Ok(())
    }

    /// Renders and presents one frame.
    ///
    /// Blocks while the GPU still uses the next slot. Returns the fence value
    /// the frame's submission signals.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotInitialized`] before
    /// [`initialize`](Self::initialize), [`RenderError::DeviceLost`] if the
    /// device stopped, or the recording error. A frame whose recording fails
    /// is discarded without submitting anything.
    pub fn render_frame(&mut self) -> RenderResult<FenceValue> {
        let (view, projection) = self.view_and_projection();
        let matrices = FrameMatrices::compute(self.world.matrix(), view, projection, &self.light, &self.config.shadow);
        let light = LightState::new(&self.light, &view);
        let state = self.state.as_mut().ok_or(RenderError::NotInitialized)?;

        let slot = state.scheduler.advance()?;
        if let Err(e) = record_frame(state, slot, &matrices, &light, &self.config) {
            error!("Recording of slot {} failed: {}", slot, e);
            state.scheduler.abort_recording();
            return Err(e);
        }

        let fence = state.scheduler.submit()?;
        state.swap_chain.present(&**state.scheduler.queue(), slot)?;

        self.frames_rendered += 1;
        trace!("Frame {} submitted in slot {} with fence {}", self.frames_rendered, slot, fence);
        Ok(fence)
    }

    /// Resizes the presentable and attribute targets.
    ///
    /// Waits for the GPU first. Zero extents and unchanged sizes are ignored.
    /// Before initialization only the stored size changes.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::DeviceLost`] if the wait fails, or the error of
    /// recreating a target.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to zero dimensions");
            return Ok(());
        }
        if width == self.width && height == self.height {
            return Ok(());
        }

        debug!("Resize: {}x{} -> {}x{}", self.width, self.height, width, height);
        self.width = width;
        self.height = height;
        self.camera.set_aspect(width as f32 / height as f32);

        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        state.idle()?;
        state.swap_chain.resize(width, height)?;
        for (index, frame) in state.frames.iter_mut().enumerate() {
            let presentable = state.swap_chain.buffer(index).ok_or_else(|| {
                RenderError::Contract(format!("swap chain has no buffer {}", index))
            })?;
            frame.resize(&state.device, &state.allocator, presentable, width, height)?;
        }
        info!("Renderer resized to {}x{}", width, height);
        Ok(())
    }

    /// Waits for the GPU and releases every device object.
    ///
    /// Safe to call before or after a failed initialization, and more than
    /// once: later calls do no GPU work. Resources are released even if the
    /// wait fails; that error is returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::DeviceLost`] if the final wait failed.
    pub fn cleanup(&mut self) -> RenderResult<()> {
        let Some(state) = self.state.take() else {
            debug!("Cleanup: nothing to release");
            return Ok(());
        };

        let flushed = state.scheduler.flush_all();
        if let Err(e) = &flushed {
            warn!("GPU did not finish before cleanup: {}", e);
        }
        drop(state);

        info!("Renderer cleaned up after {} frames", self.frames_rendered);
        flushed
    }

    /// Blocks until every submitted frame has executed, then releases the
    /// staging buffers of finished uploads.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotInitialized`] before initialization or
    /// [`RenderError::DeviceLost`] if the wait fails.
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.state.as_mut().ok_or(RenderError::NotInitialized)?.idle()
    }

    /// Replaces the camera. Clears any matrices set with
    /// [`set_view_projection`](Self::set_view_projection).
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.view_projection = None;
    }

    /// Uses explicit view and projection matrices instead of the camera.
    pub fn set_view_projection(&mut self, view: Mat4, projection: Mat4) {
        self.view_projection = Some((view, projection));
    }

    /// Replaces the point light.
    pub fn set_light(&mut self, light: PointLight) {
        self.light = light;
    }

    /// Places the model in the world.
    pub fn set_world_transform(&mut self, transform: Transform) {
        self.world = transform;
    }

    /// Returns the model-to-world transform.
    #[inline]
    pub fn world_transform(&self) -> &Transform {
        &self.world
    }

    /// Returns the camera.
    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Returns the point light.
    #[inline]
    pub fn light(&self) -> &PointLight {
        &self.light
    }

    /// Returns true between a successful `initialize` and `cleanup`.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Number of frame slots.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight
    }

    /// Current width and height.
    #[inline]
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Texture ids of slot `index`, or `None` before initialization or for
    /// an out-of-range slot.
    pub fn frame_targets(&self, index: usize) -> Option<FrameTargets> {
        self.state.as_ref()?.frames.get(index).map(Frame::targets)
    }

    /// The device, once initialized.
    pub fn device(&self) -> Option<&Arc<dyn Device>> {
        self.state.as_ref().map(|s| &s.device)
    }

    /// The frame scheduler, once initialized.
    pub fn scheduler(&self) -> Option<&FrameScheduler> {
        self.state.as_ref().map(|s| &s.scheduler)
    }

    /// Frame and fence counters.
    pub fn stats(&self) -> RenderStats {
        RenderStats {
            frames_rendered: self.frames_rendered,
            last_fence: self.state.as_ref().map_or(0, |s| s.scheduler.last_issued()),
            draw_count: self.state.as_ref().map_or(0, |s| s.scene.draws.len()),
            geometry_bytes: self.state.as_ref().map_or(0, |s| s.scene.size()),
            pending_uploads: self.state.as_ref().map_or(0, |s| s.uploader.pending()),
        }
    }

    fn view_and_projection(&self) -> (Mat4, Mat4) {
        self.view_projection
            .unwrap_or_else(|| (self.camera.view_matrix(), self.camera.projection_matrix()))
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            error!("Cleanup during renderer drop failed: {}", e);
        }
    }
}

/// Records the three passes into the list of `slot`, which must be
/// recording.
fn record_frame(
    state: &mut GpuState,
    slot: usize,
    matrices: &FrameMatrices,
    light: &LightState,
    config: &RendererConfig,
) -> RenderResult<()> {
    let completed = state.scheduler.completed_value()?;
    state.uploader.reclaim(completed);

    let frame = &mut state.frames[slot];
    frame.constants_mut().reset();
    let (frame_view, constants) = frame.split_mut();
    let mut ctx = FrameContext {
        frame: frame_view,
        constants,
        matrices,
        light,
        draws: &state.scene.draws,
        shared: &state.shared,
        shadow: &config.shadow,
        background: config.background_color,
    };

    let commands = state.scheduler.commands_mut()?;
    let passes: [&dyn RenderPass; 3] = [&state.shadow_pass, &state.geometry_pass, &state.lighting_pass];
    for pass in passes {
        pass.record(&mut ctx, commands)?;
        trace!("Recorded {} pass ({} commands so far)", pass.name(), commands.len());
    }
    Ok(())
}

/// Creates the model's buffers and records their uploads into `commands`.
///
/// All meshes share one vertex and one index buffer; each draw addresses its
/// mesh through `start_index` and `vertex_offset`.
fn upload_model(
    device: &Arc<dyn Device>,
    uploader: &mut ResourceUploader,
    commands: &mut CommandList,
    model: &Model,
) -> RenderResult<SceneBuffers> {
    let mut vertices = Vec::with_capacity(model.vertex_count());
    let mut indices = Vec::with_capacity(model.index_count());
    let mut draws = Vec::with_capacity(model.meshes.len());
    let mut ranges = Vec::with_capacity(model.meshes.len());

    for (i, mesh) in model.meshes.iter().enumerate() {
        let start_index = indices.len() as u32;
        let vertex_offset = vertices.len() as i32;
        vertices.extend(
            mesh.positions
                .iter()
                .zip(&mesh.normals)
                .map(|(&p, &n)| Vertex::from_position_normal(p, n)),
        );
        indices.extend_from_slice(&mesh.indices);
        ranges.push((start_index, vertex_offset, mesh.index_count() as u32, mesh.material_index));

        debug!(
            "Mesh {}: {} vertices, {} indices, material {}",
            i,
            mesh.vertex_count(),
            mesh.index_count(),
            mesh.material_index
        );
    }

    let materials: Vec<MaterialData> = model
        .materials
        .iter()
        .map(|m| MaterialData {
            ambient: m.ambient_color,
            diffuse: m.diffuse_color,
        })
        .collect();

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
    let material_bytes: &[u8] = bytemuck::cast_slice(&materials);

    let create = |usage, size: usize, label: &str| {
        Buffer::new(device.clone(), BufferDesc::new(usage, size as u64).with_label(label))
    };
    let vertex_buffer = create(BufferUsage::Vertex, vertex_bytes.len(), "model vertices")?;
    let index_buffer = create(BufferUsage::Index, index_bytes.len(), "model indices")?;
    let material_buffer = create(BufferUsage::Structured, material_bytes.len(), "materials")?;

    uploader.upload(commands, vertex_bytes, &vertex_buffer, ResourceState::VertexAndConstantBuffer)?;
    uploader.upload(commands, index_bytes, &index_buffer, ResourceState::IndexBuffer)?;
    uploader.upload(commands, material_bytes, &material_buffer, ResourceState::ShaderResource)?;

    let vertex_view = vertex_buffer.vertex_view(Vertex::STRIDE);
    let index_view = index_buffer.index_view(IndexFormat::U32);
    for (start_index, vertex_offset, index_count, material_index) in ranges {
        draws.push(DrawCallArgs {
            topology: PrimitiveTopology::TriangleList,
            vertex_buffer: vertex_view,
            index_buffer: index_view,
            index_count,
            start_index,
            vertex_offset,
            material_index,
        });
    }

    Ok(SceneBuffers {
        vertices: vertex_buffer,
        indices: index_buffer,
        materials: material_buffer,
        draws,
    })
}
