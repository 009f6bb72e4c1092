//! CPU reference implementation of the RHI.
//!
//! [`SoftwareBackend`] creates surfaces and [`SoftwareDevice`]s. The device
//! keeps every resource in host memory and runs submitted command lists on a
//! worker thread: triangles are clipped, rasterized with the top-left rule
//! and shaded by CPU versions of the three shader programs.
//!
//! Besides the [`Device`] interface the software device exposes hooks that a
//! real GPU does not have, used by tests and headless tools:
//!
//! - [`SoftwareDevice::read_texture`] copies a texture layer back to the CPU
//! - [`SoftwareDevice::presented_image`] returns the last presented image
//! - [`SoftwareDevice::pause_queue`] / [`SoftwareDevice::resume_queue`] hold
//!   execution so CPU/GPU overlap becomes observable
//! - [`SoftwareDevice::lose_device`] simulates a device removal
//!
//! # Example
//!
//! ```
//! use deferred_rhi::device::Backend;
//! use deferred_rhi::software::SoftwareBackend;
//!
//! let backend = SoftwareBackend::new();
//! let surface = backend.create_surface(64, 64);
//! let device = backend.create_device(surface).unwrap();
//! assert_eq!(device.name(), "software");
//! ```

mod execute;
mod queue;
mod raster;
mod resources;
mod shading;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::{BufferDesc, BufferId, MemoryLocation};
use crate::command::CommandList;
use crate::descriptor::{Descriptor, DescriptorHandle, DescriptorHeapId, DescriptorHeapKind};
use crate::device::{Backend, Device, Queue};
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{PipelineDesc, PipelineId};
use crate::swapchain::{SurfaceHandle, SwapChainDesc, SwapChainId};
use crate::sync::CompletionCounter;
use crate::texture::{Format, TextureDesc, TextureId};

pub use queue::SoftwareQueue;

use queue::Shared;

/// A texture layer copied back to the CPU.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureImage {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Format the texels were stored with.
    pub format: Format,
    /// Row-major texels; depth formats keep the depth in the first channel.
    pub texels: Vec<[f32; 4]>,
}

impl TextureImage {
    /// Returns the texel at (x, y).
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of range.
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// Converts to tightly packed RGBA8, clamping every channel to [0, 1].
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.texels
            .iter()
            .flat_map(|t| t.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }
}

/// Counters reported by [`SoftwareDevice::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Command lists accepted by the queue.
    pub submissions: u64,
    /// Command lists that finished executing.
    pub executed: u64,
    /// Presents that finished.
    pub presents: u64,
    /// Live buffers.
    pub buffers: usize,
    /// Live textures, not counting swap-chain buffers.
    pub textures: usize,
    /// Live pipelines.
    pub pipelines: usize,
    /// Live descriptor heaps.
    pub descriptor_heaps: usize,
    /// Live swap chains.
    pub swap_chains: usize,
}

impl DeviceStats {
    /// Returns true when no object is alive.
    pub fn is_empty(&self) -> bool {
        self.buffers == 0
            && self.textures == 0
            && self.pipelines == 0
            && self.descriptor_heaps == 0
            && self.swap_chains == 0
    }
}

/// Software implementation of [`Device`].
pub struct SoftwareDevice {
    surface: SurfaceHandle,
    shared: Arc<Shared>,
    queue: Arc<SoftwareQueue>,
}

impl SoftwareDevice {
    fn new(surface: SurfaceHandle) -> RhiResult<Self> {
        let shared = Arc::new(Shared::new());
        let queue = Arc::new(SoftwareQueue::new(shared.clone())?);
        info!("Software device created for surface {}", surface.raw());
        Ok(Self {
            surface,
            shared,
            queue,
        })
    }

    /// Surface this device presents to.
    #[inline]
    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    /// Copies one layer of a texture back to the CPU.
    ///
    /// The copy reflects every list that finished executing; pair it with
    /// a fence wait or [`wait_idle`](Self::wait_idle).
    ///
    /// # Errors
    ///
    /// Returns an error for unknown textures or layers.
    pub fn read_texture(&self, texture: TextureId, layer: u32) -> RhiResult<TextureImage> {
        self.shared.tables.lock().texture(texture)?.image(layer)
    }

    /// Returns the last image presented to `surface` and how many presents
    /// reached it.
    pub fn presented_image(&self, surface: SurfaceHandle) -> Option<(TextureImage, u64)> {
        self.shared
            .tables
            .lock()
            .presented
            .get(&surface)
            .map(|p| (p.image.clone(), p.count))
    }

    /// Holds queue execution before the next op.
    pub fn pause_queue(&self) {
        debug!("Software queue paused");
        self.shared.set_paused(true);
    }

    /// Releases a paused queue.
    pub fn resume_queue(&self) {
        debug!("Software queue resumed");
        self.shared.set_paused(false);
    }

    /// Returns true while the queue is paused.
    pub fn is_queue_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// Blocks until every queued op, presents included, has run.
    ///
    /// Blocks forever on a paused queue.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the worker has stopped.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.queue.wait_idle()
    }

    /// Simulates device removal: every wait and submission fails from now on.
    pub fn lose_device(&self, reason: &str) {
        warn!("Software device lost: {}", reason);
        self.shared.fence.mark_lost(reason);
    }

    /// Returns submission counters and live object counts.
    pub fn stats(&self) -> DeviceStats {
        let (buffers, textures, pipelines, descriptor_heaps, swap_chains) =
            self.shared.tables.lock().live_counts();
        DeviceStats {
            submissions: self.shared.submissions.load(Ordering::Relaxed),
            executed: self.shared.executed.load(Ordering::Relaxed),
            presents: self.shared.presents.load(Ordering::Relaxed),
            buffers,
            textures,
            pipelines,
            descriptor_heaps,
            swap_chains,
        }
    }

    /// Convenience for tests: submits `commands` with the next signal value
    /// after the completed one and waits for it.
    ///
    /// # Errors
    ///
    /// Returns the queue's error.
    pub fn execute_blocking(&self, commands: CommandList) -> RhiResult<()> {
        self.queue.wait_idle()?;
        let value = self.queue.completed_value()? + 1;
        self.queue.submit(commands, value)?;
        self.queue.wait_until(value)
    }
}

impl Device for SoftwareDevice {
    fn name(&self) -> &str {
        "software"
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<BufferId> {
        if desc.size == 0 {
            return Err(RhiError::AllocationFailed(format!(
                "buffer '{}' has zero size",
                desc.label
            )));
        }
        Ok(self.shared.tables.lock().insert_buffer(desc))
    }

    fn destroy_buffer(&self, id: BufferId) {
        self.shared.tables.lock().buffers.remove(&id);
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut tables = self.shared.tables.lock();
        let entry = tables.buffer_mut(id)?;
        if entry.location() != MemoryLocation::CpuToGpu {
            return Err(RhiError::InvalidUsage(format!(
                "buffer '{}' is not CPU-writable",
                entry.desc.label
            )));
        }
        let range = entry
            .range(offset, data.len() as u64)
            .map_err(|e| RhiError::InvalidUsage(e.to_string()))?;
        entry.data[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, id: BufferId, offset: u64, out: &mut [u8]) -> RhiResult<()> {
        let tables = self.shared.tables.lock();
        let entry = tables.buffer(id)?;
        if !entry.location().is_host_visible() {
            return Err(RhiError::InvalidUsage(format!(
                "buffer '{}' is not CPU-readable",
                entry.desc.label
            )));
        }
        let range = entry
            .range(offset, out.len() as u64)
            .map_err(|e| RhiError::InvalidUsage(e.to_string()))?;
        out.copy_from_slice(&entry.data[range]);
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<TextureId> {
        desc.validate()?;
        Ok(self.shared.tables.lock().insert_texture(desc))
    }

    fn destroy_texture(&self, id: TextureId) {
        let mut tables = self.shared.tables.lock();
        if tables.textures.get(&id).is_some_and(|t| t.swap_chain.is_some()) {
            warn!("Ignoring destroy of swap-chain texture {:?}", id);
            return;
        }
        tables.textures.remove(&id);
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> RhiResult<PipelineId> {
        desc.validate()?;
        Ok(self.shared.tables.lock().insert_pipeline(desc))
    }

    fn destroy_pipeline(&self, id: PipelineId) {
        self.shared.tables.lock().pipelines.remove(&id);
    }

    fn create_descriptor_heap(&self, kind: DescriptorHeapKind, capacity: u32) -> RhiResult<DescriptorHeapId> {
        Ok(self.shared.tables.lock().insert_heap(kind, capacity))
    }

    fn destroy_descriptor_heap(&self, id: DescriptorHeapId) {
        self.shared.tables.lock().heaps.remove(&id);
    }

    fn write_descriptor(&self, handle: DescriptorHandle, descriptor: Descriptor) -> RhiResult<()> {
        self.shared.tables.lock().write_descriptor(handle, descriptor)
    }

    fn create_swap_chain(&self, desc: &SwapChainDesc) -> RhiResult<(SwapChainId, Vec<TextureId>)> {
        if desc.surface != self.surface {
            return Err(RhiError::SurfaceError(format!(
                "device presents to surface {}, not {}",
                self.surface.raw(),
                desc.surface.raw()
            )));
        }
        desc.validate()?;
        Ok(self.shared.tables.lock().insert_swap_chain(desc))
    }

    fn resize_swap_chain(&self, id: SwapChainId, width: u32, height: u32) -> RhiResult<Vec<TextureId>> {
        let mut tables = self.shared.tables.lock();
        let entry = tables
            .swap_chains
            .get(&id)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown swap chain {:?}", id)))?;
        let desc = SwapChainDesc {
            width,
            height,
            ..entry.desc
        };
        desc.validate()?;

        let old = entry.buffers.clone();
        for buffer in old {
            tables.textures.remove(&buffer);
        }
        let buffers = tables.insert_presentable(id, &desc);
        if let Some(entry) = tables.swap_chains.get_mut(&id) {
            entry.desc = desc;
            entry.buffers = buffers.clone();
        }
        Ok(buffers)
    }

    fn destroy_swap_chain(&self, id: SwapChainId) {
        self.shared.tables.lock().remove_swap_chain(id);
    }

    fn queue(&self) -> Arc<dyn Queue> {
        self.queue.clone()
    }
}

/// Creates surfaces and software devices.
///
/// The backend remembers the devices it created so tests can reach the
/// software-only hooks after handing the device to a renderer as
/// `Arc<dyn Device>`.
#[derive(Default)]
pub struct SoftwareBackend {
    surfaces: Mutex<HashMap<SurfaceHandle, (u32, u32)>>,
    devices: Mutex<HashMap<SurfaceHandle, Arc<SoftwareDevice>>>,
}

impl SoftwareBackend {
    /// Creates a backend with no surfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a headless surface of the given size.
    pub fn create_surface(&self, width: u32, height: u32) -> SurfaceHandle {
        let mut surfaces = self.surfaces.lock();
        let handle = SurfaceHandle::from_raw(surfaces.len() as u64 + 1);
        surfaces.insert(handle, (width, height));
        debug!("Created software surface {} ({}x{})", handle.raw(), width, height);
        handle
    }

    /// Size the surface was registered with.
    pub fn surface_size(&self, surface: SurfaceHandle) -> Option<(u32, u32)> {
        self.surfaces.lock().get(&surface).copied()
    }

    /// Returns the device most recently created for `surface`.
    pub fn device(&self, surface: SurfaceHandle) -> Option<Arc<SoftwareDevice>> {
        self.devices.lock().get(&surface).cloned()
    }
}

impl Backend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn create_device(&self, surface: SurfaceHandle) -> RhiResult<Arc<dyn Device>> {
        if !self.surfaces.lock().contains_key(&surface) {
            return Err(RhiError::SurfaceError(format!(
                "unknown surface {}",
                surface.raw()
            )));
        }
        let device = Arc::new(SoftwareDevice::new(surface)?);
        self.devices.lock().insert(surface, device.clone());
        Ok(device)
    }
}
