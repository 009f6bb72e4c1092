//! Device, queue and backend interfaces.
//!
//! The renderer is written against three traits:
//!
//! - [`Backend`] turns an opaque [`SurfaceHandle`] into a device
//! - [`Device`] creates and destroys resources and writes descriptors
//! - [`Queue`] executes command lists in submission order and advances a
//!   completion counter after each one
//!
//! Resource owners ([`Buffer`], [`Texture`], [`Pipeline`], ...) hold an
//! `Arc<dyn Device>` and release their object on drop, so the methods that
//! destroy objects never fail.
//!
//! [`Buffer`]: crate::buffer::Buffer
//! [`Texture`]: crate::texture::Texture
//! [`Pipeline`]: crate::pipeline::Pipeline

use std::sync::Arc;

use crate::buffer::{BufferDesc, BufferId};
use crate::command::CommandList;
use crate::descriptor::{Descriptor, DescriptorHandle, DescriptorHeapId, DescriptorHeapKind};
use crate::error::RhiResult;
use crate::pipeline::{PipelineDesc, PipelineId};
use crate::swapchain::{SurfaceHandle, SwapChainDesc, SwapChainId};
use crate::sync::{CompletionCounter, FenceValue};
use crate::texture::{TextureDesc, TextureId};

/// Command queue with an attached completion counter.
///
/// # Ordering
///
/// Lists execute in the order they were submitted. After list `n` finishes
/// the counter is advanced to the value passed with it. Presents execute
/// between the lists they were queued between.
pub trait Queue: CompletionCounter {
    /// Queues `commands` and the signal of `signal_value` after them.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] once the device is lost, or
    /// [`RhiError::InvalidUsage`] if `signal_value` is not greater than the
    /// previous signal.
    ///
    /// [`RhiError::DeviceLost`]: crate::error::RhiError::DeviceLost
    /// [`RhiError::InvalidUsage`]: crate::error::RhiError::InvalidUsage
    fn submit(&self, commands: CommandList, signal_value: FenceValue) -> RhiResult<()>;

    /// Queues presentation of a swap-chain buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] once the device is lost.
    ///
    /// [`RhiError::DeviceLost`]: crate::error::RhiError::DeviceLost
    fn present(&self, swap_chain: SwapChainId, buffer_index: u32) -> RhiResult<()>;
}

/// Resource factory and descriptor writer.
///
/// # Thread Safety
///
/// Implementations are shared through `Arc` and must accept calls from any
/// thread.
pub trait Device: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Allocates a buffer. Host-visible buffers start zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocationFailed`] when memory runs out.
    ///
    /// [`RhiError::AllocationFailed`]: crate::error::RhiError::AllocationFailed
    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<BufferId>;

    /// Releases a buffer. Unknown ids are ignored.
    fn destroy_buffer(&self, id: BufferId);

    /// Copies `data` into a CPU-writable buffer.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown ids, out-of-range writes or buffers the
    /// CPU cannot write.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> RhiResult<()>;

    /// Copies bytes out of a CPU-readable buffer.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown ids, out-of-range reads or GPU-only buffers.
    fn read_buffer(&self, id: BufferId, offset: u64, out: &mut [u8]) -> RhiResult<()>;

    /// Allocates a texture filled with its clear value.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid descriptions or allocation failure.
    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<TextureId>;

    /// Releases a texture. Unknown ids are ignored.
    fn destroy_texture(&self, id: TextureId);

    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] for unsupported state.
    ///
    /// [`RhiError::PipelineError`]: crate::error::RhiError::PipelineError
    fn create_pipeline(&self, desc: &PipelineDesc) -> RhiResult<PipelineId>;

    /// Releases a pipeline. Unknown ids are ignored.
    fn destroy_pipeline(&self, id: PipelineId);

    /// Creates a descriptor heap with `capacity` empty slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the heap cannot be allocated.
    fn create_descriptor_heap(&self, kind: DescriptorHeapKind, capacity: u32) -> RhiResult<DescriptorHeapId>;

    /// Releases a descriptor heap. Unknown ids are ignored.
    fn destroy_descriptor_heap(&self, id: DescriptorHeapId);

    /// Writes one descriptor slot.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for unknown heaps or slots and
    /// [`RhiError::InvalidUsage`] for a descriptor of the wrong kind.
    ///
    /// [`RhiError::InvalidHandle`]: crate::error::RhiError::InvalidHandle
    /// [`RhiError::InvalidUsage`]: crate::error::RhiError::InvalidUsage
    fn write_descriptor(&self, handle: DescriptorHandle, descriptor: Descriptor) -> RhiResult<()>;

    /// Creates a swap chain and its presentable textures.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceError`] for a surface this device cannot
    /// present to.
    ///
    /// [`RhiError::SurfaceError`]: crate::error::RhiError::SurfaceError
    fn create_swap_chain(&self, desc: &SwapChainDesc) -> RhiResult<(SwapChainId, Vec<TextureId>)>;

    /// Replaces the presentable textures with new ones of the given size.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown swap chains.
    fn resize_swap_chain(&self, id: SwapChainId, width: u32, height: u32) -> RhiResult<Vec<TextureId>>;

    /// Releases a swap chain and its presentable textures.
    fn destroy_swap_chain(&self, id: SwapChainId);

    /// Returns the queue every submission goes to.
    fn queue(&self) -> Arc<dyn Queue>;
}

/// Creates devices for surfaces.
pub trait Backend: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Creates a device able to present to `surface`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceError`] for unknown surfaces or
    /// [`RhiError::NoSuitableGpu`] when no device fits.
    ///
    /// [`RhiError::SurfaceError`]: crate::error::RhiError::SurfaceError
    /// [`RhiError::NoSuitableGpu`]: crate::error::RhiError::NoSuitableGpu
    fn create_device(&self, surface: SurfaceHandle) -> RhiResult<Arc<dyn Device>>;
}
