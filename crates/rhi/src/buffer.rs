//! GPU buffer management.
//!
//! This module handles vertex, index, structured, constant, staging and
//! readback buffers.
//!
//! # Overview
//!
//! - [`BufferUsage`] defines how a buffer will be used (vertex, index, staging, etc.)
//! - [`MemoryLocation`] says which side of the bus owns the memory
//! - [`Buffer`] owns a device buffer and frees it on drop
//! - [`VertexBufferView`] / [`IndexBufferView`] are the non-owning views bound
//!   while drawing
//!
//! Only GPU-only buffers take part in state tracking. Upload and constant
//! buffers are always readable by the GPU; readback buffers are always a copy
//! destination.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deferred_rhi::device::Device;
//! use deferred_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<dyn Device>) -> Result<(), deferred_rhi::RhiError> {
//! // Create an upload buffer with initial data
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let staging = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Staging,
//!     bytemuck::cast_slice(&vertices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::texture::ResourceState;

resource_id! {
    /// Device-side identifier of a buffer. Copyable and non-owning.
    BufferId
}

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which selects the memory location
/// and the state the buffer starts in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex buffer - stores vertex data
    Vertex,
    /// Index buffer - stores index data
    Index,
    /// Constant buffer - per-frame shader constants written by the CPU
    Constant,
    /// Structured buffer - read by shaders through a shader-resource view
    Structured,
    /// Staging buffer - CPU-writable source of uploads
    Staging,
    /// Readback buffer - GPU-writable, CPU-readable
    Readback,
}

/// Where the memory of a buffer lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Device-local memory, only reachable through copies.
    GpuOnly,
    /// Host-visible memory the CPU writes and the GPU reads.
    CpuToGpu,
    /// Host-visible memory the GPU writes and the CPU reads.
    GpuToCpu,
}

impl MemoryLocation {
    /// Returns true if the CPU may map this memory.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        !matches!(self, MemoryLocation::GpuOnly)
    }
}

impl BufferUsage {
    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            // Static geometry lives on the device and is filled by copies
            BufferUsage::Vertex | BufferUsage::Index | BufferUsage::Structured => {
                MemoryLocation::GpuOnly
            }
            // Constants change every frame
            BufferUsage::Constant => MemoryLocation::CpuToGpu,
            BufferUsage::Staging => MemoryLocation::CpuToGpu,
            BufferUsage::Readback => MemoryLocation::GpuToCpu,
        }
    }

    /// Returns the state a freshly created buffer of this type is in.
    pub fn initial_state(self) -> ResourceState {
        match self.memory_location() {
            MemoryLocation::GpuToCpu => ResourceState::CopyDest,
            MemoryLocation::GpuOnly | MemoryLocation::CpuToGpu => ResourceState::Common,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Constant => "constant",
            BufferUsage::Structured => "structured",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// Creation parameters for a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug label.
    pub label: String,
    /// Size in bytes. Must be non-zero.
    pub size: u64,
    /// Intended usage.
    pub usage: BufferUsage,
}

impl BufferDesc {
    /// Creates a descriptor with a label derived from the usage.
    pub fn new(usage: BufferUsage, size: u64) -> Self {
        Self {
            label: usage.name().to_string(),
            size,
            usage,
        }
    }

    /// Replaces the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Device buffer owned by the CPU side.
///
/// The buffer is released when this value drops. [`BufferId`]s handed out
/// through [`Buffer::id`] must not be used after that.
///
/// # Thread Safety
///
/// Writes go through the device, which serializes them internally, but the
/// caller must not write memory the GPU is still reading.
pub struct Buffer {
    /// Reference to the device.
    device: Arc<dyn Device>,
    /// Device-side id.
    id: BufferId,
    /// Creation parameters.
    desc: BufferDesc,
}

impl Buffer {
    /// Creates a new buffer.
    ///
    /// # Arguments
    ///
    /// * `device` - The device
    /// * `desc` - Size, usage and label
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or the allocation fails.
    pub fn new(device: Arc<dyn Device>, desc: BufferDesc) -> RhiResult<Self> {
        if desc.size == 0 {
            return Err(RhiError::InvalidUsage(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let id = device.create_buffer(&desc)?;

        debug!(
            "Created {} buffer '{}': {} bytes",
            desc.usage.name(),
            desc.label,
            desc.size
        );

        Ok(Self { device, id, desc })
    }

    /// Creates a host-visible buffer and initializes it with data.
    ///
    /// # Arguments
    ///
    /// * `device` - The device
    /// * `usage` - The intended buffer usage
    /// * `data` - Initial data
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation fails or the usage selects memory
    /// the CPU cannot write.
    pub fn new_with_data(device: Arc<dyn Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, BufferDesc::new(usage, data.len() as u64))?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// The buffer must use CPU-writable memory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer is not in CPU-writable memory
    /// - The write would exceed the buffer size
    pub fn write_data(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as u64;
        if end > self.desc.size {
            return Err(RhiError::InvalidUsage(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.desc.size
            )));
        }

        if self.memory_location() != MemoryLocation::CpuToGpu {
            return Err(RhiError::InvalidUsage(format!(
                "Buffer '{}' is not CPU-writable",
                self.desc.label
            )));
        }

        self.device.write_buffer(self.id, offset, data)
    }

    /// Reads `out.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is GPU-only or the range is out of bounds.
    pub fn read_data(&self, offset: u64, out: &mut [u8]) -> RhiResult<()> {
        if offset + out.len() as u64 > self.desc.size {
            return Err(RhiError::InvalidUsage(format!(
                "Read exceeds buffer size: offset {} + len {} > buffer {}",
                offset,
                out.len(),
                self.desc.size
            )));
        }
        if !self.memory_location().is_host_visible() {
            return Err(RhiError::InvalidUsage(format!(
                "Buffer '{}' is not CPU-readable",
                self.desc.label
            )));
        }
        self.device.read_buffer(self.id, offset, out)
    }

    /// Returns the device-side id.
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.desc.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    /// Returns the memory location.
    #[inline]
    pub fn memory_location(&self) -> MemoryLocation {
        self.desc.usage.memory_location()
    }

    /// Returns the debug label.
    #[inline]
    pub fn label(&self) -> &str {
        &self.desc.label
    }

    /// Returns a vertex-buffer view covering the whole buffer.
    pub fn vertex_view(&self, stride: u32) -> VertexBufferView {
        VertexBufferView {
            buffer: self.id,
            offset: 0,
            size: self.desc.size,
            stride,
        }
    }

    /// Returns an index-buffer view covering the whole buffer.
    pub fn index_view(&self, format: IndexFormat) -> IndexBufferView {
        IndexBufferView {
            buffer: self.id,
            offset: 0,
            size: self.desc.size,
            format,
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.id);
        debug!("Destroyed {} buffer '{}'", self.desc.usage.name(), self.desc.label);
    }
}

/// Index element width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    #[inline]
    pub fn size(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Non-owning view of a vertex buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBufferView {
    /// Buffer holding the vertices.
    pub buffer: BufferId,
    /// Byte offset of the first vertex.
    pub offset: u64,
    /// Bytes visible through the view.
    pub size: u64,
    /// Distance between consecutive vertices.
    pub stride: u32,
}

/// Non-owning view of an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferView {
    /// Buffer holding the indices.
    pub buffer: BufferId,
    /// Byte offset of the first index.
    pub offset: u64,
    /// Bytes visible through the view.
    pub size: u64,
    /// Element width.
    pub format: IndexFormat,
}
