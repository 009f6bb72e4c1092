//! Per-slot arena for transient shader constants.
//!
//! Each frame slot owns one CPU-writable buffer. Passes allocate their
//! constant blocks from it while recording; the arena is reset when the slot
//! is handed out again, which is only after the GPU finished reading it.

use std::sync::Arc;

use bytemuck::Pod;
use deferred_rhi::buffer::{Buffer, BufferDesc, BufferUsage};
use deferred_rhi::command::ConstantBinding;
use deferred_rhi::device::Device;
use deferred_rhi::shader::{GeometryConstants, LightingConstants, ShadowConstants};
use deferred_rhi::texture::CUBE_FACE_COUNT;
use tracing::debug;

use crate::error::{RenderError, RenderResult};

/// Offset alignment of constant blocks.
pub const CONSTANT_ALIGNMENT: u64 = 256;

/// Bytes one frame takes from its arena: a block per shadow face, then the
/// geometry and lighting blocks, each on an aligned offset.
pub fn frame_footprint() -> u64 {
    std::iter::repeat_n(ShadowConstants::SIZE, CUBE_FACE_COUNT as usize)
        .chain([GeometryConstants::SIZE, LightingConstants::SIZE])
        .fold(0, |end, size| end.next_multiple_of(CONSTANT_ALIGNMENT) + size as u64)
}

/// Linear allocator over one constant buffer.
pub struct ConstantArena {
    buffer: Buffer,
    cursor: u64,
}

impl ConstantArena {
    /// Creates an arena of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be created.
    pub fn new(device: Arc<dyn Device>, capacity: u64, label: impl Into<String>) -> RenderResult<Self> {
        let desc = BufferDesc::new(BufferUsage::Constant, capacity).with_label(label);
        let buffer = Buffer::new(device, desc)?;
        Ok(Self { buffer, cursor: 0 })
    }

    /// Copies `value` into the arena and returns its binding.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Contract`] when the arena is full.
    pub fn push<T: Pod>(&mut self, value: &T) -> RenderResult<ConstantBinding> {
        let bytes = bytemuck::bytes_of(value);
        let offset = self.cursor.next_multiple_of(CONSTANT_ALIGNMENT);
        let end = offset + bytes.len() as u64;
        if end > self.buffer.size() {
            return Err(RenderError::Contract(format!(
                "constant arena '{}' exhausted: {} bytes requested at {}, capacity {}",
                self.buffer.label(),
                bytes.len(),
                offset,
                self.buffer.size()
            )));
        }

        self.buffer.write_data(offset, bytes)?;
        self.cursor = end;
        Ok(ConstantBinding {
            buffer: self.buffer.id(),
            offset,
            size: bytes.len() as u64,
        })
    }

    /// Forgets every allocation.
    ///
    /// Only valid once the GPU has finished with the slot that owns the arena.
    pub fn reset(&mut self) {
        if self.cursor > 0 {
            debug!("Constant arena '{}' reset after {} bytes", self.buffer.label(), self.cursor);
        }
        self.cursor = 0;
    }

    /// Bytes in use, including alignment padding.
    #[inline]
    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Size of the backing buffer.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.buffer.size()
    }
}

#[cfg(test)]
mod tests {
    use deferred_rhi::device::Backend;
    use deferred_rhi::software::SoftwareBackend;

    use super::*;

    fn device() -> Arc<dyn Device> {
        let backend = SoftwareBackend::new();
        let surface = backend.create_surface(4, 4);
        backend.create_device(surface).unwrap()
    }

    #[test]
    fn test_allocations_are_aligned() {
        let mut arena = ConstantArena::new(device(), 1024, "test").unwrap();
        let a = arena.push(&ShadowConstants::default()).unwrap();
        let b = arena.push(&GeometryConstants::default()).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(a.size, ShadowConstants::SIZE as u64);
        assert_eq!(b.offset, 256);
        assert_eq!(arena.used(), 256 + GeometryConstants::SIZE as u64);
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let mut arena = ConstantArena::new(device(), 512, "small").unwrap();
        arena.push(&GeometryConstants::default()).unwrap();
        arena.push(&GeometryConstants::default()).unwrap();
        assert!(matches!(
            arena.push(&GeometryConstants::default()),
            Err(RenderError::Contract(_))
        ));

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.push(&GeometryConstants::default()).unwrap().offset, 0);
    }

    #[test]
    fn test_frame_footprint_fits_one_frame() {
        let footprint = frame_footprint();
        assert_eq!(footprint, 7 * 256 + LightingConstants::SIZE as u64);

        let mut arena = ConstantArena::new(device(), footprint, "exact").unwrap();
        for _ in 0..CUBE_FACE_COUNT {
            arena.push(&ShadowConstants::default()).unwrap();
        }
        arena.push(&GeometryConstants::default()).unwrap();
        arena.push(&LightingConstants::default()).unwrap();
        assert_eq!(arena.used(), footprint);
        assert!(arena.push(&ShadowConstants::default()).is_err());
    }
}
