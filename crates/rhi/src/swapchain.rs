//! Swap chain management.
//!
//! A swap chain is a ring of presentable textures tied to a surface. The
//! textures belong to the swap chain: callers only ever see their
//! [`TextureId`]s and must not destroy them. Presentable textures are created
//! in [`ResourceState::Present`] and must be back in that state whenever they
//! are presented.
//!
//! Presentation is ordered on the queue behind previously submitted work, so
//! presenting right after a submission shows that submission's result.
//!
//! [`ResourceState::Present`]: crate::texture::ResourceState::Present

use std::sync::Arc;

use tracing::{debug, info};

use crate::device::{Device, Queue};
use crate::error::{RhiError, RhiResult};
use crate::texture::{Format, TextureId};

/// Opaque handle of a presentation surface, created outside the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    /// Wraps a raw platform value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw platform value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

resource_id! {
    /// Device-side identifier of a swap chain.
    SwapChainId
}

/// Creation parameters for a swap chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDesc {
    /// Surface presented to.
    pub surface: SurfaceHandle,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Format of the presentable textures.
    pub format: Format,
    /// Number of presentable textures.
    pub buffer_count: u32,
}

impl SwapChainDesc {
    /// Checks the extent and buffer count.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] for zero values or a depth format.
    pub fn validate(&self) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "Invalid extent {}x{}",
                self.width, self.height
            )));
        }
        if self.buffer_count == 0 {
            return Err(RhiError::SwapchainError(
                "Swap chain needs at least one buffer".to_string(),
            ));
        }
        if self.format.is_depth() {
            return Err(RhiError::SwapchainError(format!(
                "{:?} is not presentable",
                self.format
            )));
        }
        Ok(())
    }
}

/// Swap chain owned by the CPU side.
pub struct SwapChain {
    device: Arc<dyn Device>,
    id: SwapChainId,
    desc: SwapChainDesc,
    buffers: Vec<TextureId>,
}

impl SwapChain {
    /// Creates a swap chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is invalid or the surface is unknown.
    pub fn new(device: Arc<dyn Device>, desc: SwapChainDesc) -> RhiResult<Self> {
        desc.validate()?;
        let (id, buffers) = device.create_swap_chain(&desc)?;

        info!(
            "Swap chain created: {}x{}, {:?}, {} buffers",
            desc.width, desc.height, desc.format, desc.buffer_count
        );

        Ok(Self {
            device,
            id,
            desc,
            buffers,
        })
    }

    /// Recreates the presentable textures at a new size.
    ///
    /// Previous buffer ids become invalid. The caller must make sure the GPU
    /// no longer uses them.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero extent or a device failure.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let desc = SwapChainDesc {
            width,
            height,
            ..self.desc
        };
        desc.validate()?;

        self.buffers = self.device.resize_swap_chain(self.id, width, height)?;
        self.desc = desc;

        debug!("Swap chain resized to {}x{}", width, height);
        Ok(())
    }

    /// Queues presentation of buffer `index` behind all submitted work.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an out-of-range index, or the
    /// queue's error.
    pub fn present(&self, queue: &dyn Queue, index: usize) -> RhiResult<()> {
        if index >= self.buffers.len() {
            return Err(RhiError::InvalidHandle(format!(
                "Swap chain buffer {} out of range ({} buffers)",
                index,
                self.buffers.len()
            )));
        }
        queue.present(self.id, index as u32)
    }

    /// Returns the device-side id.
    #[inline]
    pub fn id(&self) -> SwapChainId {
        self.id
    }

    /// Returns the presentable texture at `index`.
    #[inline]
    pub fn buffer(&self, index: usize) -> Option<TextureId> {
        self.buffers.get(index).copied()
    }

    /// Returns every presentable texture.
    #[inline]
    pub fn buffers(&self) -> &[TextureId] {
        &self.buffers
    }

    /// Number of presentable textures.
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Presentable format.
    #[inline]
    pub fn format(&self) -> Format {
        self.desc.format
    }

    /// Current width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    /// Current height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// Surface presented to.
    #[inline]
    pub fn surface(&self) -> SurfaceHandle {
        self.desc.surface
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.device.destroy_swap_chain(self.id);
        debug!("Destroyed swap chain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> SwapChainDesc {
        SwapChainDesc {
            surface: SurfaceHandle::from_raw(1),
            width: 640,
            height: 480,
            format: Format::Rgba8Unorm,
            buffer_count: 2,
        }
    }

    #[test]
    fn test_valid_desc() {
        assert!(desc().validate().is_ok());
    }

    #[test]
    fn test_invalid_desc() {
        let zero = SwapChainDesc { width: 0, ..desc() };
        assert!(matches!(zero.validate(), Err(RhiError::SwapchainError(_))));

        let no_buffers = SwapChainDesc {
            buffer_count: 0,
            ..desc()
        };
        assert!(no_buffers.validate().is_err());

        let depth = SwapChainDesc {
            format: Format::D32Float,
            ..desc()
        };
        assert!(depth.validate().is_err());
    }

    #[test]
    fn test_surface_handle_raw() {
        assert_eq!(SurfaceHandle::from_raw(42).raw(), 42);
    }
}
