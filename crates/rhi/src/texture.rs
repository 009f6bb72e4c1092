//! Textures and resource states.
//!
//! - [`Format`] lists the pixel formats the renderer uses
//! - [`TextureDesc`] describes a 2D texture or a six-face cube
//! - [`Texture`] owns a device texture and frees it on drop
//! - [`ResourceState`] is the usage state a resource is transitioned between
//!   with barriers

use std::sync::Arc;

use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

resource_id! {
    /// Device-side identifier of a texture. Copyable and non-owning.
    TextureId
}

/// Number of array layers in a cube texture.
pub const CUBE_FACE_COUNT: u32 = 6;

/// Pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// 8-bit normalized RGBA, used for presentable buffers
    Rgba8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 32-bit float RGBA, used for world positions and normals
    Rgba32Float,
    /// 32-bit float depth
    D32Float,
}

impl Format {
    /// Returns true for depth formats.
    #[inline]
    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Float)
    }

    /// Bytes per texel.
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Format::Rgba8Unorm | Format::D32Float => 4,
            Format::Rgba16Float => 8,
            Format::Rgba32Float => 16,
        }
    }
}

/// Texture shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// A single 2D image
    D2,
    /// Six square faces ordered +X, -X, +Y, -Y, +Z, -Z
    Cube,
}

impl TextureDimension {
    /// Number of array layers.
    #[inline]
    pub fn layer_count(self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => CUBE_FACE_COUNT,
        }
    }
}

/// Usage state of a resource.
///
/// A resource is in exactly one state at any point of the GPU timeline;
/// barriers move it between states and every command checks the state it
/// needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// No particular usage, the state of freshly created buffers
    Common,
    /// Source of a copy
    CopySource,
    /// Destination of a copy
    CopyDest,
    /// Read as vertex data or constants
    VertexAndConstantBuffer,
    /// Read as index data
    IndexBuffer,
    /// Written as a color target
    RenderTarget,
    /// Written as a depth target
    DepthWrite,
    /// Read by shaders
    ShaderResource,
    /// Handed to the presentation engine
    Present,
}

/// Creation parameters for a texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    /// Debug label.
    pub label: String,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Pixel format.
    pub format: Format,
    /// 2D or cube.
    pub dimension: TextureDimension,
    /// State the texture is created in.
    pub initial_state: ResourceState,
    /// Value the texture is filled with on creation.
    pub clear_value: [f32; 4],
}

impl TextureDesc {
    /// Describes a 2D texture.
    pub fn new_2d(label: impl Into<String>, width: u32, height: u32, format: Format) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            dimension: TextureDimension::D2,
            initial_state: ResourceState::Common,
            clear_value: if format.is_depth() {
                [1.0, 0.0, 0.0, 0.0]
            } else {
                [0.0; 4]
            },
        }
    }

    /// Describes a cube texture with square faces.
    pub fn new_cube(label: impl Into<String>, size: u32, format: Format) -> Self {
        Self {
            dimension: TextureDimension::Cube,
            ..Self::new_2d(label, size, size, format)
        }
    }

    /// Sets the initial state.
    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }

    /// Sets the creation fill value.
    pub fn with_clear_value(mut self, value: [f32; 4]) -> Self {
        self.clear_value = value;
        self
    }

    /// Number of array layers.
    #[inline]
    pub fn layer_count(&self) -> u32 {
        self.dimension.layer_count()
    }

    /// Checks the description for values no device accepts.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidUsage`] for zero extents or a non-square cube.
    pub fn validate(&self) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RhiError::InvalidUsage(format!(
                "Texture '{}' has zero extent {}x{}",
                self.label, self.width, self.height
            )));
        }
        if self.dimension == TextureDimension::Cube && self.width != self.height {
            return Err(RhiError::InvalidUsage(format!(
                "Cube texture '{}' faces must be square, got {}x{}",
                self.label, self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Device texture owned by the CPU side.
pub struct Texture {
    device: Arc<dyn Device>,
    id: TextureId,
    desc: TextureDesc,
}

impl Texture {
    /// Creates a new texture.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is invalid or allocation fails.
    pub fn new(device: Arc<dyn Device>, desc: TextureDesc) -> RhiResult<Self> {
        desc.validate()?;
        let id = device.create_texture(&desc)?;

        debug!(
            "Created texture '{}': {}x{} {:?} ({} layers)",
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            desc.layer_count()
        );

        Ok(Self { device, id, desc })
    }

    /// Returns the device-side id.
    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Returns the creation parameters.
    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Returns the pixel format.
    #[inline]
    pub fn format(&self) -> Format {
        self.desc.format
    }

    /// Returns the extent as (width, height).
    #[inline]
    pub fn extent(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.device.destroy_texture(self.id);
        debug!("Destroyed texture '{}'", self.desc.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_depth() {
        assert!(Format::D32Float.is_depth());
        assert!(!Format::Rgba8Unorm.is_depth());
        assert!(!Format::Rgba32Float.is_depth());
    }

    #[test]
    fn test_cube_desc() {
        let desc = TextureDesc::new_cube("shadow", 128, Format::D32Float);
        assert_eq!(desc.layer_count(), 6);
        assert_eq!(desc.clear_value[0], 1.0);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_desc_validation() {
        let empty = TextureDesc::new_2d("empty", 0, 4, Format::Rgba8Unorm);
        assert!(matches!(empty.validate(), Err(RhiError::InvalidUsage(_))));

        let mut cube = TextureDesc::new_cube("cube", 4, Format::D32Float);
        cube.height = 8;
        assert!(cube.validate().is_err());
    }
}
