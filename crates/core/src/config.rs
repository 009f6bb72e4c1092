//! Renderer configuration.
//!
//! [`RendererConfig`] collects every tunable the frame core reads once at
//! initialization: the number of buffered frame slots, shadow cube settings,
//! the background color written for pixels without geometry, and the
//! capacities of the fixed-size descriptor heaps.
//!
//! Configurations are usually loaded from TOML; every field has a default so
//! a partial document is fine:
//!
//! ```
//! use deferred_core::RendererConfig;
//!
//! let config = RendererConfig::from_toml_str(
//!     r#"
//!     frames_in_flight = 3
//!
//!     [shadow]
//!     map_size = 128
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.frames_in_flight, 3);
//! assert_eq!(config.shadow.map_size, 128);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Largest number of frame slots the scheduler accepts.
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Shadow cube settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Edge length in texels of each cube face.
    pub map_size: u32,
    /// Near plane of the six face projections.
    pub near_plane: f32,
    /// Far plane of the six face projections.
    pub far_plane: f32,
    /// Depth bias subtracted before the occlusion comparison.
    pub depth_bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 256,
            near_plane: 0.1,
            far_plane: 50.0,
            depth_bias: 0.0005,
        }
    }
}

/// Capacities of the four descriptor heaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorHeapSizes {
    /// Render-target views.
    pub render_target: u32,
    /// Depth-stencil views.
    pub depth_stencil: u32,
    /// Shader-resource and constant-buffer views.
    pub shader_resource: u32,
    /// Samplers.
    pub sampler: u32,
}

impl Default for DescriptorHeapSizes {
    fn default() -> Self {
        Self {
            render_target: 32,
            depth_stencil: 64,
            shader_resource: 64,
            sampler: 4,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of buffered frame slots (1 to [`MAX_FRAMES_IN_FLIGHT`]).
    pub frames_in_flight: usize,
    /// Color written for pixels not covered by geometry.
    pub background_color: [f32; 4],
    /// Bytes of transient constant memory owned by each frame slot.
    pub constant_arena_size: u64,
    /// Shadow cube settings.
    pub shadow: ShadowConfig,
    /// Descriptor heap capacities.
    pub descriptor_heaps: DescriptorHeapSizes,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            background_color: [0.1, 0.1, 0.15, 1.0],
            constant_arena_size: 64 * 1024,
            shadow: ShadowConfig::default(),
            descriptor_heaps: DescriptorHeapSizes::default(),
        }
    }
}

impl RendererConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for malformed TOML and
    /// [`Error::Config`] for values that fail [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, otherwise the same
    /// errors as [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading renderer config from {}", path.display());
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.shadow.map_size == 0 {
            return Err(Error::Config("shadow.map_size must be non-zero".into()));
        }
        if !(self.shadow.near_plane > 0.0 && self.shadow.far_plane > self.shadow.near_plane) {
            return Err(Error::Config(format!(
                "shadow planes must satisfy 0 < near < far, got near={} far={}",
                self.shadow.near_plane, self.shadow.far_plane
            )));
        }
        if self.shadow.depth_bias < 0.0 {
            return Err(Error::Config("shadow.depth_bias must not be negative".into()));
        }
        if self.constant_arena_size < 256 {
            return Err(Error::Config(format!(
                "constant_arena_size must hold at least one 256-byte allocation, got {}",
                self.constant_arena_size
            )));
        }
        Ok(())
    }
}
