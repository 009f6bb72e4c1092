//! Graphics pipeline state.
//!
//! - [`PipelineDesc`] gathers the fixed-function state of a draw: program,
//!   input layout, target formats, depth test and culling
//! - [`Pipeline`] owns the device object and frees it on drop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deferred_rhi::device::Device;
//! use deferred_rhi::pipeline::{Pipeline, PipelineDesc};
//! use deferred_rhi::shader::ShaderProgram;
//! use deferred_rhi::texture::Format;
//! use deferred_rhi::vertex::InputLayout;
//!
//! # fn example(device: Arc<dyn Device>) -> Result<(), deferred_rhi::RhiError> {
//! let desc = PipelineDesc::new(ShaderProgram::ShadowDepth, InputLayout::PositionOnly)
//!     .with_depth(Format::D32Float);
//! let pipeline = Pipeline::new(device, desc)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::ShaderProgram;
use crate::texture::Format;
use crate::vertex::InputLayout;

resource_id! {
    /// Device-side identifier of a pipeline.
    PipelineId
}

/// Maximum number of simultaneous color targets.
pub const MAX_COLOR_TARGETS: usize = 4;

/// Depth comparison function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Passes when the new depth is smaller
    Less,
    /// Passes when the new depth is smaller or equal
    LessOrEqual,
    /// Always passes
    Always,
}

impl CompareOp {
    /// Evaluates `incoming <op> stored`.
    #[inline]
    pub fn test(self, incoming: f32, stored: f32) -> bool {
        match self {
            CompareOp::Less => incoming < stored,
            CompareOp::LessOrEqual => incoming <= stored,
            CompareOp::Always => true,
        }
    }
}

/// Triangle face culling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// Draw both faces
    #[default]
    None,
    /// Drop triangles whose screen-space winding is counter-clockwise
    Back,
}

/// Depth test state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// Depth target format.
    pub format: Format,
    /// Comparison applied against the stored depth.
    pub compare: CompareOp,
    /// Whether passing fragments write their depth.
    pub write: bool,
}

/// Full pipeline description.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineDesc {
    /// Program executed by the pipeline.
    pub program: ShaderProgram,
    /// Vertex attributes read.
    pub input_layout: InputLayout,
    /// Formats of the bound color targets, in output order.
    pub color_formats: Vec<Format>,
    /// Depth test, if any.
    pub depth: Option<DepthState>,
    /// Culling.
    pub cull_mode: CullMode,
}

impl PipelineDesc {
    /// Starts a description with no targets.
    pub fn new(program: ShaderProgram, input_layout: InputLayout) -> Self {
        Self {
            program,
            input_layout,
            color_formats: Vec::new(),
            depth: None,
            cull_mode: CullMode::None,
        }
    }

    /// Appends a color target format.
    pub fn with_color(mut self, format: Format) -> Self {
        self.color_formats.push(format);
        self
    }

    /// Enables the depth test with `Less` and depth writes.
    pub fn with_depth(mut self, format: Format) -> Self {
        self.depth = Some(DepthState {
            format,
            compare: CompareOp::Less,
            write: true,
        });
        self
    }

    /// Sets the cull mode.
    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Checks target formats.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] for too many color targets, a depth
    /// format used as color or a color format used as depth.
    pub fn validate(&self) -> RhiResult<()> {
        if self.color_formats.len() > MAX_COLOR_TARGETS {
            return Err(RhiError::PipelineError(format!(
                "{} color targets exceed the limit of {}",
                self.color_formats.len(),
                MAX_COLOR_TARGETS
            )));
        }
        if let Some(format) = self.color_formats.iter().find(|f| f.is_depth()) {
            return Err(RhiError::PipelineError(format!(
                "{:?} cannot be a color target",
                format
            )));
        }
        if let Some(depth) = &self.depth
            && !depth.format.is_depth()
        {
            return Err(RhiError::PipelineError(format!(
                "{:?} cannot be a depth target",
                depth.format
            )));
        }
        if self.color_formats.is_empty() && self.depth.is_none() {
            return Err(RhiError::PipelineError(format!(
                "Pipeline '{}' writes no targets",
                self.program.name()
            )));
        }
        Ok(())
    }
}

/// Pipeline owned by the CPU side.
pub struct Pipeline {
    device: Arc<dyn Device>,
    id: PipelineId,
    desc: PipelineDesc,
}

impl Pipeline {
    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is invalid or creation fails.
    pub fn new(device: Arc<dyn Device>, desc: PipelineDesc) -> RhiResult<Self> {
        desc.validate()?;
        let id = device.create_pipeline(&desc)?;
        debug!(
            "Created pipeline '{}' ({} color targets, depth: {})",
            desc.program.name(),
            desc.color_formats.len(),
            desc.depth.is_some()
        );
        Ok(Self { device, id, desc })
    }

    /// Returns the device-side id.
    #[inline]
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns the description.
    #[inline]
    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.id);
        debug!("Destroyed pipeline '{}'", self.desc.program.name());
    }
}
