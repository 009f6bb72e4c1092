//! Omnidirectional shadow pass.
//!
//! Renders the scene's depth as seen from the point light into each face of
//! the slot's shadow cube. Faces are ordered +X, -X, +Y, -Y, +Z, -Z and each
//! gets its own constant block holding that face's view-projection.

use std::sync::Arc;

use deferred_rhi::command::{CommandList, Rect, Viewport};
use deferred_rhi::device::Device;
use deferred_rhi::pipeline::{CullMode, Pipeline, PipelineDesc};
use deferred_rhi::shader::{CONSTANTS_SLOT, ShaderProgram, ShadowConstants};
use deferred_rhi::texture::{CUBE_FACE_COUNT, ResourceState};
use deferred_rhi::vertex::InputLayout;
use tracing::trace;

use super::{RenderPass, draw_mesh};
use crate::context::FrameContext;
use crate::error::RenderResult;
use crate::frame::DEPTH_FORMAT;

/// Depth written to every texel before the faces are rendered.
const FAR_DEPTH: f32 = 1.0;

/// Depth-only pass over the six cube faces.
pub struct ShadowPass {
    pipeline: Pipeline,
}

impl ShadowPass {
    /// Creates the pass and its depth-only pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline cannot be created.
    pub fn new(device: Arc<dyn Device>) -> RenderResult<Self> {
        let desc = PipelineDesc::new(ShaderProgram::ShadowDepth, InputLayout::PositionOnly)
            .with_depth(DEPTH_FORMAT)
            .with_cull_mode(CullMode::None);
        Ok(Self {
            pipeline: Pipeline::new(device, desc)?,
        })
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        "shadow"
    }

    fn record(&self, ctx: &mut FrameContext<'_>, commands: &mut CommandList) -> RenderResult<()> {
        let cube = ctx.frame.targets.shadow;
        let size = ctx.frame.shadow_size;

        commands.transition_texture(cube, ResourceState::ShaderResource, ResourceState::DepthWrite);
        commands.set_pipeline(self.pipeline.id());
        commands.set_viewport(Viewport::new(size as f32, size as f32));
        commands.set_scissor(Rect::new(size, size));

        let light_pos = ctx.light.world_position.extend(1.0);
        for face in 0..CUBE_FACE_COUNT {
            let constants = ShadowConstants {
                view_proj: ctx.matrices.shadow_view_proj[face as usize],
                world: ctx.matrices.world,
                light_pos,
            };
            let binding = ctx.constants.push(&constants)?;
            let view = ctx.frame.descriptors.shadow_face_dsv(face)?;

            commands.set_render_targets(&[], Some(view));
            commands.clear_depth(view, FAR_DEPTH);
            commands.set_constant_buffer(CONSTANTS_SLOT, binding);
            for draw in ctx.draws {
                draw_mesh(commands, draw);
            }
        }

        commands.transition_texture(cube, ResourceState::DepthWrite, ResourceState::ShaderResource);
        trace!("Recorded shadow pass: {} faces, {} draws each", CUBE_FACE_COUNT, ctx.draws.len());
        Ok(())
    }
}
