//! Lighting resolve.
//!
//! One full-screen triangle reads the attribute targets and the shadow cube
//! and writes the lit color into the slot's presentable buffer. Pixels whose
//! position `w` is zero get the background color.

use std::sync::Arc;

use deferred_rhi::command::{CommandList, PrimitiveTopology, Rect, Viewport};
use deferred_rhi::device::Device;
use deferred_rhi::pipeline::{Pipeline, PipelineDesc};
use deferred_rhi::shader::{
    ATTRIBUTES_TABLE_SLOT, CONSTANTS_SLOT, LightingConstants, MATERIALS_TABLE_SLOT, ShaderProgram,
};
use deferred_rhi::texture::ResourceState;
use deferred_rhi::vertex::InputLayout;
use glam::Vec4;
use tracing::trace;

use super::RenderPass;
use crate::context::FrameContext;
use crate::error::RenderResult;
use crate::frame::PRESENT_FORMAT;

/// Vertices of the full-screen triangle.
const FULLSCREEN_VERTICES: u32 = 3;

/// Resolves the attribute targets into the presentable buffer.
pub struct LightingPass {
    pipeline: Pipeline,
}

impl LightingPass {
    /// Creates the pass and its full-screen pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline cannot be created.
    pub fn new(device: Arc<dyn Device>) -> RenderResult<Self> {
        let desc = PipelineDesc::new(ShaderProgram::LightingResolve, InputLayout::None).with_color(PRESENT_FORMAT);
        Ok(Self {
            pipeline: Pipeline::new(device, desc)?,
        })
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &'static str {
        "lighting"
    }

    fn record(&self, ctx: &mut FrameContext<'_>, commands: &mut CommandList) -> RenderResult<()> {
        let targets = ctx.frame.targets;
        let view = ctx.frame.descriptors.presentable_rtv()?;

        commands.transition_texture(targets.presentable, ResourceState::Present, ResourceState::RenderTarget);
        commands.set_render_targets(&[view], None);
        commands.clear_render_target(view, ctx.background);
        commands.set_viewport(Viewport::new(targets.width as f32, targets.height as f32));
        commands.set_scissor(Rect::new(targets.width, targets.height));
        commands.set_pipeline(self.pipeline.id());

        let binding = ctx.constants.push(&LightingConstants {
            shadow_view_proj: ctx.matrices.shadow_view_proj,
            light_world_pos: ctx.light.world_position.extend(1.0),
            light_view_pos: ctx.light.view_position.extend(1.0),
            light_color: ctx.light.color.extend(1.0),
            background: Vec4::from_array(ctx.background),
            params: Vec4::new(ctx.shadow.depth_bias, ctx.frame.shadow_size as f32, 0.0, 0.0),
        })?;
        commands.set_constant_buffer(CONSTANTS_SLOT, binding);
        commands.set_shader_resources(ATTRIBUTES_TABLE_SLOT, ctx.frame.descriptors.lighting_inputs());
        commands.set_shader_resources(MATERIALS_TABLE_SLOT, ctx.shared.materials());
        commands.set_samplers(ctx.shared.sampler());

        commands.set_primitive_topology(PrimitiveTopology::TriangleList);
        commands.draw(FULLSCREEN_VERTICES, 0);

        commands.transition_texture(targets.presentable, ResourceState::RenderTarget, ResourceState::Present);
        trace!("Recorded lighting pass");
        Ok(())
    }
}
