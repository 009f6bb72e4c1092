//! Geometry pass.
//!
//! Fills the slot's attribute targets: world position (with `w = 1` where a
//! triangle landed), diffuse albedo and world normal with the material index
//! in `w`. The position target is cleared to [`POSITION_SENTINEL`] so the
//! lighting pass can tell background pixels apart.

use std::sync::Arc;

use deferred_rhi::command::{Barrier, CommandList, Rect, Viewport};
use deferred_rhi::device::Device;
use deferred_rhi::pipeline::{CullMode, Pipeline, PipelineDesc};
use deferred_rhi::shader::{CONSTANTS_SLOT, GeometryConstants, MATERIALS_TABLE_SLOT, ShaderProgram};
use deferred_rhi::texture::ResourceState;
use deferred_rhi::vertex::InputLayout;
use tracing::trace;

use super::{RenderPass, draw_mesh};
use crate::context::FrameContext;
use crate::error::RenderResult;
use crate::frame::{DEPTH_FORMAT, DIFFUSE_FORMAT, NORMAL_FORMAT, POSITION_FORMAT, POSITION_SENTINEL};

/// Writes per-pixel surface attributes.
pub struct GeometryPass {
    pipeline: Pipeline,
}

impl GeometryPass {
    /// Creates the pass and its three-target pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline cannot be created.
    pub fn new(device: Arc<dyn Device>) -> RenderResult<Self> {
        let desc = PipelineDesc::new(ShaderProgram::GeometryAttributes, InputLayout::Full)
            .with_color(POSITION_FORMAT)
            .with_color(DIFFUSE_FORMAT)
            .with_color(NORMAL_FORMAT)
            .with_depth(DEPTH_FORMAT)
            .with_cull_mode(CullMode::None);
        Ok(Self {
            pipeline: Pipeline::new(device, desc)?,
        })
    }
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &'static str {
        "geometry"
    }

    fn record(&self, ctx: &mut FrameContext<'_>, commands: &mut CommandList) -> RenderResult<()> {
        let targets = ctx.frame.targets;
        let attributes = [targets.position, targets.diffuse, targets.normal];
        let views = ctx.frame.descriptors.attribute_rtvs()?;
        let depth = ctx.frame.descriptors.scene_dsv()?;

        let to_target: Vec<Barrier> = attributes
            .iter()
            .map(|&t| Barrier::texture(t, ResourceState::ShaderResource, ResourceState::RenderTarget))
            .collect();
        commands.resource_barrier(&to_target);

        commands.set_render_targets(&views, Some(depth));
        for view in views {
            commands.clear_render_target(view, POSITION_SENTINEL);
        }
        commands.clear_depth(depth, 1.0);
        commands.set_viewport(Viewport::new(targets.width as f32, targets.height as f32));
        commands.set_scissor(Rect::new(targets.width, targets.height));
        commands.set_pipeline(self.pipeline.id());

        let m = ctx.matrices;
        let binding = ctx.constants.push(&GeometryConstants {
            world: m.world,
            world_view: m.world_view,
            world_view_proj: m.world_view_proj,
            normal_matrix: m.normal_matrix,
        })?;
        commands.set_constant_buffer(CONSTANTS_SLOT, binding);
        commands.set_shader_resources(MATERIALS_TABLE_SLOT, ctx.shared.materials());

        for draw in ctx.draws {
            commands.set_root_constants(&[draw.material_index]);
            draw_mesh(commands, draw);
        }

        let to_resource: Vec<Barrier> = attributes
            .iter()
            .map(|&t| Barrier::texture(t, ResourceState::RenderTarget, ResourceState::ShaderResource))
            .collect();
        commands.resource_barrier(&to_resource);

        trace!("Recorded geometry pass: {} draws", ctx.draws.len());
        Ok(())
    }
}
