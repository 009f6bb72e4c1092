//! The three render passes.
//!
//! Each pass owns its pipeline and records into the slot's command list. A
//! frame records them in a fixed order:
//!
//! 1. [`ShadowPass`] renders light-space depth into the six cube faces
//! 2. [`GeometryPass`] writes position, diffuse and normal per pixel
//! 3. [`LightingPass`] resolves the attribute targets into the presentable
//!
//! Passes leave every resource they touch in the state they found it in, so
//! the order of transitions within a slot stays fixed from frame to frame.

mod geometry;
mod lighting;
mod shadow;

pub use geometry::GeometryPass;
pub use lighting::LightingPass;
pub use shadow::ShadowPass;

use deferred_rhi::command::CommandList;

use crate::context::{DrawCallArgs, FrameContext};
use crate::error::RenderResult;

/// A fixed stage of the frame.
pub trait RenderPass {
    /// Pass name, for logging.
    fn name(&self) -> &'static str;

    /// Records the pass into `commands`.
    ///
    /// # Errors
    ///
    /// Returns an error if constants cannot be allocated or a descriptor
    /// range is malformed. The caller discards the partial list.
    fn record(&self, ctx: &mut FrameContext<'_>, commands: &mut CommandList) -> RenderResult<()>;
}

/// Binds one mesh's buffers and issues its indexed draw.
fn draw_mesh(commands: &mut CommandList, draw: &DrawCallArgs) {
    commands.set_primitive_topology(draw.topology);
    commands.set_vertex_buffer(draw.vertex_buffer);
    commands.set_index_buffer(draw.index_buffer);
    commands.draw_indexed(draw.index_count, draw.start_index, draw.vertex_offset);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use deferred_core::{RendererConfig, ShadowConfig};
    use deferred_rhi::buffer::{BufferId, IndexBufferView, IndexFormat, VertexBufferView};
    use deferred_rhi::command::PrimitiveTopology;
    use deferred_rhi::descriptor::{DescriptorAllocator, DescriptorHeapCapacities};
    use deferred_rhi::device::{Backend, Device};
    use deferred_rhi::software::SoftwareBackend;
    use deferred_rhi::texture::TextureId;
    use deferred_rhi::vertex::Vertex;
    use deferred_scene::PointLight;
    use glam::Mat4;

    use crate::context::{DrawCallArgs, FrameContext, FrameMatrices, LightState};
    use crate::descriptors::SharedDescriptors;
    use crate::frame::Frame;

    /// A slot and the shared state passes need, on a software device.
    pub struct PassFixture {
        pub device: Arc<dyn Device>,
        pub frame: Frame,
        pub shared: SharedDescriptors,
        pub matrices: FrameMatrices,
        pub light: LightState,
        pub draws: Vec<DrawCallArgs>,
        pub shadow: ShadowConfig,
        _allocator: DescriptorAllocator,
    }

    impl PassFixture {
        pub fn new(draw_count: usize) -> Self {
            let backend = SoftwareBackend::new();
            let surface = backend.create_surface(8, 8);
            let device = backend.create_device(surface).unwrap();
            let mut allocator =
                DescriptorAllocator::new(device.clone(), &DescriptorHeapCapacities::default()).unwrap();
            let config = RendererConfig::default();
            let shadow = ShadowConfig {
                map_size: 8,
                ..config.shadow
            };
            let frame = Frame::new(
                &device,
                &mut allocator,
                0,
                TextureId::from_raw(999),
                (8, 8),
                &shadow,
                config.constant_arena_size,
            )
            .unwrap();
            let shared = SharedDescriptors::allocate(&mut allocator).unwrap();

            let light = PointLight::default();
            let matrices = FrameMatrices::compute(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY, &light, &shadow);
            let draws = (0..draw_count)
                .map(|i| DrawCallArgs {
                    topology: PrimitiveTopology::TriangleList,
                    vertex_buffer: VertexBufferView {
                        buffer: BufferId::from_raw(500),
                        offset: 0,
                        size: 3 * Vertex::STRIDE as u64,
                        stride: Vertex::STRIDE,
                    },
                    index_buffer: IndexBufferView {
                        buffer: BufferId::from_raw(501),
                        offset: 0,
                        size: 12,
                        format: IndexFormat::U32,
                    },
                    index_count: 3,
                    start_index: 0,
                    vertex_offset: 0,
                    material_index: i as u32,
                })
                .collect();

            Self {
                device,
                frame,
                shared,
                matrices,
                light: LightState::new(&light, &Mat4::IDENTITY),
                draws,
                shadow,
                _allocator: allocator,
            }
        }

        pub fn context(&mut self) -> FrameContext<'_> {
            let (frame, constants) = self.frame.split_mut();
            FrameContext {
                frame,
                constants,
                matrices: &self.matrices,
                light: &self.light,
                draws: &self.draws,
                shared: &self.shared,
                shadow: &self.shadow,
                background: [0.1, 0.2, 0.3, 1.0],
            }
        }
    }
}
