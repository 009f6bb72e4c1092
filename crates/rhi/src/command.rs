//! Command list recording.
//!
//! A [`CommandList`] is a plain, CPU-side record of GPU commands. Recording
//! never touches the device; the list is handed to a [`Queue`] by value on
//! submission and executed in order there.
//!
//! # Example
//!
//! ```
//! use deferred_rhi::command::{CommandList, Viewport};
//! use deferred_rhi::texture::{ResourceState, TextureId};
//!
//! let target = TextureId::from_raw(7);
//!
//! let mut cmd = CommandList::new("frame");
//! cmd.transition_texture(target, ResourceState::Present, ResourceState::RenderTarget);
//! cmd.set_viewport(Viewport::new(640.0, 480.0));
//! cmd.draw(3, 0);
//! cmd.transition_texture(target, ResourceState::RenderTarget, ResourceState::Present);
//!
//! assert_eq!(cmd.len(), 4);
//! ```
//!
//! [`Queue`]: crate::device::Queue

use crate::buffer::{BufferId, IndexBufferView, VertexBufferView};
use crate::descriptor::{DescriptorHandle, DescriptorRange};
use crate::pipeline::PipelineId;
use crate::texture::{ResourceState, TextureId};

/// Resource a barrier applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// A buffer
    Buffer(BufferId),
    /// A texture (all layers)
    Texture(TextureId),
}

/// A state transition of one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Barrier {
    /// Transitioned resource.
    pub resource: ResourceRef,
    /// State the resource is in before the barrier.
    pub before: ResourceState,
    /// State the resource is in after the barrier.
    pub after: ResourceState,
}

impl Barrier {
    /// Transition of a texture.
    pub fn texture(texture: TextureId, before: ResourceState, after: ResourceState) -> Self {
        Self {
            resource: ResourceRef::Texture(texture),
            before,
            after,
        }
    }

    /// Transition of a buffer.
    pub fn buffer(buffer: BufferId, before: ResourceState, after: ResourceState) -> Self {
        Self {
            resource: ResourceRef::Buffer(buffer),
            before,
            after,
        }
    }
}

/// Viewport transform. Depth range is `[min_depth, max_depth]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Depth mapped from NDC z = 0.
    pub min_depth: f32,
    /// Depth mapped from NDC z = 1.
    pub max_depth: f32,
}

impl Viewport {
    /// Full-target viewport with the default depth range.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Integer rectangle, used for scissors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Rect {
    /// Rectangle anchored at the origin.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// How vertices are assembled into triangles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// Independent triangles, three vertices each
    #[default]
    TriangleList,
    /// Each vertex after the second forms a triangle with the previous two
    TriangleStrip,
}

/// Root constant-buffer binding: a byte range of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantBinding {
    /// Buffer holding the constants.
    pub buffer: BufferId,
    /// Byte offset.
    pub offset: u64,
    /// Byte size.
    pub size: u64,
}

/// A single recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// State transitions, applied in order.
    ResourceBarrier(Vec<Barrier>),
    /// Buffer-to-buffer copy.
    CopyBuffer {
        /// Source buffer
        src: BufferId,
        /// Source offset
        src_offset: u64,
        /// Destination buffer
        dst: BufferId,
        /// Destination offset
        dst_offset: u64,
        /// Bytes copied
        size: u64,
    },
    /// Fills a color view.
    ClearRenderTarget {
        /// Cleared view
        view: DescriptorHandle,
        /// Fill color
        color: [f32; 4],
    },
    /// Fills a depth view.
    ClearDepth {
        /// Cleared view
        view: DescriptorHandle,
        /// Fill depth
        depth: f32,
    },
    /// Binds color and depth targets for following draws.
    SetRenderTargets {
        /// Color views, in output order
        colors: Vec<DescriptorHandle>,
        /// Optional depth view
        depth: Option<DescriptorHandle>,
    },
    /// Sets the viewport.
    SetViewport(Viewport),
    /// Sets the scissor rectangle.
    SetScissor(Rect),
    /// Binds a pipeline.
    SetPipeline(PipelineId),
    /// Sets the root 32-bit constants.
    SetRootConstants(Vec<u32>),
    /// Binds a constant buffer to a root slot.
    SetConstantBuffer {
        /// Root slot
        slot: u32,
        /// Bound byte range
        binding: ConstantBinding,
    },
    /// Binds a shader-resource descriptor table to a root slot.
    SetShaderResources {
        /// Root slot
        slot: u32,
        /// Bound descriptors
        range: DescriptorRange,
    },
    /// Binds a sampler descriptor table.
    SetSamplers(DescriptorRange),
    /// Sets the primitive topology.
    SetPrimitiveTopology(PrimitiveTopology),
    /// Binds a vertex buffer.
    SetVertexBuffer(VertexBufferView),
    /// Binds an index buffer.
    SetIndexBuffer(IndexBufferView),
    /// Indexed draw.
    DrawIndexed {
        /// Indices read
        index_count: u32,
        /// First index
        start_index: u32,
        /// Value added to every index before the vertex fetch
        base_vertex: i32,
    },
    /// Non-indexed draw.
    Draw {
        /// Vertices generated
        vertex_count: u32,
        /// First vertex id
        start_vertex: u32,
    },
}

/// Ordered record of GPU commands.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
}

impl CommandList {
    /// Creates an empty list.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    /// Drops every recorded command, keeping the allocation.
    pub fn reset(&mut self) {
        self.commands.clear();
    }

    /// Returns the debug label.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recorded commands, in order.
    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of recorded commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing has been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Appends a raw command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Records a batch of state transitions.
    pub fn resource_barrier(&mut self, barriers: &[Barrier]) {
        if !barriers.is_empty() {
            self.commands.push(Command::ResourceBarrier(barriers.to_vec()));
        }
    }

    /// Records a single texture transition.
    pub fn transition_texture(&mut self, texture: TextureId, before: ResourceState, after: ResourceState) {
        self.resource_barrier(&[Barrier::texture(texture, before, after)]);
    }

    /// Records a single buffer transition.
    pub fn transition_buffer(&mut self, buffer: BufferId, before: ResourceState, after: ResourceState) {
        self.resource_barrier(&[Barrier::buffer(buffer, before, after)]);
    }

    /// Records a buffer-to-buffer copy.
    pub fn copy_buffer(&mut self, src: BufferId, src_offset: u64, dst: BufferId, dst_offset: u64, size: u64) {
        self.commands.push(Command::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
    }

    /// Clears a color view.
    pub fn clear_render_target(&mut self, view: DescriptorHandle, color: [f32; 4]) {
        self.commands.push(Command::ClearRenderTarget { view, color });
    }

    /// Clears a depth view.
    pub fn clear_depth(&mut self, view: DescriptorHandle, depth: f32) {
        self.commands.push(Command::ClearDepth { view, depth });
    }

    /// Binds color targets and an optional depth target.
    pub fn set_render_targets(&mut self, colors: &[DescriptorHandle], depth: Option<DescriptorHandle>) {
        self.commands.push(Command::SetRenderTargets {
            colors: colors.to_vec(),
            depth,
        });
    }

    /// Sets the viewport.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(Command::SetViewport(viewport));
    }

    /// Sets the scissor rectangle.
    pub fn set_scissor(&mut self, scissor: Rect) {
        self.commands.push(Command::SetScissor(scissor));
    }

    /// Binds a pipeline.
    pub fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    /// Sets root 32-bit constants.
    pub fn set_root_constants(&mut self, values: &[u32]) {
        self.commands.push(Command::SetRootConstants(values.to_vec()));
    }

    /// Binds a constant buffer range to `slot`.
    pub fn set_constant_buffer(&mut self, slot: u32, binding: ConstantBinding) {
        self.commands.push(Command::SetConstantBuffer { slot, binding });
    }

    /// Binds a shader-resource table to `slot`.
    pub fn set_shader_resources(&mut self, slot: u32, range: DescriptorRange) {
        self.commands.push(Command::SetShaderResources { slot, range });
    }

    /// Binds a sampler table.
    pub fn set_samplers(&mut self, range: DescriptorRange) {
        self.commands.push(Command::SetSamplers(range));
    }

    /// Sets the primitive topology.
    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.commands.push(Command::SetPrimitiveTopology(topology));
    }

    /// Binds a vertex buffer.
    pub fn set_vertex_buffer(&mut self, view: VertexBufferView) {
        self.commands.push(Command::SetVertexBuffer(view));
    }

    /// Binds an index buffer.
    pub fn set_index_buffer(&mut self, view: IndexBufferView) {
        self.commands.push(Command::SetIndexBuffer(view));
    }

    /// Records an indexed draw.
    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        });
    }

    /// Records a non-indexed draw.
    pub fn draw(&mut self, vertex_count: u32, start_vertex: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            start_vertex,
        });
    }

    /// Counts the draw commands in the list.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. } | Command::DrawIndexed { .. }))
            .count()
    }
}
