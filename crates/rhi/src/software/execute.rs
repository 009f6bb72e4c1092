//! Command list execution on the software device.
//!
//! Every command validates the resource states it depends on. A failing
//! command stops the list; the queue then treats the device as lost.

use tracing::trace;

use crate::buffer::{BufferId, IndexFormat, MemoryLocation};
use crate::command::{
    Barrier, Command, CommandList, ConstantBinding, PrimitiveTopology, Rect, ResourceRef, Viewport,
};
use crate::descriptor::{Descriptor, DescriptorHandle, DescriptorHeapKind, DescriptorRange, SamplerDesc};
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{PipelineDesc, PipelineId};
use crate::shader::{
    CONSTANTS_SLOT, GeometryConstants, LIGHTING_INPUT_COUNT, LightingConstants, MATERIALS_TABLE_SLOT,
    MaterialData, ATTRIBUTES_TABLE_SLOT, ShaderProgram, ShadowConstants,
};
use crate::texture::{ResourceState, TextureId};
use crate::vertex::Vertex;

use super::raster::{ClipVertex, RasterState, rasterize_triangle};
use super::resources::{ResourceTables, TextureEntry};
use super::shading::{ProgramConstants, ShaderBindings, run_pixel, run_vertex};

/// Bound state accumulated while walking a list.
#[derive(Default)]
struct DrawState {
    pipeline: Option<PipelineId>,
    viewport: Option<Viewport>,
    scissor: Option<Rect>,
    colors: Vec<DescriptorHandle>,
    depth: Option<DescriptorHandle>,
    root_constants: Vec<u32>,
    constant_buffer: Option<ConstantBinding>,
    tables: [Option<DescriptorRange>; 2],
    samplers: Option<DescriptorRange>,
    topology: PrimitiveTopology,
    vertex_buffer: Option<crate::buffer::VertexBufferView>,
    index_buffer: Option<crate::buffer::IndexBufferView>,
}

enum DrawCall {
    Indexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    Vertices {
        vertex_count: u32,
        start_vertex: u32,
    },
}

fn invalid(message: impl Into<String>) -> RhiError {
    RhiError::Validation(message.into())
}

/// Executes every command of `list` in order.
pub(crate) fn execute(tables: &mut ResourceTables, list: &CommandList) -> RhiResult<()> {
    let mut state = DrawState::default();
    for (i, command) in list.commands().iter().enumerate() {
        execute_command(tables, &mut state, command).map_err(|e| {
            RhiError::Validation(format!("list '{}' command {}: {}", list.label(), i, e))
        })?;
    }
    trace!("Executed list '{}' ({} commands)", list.label(), list.len());
    Ok(())
}

fn execute_command(tables: &mut ResourceTables, state: &mut DrawState, command: &Command) -> RhiResult<()> {
    match command {
        Command::ResourceBarrier(barriers) => {
            for barrier in barriers {
                apply_barrier(tables, barrier)?;
            }
        }
        Command::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        } => copy_buffer(tables, *src, *src_offset, *dst, *dst_offset, *size)?,
        Command::ClearRenderTarget { view, color } => {
            let (texture, slice) = render_target_view(tables, *view)?;
            let entry = tables.texture_mut(texture)?;
            expect_state(entry, ResourceState::RenderTarget)?;
            entry.fill(slice, *color);
        }
        Command::ClearDepth { view, depth } => {
            let (texture, slice) = depth_view(tables, *view)?;
            let entry = tables.texture_mut(texture)?;
            expect_state(entry, ResourceState::DepthWrite)?;
            entry.fill(slice, [*depth, 0.0, 0.0, 0.0]);
        }
        Command::SetRenderTargets { colors, depth } => {
            if colors.iter().any(|h| h.kind != DescriptorHeapKind::RenderTarget) {
                return Err(invalid("color target handle from a non render-target heap"));
            }
            if depth.is_some_and(|h| h.kind != DescriptorHeapKind::DepthStencil) {
                return Err(invalid("depth target handle from a non depth-stencil heap"));
            }
            state.colors = colors.clone();
            state.depth = *depth;
        }
        Command::SetViewport(viewport) => state.viewport = Some(*viewport),
        Command::SetScissor(scissor) => state.scissor = Some(*scissor),
        Command::SetPipeline(pipeline) => {
            tables.pipeline(*pipeline)?;
            state.pipeline = Some(*pipeline);
        }
        Command::SetRootConstants(values) => state.root_constants = values.clone(),
        Command::SetConstantBuffer { slot, binding } => {
            if *slot != CONSTANTS_SLOT {
                return Err(invalid(format!("constant buffer slot {} does not exist", slot)));
            }
            state.constant_buffer = Some(*binding);
        }
        Command::SetShaderResources { slot, range } => {
            if range.kind() != DescriptorHeapKind::ShaderResource {
                return Err(invalid("shader-resource table from a non shader-resource heap"));
            }
            let entry = state
                .tables
                .get_mut(*slot as usize)
                .ok_or_else(|| invalid(format!("table slot {} does not exist", slot)))?;
            *entry = Some(*range);
        }
        Command::SetSamplers(range) => {
            if range.kind() != DescriptorHeapKind::Sampler {
                return Err(invalid("sampler table from a non sampler heap"));
            }
            state.samplers = Some(*range);
        }
        Command::SetPrimitiveTopology(topology) => state.topology = *topology,
        Command::SetVertexBuffer(view) => state.vertex_buffer = Some(*view),
        Command::SetIndexBuffer(view) => state.index_buffer = Some(*view),
        Command::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        } => draw(
            tables,
            state,
            DrawCall::Indexed {
                index_count: *index_count,
                start_index: *start_index,
                base_vertex: *base_vertex,
            },
        )?,
        Command::Draw {
            vertex_count,
            start_vertex,
        } => draw(
            tables,
            state,
            DrawCall::Vertices {
                vertex_count: *vertex_count,
                start_vertex: *start_vertex,
            },
        )?,
    }
    Ok(())
}

fn expect_state(entry: &TextureEntry, expected: ResourceState) -> RhiResult<()> {
    if entry.state == expected {
        Ok(())
    } else {
        Err(invalid(format!(
            "texture '{}' is in {:?}, expected {:?}",
            entry.desc.label, entry.state, expected
        )))
    }
}

fn apply_barrier(tables: &mut ResourceTables, barrier: &Barrier) -> RhiResult<()> {
    let (current, label) = match barrier.resource {
        ResourceRef::Texture(id) => {
            let entry = tables.texture_mut(id)?;
            (&mut entry.state, &entry.desc.label)
        }
        ResourceRef::Buffer(id) => {
            let entry = tables.buffer_mut(id)?;
            if !entry.is_tracked() {
                return Err(invalid(format!(
                    "buffer '{}' is host-visible and has no tracked state",
                    entry.desc.label
                )));
            }
            (&mut entry.state, &entry.desc.label)
        }
    };

    if *current != barrier.before {
        return Err(invalid(format!(
            "barrier on '{}' expects {:?} but resource is in {:?}",
            label, barrier.before, current
        )));
    }
    *current = barrier.after;
    Ok(())
}

fn copy_buffer(
    tables: &mut ResourceTables,
    src: BufferId,
    src_offset: u64,
    dst: BufferId,
    dst_offset: u64,
    size: u64,
) -> RhiResult<()> {
    if src == dst {
        return Err(invalid("copy source and destination are the same buffer"));
    }

    let source = tables.buffer(src)?;
    let readable = match source.location() {
        MemoryLocation::GpuOnly => source.state == ResourceState::CopySource,
        MemoryLocation::CpuToGpu => true,
        MemoryLocation::GpuToCpu => false,
    };
    if !readable {
        return Err(invalid(format!(
            "buffer '{}' cannot be a copy source in {:?}",
            source.desc.label, source.state
        )));
    }
    let bytes = source.data[source.range(src_offset, size)?].to_vec();

    let destination = tables.buffer_mut(dst)?;
    let writable = match destination.location() {
        MemoryLocation::GpuOnly => destination.state == ResourceState::CopyDest,
        MemoryLocation::CpuToGpu => false,
        MemoryLocation::GpuToCpu => true,
    };
    if !writable {
        return Err(invalid(format!(
            "buffer '{}' cannot be a copy destination in {:?}",
            destination.desc.label, destination.state
        )));
    }
    let range = destination.range(dst_offset, size)?;
    destination.data[range].copy_from_slice(&bytes);
    Ok(())
}

fn render_target_view(tables: &ResourceTables, handle: DescriptorHandle) -> RhiResult<(TextureId, u32)> {
    match tables.descriptor(handle)? {
        Descriptor::RenderTarget {
            texture,
            array_slice,
        } => {
            tables.texture(texture)?.check_layer(array_slice)?;
            Ok((texture, array_slice))
        }
        other => Err(invalid(format!("{:?} is not a render-target view", other))),
    }
}

fn depth_view(tables: &ResourceTables, handle: DescriptorHandle) -> RhiResult<(TextureId, u32)> {
    match tables.descriptor(handle)? {
        Descriptor::DepthStencil {
            texture,
            array_slice,
        } => {
            tables.texture(texture)?.check_layer(array_slice)?;
            Ok((texture, array_slice))
        }
        other => Err(invalid(format!("{:?} is not a depth-stencil view", other))),
    }
}

/// Targets removed from the table for the duration of a draw, so shader
/// inputs can be borrowed from the table while targets are written.
struct BoundTargets {
    colors: Vec<(TextureId, u32, TextureEntry)>,
    depth: Option<(TextureId, u32, TextureEntry)>,
}

impl BoundTargets {
    fn take(
        tables: &mut ResourceTables,
        colors: &[(TextureId, u32)],
        depth: Option<(TextureId, u32)>,
    ) -> RhiResult<Self> {
        let mut bound = Self {
            colors: Vec::with_capacity(colors.len()),
            depth: None,
        };
        for &(id, slice) in colors {
            match tables.textures.remove(&id) {
                Some(entry) => bound.colors.push((id, slice, entry)),
                None => {
                    bound.restore(tables);
                    return Err(invalid(format!("texture {:?} bound twice or missing", id)));
                }
            }
        }
        if let Some((id, slice)) = depth {
            match tables.textures.remove(&id) {
                Some(entry) => bound.depth = Some((id, slice, entry)),
                None => {
                    bound.restore(tables);
                    return Err(invalid(format!("depth texture {:?} bound twice or missing", id)));
                }
            }
        }
        Ok(bound)
    }

    fn restore(self, tables: &mut ResourceTables) {
        for (id, _, entry) in self.colors {
            tables.textures.insert(id, entry);
        }
        if let Some((id, _, entry)) = self.depth {
            tables.textures.insert(id, entry);
        }
    }

    fn extent(&self) -> Option<(u32, u32)> {
        self.colors
            .first()
            .map(|(_, _, e)| (e.width(), e.height()))
            .or_else(|| self.depth.as_ref().map(|(_, _, e)| (e.width(), e.height())))
    }
}

fn draw(tables: &mut ResourceTables, state: &DrawState, call: DrawCall) -> RhiResult<()> {
    let pipeline_id = state.pipeline.ok_or_else(|| invalid("draw without a pipeline"))?;
    let pipeline = tables.pipeline(pipeline_id)?.clone();

    let colors = state
        .colors
        .iter()
        .map(|h| render_target_view(tables, *h))
        .collect::<RhiResult<Vec<_>>>()?;
    if colors.len() != pipeline.color_formats.len() {
        return Err(invalid(format!(
            "pipeline '{}' writes {} color targets, {} bound",
            pipeline.program.name(),
            pipeline.color_formats.len(),
            colors.len()
        )));
    }
    for (&(id, _), format) in colors.iter().zip(&pipeline.color_formats) {
        let entry = tables.texture(id)?;
        expect_state(entry, ResourceState::RenderTarget)?;
        if entry.desc.format != *format {
            return Err(invalid(format!(
                "target '{}' is {:?}, pipeline expects {:?}",
                entry.desc.label, entry.desc.format, format
            )));
        }
    }

    let depth = match (&pipeline.depth, state.depth) {
        (Some(depth_state), Some(handle)) => {
            let (id, slice) = depth_view(tables, handle)?;
            let entry = tables.texture(id)?;
            expect_state(entry, ResourceState::DepthWrite)?;
            if entry.desc.format != depth_state.format {
                return Err(invalid("depth target format does not match the pipeline"));
            }
            Some((id, slice))
        }
        (Some(_), None) => {
            return Err(invalid(format!(
                "pipeline '{}' needs a depth target",
                pipeline.program.name()
            )));
        }
        (None, _) => None,
    };

    let mut targets = BoundTargets::take(tables, &colors, depth)?;
    let result = draw_into(tables, state, &pipeline, call, &mut targets);
    targets.restore(tables);
    result
}

fn draw_into(
    tables: &ResourceTables,
    state: &DrawState,
    pipeline: &PipelineDesc,
    call: DrawCall,
    targets: &mut BoundTargets,
) -> RhiResult<()> {
    let (width, height) = targets
        .extent()
        .ok_or_else(|| invalid("draw without targets"))?;
    if targets
        .colors
        .iter()
        .map(|(_, _, e)| (e.width(), e.height()))
        .chain(targets.depth.iter().map(|(_, _, e)| (e.width(), e.height())))
        .any(|extent| extent != (width, height))
    {
        return Err(invalid("bound targets differ in size"));
    }

    let viewport = state
        .viewport
        .ok_or_else(|| invalid("draw without a viewport"))?;
    let scissor = clamp_scissor(state.scissor.unwrap_or(Rect::new(width, height)), width, height);

    let bindings = resolve_bindings(tables, state, pipeline.program)?;
    let vertices = fetch_vertices(tables, state, pipeline, &call)?;
    let clip: Vec<ClipVertex> = vertices
        .iter()
        .map(|(id, v)| run_vertex(&bindings, *id, v))
        .collect();

    let raster = RasterState {
        viewport,
        scissor,
        cull_mode: pipeline.cull_mode,
    };
    let depth_state = pipeline.depth;

    let mut emit = |fragment: &super::raster::Fragment| {
        if let (Some(ds), Some((_, slice, entry))) = (&depth_state, targets.depth.as_mut()) {
            let stored = entry.texel(*slice, fragment.x, fragment.y)[0];
            if !ds.compare.test(fragment.depth, stored) {
                return;
            }
            if ds.write {
                entry.set_texel(*slice, fragment.x, fragment.y, [fragment.depth, 0.0, 0.0, 0.0]);
            }
        }
        if targets.colors.is_empty() {
            return;
        }
        let outputs = run_pixel(&bindings, fragment);
        for (i, (_, slice, entry)) in targets.colors.iter_mut().enumerate() {
            entry.set_texel(*slice, fragment.x, fragment.y, outputs[i]);
        }
    };

    for triangle in assemble(&clip, state.topology) {
        rasterize_triangle(&triangle, &raster, &mut emit);
    }
    Ok(())
}

fn clamp_scissor(scissor: Rect, width: u32, height: u32) -> Rect {
    let x = scissor.x.min(width);
    let y = scissor.y.min(height);
    Rect {
        x,
        y,
        width: scissor.width.min(width - x),
        height: scissor.height.min(height - y),
    }
}

fn assemble(vertices: &[ClipVertex], topology: PrimitiveTopology) -> Vec<[ClipVertex; 3]> {
    match topology {
        PrimitiveTopology::TriangleList => vertices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect(),
        PrimitiveTopology::TriangleStrip => vertices
            .windows(3)
            .enumerate()
            .map(|(i, t)| {
                if i % 2 == 0 {
                    [t[0], t[1], t[2]]
                } else {
                    [t[1], t[0], t[2]]
                }
            })
            .collect(),
    }
}

fn read_constants<T: bytemuck::Pod>(tables: &ResourceTables, binding: &ConstantBinding) -> RhiResult<T> {
    let buffer = tables.buffer(binding.buffer)?;
    let readable = match buffer.location() {
        MemoryLocation::CpuToGpu => true,
        MemoryLocation::GpuOnly => buffer.state == ResourceState::VertexAndConstantBuffer,
        MemoryLocation::GpuToCpu => false,
    };
    if !readable {
        return Err(invalid(format!(
            "buffer '{}' is not readable as constants",
            buffer.desc.label
        )));
    }
    let size = std::mem::size_of::<T>() as u64;
    if binding.size < size {
        return Err(invalid(format!(
            "constant binding of {} bytes is smaller than the {} bytes the program reads",
            binding.size, size
        )));
    }
    let range = buffer.range(binding.offset, size)?;
    Ok(bytemuck::pod_read_unaligned(&buffer.data[range]))
}

fn resolve_bindings<'a>(
    tables: &'a ResourceTables,
    state: &DrawState,
    program: ShaderProgram,
) -> RhiResult<ShaderBindings<'a>> {
    let binding = state
        .constant_buffer
        .ok_or_else(|| invalid(format!("program '{}' has no constants bound", program.name())))?;

    let constants = match program {
        ShaderProgram::ShadowDepth => {
            ProgramConstants::Shadow(read_constants::<ShadowConstants>(tables, &binding)?)
        }
        ShaderProgram::GeometryAttributes => {
            ProgramConstants::Geometry(read_constants::<GeometryConstants>(tables, &binding)?)
        }
        ShaderProgram::LightingResolve => {
            ProgramConstants::Lighting(read_constants::<LightingConstants>(tables, &binding)?)
        }
    };

    let mut bindings = ShaderBindings {
        constants,
        material_index: 0,
        materials: Vec::new(),
        inputs: Vec::new(),
        sampler: SamplerDesc::default(),
    };

    if program == ShaderProgram::ShadowDepth {
        return Ok(bindings);
    }

    bindings.materials = read_materials(tables, state)?;

    match program {
        ShaderProgram::GeometryAttributes => {
            let index = state
                .root_constants
                .first()
                .copied()
                .ok_or_else(|| invalid("geometry draw without a material index"))?;
            if index as usize >= bindings.materials.len() {
                return Err(invalid(format!(
                    "material index {} out of range of {} materials",
                    index,
                    bindings.materials.len()
                )));
            }
            bindings.material_index = index;
        }
        ShaderProgram::LightingResolve => {
            let table = state.tables[ATTRIBUTES_TABLE_SLOT as usize]
                .ok_or_else(|| invalid("lighting draw without its input table"))?;
            if table.count() < LIGHTING_INPUT_COUNT {
                return Err(invalid(format!(
                    "lighting input table has {} entries, {} needed",
                    table.count(),
                    LIGHTING_INPUT_COUNT
                )));
            }
            for i in 0..LIGHTING_INPUT_COUNT {
                let texture = match tables.descriptor(table.handle(i)?)? {
                    Descriptor::Texture { texture } => texture,
                    other => return Err(invalid(format!("{:?} is not a texture view", other))),
                };
                let entry = tables.texture(texture).map_err(|_| {
                    invalid(format!("input texture {:?} is missing or bound as a target", texture))
                })?;
                expect_state(entry, ResourceState::ShaderResource)?;
                bindings.inputs.push(entry);
            }

            let samplers = state
                .samplers
                .ok_or_else(|| invalid("lighting draw without a sampler"))?;
            bindings.sampler = match tables.descriptor(samplers.handle(0)?)? {
                Descriptor::Sampler(desc) => desc,
                other => return Err(invalid(format!("{:?} is not a sampler", other))),
            };
        }
        ShaderProgram::ShadowDepth => {}
    }

    Ok(bindings)
}

fn read_materials(tables: &ResourceTables, state: &DrawState) -> RhiResult<Vec<MaterialData>> {
    let table = state.tables[MATERIALS_TABLE_SLOT as usize]
        .ok_or_else(|| invalid("draw without a material table"))?;
    let (buffer, stride, count) = match tables.descriptor(table.handle(0)?)? {
        Descriptor::StructuredBuffer {
            buffer,
            stride,
            count,
        } => (buffer, stride, count),
        other => return Err(invalid(format!("{:?} is not a structured buffer", other))),
    };
    if stride as usize != MaterialData::SIZE {
        return Err(invalid(format!(
            "material stride {} does not match {}",
            stride,
            MaterialData::SIZE
        )));
    }

    let entry = tables.buffer(buffer)?;
    if entry.is_tracked() && entry.state != ResourceState::ShaderResource {
        return Err(invalid(format!(
            "material buffer '{}' is in {:?}, expected ShaderResource",
            entry.desc.label, entry.state
        )));
    }
    let range = entry.range(0, stride as u64 * count as u64)?;
    Ok(entry.data[range]
        .chunks_exact(MaterialData::SIZE)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

/// `start..start + count`, rejecting ranges past `u32::MAX`.
fn draw_range(start: u32, count: u32, what: &str) -> RhiResult<std::ops::Range<u32>> {
    let end = start
        .checked_add(count)
        .ok_or_else(|| invalid(format!("{} range {} + {} overflows", what, start, count)))?;
    Ok(start..end)
}

/// Returns `(vertex id, vertex)` pairs in draw order.
fn fetch_vertices(
    tables: &ResourceTables,
    state: &DrawState,
    pipeline: &PipelineDesc,
    call: &DrawCall,
) -> RhiResult<Vec<(u32, Vertex)>> {
    let vertex_data = if pipeline.input_layout.needs_vertex_buffer() {
        let view = state
            .vertex_buffer
            .ok_or_else(|| invalid("draw without a vertex buffer"))?;
        let entry = tables.buffer(view.buffer)?;
        if entry.is_tracked() && entry.state != ResourceState::VertexAndConstantBuffer {
            return Err(invalid(format!(
                "vertex buffer '{}' is in {:?}",
                entry.desc.label, entry.state
            )));
        }
        if view.stride as usize != std::mem::size_of::<Vertex>() {
            return Err(invalid(format!("unsupported vertex stride {}", view.stride)));
        }
        Some(&entry.data[entry.range(view.offset, view.size)?])
    } else {
        None
    };

    let fetch = |id: u32| -> RhiResult<Vertex> {
        let Some(data) = vertex_data else {
            return Ok(Vertex::default());
        };
        let start = id as usize * Vertex::STRIDE as usize;
        let bytes = data
            .get(start..start + Vertex::STRIDE as usize)
            .ok_or_else(|| invalid(format!("vertex {} out of range", id)))?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    };

    match *call {
        DrawCall::Vertices {
            vertex_count,
            start_vertex,
        } => draw_range(start_vertex, vertex_count, "vertex")?
            .map(|id| -> RhiResult<(u32, Vertex)> { Ok((id, fetch(id)?)) })
            .collect(),
        DrawCall::Indexed {
            index_count,
            start_index,
            base_vertex,
        } => {
            let view = state
                .index_buffer
                .ok_or_else(|| invalid("indexed draw without an index buffer"))?;
            let entry = tables.buffer(view.buffer)?;
            if entry.is_tracked() && entry.state != ResourceState::IndexBuffer {
                return Err(invalid(format!(
                    "index buffer '{}' is in {:?}",
                    entry.desc.label, entry.state
                )));
            }
            let data = &entry.data[entry.range(view.offset, view.size)?];
            let width = view.format.size() as usize;

            draw_range(start_index, index_count, "index")?
                .map(|i| -> RhiResult<(u32, Vertex)> {
                    let at = i as usize * width;
                    let bytes = data
                        .get(at..at + width)
                        .ok_or_else(|| invalid(format!("index {} out of range", i)))?;
                    let index = match view.format {
                        IndexFormat::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as i64,
                        IndexFormat::U32 => {
                            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64
                        }
                    };
                    let id = u32::try_from(index + base_vertex as i64)
                        .map_err(|_| invalid(format!("vertex index {} out of range", index)))?;
                    Ok((id, fetch(id)?))
                })
                .collect()
        }
    }
}
