//! Resource tables of the software device.

use std::collections::HashMap;

use tracing::trace;

use crate::buffer::{BufferDesc, BufferId, MemoryLocation};
use crate::descriptor::{Descriptor, DescriptorHandle, DescriptorHeapId, DescriptorHeapKind};
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{PipelineDesc, PipelineId};
use crate::swapchain::{SurfaceHandle, SwapChainDesc, SwapChainId};
use crate::texture::{Format, ResourceState, TextureDesc, TextureId};

use super::TextureImage;

pub(crate) type Texel = [f32; 4];

pub(crate) struct BufferEntry {
    pub desc: BufferDesc,
    pub data: Vec<u8>,
    pub state: ResourceState,
}

impl BufferEntry {
    /// GPU-only buffers are the only ones with a tracked state.
    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.desc.usage.memory_location() == MemoryLocation::GpuOnly
    }

    #[inline]
    pub fn location(&self) -> MemoryLocation {
        self.desc.usage.memory_location()
    }

    pub fn range(&self, offset: u64, size: u64) -> RhiResult<std::ops::Range<usize>> {
        let end = offset.checked_add(size).filter(|end| *end <= self.data.len() as u64);
        match end {
            Some(end) => Ok(offset as usize..end as usize),
            None => Err(RhiError::Validation(format!(
                "range {}..{} out of bounds of buffer '{}' ({} bytes)",
                offset,
                offset.saturating_add(size),
                self.desc.label,
                self.data.len()
            ))),
        }
    }
}

pub(crate) struct TextureEntry {
    pub desc: TextureDesc,
    pub layers: Vec<Vec<Texel>>,
    pub state: ResourceState,
    /// Swap chain owning the texture, if it is a presentable buffer.
    pub swap_chain: Option<SwapChainId>,
}

impl TextureEntry {
    pub fn new(desc: TextureDesc) -> Self {
        let texel = quantize(desc.format, desc.clear_value);
        let len = desc.width as usize * desc.height as usize;
        let layers = (0..desc.layer_count())
            .map(|_| vec![texel; len])
            .collect();
        Self {
            state: desc.initial_state,
            desc,
            layers,
            swap_chain: None,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// Reads a texel; coordinates are clamped to the edge.
    #[inline]
    pub fn texel(&self, layer: u32, x: u32, y: u32) -> Texel {
        let x = x.min(self.desc.width - 1) as usize;
        let y = y.min(self.desc.height - 1) as usize;
        self.layers[layer as usize][y * self.desc.width as usize + x]
    }

    #[inline]
    pub fn set_texel(&mut self, layer: u32, x: u32, y: u32, value: Texel) {
        let index = y as usize * self.desc.width as usize + x as usize;
        self.layers[layer as usize][index] = quantize(self.desc.format, value);
    }

    pub fn fill(&mut self, layer: u32, value: Texel) {
        let value = quantize(self.desc.format, value);
        self.layers[layer as usize].fill(value);
    }

    pub fn check_layer(&self, layer: u32) -> RhiResult<()> {
        if layer < self.desc.layer_count() {
            Ok(())
        } else {
            Err(RhiError::Validation(format!(
                "layer {} out of range of texture '{}' ({} layers)",
                layer,
                self.desc.label,
                self.desc.layer_count()
            )))
        }
    }

    pub fn image(&self, layer: u32) -> RhiResult<TextureImage> {
        self.check_layer(layer)?;
        Ok(TextureImage {
            width: self.desc.width,
            height: self.desc.height,
            format: self.desc.format,
            texels: self.layers[layer as usize].clone(),
        })
    }
}

/// Stores a value the way the format would.
fn quantize(format: Format, value: Texel) -> Texel {
    match format {
        Format::Rgba8Unorm => value.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() / 255.0),
        Format::D32Float => [value[0], 0.0, 0.0, 0.0],
        Format::Rgba16Float | Format::Rgba32Float => value,
    }
}

pub(crate) struct HeapEntry {
    pub kind: DescriptorHeapKind,
    pub slots: Vec<Option<Descriptor>>,
}

pub(crate) struct SwapChainEntry {
    pub desc: SwapChainDesc,
    pub buffers: Vec<TextureId>,
}

pub(crate) struct PresentedImage {
    pub image: TextureImage,
    pub count: u64,
}

/// Every object the software device knows about.
#[derive(Default)]
pub(crate) struct ResourceTables {
    next_id: u64,
    pub buffers: HashMap<BufferId, BufferEntry>,
    pub textures: HashMap<TextureId, TextureEntry>,
    pub pipelines: HashMap<PipelineId, PipelineDesc>,
    pub heaps: HashMap<DescriptorHeapId, HeapEntry>,
    pub swap_chains: HashMap<SwapChainId, SwapChainEntry>,
    pub presented: HashMap<SurfaceHandle, PresentedImage>,
}

impl ResourceTables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert_buffer(&mut self, desc: &BufferDesc) -> BufferId {
        let id = BufferId::from_raw(self.next_id());
        self.buffers.insert(
            id,
            BufferEntry {
                desc: desc.clone(),
                data: vec![0; desc.size as usize],
                state: desc.usage.initial_state(),
            },
        );
        id
    }

    pub fn insert_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId::from_raw(self.next_id());
        self.textures.insert(id, TextureEntry::new(desc.clone()));
        id
    }

    pub fn insert_pipeline(&mut self, desc: &PipelineDesc) -> PipelineId {
        let id = PipelineId::from_raw(self.next_id());
        self.pipelines.insert(id, desc.clone());
        id
    }

    pub fn insert_heap(&mut self, kind: DescriptorHeapKind, capacity: u32) -> DescriptorHeapId {
        let id = DescriptorHeapId::from_raw(self.next_id());
        self.heaps.insert(
            id,
            HeapEntry {
                kind,
                slots: vec![None; capacity as usize],
            },
        );
        id
    }

    /// Creates `desc.buffer_count` presentable textures for a swap chain.
    pub fn insert_presentable(&mut self, swap_chain: SwapChainId, desc: &SwapChainDesc) -> Vec<TextureId> {
        (0..desc.buffer_count)
            .map(|i| {
                let texture = TextureDesc::new_2d(
                    format!("swap chain buffer {}", i),
                    desc.width,
                    desc.height,
                    desc.format,
                )
                .with_initial_state(ResourceState::Present);
                let id = self.insert_texture(&texture);
                if let Some(entry) = self.textures.get_mut(&id) {
                    entry.swap_chain = Some(swap_chain);
                }
                id
            })
            .collect()
    }

    pub fn insert_swap_chain(&mut self, desc: &SwapChainDesc) -> (SwapChainId, Vec<TextureId>) {
        let id = SwapChainId::from_raw(self.next_id());
        let buffers = self.insert_presentable(id, desc);
        self.swap_chains.insert(
            id,
            SwapChainEntry {
                desc: *desc,
                buffers: buffers.clone(),
            },
        );
        (id, buffers)
    }

    pub fn buffer(&self, id: BufferId) -> RhiResult<&BufferEntry> {
        self.buffers
            .get(&id)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown buffer {:?}", id)))
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> RhiResult<&mut BufferEntry> {
        self.buffers
            .get_mut(&id)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown buffer {:?}", id)))
    }

    pub fn texture(&self, id: TextureId) -> RhiResult<&TextureEntry> {
        self.textures
            .get(&id)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown texture {:?}", id)))
    }

    pub fn texture_mut(&mut self, id: TextureId) -> RhiResult<&mut TextureEntry> {
        self.textures
            .get_mut(&id)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown texture {:?}", id)))
    }

    pub fn pipeline(&self, id: PipelineId) -> RhiResult<&PipelineDesc> {
        self.pipelines
            .get(&id)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown pipeline {:?}", id)))
    }

    /// Resolves a written descriptor slot.
    pub fn descriptor(&self, handle: DescriptorHandle) -> RhiResult<Descriptor> {
        let heap = self
            .heaps
            .get(&handle.heap)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown heap {:?}", handle.heap)))?;
        if heap.kind != handle.kind {
            return Err(RhiError::InvalidHandle(format!(
                "handle of kind {} points into a {} heap",
                handle.kind.name(),
                heap.kind.name()
            )));
        }
        heap.slots
            .get(handle.index as usize)
            .copied()
            .flatten()
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "{} descriptor {} is out of range or unwritten",
                    handle.kind.name(),
                    handle.index
                ))
            })
    }

    pub fn write_descriptor(&mut self, handle: DescriptorHandle, descriptor: Descriptor) -> RhiResult<()> {
        let heap = self
            .heaps
            .get_mut(&handle.heap)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown heap {:?}", handle.heap)))?;
        if heap.kind != descriptor.heap_kind() || heap.kind != handle.kind {
            return Err(RhiError::InvalidUsage(format!(
                "{:?} cannot be written to a {} heap",
                descriptor,
                heap.kind.name()
            )));
        }
        let capacity = heap.slots.len();
        let slot = heap.slots.get_mut(handle.index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "descriptor {} out of range of heap with {} slots",
                handle.index, capacity
            ))
        })?;
        *slot = Some(descriptor);
        trace!("Descriptor {} {} written", handle.kind.name(), handle.index);
        Ok(())
    }

    pub fn remove_swap_chain(&mut self, id: SwapChainId) {
        if let Some(entry) = self.swap_chains.remove(&id) {
            for buffer in entry.buffers {
                self.textures.remove(&buffer);
            }
        }
    }

    /// Copies a presentable buffer to the surface image.
    pub fn present(&mut self, swap_chain: SwapChainId, buffer_index: u32) -> RhiResult<()> {
        let entry = self
            .swap_chains
            .get(&swap_chain)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown swap chain {:?}", swap_chain)))?;
        let surface = entry.desc.surface;
        let buffer = entry
            .buffers
            .get(buffer_index as usize)
            .copied()
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("swap chain buffer {} out of range", buffer_index))
            })?;

        let texture = self.texture(buffer)?;
        if texture.state != ResourceState::Present {
            return Err(RhiError::Validation(format!(
                "presented buffer {} is in {:?}, expected Present",
                buffer_index, texture.state
            )));
        }
        let image = texture.image(0)?;

        let presented = self.presented.entry(surface).or_insert(PresentedImage {
            image: image.clone(),
            count: 0,
        });
        presented.image = image;
        presented.count += 1;
        Ok(())
    }

    pub fn live_counts(&self) -> (usize, usize, usize, usize, usize) {
        let swap_chain_textures = self
            .textures
            .values()
            .filter(|t| t.swap_chain.is_some())
            .count();
        (
            self.buffers.len(),
            self.textures.len() - swap_chain_textures,
            self.pipelines.len(),
            self.heaps.len(),
            self.swap_chains.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferUsage;
    use crate::texture::TextureDimension;

    #[test]
    fn test_texture_entry_fill_and_quantize() {
        let desc = TextureDesc::new_2d("color", 2, 2, Format::Rgba8Unorm);
        let mut entry = TextureEntry::new(desc);
        entry.fill(0, [2.0, -1.0, 0.5, 1.0]);
        let texel = entry.texel(0, 1, 1);
        assert_eq!(texel[0], 1.0);
        assert_eq!(texel[1], 0.0);
        assert!((texel[2] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_depth_texture_starts_at_clear_value() {
        let entry = TextureEntry::new(TextureDesc::new_cube("shadow", 4, Format::D32Float));
        assert_eq!(entry.layers.len(), 6);
        assert_eq!(entry.texel(5, 3, 3)[0], 1.0);
        assert!(entry.check_layer(6).is_err());
    }

    #[test]
    fn test_buffer_range_checks() {
        let mut tables = ResourceTables::default();
        let id = tables.insert_buffer(&BufferDesc::new(BufferUsage::Staging, 16));
        let entry = tables.buffer(id).unwrap();
        assert_eq!(entry.range(4, 8).unwrap(), 4..12);
        assert!(entry.range(12, 8).is_err());
        assert!(entry.range(u64::MAX, 2).is_err());
    }

    #[test]
    fn test_descriptor_write_checks_kind() {
        let mut tables = ResourceTables::default();
        let heap = tables.insert_heap(DescriptorHeapKind::Sampler, 2);
        let handle = DescriptorHandle {
            heap,
            kind: DescriptorHeapKind::Sampler,
            index: 0,
        };
        let wrong = Descriptor::Texture {
            texture: TextureId::from_raw(9),
        };
        assert!(tables.write_descriptor(handle, wrong).is_err());
        assert!(tables.descriptor(handle).is_err());

        let out_of_range = DescriptorHandle { index: 2, ..handle };
        assert!(
            tables
                .write_descriptor(out_of_range, Descriptor::Sampler(Default::default()))
                .is_err()
        );
    }

    #[test]
    fn test_swap_chain_textures_are_owned() {
        let mut tables = ResourceTables::default();
        let desc = SwapChainDesc {
            surface: SurfaceHandle::from_raw(1),
            width: 4,
            height: 4,
            format: Format::Rgba8Unorm,
            buffer_count: 2,
        };
        let (id, buffers) = tables.insert_swap_chain(&desc);
        assert_eq!(buffers.len(), 2);
        assert_eq!(tables.texture(buffers[0]).unwrap().state, ResourceState::Present);
        assert_eq!(tables.live_counts(), (0, 0, 0, 0, 1));

        tables.present(id, 1).unwrap();
        assert_eq!(tables.presented[&desc.surface].count, 1);

        tables.remove_swap_chain(id);
        assert!(tables.textures.is_empty());
    }

    #[test]
    fn test_dimension_layers() {
        assert_eq!(TextureDimension::Cube.layer_count(), 6);
    }
}
