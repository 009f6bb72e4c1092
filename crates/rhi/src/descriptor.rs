//! Descriptor heaps and linear descriptor allocation.
//!
//! Shaders reach resources through descriptors stored in fixed-capacity
//! heaps. There is one heap per [`DescriptorHeapKind`]:
//!
//! | heap            | holds                                        |
//! |-----------------|----------------------------------------------|
//! | render target   | color target views (texture + array slice)   |
//! | depth stencil   | depth target views (texture + array slice)   |
//! | shader resource | texture views and structured buffer views    |
//! | sampler         | sampler states                               |
//!
//! [`DescriptorAllocator`] owns the four heaps and hands out contiguous
//! [`DescriptorRange`]s with a bump cursor. Ranges are never freed
//! individually; they stay valid for as long as the allocator lives, so
//! handles computed once at initialization can be recorded into every frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deferred_rhi::device::Device;
//! use deferred_rhi::descriptor::{
//!     DescriptorAllocator, DescriptorHeapCapacities, DescriptorHeapKind,
//! };
//!
//! # fn example(device: Arc<dyn Device>) -> Result<(), deferred_rhi::RhiError> {
//! let mut allocator = DescriptorAllocator::new(device, &DescriptorHeapCapacities::default())?;
//!
//! // Four color targets for one frame slot
//! let rtvs = allocator.allocate(DescriptorHeapKind::RenderTarget, 4)?;
//! assert_eq!(rtvs.count(), 4);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::BufferId;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::texture::TextureId;

resource_id! {
    /// Device-side identifier of a descriptor heap.
    DescriptorHeapId
}

/// The four heap types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Color target views
    RenderTarget,
    /// Depth target views
    DepthStencil,
    /// Shader-visible texture and buffer views
    ShaderResource,
    /// Sampler states
    Sampler,
}

impl DescriptorHeapKind {
    /// All heap kinds, in allocator order.
    pub const ALL: [DescriptorHeapKind; 4] = [
        DescriptorHeapKind::RenderTarget,
        DescriptorHeapKind::DepthStencil,
        DescriptorHeapKind::ShaderResource,
        DescriptorHeapKind::Sampler,
    ];

    /// Returns a human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            DescriptorHeapKind::RenderTarget => "render-target",
            DescriptorHeapKind::DepthStencil => "depth-stencil",
            DescriptorHeapKind::ShaderResource => "shader-resource",
            DescriptorHeapKind::Sampler => "sampler",
        }
    }

    #[inline]
    fn index(self) -> usize {
        match self {
            DescriptorHeapKind::RenderTarget => 0,
            DescriptorHeapKind::DepthStencil => 1,
            DescriptorHeapKind::ShaderResource => 2,
            DescriptorHeapKind::Sampler => 3,
        }
    }
}

/// Texture filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Nearest texel
    Point,
    /// Bilinear
    Linear,
}

/// Behavior of coordinates outside [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Clamp to the edge texel
    Clamp,
    /// Repeat
    Wrap,
}

/// Sampler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    /// Filtering.
    pub filter: Filter,
    /// Addressing for both axes.
    pub address_mode: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Point,
            address_mode: AddressMode::Clamp,
        }
    }
}

/// Contents of one descriptor slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Descriptor {
    /// One array slice of a color texture bound as a render target.
    RenderTarget {
        /// Target texture
        texture: TextureId,
        /// Layer written through this view
        array_slice: u32,
    },
    /// One array slice of a depth texture bound as a depth target.
    DepthStencil {
        /// Target texture
        texture: TextureId,
        /// Layer written through this view
        array_slice: u32,
    },
    /// A texture (all layers) read by shaders.
    Texture {
        /// Source texture
        texture: TextureId,
    },
    /// An array of fixed-size elements read by shaders.
    StructuredBuffer {
        /// Source buffer
        buffer: BufferId,
        /// Element size in bytes
        stride: u32,
        /// Number of elements
        count: u32,
    },
    /// A sampler state.
    Sampler(SamplerDesc),
}

impl Descriptor {
    /// Returns the heap kind this descriptor must be written to.
    pub fn heap_kind(&self) -> DescriptorHeapKind {
        match self {
            Descriptor::RenderTarget { .. } => DescriptorHeapKind::RenderTarget,
            Descriptor::DepthStencil { .. } => DescriptorHeapKind::DepthStencil,
            Descriptor::Texture { .. } | Descriptor::StructuredBuffer { .. } => {
                DescriptorHeapKind::ShaderResource
            }
            Descriptor::Sampler(_) => DescriptorHeapKind::Sampler,
        }
    }
}

/// Address of one descriptor slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    /// Heap holding the slot.
    pub heap: DescriptorHeapId,
    /// Heap type.
    pub kind: DescriptorHeapKind,
    /// Slot index inside the heap.
    pub index: u32,
}

/// A contiguous run of slots in one heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    heap: DescriptorHeapId,
    kind: DescriptorHeapKind,
    start: u32,
    count: u32,
}

impl DescriptorRange {
    /// Returns the handle of the `i`-th slot of the range, or `None` when `i`
    /// is past the end.
    pub fn get(&self, i: u32) -> Option<DescriptorHandle> {
        (i < self.count).then(|| DescriptorHandle {
            heap: self.heap,
            kind: self.kind,
            index: self.start + i,
        })
    }

    /// Returns the handle of the `i`-th slot.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] when `i` is past the end.
    pub fn handle(&self, i: u32) -> RhiResult<DescriptorHandle> {
        self.get(i).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "Descriptor {} out of range of {} {} descriptors",
                i,
                self.count,
                self.kind.name()
            ))
        })
    }

    /// Iterates over every handle of the range.
    pub fn handles(&self) -> impl Iterator<Item = DescriptorHandle> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }

    /// Heap holding the range.
    #[inline]
    pub fn heap(&self) -> DescriptorHeapId {
        self.heap
    }

    /// Heap type.
    #[inline]
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// First slot index.
    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Number of slots.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Fixed-capacity descriptor heap owned by the CPU side.
pub struct DescriptorHeap {
    device: Arc<dyn Device>,
    id: DescriptorHeapId,
    kind: DescriptorHeapKind,
    capacity: u32,
}

impl DescriptorHeap {
    /// Creates a heap with `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity is zero or allocation fails.
    pub fn new(device: Arc<dyn Device>, kind: DescriptorHeapKind, capacity: u32) -> RhiResult<Self> {
        if capacity == 0 {
            return Err(RhiError::InvalidUsage(format!(
                "{} heap capacity must be greater than 0",
                kind.name()
            )));
        }
        let id = device.create_descriptor_heap(kind, capacity)?;
        debug!("Created {} descriptor heap: {} slots", kind.name(), capacity);
        Ok(Self {
            device,
            id,
            kind,
            capacity,
        })
    }

    /// Returns the device-side id.
    #[inline]
    pub fn id(&self) -> DescriptorHeapId {
        self.id
    }

    /// Returns the heap type.
    #[inline]
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// Returns the number of slots.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl Drop for DescriptorHeap {
    fn drop(&mut self) {
        self.device.destroy_descriptor_heap(self.id);
        debug!("Destroyed {} descriptor heap", self.kind.name());
    }
}

/// Slot counts of the four heaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorHeapCapacities {
    /// Render-target heap slots.
    pub render_target: u32,
    /// Depth-stencil heap slots.
    pub depth_stencil: u32,
    /// Shader-resource heap slots.
    pub shader_resource: u32,
    /// Sampler heap slots.
    pub sampler: u32,
}

impl DescriptorHeapCapacities {
    /// Capacity of the heap of the given kind.
    pub fn get(&self, kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::RenderTarget => self.render_target,
            DescriptorHeapKind::DepthStencil => self.depth_stencil,
            DescriptorHeapKind::ShaderResource => self.shader_resource,
            DescriptorHeapKind::Sampler => self.sampler,
        }
    }
}

impl Default for DescriptorHeapCapacities {
    fn default() -> Self {
        Self {
            render_target: 32,
            depth_stencil: 64,
            shader_resource: 64,
            sampler: 4,
        }
    }
}

/// Owns the four heaps and partitions them linearly.
///
/// Allocation is a cursor bump per heap. Ranges are stable and never reused.
pub struct DescriptorAllocator {
    device: Arc<dyn Device>,
    heaps: [DescriptorHeap; 4],
    cursors: [u32; 4],
}

impl DescriptorAllocator {
    /// Creates the four heaps.
    ///
    /// # Errors
    ///
    /// Returns an error if any heap cannot be created.
    pub fn new(device: Arc<dyn Device>, capacities: &DescriptorHeapCapacities) -> RhiResult<Self> {
        let [rtv, dsv, srv, sampler] = DescriptorHeapKind::ALL;
        let heaps = [
            DescriptorHeap::new(device.clone(), rtv, capacities.get(rtv))?,
            DescriptorHeap::new(device.clone(), dsv, capacities.get(dsv))?,
            DescriptorHeap::new(device.clone(), srv, capacities.get(srv))?,
            DescriptorHeap::new(device.clone(), sampler, capacities.get(sampler))?,
        ];

        Ok(Self {
            device,
            heaps,
            cursors: [0; 4],
        })
    }

    /// Reserves `count` consecutive slots of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocationFailed`] when the heap cannot fit the
    /// request; the cursor is left unchanged.
    pub fn allocate(&mut self, kind: DescriptorHeapKind, count: u32) -> RhiResult<DescriptorRange> {
        let heap = &self.heaps[kind.index()];
        let cursor = &mut self.cursors[kind.index()];

        let end = cursor.checked_add(count).filter(|end| *end <= heap.capacity());
        let Some(end) = end else {
            warn!(
                "{} heap exhausted: {} in use, {} requested, capacity {}",
                kind.name(),
                cursor,
                count,
                heap.capacity()
            );
            return Err(RhiError::AllocationFailed(format!(
                "{} descriptor heap exhausted ({} of {} used, {} requested)",
                kind.name(),
                cursor,
                heap.capacity(),
                count
            )));
        };

        let range = DescriptorRange {
            heap: heap.id(),
            kind,
            start: *cursor,
            count,
        };
        *cursor = end;

        debug!(
            "Allocated {} {} descriptors at {}",
            count,
            kind.name(),
            range.start
        );
        Ok(range)
    }

    /// Writes `descriptor` into the slot at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidUsage`] if the descriptor belongs to another
    /// heap kind, or a device error for unknown handles.
    pub fn write(&self, handle: DescriptorHandle, descriptor: Descriptor) -> RhiResult<()> {
        if descriptor.heap_kind() != handle.kind {
            return Err(RhiError::InvalidUsage(format!(
                "{:?} cannot be written to a {} heap",
                descriptor,
                handle.kind.name()
            )));
        }
        self.device.write_descriptor(handle, descriptor)
    }

    /// Number of slots handed out from the heap of `kind`.
    #[inline]
    pub fn used(&self, kind: DescriptorHeapKind) -> u32 {
        self.cursors[kind.index()]
    }

    /// Slots left in the heap of `kind`.
    #[inline]
    pub fn remaining(&self, kind: DescriptorHeapKind) -> u32 {
        self.heaps[kind.index()].capacity() - self.cursors[kind.index()]
    }

    /// Returns the heap of `kind`.
    #[inline]
    pub fn heap(&self, kind: DescriptorHeapKind) -> &DescriptorHeap {
        &self.heaps[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(count: u32) -> DescriptorRange {
        DescriptorRange {
            heap: DescriptorHeapId::from_raw(1),
            kind: DescriptorHeapKind::ShaderResource,
            start: 10,
            count,
        }
    }

    #[test]
    fn test_descriptor_heap_kind() {
        assert_eq!(
            Descriptor::Texture {
                texture: TextureId::from_raw(1)
            }
            .heap_kind(),
            DescriptorHeapKind::ShaderResource
        );
        assert_eq!(
            Descriptor::Sampler(SamplerDesc::default()).heap_kind(),
            DescriptorHeapKind::Sampler
        );
        assert_eq!(
            Descriptor::DepthStencil {
                texture: TextureId::from_raw(1),
                array_slice: 3
            }
            .heap_kind(),
            DescriptorHeapKind::DepthStencil
        );
    }

    #[test]
    fn test_range_handles() {
        let r = range(3);
        let indices: Vec<u32> = r.handles().map(|h| h.index).collect();
        assert_eq!(indices, vec![10, 11, 12]);
        assert!(r.get(3).is_none());
        assert!(matches!(r.handle(3), Err(RhiError::InvalidHandle(_))));
    }

    #[test]
    fn test_default_capacities() {
        let caps = DescriptorHeapCapacities::default();
        assert_eq!(caps.get(DescriptorHeapKind::RenderTarget), 32);
        assert_eq!(caps.get(DescriptorHeapKind::Sampler), 4);
    }
}
