//! Descriptor layout of the frame core.
//!
//! Ranges are carved out of the [`DescriptorAllocator`] once, at
//! initialization, and never move. Resizing rewrites the views inside the
//! same ranges.
//!
//! Per frame slot:
//!
//! | heap            | slots | contents |
//! |-----------------|-------|----------|
//! | render target   | 4     | presentable, position, diffuse, normal |
//! | depth stencil   | 7     | scene depth, shadow faces +X, -X, +Y, -Y, +Z, -Z |
//! | shader resource | 4     | position, diffuse, normal, shadow cube |
//!
//! Shared by every slot: one shader-resource slot for the material buffer and
//! one sampler for the shadow lookups.

use deferred_rhi::RhiResult;
use deferred_rhi::buffer::BufferId;
use deferred_rhi::descriptor::{
    Descriptor, DescriptorAllocator, DescriptorHandle, DescriptorHeapKind, DescriptorRange, SamplerDesc,
};
use deferred_rhi::shader::{LIGHTING_INPUT_COUNT, MaterialData};
use deferred_rhi::texture::CUBE_FACE_COUNT;

use crate::frame::FrameTargets;

/// Render-target views per slot.
pub const RTV_PER_FRAME: u32 = 4;
/// Depth-stencil views per slot.
pub const DSV_PER_FRAME: u32 = 1 + CUBE_FACE_COUNT;
/// Shader-resource views per slot.
pub const SRV_PER_FRAME: u32 = LIGHTING_INPUT_COUNT;

const PRESENTABLE_RTV: u32 = 0;
const POSITION_RTV: u32 = 1;
const DIFFUSE_RTV: u32 = 2;
const NORMAL_RTV: u32 = 3;
const SCENE_DSV: u32 = 0;
const SHADOW_DSV: u32 = 1;

/// The descriptor ranges of one frame slot.
#[derive(Clone, Copy, Debug)]
pub struct FrameDescriptors {
    rtv: DescriptorRange,
    dsv: DescriptorRange,
    srv: DescriptorRange,
}

impl FrameDescriptors {
    /// Reserves the ranges of one slot.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocationFailed`](deferred_rhi::RhiError::AllocationFailed)
    /// when a heap is exhausted.
    pub fn allocate(allocator: &mut DescriptorAllocator) -> RhiResult<Self> {
        Ok(Self {
            rtv: allocator.allocate(DescriptorHeapKind::RenderTarget, RTV_PER_FRAME)?,
            dsv: allocator.allocate(DescriptorHeapKind::DepthStencil, DSV_PER_FRAME)?,
            srv: allocator.allocate(DescriptorHeapKind::ShaderResource, SRV_PER_FRAME)?,
        })
    }

    /// Writes the views of `targets` into the slot's ranges.
    ///
    /// # Errors
    ///
    /// Returns the device's error.
    pub fn write(&self, allocator: &DescriptorAllocator, targets: &FrameTargets) -> RhiResult<()> {
        let color = |texture| Descriptor::RenderTarget {
            texture,
            array_slice: 0,
        };
        allocator.write(self.rtv.handle(PRESENTABLE_RTV)?, color(targets.presentable))?;
        allocator.write(self.rtv.handle(POSITION_RTV)?, color(targets.position))?;
        allocator.write(self.rtv.handle(DIFFUSE_RTV)?, color(targets.diffuse))?;
        allocator.write(self.rtv.handle(NORMAL_RTV)?, color(targets.normal))?;

        allocator.write(
            self.dsv.handle(SCENE_DSV)?,
            Descriptor::DepthStencil {
                texture: targets.depth,
                array_slice: 0,
            },
        )?;
        for face in 0..CUBE_FACE_COUNT {
            allocator.write(
                self.dsv.handle(SHADOW_DSV + face)?,
                Descriptor::DepthStencil {
                    texture: targets.shadow,
                    array_slice: face,
                },
            )?;
        }

        // Order matches the lighting program's input table
        let inputs = [targets.position, targets.diffuse, targets.normal, targets.shadow];
        for (i, texture) in (0..).zip(inputs) {
            allocator.write(self.srv.handle(i)?, Descriptor::Texture { texture })?;
        }
        Ok(())
    }

    /// View of the swap-chain buffer.
    #[inline]
    pub fn presentable_rtv(&self) -> RhiResult<DescriptorHandle> {
        self.rtv.handle(PRESENTABLE_RTV)
    }

    /// Views of the position, diffuse and normal targets, in that order.
    pub fn attribute_rtvs(&self) -> RhiResult<[DescriptorHandle; 3]> {
        Ok([
            self.rtv.handle(POSITION_RTV)?,
            self.rtv.handle(DIFFUSE_RTV)?,
            self.rtv.handle(NORMAL_RTV)?,
        ])
    }

    /// View of the scene depth target.
    #[inline]
    pub fn scene_dsv(&self) -> RhiResult<DescriptorHandle> {
        self.dsv.handle(SCENE_DSV)
    }

    /// View of one shadow-cube face.
    #[inline]
    pub fn shadow_face_dsv(&self, face: u32) -> RhiResult<DescriptorHandle> {
        self.dsv.handle(SHADOW_DSV + face)
    }

    /// Input table of the lighting pass.
    #[inline]
    pub fn lighting_inputs(&self) -> DescriptorRange {
        self.srv
    }
}

/// Descriptors every slot reads.
#[derive(Clone, Copy, Debug)]
pub struct SharedDescriptors {
    materials: DescriptorRange,
    sampler: DescriptorRange,
}

impl SharedDescriptors {
    /// Reserves the material view and the sampler.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocationFailed`](deferred_rhi::RhiError::AllocationFailed)
    /// when a heap is exhausted.
    pub fn allocate(allocator: &mut DescriptorAllocator) -> RhiResult<Self> {
        Ok(Self {
            materials: allocator.allocate(DescriptorHeapKind::ShaderResource, 1)?,
            sampler: allocator.allocate(DescriptorHeapKind::Sampler, 1)?,
        })
    }

    /// Writes the material buffer view and the shadow sampler.
    ///
    /// # Errors
    ///
    /// Returns the device's error.
    pub fn write(
        &self,
        allocator: &DescriptorAllocator,
        materials: BufferId,
        material_count: u32,
        sampler: SamplerDesc,
    ) -> RhiResult<()> {
        allocator.write(
            self.materials.handle(0)?,
            Descriptor::StructuredBuffer {
                buffer: materials,
                stride: MaterialData::SIZE as u32,
                count: material_count,
            },
        )?;
        allocator.write(self.sampler.handle(0)?, Descriptor::Sampler(sampler))
    }

    /// Material table.
    #[inline]
    pub fn materials(&self) -> DescriptorRange {
        self.materials
    }

    /// Sampler table.
    #[inline]
    pub fn sampler(&self) -> DescriptorRange {
        self.sampler
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use deferred_rhi::descriptor::DescriptorHeapCapacities;
    use deferred_rhi::device::{Backend, Device};
    use deferred_rhi::software::SoftwareBackend;

    use super::*;

    #[test]
    fn test_ranges_are_disjoint_and_stable() {
        let backend = SoftwareBackend::new();
        let surface = backend.create_surface(4, 4);
        let device: Arc<dyn Device> = backend.create_device(surface).unwrap();
        let mut allocator = DescriptorAllocator::new(device, &DescriptorHeapCapacities::default()).unwrap();

        let a = FrameDescriptors::allocate(&mut allocator).unwrap();
        let b = FrameDescriptors::allocate(&mut allocator).unwrap();
        let shared = SharedDescriptors::allocate(&mut allocator).unwrap();

        assert_eq!(a.rtv.start() + RTV_PER_FRAME, b.rtv.start());
        assert_eq!(a.dsv.start() + DSV_PER_FRAME, b.dsv.start());
        assert_eq!(b.srv.start() + SRV_PER_FRAME, shared.materials.start());
        assert_eq!(allocator.used(DescriptorHeapKind::Sampler), 1);
        assert_eq!(a.shadow_face_dsv(5).unwrap().index, a.dsv.start() + 6);
        assert!(a.shadow_face_dsv(6).is_err());
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let backend = SoftwareBackend::new();
        let surface = backend.create_surface(4, 4);
        let device: Arc<dyn Device> = backend.create_device(surface).unwrap();
        let capacities = DescriptorHeapCapacities {
            depth_stencil: 10,
            ..Default::default()
        };
        let mut allocator = DescriptorAllocator::new(device, &capacities).unwrap();

        FrameDescriptors::allocate(&mut allocator).unwrap();
        assert!(FrameDescriptors::allocate(&mut allocator).is_err());
    }
}
