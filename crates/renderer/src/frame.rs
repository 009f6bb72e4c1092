//! Per-slot frame resources.
//!
//! Every frame slot owns its own attribute targets, scene depth, shadow
//! cube, constant arena and descriptor ranges, so recording slot N+1 never
//! touches memory the GPU may still be reading for slot N. The presentable
//! target is the swap-chain buffer with the slot's index and is not owned.

use std::sync::Arc;

use deferred_core::ShadowConfig;
use deferred_rhi::descriptor::DescriptorAllocator;
use deferred_rhi::device::Device;
use deferred_rhi::texture::{Format, ResourceState, Texture, TextureDesc, TextureId};
use tracing::debug;

use crate::constants::ConstantArena;
use crate::descriptors::FrameDescriptors;
use crate::error::RenderResult;

/// Format of the world-position target.
pub const POSITION_FORMAT: Format = Format::Rgba32Float;
/// Format of the diffuse target.
pub const DIFFUSE_FORMAT: Format = Format::Rgba8Unorm;
/// Format of the normal target; `w` carries the material index.
pub const NORMAL_FORMAT: Format = Format::Rgba16Float;
/// Format of the scene depth and the shadow cube.
pub const DEPTH_FORMAT: Format = Format::D32Float;
/// Format of the presentable targets.
pub const PRESENT_FORMAT: Format = Format::Rgba8Unorm;

/// Value the position target is cleared to. `w == 0` marks pixels no
/// geometry was written to.
pub const POSITION_SENTINEL: [f32; 4] = [0.0; 4];

/// Texture ids of one slot, for inspection and descriptor writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTargets {
    /// Swap-chain buffer the lighting pass writes.
    pub presentable: TextureId,
    /// World-space position, `w = 1` where geometry was drawn.
    pub position: TextureId,
    /// Diffuse color.
    pub diffuse: TextureId,
    /// World-space normal, `w` = material index.
    pub normal: TextureId,
    /// Scene depth.
    pub depth: TextureId,
    /// Six-face shadow depth cube.
    pub shadow: TextureId,
    /// Width of the screen-sized targets.
    pub width: u32,
    /// Height of the screen-sized targets.
    pub height: u32,
}

/// Screen-sized targets, recreated on resize.
struct AttributeTargets {
    position: Texture,
    diffuse: Texture,
    normal: Texture,
    depth: Texture,
}

impl AttributeTargets {
    fn new(device: &Arc<dyn Device>, slot: usize, width: u32, height: u32) -> RenderResult<Self> {
        let color = |name: &str, format| {
            let desc = TextureDesc::new_2d(format!("{} {}", name, slot), width, height, format)
                .with_initial_state(ResourceState::ShaderResource)
                .with_clear_value(POSITION_SENTINEL);
            Texture::new(device.clone(), desc)
        };
        let depth_desc = TextureDesc::new_2d(format!("scene depth {}", slot), width, height, DEPTH_FORMAT)
            .with_initial_state(ResourceState::DepthWrite);

        Ok(Self {
            position: color("position", POSITION_FORMAT)?,
            diffuse: color("diffuse", DIFFUSE_FORMAT)?,
            normal: color("normal", NORMAL_FORMAT)?,
            depth: Texture::new(device.clone(), depth_desc)?,
        })
    }
}

/// Resources of one frame slot.
pub struct Frame {
    index: usize,
    presentable: TextureId,
    attributes: AttributeTargets,
    shadow: Texture,
    constants: ConstantArena,
    descriptors: FrameDescriptors,
}

impl Frame {
    /// Creates the resources of slot `index` and writes its descriptors.
    ///
    /// # Arguments
    ///
    /// * `device` - The device
    /// * `allocator` - Descriptor allocator the slot's ranges come from
    /// * `index` - Slot index, used in labels
    /// * `presentable` - Swap-chain buffer of the slot
    /// * `extent` - Width and height of the screen-sized targets
    /// * `shadow` - Shadow-cube settings
    /// * `arena_size` - Size of the constant arena in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if a resource cannot be created or a heap is full.
    pub fn new(
        device: &Arc<dyn Device>,
        allocator: &mut DescriptorAllocator,
        index: usize,
        presentable: TextureId,
        extent: (u32, u32),
        shadow: &ShadowConfig,
        arena_size: u64,
    ) -> RenderResult<Self> {
        let (width, height) = extent;
        let attributes = AttributeTargets::new(device, index, width, height)?;
        let shadow_desc = TextureDesc::new_cube(format!("shadow cube {}", index), shadow.map_size, DEPTH_FORMAT)
            .with_initial_state(ResourceState::ShaderResource);
        let shadow = Texture::new(device.clone(), shadow_desc)?;
        let constants = ConstantArena::new(device.clone(), arena_size, format!("constants {}", index))?;
        let descriptors = FrameDescriptors::allocate(allocator)?;

        let frame = Self {
            index,
            presentable,
            attributes,
            shadow,
            constants,
            descriptors,
        };
        frame.descriptors.write(allocator, &frame.targets())?;

        debug!("Frame slot {} created ({}x{})", index, width, height);
        Ok(frame)
    }

    /// Replaces the screen-sized targets and rewrites the slot's views in
    /// place.
    ///
    /// The GPU must be idle with respect to this slot.
    ///
    /// # Errors
    ///
    /// Returns an error if a target cannot be created.
    pub fn resize(
        &mut self,
        device: &Arc<dyn Device>,
        allocator: &DescriptorAllocator,
        presentable: TextureId,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        self.attributes = AttributeTargets::new(device, self.index, width, height)?;
        self.presentable = presentable;
        self.descriptors.write(allocator, &self.targets())?;
        debug!("Frame slot {} resized to {}x{}", self.index, width, height);
        Ok(())
    }

    /// Returns the slot's texture ids.
    pub fn targets(&self) -> FrameTargets {
        let (width, height) = self.attributes.position.extent();
        FrameTargets {
            presentable: self.presentable,
            position: self.attributes.position.id(),
            diffuse: self.attributes.diffuse.id(),
            normal: self.attributes.normal.id(),
            depth: self.attributes.depth.id(),
            shadow: self.shadow.id(),
            width,
            height,
        }
    }

    /// Slot index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Edge length of the shadow cube faces.
    #[inline]
    pub fn shadow_size(&self) -> u32 {
        self.shadow.extent().0
    }

    /// The slot's descriptor ranges.
    #[inline]
    pub fn descriptors(&self) -> &FrameDescriptors {
        &self.descriptors
    }

    /// The slot's constant arena.
    #[inline]
    pub fn constants_mut(&mut self) -> &mut ConstantArena {
        &mut self.constants
    }

    /// Splits the slot into its read-only part and its constant arena, so
    /// passes can allocate constants while reading views.
    pub(crate) fn split_mut(&mut self) -> (FrameView<'_>, &mut ConstantArena) {
        let view = FrameView {
            targets: self.targets(),
            descriptors: &self.descriptors,
            shadow_size: self.shadow.extent().0,
        };
        (view, &mut self.constants)
    }
}

/// Read-only view of a slot handed to the passes.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    /// Texture ids.
    pub targets: FrameTargets,
    /// Descriptor ranges.
    pub descriptors: &'a FrameDescriptors,
    /// Shadow face size.
    pub shadow_size: u32,
}
