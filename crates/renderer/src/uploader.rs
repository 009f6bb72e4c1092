//! Staged uploads into GPU-only buffers.
//!
//! The [`ResourceUploader`] copies CPU data into a fresh staging buffer and
//! records the barrier, copy and barrier that move it into the destination.
//! The staging buffer must outlive the GPU copy, so it is kept in an arena
//! entry until the submission carrying the copy is known to be complete:
//!
//! 1. [`upload`](ResourceUploader::upload) records the copy; the entry is
//!    *pending submission*
//! 2. [`mark_submitted`](ResourceUploader::mark_submitted) stamps every
//!    pending entry with the counter value of the submission
//! 3. [`reclaim`](ResourceUploader::reclaim) releases entries whose value
//!    the counter has reached
//!
//! Entries that were never stamped are never reclaimed. A reclaimed index is
//! reused with a new generation, so an old handle never names the new entry.

use std::sync::Arc;

use deferred_rhi::buffer::{Buffer, BufferDesc, BufferUsage, MemoryLocation};
use deferred_rhi::command::CommandList;
use deferred_rhi::device::Device;
use deferred_rhi::sync::FenceValue;
use deferred_rhi::texture::ResourceState;
use tracing::debug;

use crate::error::{RenderError, RenderResult};

/// Names one upload. Outlives its entry: once reclaimed, the handle reads
/// as complete even after the arena index is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UploadHandle {
    index: usize,
    generation: u32,
}

struct StagingEntry {
    buffer: Buffer,
    fence: Option<FenceValue>,
}

#[derive(Default)]
struct ArenaSlot {
    /// Bumped every time the slot's entry is released.
    generation: u32,
    entry: Option<StagingEntry>,
}

/// Arena of staging buffers for in-flight uploads.
pub struct ResourceUploader {
    device: Arc<dyn Device>,
    slots: Vec<ArenaSlot>,
    free: Vec<usize>,
}

impl ResourceUploader {
    /// Creates an empty uploader.
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Records an upload of `data` into the start of `destination`.
    ///
    /// `destination` must be a GPU-only buffer in the `Common` state. The
    /// recorded commands leave it in `after`.
    ///
    /// # Arguments
    ///
    /// * `commands` - List the copy is recorded into
    /// * `data` - Bytes to upload
    /// * `destination` - Target buffer
    /// * `after` - State the destination is moved to after the copy
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Contract`] for empty data, a destination
    /// smaller than `data` or a host-visible destination; nothing is
    /// allocated in that case. Staging allocation failures are returned as
    /// device errors.
    pub fn upload(
        &mut self,
        commands: &mut CommandList,
        data: &[u8],
        destination: &Buffer,
        after: ResourceState,
    ) -> RenderResult<UploadHandle> {
        if data.is_empty() {
            return Err(RenderError::Contract("upload of zero bytes".to_string()));
        }
        if destination.size() < data.len() as u64 {
            return Err(RenderError::Contract(format!(
                "upload of {} bytes does not fit buffer '{}' ({} bytes)",
                data.len(),
                destination.label(),
                destination.size()
            )));
        }
        if destination.memory_location() != MemoryLocation::GpuOnly {
            return Err(RenderError::Contract(format!(
                "buffer '{}' is host-visible and needs no staging",
                destination.label()
            )));
        }

        let desc = BufferDesc::new(BufferUsage::Staging, data.len() as u64)
            .with_label(format!("staging for '{}'", destination.label()));
        let staging = Buffer::new(self.device.clone(), desc).map_err(RenderError::Rhi)?;
        staging.write_data(0, data)?;

        commands.transition_buffer(destination.id(), ResourceState::Common, ResourceState::CopyDest);
        commands.copy_buffer(staging.id(), 0, destination.id(), 0, data.len() as u64);
        commands.transition_buffer(destination.id(), ResourceState::CopyDest, after);

        debug!(
            "Recorded upload of {} bytes into '{}'",
            data.len(),
            destination.label()
        );

        let entry = StagingEntry {
            buffer: staging,
            fence: None,
        };
        let index = self.free.pop().unwrap_or_else(|| {
            self.slots.push(ArenaSlot::default());
            self.slots.len() - 1
        });
        let slot = &mut self.slots[index];
        slot.entry = Some(entry);
        Ok(UploadHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Stamps every entry recorded since the last call with `fence`.
    ///
    /// Returns the number of entries stamped.
    pub fn mark_submitted(&mut self, fence: FenceValue) -> usize {
        let mut stamped = 0;
        for entry in self.slots.iter_mut().filter_map(|s| s.entry.as_mut()) {
            if entry.fence.is_none() {
                entry.fence = Some(fence);
                stamped += 1;
            }
        }
        stamped
    }

    /// Returns true once the upload behind `handle` can no longer be read by
    /// the GPU, given the counter's `completed` value.
    pub fn is_complete(&self, handle: UploadHandle, completed: FenceValue) -> bool {
        match self.slots.get(handle.index) {
            Some(ArenaSlot {
                generation,
                entry: Some(entry),
            }) if *generation == handle.generation => entry.fence.is_some_and(|f| f <= completed),
            _ => true,
        }
    }

    /// Releases every staging buffer whose submission has completed.
    ///
    /// Returns the number of buffers released.
    pub fn reclaim(&mut self, completed: FenceValue) -> usize {
        let mut released = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let done = slot
                .entry
                .as_ref()
                .is_some_and(|e| e.fence.is_some_and(|f| f <= completed));
            if done {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index);
                released += 1;
            }
        }
        if released > 0 {
            debug!("Reclaimed {} staging buffers at fence {}", released, completed);
        }
        released
    }

    /// Number of staging buffers still held.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    /// Total size of the staging buffers still held.
    pub fn pending_bytes(&self) -> u64 {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .map(|e| e.buffer.size())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use deferred_rhi::device::Backend;
    use deferred_rhi::software::SoftwareBackend;

    use super::*;

    fn device() -> Arc<dyn Device> {
        let backend = SoftwareBackend::new();
        let surface = backend.create_surface(4, 4);
        backend.create_device(surface).unwrap()
    }

    #[test]
    fn test_destination_too_small_allocates_nothing() {
        let device = device();
        let mut uploader = ResourceUploader::new(device.clone());
        let destination = Buffer::new(device, BufferDesc::new(BufferUsage::Vertex, 8)).unwrap();
        let mut commands = CommandList::new("upload");

        let result = uploader.upload(&mut commands, &[0u8; 16], &destination, ResourceState::VertexAndConstantBuffer);
        assert!(matches!(result, Err(RenderError::Contract(_))));
        assert_eq!(uploader.pending(), 0);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_host_visible_destination_rejected() {
        let device = device();
        let mut uploader = ResourceUploader::new(device.clone());
        let destination = Buffer::new(device, BufferDesc::new(BufferUsage::Constant, 64)).unwrap();
        let mut commands = CommandList::new("upload");
        assert!(
            uploader
                .upload(&mut commands, &[1; 4], &destination, ResourceState::Common)
                .is_err()
        );
    }

    #[test]
    fn test_records_barrier_copy_barrier() {
        let device = device();
        let mut uploader = ResourceUploader::new(device.clone());
        let destination = Buffer::new(device, BufferDesc::new(BufferUsage::Index, 64)).unwrap();
        let mut commands = CommandList::new("upload");

        uploader
            .upload(&mut commands, &[7; 12], &destination, ResourceState::IndexBuffer)
            .unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(uploader.pending_bytes(), 12);
    }

    #[test]
    fn test_reclaim_only_completed_entries() {
        let device = device();
        let mut uploader = ResourceUploader::new(device.clone());
        let destination = Buffer::new(device, BufferDesc::new(BufferUsage::Structured, 64)).unwrap();
        let mut commands = CommandList::new("upload");

        let first = uploader
            .upload(&mut commands, &[1; 8], &destination, ResourceState::ShaderResource)
            .unwrap();
        assert_eq!(uploader.mark_submitted(5), 1);
        let second = uploader
            .upload(&mut commands, &[2; 8], &destination, ResourceState::ShaderResource)
            .unwrap();

        // Never stamped entries survive any reclaim
        assert_eq!(uploader.reclaim(100), 1);
        assert!(uploader.is_complete(first, 100));
        assert!(!uploader.is_complete(second, 100));
        assert_eq!(uploader.pending(), 1);

        assert_eq!(uploader.mark_submitted(6), 1);
        assert_eq!(uploader.reclaim(5), 0);
        assert!(!uploader.is_complete(second, 5));
        assert_eq!(uploader.reclaim(6), 1);
        assert_eq!(uploader.pending(), 0);
    }

    #[test]
    fn test_reused_index_keeps_old_handle_complete() {
        let device = device();
        let mut uploader = ResourceUploader::new(device.clone());
        let destination = Buffer::new(device, BufferDesc::new(BufferUsage::Structured, 64)).unwrap();
        let mut commands = CommandList::new("upload");

        let first = uploader
            .upload(&mut commands, &[1; 8], &destination, ResourceState::ShaderResource)
            .unwrap();
        uploader.mark_submitted(1);
        assert!(uploader.is_complete(first, 1));
        assert_eq!(uploader.reclaim(1), 1);

        let second = uploader
            .upload(&mut commands, &[2; 8], &destination, ResourceState::ShaderResource)
            .unwrap();
        assert_ne!(first, second);
        assert!(uploader.is_complete(first, 1));
        assert!(!uploader.is_complete(second, 1));

        uploader.mark_submitted(2);
        assert!(!uploader.is_complete(second, 1));
        assert!(uploader.is_complete(second, 2));
    }
}
