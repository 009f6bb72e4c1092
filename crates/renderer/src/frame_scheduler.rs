//! Frame-in-flight scheduling over a completion counter.
//!
//! The [`FrameScheduler`] owns one command list per frame slot and hands the
//! slots out round-robin. Every submission, per-slot or not, takes the next
//! value of a single strictly increasing 64-bit counter and asks the queue to
//! signal it once the list has executed.
//!
//! # Overview
//!
//! ```text
//!            advance()            submit()               counter reaches value
//!   Idle ───────────────▶ Recording ───────▶ Submitted ─────────────────────▶ Completed
//!     ▲                      │                                                    │
//!     └── abort_recording() ─┘          advance() waits here before reuse ◀──────┘
//! ```
//!
//! `Completed` is never stored: [`FrameScheduler::slot_status`] derives it
//! from the counter. The CPU blocks in two places only:
//!
//! - [`FrameScheduler::advance`] waits until the slot's previous submission
//!   has completed, so the slot's resources can be rewritten
//! - [`FrameScheduler::flush_all`] waits for every value issued so far
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deferred_rhi::device::Queue;
//! use deferred_renderer::frame_scheduler::FrameScheduler;
//!
//! # fn example(queue: Arc<dyn Queue>) -> deferred_renderer::RenderResult<()> {
//! let mut scheduler = FrameScheduler::new(queue, 2)?;
//! for _ in 0..3 {
//!     let slot = scheduler.advance()?;
//!     scheduler.commands_mut()?.set_root_constants(&[slot as u32]);
//!     scheduler.submit()?;
//! }
//! scheduler.flush_all()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use deferred_core::MAX_FRAMES_IN_FLIGHT;
use deferred_rhi::command::CommandList;
use deferred_rhi::device::Queue;
use deferred_rhi::sync::FenceValue;
use tracing::{debug, info, trace, warn};

use crate::error::{RenderError, RenderResult};

/// Observable state of a frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// Never submitted.
    Idle,
    /// Handed out by `advance` and not yet submitted.
    Recording,
    /// Submitted; the counter has not reached the slot's value.
    Submitted,
    /// The slot's last submission has executed.
    Completed,
}

/// Per-slot scheduling state.
struct FrameSlot {
    commands: CommandList,
    /// Counter value of the slot's last submission; 0 if never submitted.
    fence_value: FenceValue,
    recording: bool,
}

impl FrameSlot {
    fn new(index: usize) -> Self {
        Self {
            commands: CommandList::new(slot_label(index)),
            fence_value: 0,
            recording: false,
        }
    }
}

fn slot_label(index: usize) -> String {
    format!("frame slot {}", index)
}

/// Hands out frame slots and tracks their completion.
///
/// # Thread Safety
///
/// The scheduler is driven from a single recording thread. The queue it
/// submits to may execute on any thread.
pub struct FrameScheduler {
    queue: Arc<dyn Queue>,
    slots: Vec<FrameSlot>,
    current: Option<usize>,
    last_issued: FenceValue,
}

impl FrameScheduler {
    /// Creates a scheduler with `slot_count` frame slots.
    ///
    /// Counter values continue from the queue's completed value, so a
    /// scheduler can be created for a queue that already ran work.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Contract`] if `slot_count` is not in
    /// `1..=MAX_FRAMES_IN_FLIGHT`, or [`RenderError::DeviceLost`] if the
    /// counter cannot be read.
    pub fn new(queue: Arc<dyn Queue>, slot_count: usize) -> RenderResult<Self> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&slot_count) {
            return Err(RenderError::Contract(format!(
                "{} frame slots requested, supported range is 1..={}",
                slot_count, MAX_FRAMES_IN_FLIGHT
            )));
        }
        let last_issued = queue.completed_value().map_err(RenderError::from_wait)?;
        let slots = (0..slot_count).map(FrameSlot::new).collect();

        info!("Frame scheduler created with {} slots", slot_count);

        Ok(Self {
            queue,
            slots,
            current: None,
            last_issued,
        })
    }

    /// Moves to the next slot and returns its index in the recording state.
    ///
    /// Blocks until the GPU has finished the slot's previous submission. The
    /// slot's command list is reset before it is handed out. The first call
    /// returns slot 0.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Contract`] if the current slot is still
    /// recording, or [`RenderError::DeviceLost`] if the wait fails.
    pub fn advance(&mut self) -> RenderResult<usize> {
        if let Some(current) = self.current
            && self.slots[current].recording
        {
            return Err(RenderError::Contract(format!(
                "advance() while slot {} is still recording",
                current
            )));
        }

        let next = self.current.map_or(0, |c| (c + 1) % self.slots.len());
        let slot = &mut self.slots[next];

        if slot.fence_value > 0 {
            trace!("Slot {} waits for fence {}", next, slot.fence_value);
            self.queue
                .wait_until(slot.fence_value)
                .map_err(RenderError::from_wait)?;
        }

        slot.commands.reset();
        slot.recording = true;
        self.current = Some(next);
        Ok(next)
    }

    /// Returns the command list of the slot being recorded.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Contract`] if no slot is recording.
    pub fn commands_mut(&mut self) -> RenderResult<&mut CommandList> {
        let slot = self.recording_slot()?;
        Ok(&mut self.slots[slot].commands)
    }

    /// Submits the recording slot's list with the next counter value.
    ///
    /// On success the slot is `Submitted` and the returned value is the one
    /// it will be reused after.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Contract`] if no slot is recording, or the
    /// queue's error. A failed submission leaves the slot idle with its
    /// previous fence value.
    pub fn submit(&mut self) -> RenderResult<FenceValue> {
        let index = self.recording_slot()?;
        let value = self.last_issued + 1;
        let slot = &mut self.slots[index];
        let commands = std::mem::replace(&mut slot.commands, CommandList::new(slot_label(index)));
        slot.recording = false;

        trace!(
            "Submitting slot {} ({} commands) with fence {}",
            index,
            commands.len(),
            value
        );
        self.queue.submit(commands, value)?;

        slot.fence_value = value;
        self.last_issued = value;
        Ok(value)
    }

    /// Submits a list that belongs to no slot, such as initial uploads.
    ///
    /// # Errors
    ///
    /// Returns the queue's error.
    pub fn submit_setup(&mut self, commands: CommandList) -> RenderResult<FenceValue> {
        let value = self.last_issued + 1;
        debug!(
            "Submitting setup list '{}' ({} commands) with fence {}",
            commands.label(),
            commands.len(),
            value
        );
        self.queue.submit(commands, value)?;
        self.last_issued = value;
        Ok(value)
    }

    /// Discards the list being recorded. Nothing is submitted and the slot
    /// keeps the fence value of its previous submission.
    ///
    /// Does nothing when no slot is recording.
    pub fn abort_recording(&mut self) {
        if let Some(current) = self.current {
            let slot = &mut self.slots[current];
            if slot.recording {
                warn!(
                    "Discarding {} recorded commands of slot {}",
                    slot.commands.len(),
                    current
                );
                slot.commands.reset();
                slot.recording = false;
            }
        }
    }

    /// Blocks until every issued value has completed.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::DeviceLost`] if the wait fails.
    pub fn flush_all(&self) -> RenderResult<()> {
        debug!("Flushing up to fence {}", self.last_issued);
        self.queue
            .wait_until(self.last_issued)
            .map_err(RenderError::from_wait)?;

        let completed = self.completed_value()?;
        if completed < self.last_issued || self.slots.iter().any(|s| s.fence_value > completed) {
            return Err(RenderError::DeviceLost(format!(
                "flush returned at {} with {} issued",
                completed, self.last_issued
            )));
        }
        Ok(())
    }

    /// Returns the queue's completed counter value.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::DeviceLost`] once the device is lost.
    pub fn completed_value(&self) -> RenderResult<FenceValue> {
        self.queue.completed_value().map_err(RenderError::from_wait)
    }

    /// Returns the status of slot `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Contract`] for an out-of-range index or
    /// [`RenderError::DeviceLost`] if the counter cannot be read.
    pub fn slot_status(&self, index: usize) -> RenderResult<SlotStatus> {
        let slot = self.slots.get(index).ok_or_else(|| {
            RenderError::Contract(format!(
                "slot {} out of range ({} slots)",
                index,
                self.slots.len()
            ))
        })?;
        if slot.recording {
            return Ok(SlotStatus::Recording);
        }
        if slot.fence_value == 0 {
            return Ok(SlotStatus::Idle);
        }
        if self.completed_value()? >= slot.fence_value {
            Ok(SlotStatus::Completed)
        } else {
            Ok(SlotStatus::Submitted)
        }
    }

    /// Counter value of slot `index`'s last submission, 0 if none.
    #[inline]
    pub fn slot_fence_value(&self, index: usize) -> Option<FenceValue> {
        self.slots.get(index).map(|s| s.fence_value)
    }

    /// Highest counter value handed to the queue.
    #[inline]
    pub fn last_issued(&self) -> FenceValue {
        self.last_issued
    }

    /// Index of the slot returned by the last `advance`.
    #[inline]
    pub fn current_slot(&self) -> Option<usize> {
        self.current
    }

    /// Number of frame slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the queue work is submitted to.
    #[inline]
    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    fn recording_slot(&self) -> RenderResult<usize> {
        match self.current {
            Some(index) if self.slots[index].recording => Ok(index),
            _ => Err(RenderError::Contract("no frame slot is recording".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use deferred_rhi::RhiResult;
    use deferred_rhi::swapchain::SwapChainId;
    use deferred_rhi::sync::{CompletionCounter, TimelineFence};
    use parking_lot::Mutex;

    use super::*;

    /// Queue whose counter the test drives by hand.
    #[derive(Default)]
    struct ManualQueue {
        fence: TimelineFence,
        submitted: Mutex<Vec<(String, FenceValue)>>,
    }

    impl ManualQueue {
        fn complete(&self, value: FenceValue) {
            self.fence.signal(value).unwrap();
        }

        fn submitted_values(&self) -> Vec<FenceValue> {
            self.submitted.lock().iter().map(|(_, v)| *v).collect()
        }
    }

    impl CompletionCounter for ManualQueue {
        fn completed_value(&self) -> RhiResult<FenceValue> {
            self.fence.completed_value()
        }

        fn wait_until(&self, value: FenceValue) -> RhiResult<()> {
            self.fence.wait_until(value)
        }
    }

    impl Queue for ManualQueue {
        fn submit(&self, commands: CommandList, signal_value: FenceValue) -> RhiResult<()> {
            self.fence.completed_value()?;
            self.submitted
                .lock()
                .push((commands.label().to_string(), signal_value));
            Ok(())
        }

        fn present(&self, _swap_chain: SwapChainId, _buffer_index: u32) -> RhiResult<()> {
            Ok(())
        }
    }

    fn scheduler(slots: usize) -> (Arc<ManualQueue>, FrameScheduler) {
        let queue = Arc::new(ManualQueue::default());
        let scheduler = FrameScheduler::new(queue.clone(), slots).unwrap();
        (queue, scheduler)
    }

    #[test]
    fn test_slot_count_is_validated() {
        let queue: Arc<dyn Queue> = Arc::new(ManualQueue::default());
        assert!(FrameScheduler::new(queue.clone(), 0).is_err());
        assert!(FrameScheduler::new(queue.clone(), MAX_FRAMES_IN_FLIGHT + 1).is_err());
        assert!(FrameScheduler::new(queue, 3).is_ok());
    }

    #[test]
    fn test_slots_rotate_from_zero() {
        let (queue, mut scheduler) = scheduler(3);
        let mut order = Vec::new();
        for _ in 0..5 {
            let slot = scheduler.advance().unwrap();
            order.push(slot);
            let value = scheduler.submit().unwrap();
            queue.complete(value);
        }
        assert_eq!(order, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_fence_values_increase_across_slots_and_setup() {
        let (queue, mut scheduler) = scheduler(2);
        scheduler.advance().unwrap();
        let a = scheduler.submit().unwrap();
        let setup = scheduler.submit_setup(CommandList::new("uploads")).unwrap();
        scheduler.advance().unwrap();
        let b = scheduler.submit().unwrap();

        assert_eq!((a, setup, b), (1, 2, 3));
        assert_eq!(queue.submitted_values(), vec![1, 2, 3]);
        assert_eq!(scheduler.last_issued(), 3);
        assert_eq!(scheduler.slot_fence_value(0), Some(1));
        assert_eq!(scheduler.slot_fence_value(1), Some(3));
    }

    #[test]
    fn test_advance_blocks_until_slot_fence_reached() {
        let (queue, mut scheduler) = scheduler(2);
        scheduler.advance().unwrap();
        let first = scheduler.submit().unwrap();
        scheduler.advance().unwrap();
        scheduler.submit().unwrap();

        let released = Arc::new(AtomicBool::new(false));
        let gpu = {
            let queue = queue.clone();
            let released = released.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                released.store(true, Ordering::SeqCst);
                queue.complete(first);
            })
        };

        let slot = scheduler.advance().unwrap();
        assert_eq!(slot, 0);
        assert!(released.load(Ordering::SeqCst));
        assert!(queue.completed_value().unwrap() >= first);
        gpu.join().unwrap();
    }

    #[test]
    fn test_advance_while_recording_is_contract_error() {
        let (_queue, mut scheduler) = scheduler(2);
        scheduler.advance().unwrap();
        assert!(matches!(scheduler.advance(), Err(RenderError::Contract(_))));
    }

    #[test]
    fn test_submit_without_recording_is_contract_error() {
        let (_queue, mut scheduler) = scheduler(2);
        assert!(matches!(scheduler.submit(), Err(RenderError::Contract(_))));
        assert!(scheduler.commands_mut().is_err());
    }

    #[test]
    fn test_abort_submits_nothing() {
        let (queue, mut scheduler) = scheduler(2);
        scheduler.advance().unwrap();
        scheduler.commands_mut().unwrap().draw(3, 0);
        scheduler.abort_recording();

        assert!(queue.submitted_values().is_empty());
        assert_eq!(scheduler.slot_status(0).unwrap(), SlotStatus::Idle);
        assert_eq!(scheduler.advance().unwrap(), 1);
        assert!(scheduler.commands_mut().unwrap().is_empty());
    }

    #[test]
    fn test_slot_status_follows_counter() {
        let (queue, mut scheduler) = scheduler(2);
        assert_eq!(scheduler.slot_status(0).unwrap(), SlotStatus::Idle);
        scheduler.advance().unwrap();
        assert_eq!(scheduler.slot_status(0).unwrap(), SlotStatus::Recording);
        let value = scheduler.submit().unwrap();
        assert_eq!(scheduler.slot_status(0).unwrap(), SlotStatus::Submitted);
        queue.complete(value);
        assert_eq!(scheduler.slot_status(0).unwrap(), SlotStatus::Completed);
        assert!(scheduler.slot_status(2).is_err());
    }

    #[test]
    fn test_flush_all_waits_for_everything() {
        let (queue, mut scheduler) = scheduler(2);
        scheduler.advance().unwrap();
        scheduler.submit().unwrap();
        let last = scheduler.submit_setup(CommandList::new("late")).unwrap();

        let gpu = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.complete(last);
            })
        };
        scheduler.flush_all().unwrap();
        assert!(scheduler.completed_value().unwrap() >= last);
        gpu.join().unwrap();
    }

    #[test]
    fn test_lost_device_fails_advance() {
        let (queue, mut scheduler) = scheduler(1);
        scheduler.advance().unwrap();
        scheduler.submit().unwrap();
        queue.fence.mark_lost("removed");

        let err = scheduler.advance().unwrap_err();
        assert!(err.is_device_lost());
        assert!(scheduler.flush_all().unwrap_err().is_device_lost());
    }

    #[test]
    fn test_scheduler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameScheduler>();
    }
}
