//! Fence protocol of the frame scheduler on the software queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use deferred_renderer::{FrameScheduler, RenderError, SlotStatus};
use deferred_rhi::command::CommandList;
use deferred_rhi::device::{Backend, Device};
use deferred_rhi::software::{SoftwareBackend, SoftwareDevice};
use deferred_rhi::sync::CompletionCounter;

fn software_device() -> (Arc<dyn Device>, Arc<SoftwareDevice>) {
    let backend = SoftwareBackend::new();
    let surface = backend.create_surface(8, 8);
    let device = backend.create_device(surface).unwrap();
    let software = backend.device(surface).unwrap();
    (device, software)
}

fn submit_empty_frame(scheduler: &mut FrameScheduler) -> u64 {
    scheduler.advance().unwrap();
    scheduler.submit().unwrap()
}

#[test]
fn test_fence_values_increase_across_slots_and_setup() {
    let (device, software) = software_device();
    let mut scheduler = FrameScheduler::new(device.queue(), 3).unwrap();

    let mut values = Vec::new();
    for i in 0..7 {
        values.push(submit_empty_frame(&mut scheduler));
        if i == 3 {
            values.push(scheduler.submit_setup(CommandList::new("setup")).unwrap());
        }
    }

    assert!(values.windows(2).all(|w| w[1] == w[0] + 1));
    assert_eq!(scheduler.last_issued(), *values.last().unwrap());

    scheduler.flush_all().unwrap();
    assert_eq!(software.stats().executed, values.len() as u64);
}

#[test]
fn test_advance_waits_for_the_slot_fence() {
    let (device, software) = software_device();
    let queue = device.queue();
    let mut scheduler = FrameScheduler::new(queue.clone(), 2).unwrap();

    software.pause_queue();
    submit_empty_frame(&mut scheduler);
    submit_empty_frame(&mut scheduler);
    assert_eq!(scheduler.slot_status(0).unwrap(), SlotStatus::Submitted);

    let released = Arc::new(AtomicBool::new(false));
    let gpu = {
        let released = released.clone();
        let software = software.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            released.store(true, Ordering::SeqCst);
            software.resume_queue();
        })
    };

    let slot = scheduler.advance().unwrap();
    assert_eq!(slot, 0);
    assert!(released.load(Ordering::SeqCst));
    let fence = scheduler.slot_fence_value(0).unwrap();
    assert!(queue.completed_value().unwrap() >= fence);

    scheduler.abort_recording();
    gpu.join().unwrap();
}

#[test]
fn test_flush_all_completes_every_slot() {
    let (device, _software) = software_device();
    let queue = device.queue();
    let mut scheduler = FrameScheduler::new(queue.clone(), 3).unwrap();
    for _ in 0..5 {
        submit_empty_frame(&mut scheduler);
    }

    scheduler.flush_all().unwrap();
    assert!(queue.completed_value().unwrap() >= scheduler.last_issued());
    for slot in 0..3 {
        assert_eq!(scheduler.slot_status(slot).unwrap(), SlotStatus::Completed);
    }
}

#[test]
fn test_lost_device_fails_waits() {
    let (device, software) = software_device();
    let mut scheduler = FrameScheduler::new(device.queue(), 1).unwrap();
    submit_empty_frame(&mut scheduler);
    scheduler.flush_all().unwrap();

    software.lose_device("test removal");
    assert!(matches!(scheduler.flush_all(), Err(RenderError::DeviceLost(_))));
    assert!(scheduler.advance().unwrap_err().is_device_lost());
}
