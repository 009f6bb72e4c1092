//! Renderer lifecycle, backpressure and failure handling.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use common::{Harness, floor_model, test_config};
use deferred_renderer::constants::frame_footprint;
use deferred_renderer::{RenderError, SlotStatus};
use deferred_resources::{Model, ResourceError};

#[test]
fn test_render_before_initialize_fails() {
    let mut harness = Harness::new(16, 16, floor_model());
    assert!(matches!(
        harness.renderer.render_frame(),
        Err(RenderError::NotInitialized)
    ));
    assert!(harness.renderer.frame_targets(0).is_none());
}

#[test]
fn test_initialize_twice_fails() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    assert!(matches!(
        harness.renderer.initialize(),
        Err(RenderError::AlreadyInitialized)
    ));
}

#[test]
fn test_frames_get_increasing_fences() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    let fences: Vec<u64> = (0..5).map(|_| harness.renderer.render_frame().unwrap()).collect();

    assert!(fences.windows(2).all(|w| w[1] > w[0]));
    let stats = harness.renderer.stats();
    assert_eq!(stats.frames_rendered, 5);
    assert_eq!(stats.last_fence, fences[4]);
    assert_eq!(stats.draw_count, 1);

    harness.renderer.wait_idle().unwrap();
    let device = harness.device();
    assert_eq!(device.stats().presents, 5);
    assert_eq!(device.presented_image(harness.surface).unwrap().1, 5);
}

#[test]
fn test_third_frame_waits_for_first() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    assert_eq!(harness.renderer.frames_in_flight(), 2);
    let device = harness.device();

    device.pause_queue();
    let first = harness.renderer.render_frame().unwrap();
    harness.renderer.render_frame().unwrap();

    let released = Arc::new(AtomicBool::new(false));
    let gpu = {
        let released = released.clone();
        let device = device.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            released.store(true, Ordering::SeqCst);
            device.resume_queue();
        })
    };

    harness.renderer.render_frame().unwrap();
    assert!(released.load(Ordering::SeqCst));
    gpu.join().unwrap();

    let scheduler = harness.renderer.scheduler().unwrap();
    assert!(scheduler.completed_value().unwrap() >= first);
}

#[test]
fn test_idle_point_reclaims_staging() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    // Vertices, indices and materials
    assert_eq!(harness.renderer.stats().pending_uploads, 3);

    harness.renderer.wait_idle().unwrap();
    assert_eq!(harness.renderer.stats().pending_uploads, 0);
}

#[test]
fn test_cleanup_twice_releases_everything_once() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    harness.renderer.render_frame().unwrap();
    harness.renderer.render_frame().unwrap();
    let device = harness.device();

    harness.renderer.cleanup().unwrap();
    let after_first = device.stats();
    assert!(after_first.is_empty());
    assert!(!harness.renderer.is_initialized());

    harness.renderer.cleanup().unwrap();
    assert_eq!(device.stats(), after_first);
}

#[test]
fn test_cleanup_before_initialize_is_noop() {
    let mut harness = Harness::new(16, 16, floor_model());
    harness.renderer.cleanup().unwrap();
    assert!(harness.backend.device(harness.surface).is_none());
}

#[test]
fn test_device_loss_is_reported() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    harness.renderer.render_frame().unwrap();
    harness.renderer.wait_idle().unwrap();

    harness.device().lose_device("simulated removal");
    let err = harness.renderer.render_frame().unwrap_err();
    assert!(err.is_device_lost(), "unexpected error: {}", err);

    // The slot was released, so the next frame reports the loss again
    assert!(harness.renderer.render_frame().unwrap_err().is_device_lost());

    assert!(harness.renderer.cleanup().unwrap_err().is_device_lost());
    assert!(harness.device().stats().is_empty());
    harness.renderer.cleanup().unwrap();
}

#[test]
fn test_recording_failure_submits_nothing() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    harness.renderer.wait_idle().unwrap();
    let device = harness.device();
    let submissions = device.stats().submissions;

    // Slot 0 has never been submitted, so advance() succeeds and the
    // failure surfaces while recording
    device.lose_device("lost before the first frame");
    let err = harness.renderer.render_frame().unwrap_err();
    assert!(err.is_device_lost(), "unexpected error: {}", err);
    assert_eq!(device.stats().submissions, submissions);
    assert_eq!(device.stats().presents, 0);
    assert_eq!(harness.renderer.stats().frames_rendered, 0);

    let scheduler = harness.renderer.scheduler().unwrap();
    assert_eq!(scheduler.slot_status(0).unwrap(), SlotStatus::Idle);
}

#[test]
fn test_constant_arena_smaller_than_a_frame_is_rejected() {
    let mut config = test_config();
    config.constant_arena_size = 1024;
    let mut harness = Harness::with_config(16, 16, floor_model(), config);
    assert!(matches!(
        harness.renderer.initialize(),
        Err(RenderError::Config(_))
    ));
    assert!(!harness.renderer.is_initialized());

    let mut config = test_config();
    config.constant_arena_size = frame_footprint();
    let mut harness = Harness::with_config(16, 16, floor_model(), config);
    harness.renderer.initialize().unwrap();
    for _ in 0..3 {
        harness.renderer.render_frame().unwrap();
    }
}

#[test]
fn test_invalid_model_fails_initialization() {
    let mut model = floor_model();
    model.meshes[0].material_index = 3;
    let mut harness = Harness::new(16, 16, model);

    let err = harness.renderer.initialize().unwrap_err();
    match err {
        RenderError::Initialization { stage, source } => {
            assert_eq!(stage, "model");
            assert!(matches!(
                *source,
                RenderError::Resource(ResourceError::MaterialOutOfRange { .. })
            ));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!harness.renderer.is_initialized());
    assert!(harness.device().stats().is_empty());
}

#[test]
fn test_empty_model_fails_initialization() {
    let mut harness = Harness::new(16, 16, Model::default());
    assert!(matches!(
        harness.renderer.initialize(),
        Err(RenderError::Initialization { stage: "model", .. })
    ));
}

#[test]
fn test_invalid_config_fails_initialization() {
    let mut config = test_config();
    config.frames_in_flight = 0;
    let mut harness = Harness::with_config(16, 16, floor_model(), config);
    assert!(matches!(
        harness.renderer.initialize(),
        Err(RenderError::Config(_))
    ));
}

#[test]
fn test_resize_keeps_rendering() {
    let mut harness = Harness::initialized(16, 16, floor_model());
    harness.renderer.render_frame().unwrap();

    harness.renderer.resize(32, 24).unwrap();
    assert_eq!(harness.renderer.extent(), (32, 24));
    for _ in 0..3 {
        harness.renderer.render_frame().unwrap();
    }
    harness.renderer.wait_idle().unwrap();

    let targets = harness.renderer.frame_targets(1).unwrap();
    assert_eq!((targets.width, targets.height), (32, 24));
    let (image, _) = harness.device().presented_image(harness.surface).unwrap();
    assert_eq!((image.width, image.height), (32, 24));

    // Zero extents are ignored
    harness.renderer.resize(0, 10).unwrap();
    assert_eq!(harness.renderer.extent(), (32, 24));
}
