//! Frame core of the deferred renderer.
//!
//! This crate orchestrates the rendering process:
//! - Frame-in-flight scheduling over the queue's completion counter
//! - Per-slot frame resources and descriptor layout
//! - Staged uploads and per-slot constant memory
//! - The shadow, geometry and lighting passes
//!
//! [`Renderer`] ties these together and is the entry point for applications.

pub mod constants;
pub mod context;
pub mod descriptors;
mod error;
pub mod frame;
pub mod frame_scheduler;
pub mod passes;
mod renderer;
pub mod uploader;

pub use context::{DrawCallArgs, FrameContext, FrameMatrices, LightState};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameTargets, POSITION_SENTINEL};
pub use frame_scheduler::{FrameScheduler, SlotStatus};
pub use renderer::{RenderStats, Renderer};
pub use uploader::{ResourceUploader, UploadHandle};
