//! Core utilities for the deferred renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Configuration management

mod config;
mod error;
mod logging;
mod timer;

pub use config::{DescriptorHeapSizes, MAX_FRAMES_IN_FLIGHT, RendererConfig, ShadowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
