//! Scene math for the deferred renderer.
//!
//! This crate provides:
//! - Camera view and projection matrices
//! - Point light with shadow-cube matrices
//! - World transform and normal matrix

pub mod camera;
pub mod light;
pub mod transform;

pub use camera::{Camera, Projection};
pub use light::{CUBE_FACES, PointLight};
pub use transform::{Transform, normal_matrix};
