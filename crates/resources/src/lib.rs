//! Model data for the deferred renderer.
//!
//! This crate handles:
//! - Meshes, models and materials
//! - Model validation before upload
//! - The [`ModelSource`] interface the renderer loads its model through
//! - Procedural primitives for tests and demos

pub mod error;
pub mod material;
pub mod model;
pub mod primitives;
pub mod source;

pub use error::{ResourceError, ResourceResult};
pub use material::Material;
pub use model::{Mesh, Model};
pub use source::ModelSource;
