//! Error types for model data.

use thiserror::Error;

/// Error type for loading and validating models.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The model has no meshes.
    #[error("Model contains no meshes")]
    NoMeshes,

    /// The model has no materials.
    #[error("Model contains no materials")]
    NoMaterials,

    /// A mesh has no position data.
    #[error("Mesh {0} has no position data")]
    NoPositionData(usize),

    /// A mesh has a different number of normals than positions.
    #[error("Mesh {mesh} has {normals} normals for {positions} positions")]
    AttributeMismatch {
        /// Mesh index.
        mesh: usize,
        /// Number of positions.
        positions: usize,
        /// Number of normals.
        normals: usize,
    },

    /// A mesh's index count is not a multiple of three.
    #[error("Mesh {mesh} has {count} indices, not a triangle list")]
    IncompleteTriangles {
        /// Mesh index.
        mesh: usize,
        /// Number of indices.
        count: usize,
    },

    /// An index points past the end of the vertex data.
    #[error("Mesh {mesh} index {index} is out of range of {vertex_count} vertices")]
    IndexOutOfRange {
        /// Mesh index.
        mesh: usize,
        /// Offending index value.
        index: u32,
        /// Number of vertices.
        vertex_count: usize,
    },

    /// A mesh references a material that does not exist.
    #[error("Mesh {mesh} uses material {material} of {count}")]
    MaterialOutOfRange {
        /// Mesh index.
        mesh: usize,
        /// Referenced material index.
        material: u32,
        /// Number of materials.
        count: usize,
    },

    /// The model source failed.
    #[error("Model source failed: {0}")]
    Source(String),

    /// IO error while reading model data.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
