//! Vertex data structures and input layouts.
//!
//! - [`Vertex`] - mesh vertex with position, normal and texture coordinates
//! - [`InputLayout`] - which vertex attributes a pipeline consumes

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Standard mesh vertex.
///
/// # Memory Layout
///
/// The struct uses `#[repr(C)]`:
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: tex_coord (8 bytes)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: Vec3,
    /// Object-space normal.
    pub normal: Vec3,
    /// Texture coordinates.
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Creates a new vertex.
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Creates a vertex with only a position and a normal.
    #[inline]
    pub const fn from_position_normal(position: Vec3, normal: Vec3) -> Self {
        Self::new(position, normal, Vec2::ZERO)
    }
}

/// Vertex attributes a pipeline reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputLayout {
    /// No vertex buffer; vertices are generated from the vertex id
    None,
    /// Only the position of each [`Vertex`]
    PositionOnly,
    /// Position, normal and texture coordinates
    Full,
}

impl InputLayout {
    /// Returns true if a vertex buffer must be bound.
    #[inline]
    pub fn needs_vertex_buffer(self) -> bool {
        !matches!(self, InputLayout::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::STRIDE, 32);
    }

    #[test]
    fn test_vertex_offsets() {
        assert_eq!(std::mem::offset_of!(Vertex, position), 0);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 12);
        assert_eq!(std::mem::offset_of!(Vertex, tex_coord), 24);
    }

    #[test]
    fn test_vertex_bytes() {
        let vertices = [
            Vertex::from_position_normal(Vec3::X, Vec3::Y),
            Vertex::from_position_normal(Vec3::Z, Vec3::Y),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 64);

        let back: Vertex = bytemuck::pod_read_unaligned(&bytes[32..64]);
        assert_eq!(back.position, Vec3::Z);
    }

    #[test]
    fn test_input_layout() {
        assert!(!InputLayout::None.needs_vertex_buffer());
        assert!(InputLayout::PositionOnly.needs_vertex_buffer());
        assert!(InputLayout::Full.needs_vertex_buffer());
    }
}
