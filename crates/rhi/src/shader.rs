//! Shader programs and their constant layouts.
//!
//! The renderer uses three fixed programs. Each one reads its per-draw data
//! from a constant buffer at [`CONSTANTS_SLOT`] whose layout is one of the
//! `#[repr(C)]` structs below, plus descriptor tables bound to the root slots
//! listed here.
//!
//! | program                               | constants                 | tables |
//! |---------------------------------------|---------------------------|--------|
//! | [`ShaderProgram::ShadowDepth`]        | [`ShadowConstants`]       | none |
//! | [`ShaderProgram::GeometryAttributes`] | [`GeometryConstants`]     | materials |
//! | [`ShaderProgram::LightingResolve`]    | [`LightingConstants`]     | attributes + shadow cube, materials, sampler |
//!
//! The geometry program also takes the material index as root constant 0.
//!
//! All structures use `#[repr(C)]` and implement `Pod` so they can be copied
//! into constant memory with `bytemuck::bytes_of`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Root slot of the per-draw constant buffer.
pub const CONSTANTS_SLOT: u32 = 0;

/// Root slot of the lighting input table (position, diffuse, normal, shadow cube).
pub const ATTRIBUTES_TABLE_SLOT: u32 = 0;

/// Root slot of the material table.
pub const MATERIALS_TABLE_SLOT: u32 = 1;

/// Index of the world-position target inside the lighting input table.
pub const POSITION_INPUT: u32 = 0;
/// Index of the diffuse target inside the lighting input table.
pub const DIFFUSE_INPUT: u32 = 1;
/// Index of the normal target inside the lighting input table.
pub const NORMAL_INPUT: u32 = 2;
/// Index of the shadow cube inside the lighting input table.
pub const SHADOW_INPUT: u32 = 3;
/// Number of entries in the lighting input table.
pub const LIGHTING_INPUT_COUNT: u32 = 4;

/// The fixed set of shader programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    /// Writes light-space depth of every triangle into a shadow face.
    ShadowDepth,
    /// Writes world position, albedo and world normal into the attribute targets.
    GeometryAttributes,
    /// Full-screen resolve combining the attribute targets with the shadow cube.
    LightingResolve,
}

impl ShaderProgram {
    /// Returns a human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            ShaderProgram::ShadowDepth => "shadow_depth",
            ShaderProgram::GeometryAttributes => "geometry_attributes",
            ShaderProgram::LightingResolve => "lighting_resolve",
        }
    }

    /// Size of the constant block the program reads.
    pub fn constants_size(self) -> usize {
        match self {
            ShaderProgram::ShadowDepth => ShadowConstants::SIZE,
            ShaderProgram::GeometryAttributes => GeometryConstants::SIZE,
            ShaderProgram::LightingResolve => LightingConstants::SIZE,
        }
    }
}

/// Constants of one shadow face.
///
/// # Memory Layout
///
/// - Offset 0: face view-projection (64 bytes)
/// - Offset 64: world matrix (64 bytes)
/// - Offset 128: light position, w unused (16 bytes)
/// - Total size: 144 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ShadowConstants {
    /// View-projection of the cube face being rendered.
    pub view_proj: Mat4,
    /// Object-to-world matrix.
    pub world: Mat4,
    /// World-space light position.
    pub light_pos: Vec4,
}

impl ShadowConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Constants of the geometry pass.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: world-view matrix (64 bytes)
/// - Offset 128: world-view-projection matrix (64 bytes)
/// - Offset 192: normal matrix (64 bytes)
/// - Total size: 256 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GeometryConstants {
    /// Object-to-world matrix.
    pub world: Mat4,
    /// Object-to-view matrix.
    pub world_view: Mat4,
    /// Object-to-clip matrix.
    pub world_view_proj: Mat4,
    /// Inverse transpose of the world matrix.
    pub normal_matrix: Mat4,
}

impl GeometryConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Constants of the lighting resolve.
///
/// # Memory Layout
///
/// - Offset 0: six face view-projections (384 bytes)
/// - Offset 384: light world position (16 bytes)
/// - Offset 400: light view position (16 bytes)
/// - Offset 416: light color (16 bytes)
/// - Offset 432: background color (16 bytes)
/// - Offset 448: x = depth bias, y = shadow map size (16 bytes)
/// - Total size: 464 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LightingConstants {
    /// Face view-projections ordered +X, -X, +Y, -Y, +Z, -Z.
    pub shadow_view_proj: [Mat4; 6],
    /// Light position in world space.
    pub light_world_pos: Vec4,
    /// Light position in view space.
    pub light_view_pos: Vec4,
    /// Light color, rgb.
    pub light_color: Vec4,
    /// Color of pixels without geometry.
    pub background: Vec4,
    /// x: depth bias, y: shadow face size in texels.
    pub params: Vec4,
}

impl LightingConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Depth bias applied before the shadow comparison.
    #[inline]
    pub fn depth_bias(&self) -> f32 {
        self.params.x
    }

    /// World-space light position.
    #[inline]
    pub fn light_position(&self) -> Vec3 {
        self.light_world_pos.truncate()
    }
}

/// One material as stored in the material buffer.
///
/// # Memory Layout
///
/// - Offset 0: ambient color (16 bytes)
/// - Offset 16: diffuse color (16 bytes)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    /// Ambient term added regardless of lighting.
    pub ambient: Vec4,
    /// Diffuse albedo.
    pub diffuse: Vec4,
}

impl MaterialData {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_sizes() {
        assert_eq!(ShadowConstants::SIZE, 144);
        assert_eq!(GeometryConstants::SIZE, 256);
        assert_eq!(LightingConstants::SIZE, 464);
        assert_eq!(MaterialData::SIZE, 32);
    }

    #[test]
    fn test_constant_alignment() {
        assert_eq!(std::mem::align_of::<LightingConstants>() % 4, 0);
        assert_eq!(std::mem::offset_of!(LightingConstants, light_world_pos), 384);
        assert_eq!(std::mem::offset_of!(LightingConstants, params), 448);
    }

    #[test]
    fn test_program_constants_size() {
        assert_eq!(ShaderProgram::ShadowDepth.constants_size(), 144);
        assert_eq!(ShaderProgram::LightingResolve.constants_size(), 464);
    }
}
