//! CPU implementations of the three shader programs.

use glam::{Vec3, Vec4, vec4};

use crate::descriptor::{AddressMode, Filter, SamplerDesc};
use crate::pipeline::MAX_COLOR_TARGETS;
use crate::shader::{
    DIFFUSE_INPUT, GeometryConstants, LightingConstants, MaterialData, NORMAL_INPUT,
    POSITION_INPUT, SHADOW_INPUT, ShadowConstants,
};
use crate::vertex::Vertex;

use super::raster::{ClipVertex, Fragment};
use super::resources::{Texel, TextureEntry};

/// Decoded constant block of the bound program.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ProgramConstants {
    Shadow(ShadowConstants),
    Geometry(GeometryConstants),
    Lighting(LightingConstants),
}

/// Everything a program reads besides its vertex input.
pub(crate) struct ShaderBindings<'a> {
    pub constants: ProgramConstants,
    pub material_index: u32,
    pub materials: Vec<MaterialData>,
    /// Lighting inputs in table order; empty for other programs.
    pub inputs: Vec<&'a TextureEntry>,
    pub sampler: SamplerDesc,
}

pub(crate) type ColorOutputs = [Texel; MAX_COLOR_TARGETS];

/// Runs the vertex stage.
pub(crate) fn run_vertex(bindings: &ShaderBindings<'_>, vertex_id: u32, vertex: &Vertex) -> ClipVertex {
    match &bindings.constants {
        ProgramConstants::Shadow(c) => {
            ClipVertex::new(c.view_proj * c.world * vertex.position.extend(1.0))
        }
        ProgramConstants::Geometry(c) => {
            let position = vertex.position.extend(1.0);
            let world = c.world * position;
            let normal = c.normal_matrix * vertex.normal.extend(0.0);

            let mut out = ClipVertex::new(c.world_view_proj * position);
            out.varyings[..3].copy_from_slice(&world.truncate().to_array());
            out.varyings[3..6].copy_from_slice(&normal.truncate().to_array());
            out
        }
        ProgramConstants::Lighting(_) => {
            // Full-screen triangle: (-1, 1), (3, 1), (-1, -3)
            let u = ((vertex_id << 1) & 2) as f32;
            let v = (vertex_id & 2) as f32;
            ClipVertex::new(vec4(u * 2.0 - 1.0, 1.0 - v * 2.0, 0.0, 1.0))
        }
    }
}

/// Runs the pixel stage and returns the color outputs in target order.
pub(crate) fn run_pixel(bindings: &ShaderBindings<'_>, fragment: &Fragment) -> ColorOutputs {
    let mut out = [[0.0; 4]; MAX_COLOR_TARGETS];
    match &bindings.constants {
        ProgramConstants::Shadow(_) => {}
        ProgramConstants::Geometry(_) => {
            let world = Vec3::from_slice(&fragment.varyings[..3]);
            let normal = Vec3::from_slice(&fragment.varyings[3..6]).normalize_or_zero();
            let material = material(bindings, bindings.material_index);

            out[0] = world.extend(1.0).to_array();
            out[1] = material.diffuse.to_array();
            out[2] = normal.extend(bindings.material_index as f32).to_array();
        }
        ProgramConstants::Lighting(c) => {
            out[0] = resolve_lighting(bindings, c, fragment.x, fragment.y).to_array();
        }
    }
    out
}

fn material(bindings: &ShaderBindings<'_>, index: u32) -> MaterialData {
    bindings
        .materials
        .get(index as usize)
        .copied()
        .unwrap_or_default()
}

fn resolve_lighting(bindings: &ShaderBindings<'_>, c: &LightingConstants, x: u32, y: u32) -> Vec4 {
    let input = |slot: u32| Vec4::from_array(bindings.inputs[slot as usize].texel(0, x, y));

    let position = input(POSITION_INPUT);
    if position.w == 0.0 {
        return c.background;
    }

    let world = position.truncate();
    let albedo = input(DIFFUSE_INPUT);
    let normal_sample = input(NORMAL_INPUT);
    let normal = normal_sample.truncate().normalize_or_zero();
    let material = material(bindings, normal_sample.w.round().max(0.0) as u32);

    let to_light = (c.light_position() - world).normalize_or_zero();
    let n_dot_l = normal.dot(to_light).max(0.0);

    let visibility = if n_dot_l > 0.0 {
        shadow_visibility(bindings.inputs[SHADOW_INPUT as usize], &bindings.sampler, c, world)
    } else {
        1.0
    };

    let lit = material.ambient + albedo * c.light_color * (n_dot_l * visibility);
    lit.truncate().extend(1.0)
}

/// Cube face looking along the major axis of `direction`, ordered
/// +X, -X, +Y, -Y, +Z, -Z.
pub(crate) fn cube_face(direction: Vec3) -> usize {
    let a = direction.abs();
    if a.x >= a.y && a.x >= a.z {
        if direction.x >= 0.0 { 0 } else { 1 }
    } else if a.y >= a.z {
        if direction.y >= 0.0 { 2 } else { 3 }
    } else if direction.z >= 0.0 {
        4
    } else {
        5
    }
}

/// Returns 1.0 when `world` sees the light and 0.0 when an occluder is
/// closer to the light. Linear filtering averages a 2x2 footprint.
fn shadow_visibility(cube: &TextureEntry, sampler: &SamplerDesc, c: &LightingConstants, world: Vec3) -> f32 {
    let face = cube_face(world - c.light_position());
    let clip = c.shadow_view_proj[face] * world.extend(1.0);
    if clip.w <= 0.0 {
        return 1.0;
    }
    let ndc = clip.truncate() / clip.w;
    if ndc.z > 1.0 {
        return 1.0;
    }

    let size = cube.width() as f32;
    let u = (ndc.x * 0.5 + 0.5) * size;
    let v = (0.5 - ndc.y * 0.5) * size;
    let compare = ndc.z - c.depth_bias();

    let lit = |tx: f32, ty: f32| -> f32 {
        let tx = address(tx.floor() as i64, cube.width(), sampler.address_mode);
        let ty = address(ty.floor() as i64, cube.height(), sampler.address_mode);
        let stored = cube.texel(face as u32, tx, ty)[0];
        if compare > stored { 0.0 } else { 1.0 }
    };

    match sampler.filter {
        Filter::Point => lit(u, v),
        Filter::Linear => {
            let (u, v) = (u - 0.5, v - 0.5);
            (lit(u, v) + lit(u + 1.0, v) + lit(u, v + 1.0) + lit(u + 1.0, v + 1.0)) * 0.25
        }
    }
}

fn address(coord: i64, size: u32, mode: AddressMode) -> u32 {
    let size = size as i64;
    match mode {
        AddressMode::Clamp => coord.clamp(0, size - 1) as u32,
        AddressMode::Wrap => coord.rem_euclid(size) as u32,
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec2};

    use super::*;
    use crate::texture::{Format, TextureDesc};

    fn bindings(constants: ProgramConstants) -> ShaderBindings<'static> {
        ShaderBindings {
            constants,
            material_index: 0,
            materials: vec![MaterialData {
                ambient: vec4(0.1, 0.1, 0.1, 1.0),
                diffuse: vec4(0.8, 0.6, 0.4, 1.0),
            }],
            inputs: Vec::new(),
            sampler: SamplerDesc::default(),
        }
    }

    #[test]
    fn test_cube_face_selection() {
        assert_eq!(cube_face(Vec3::new(2.0, 1.0, 0.5)), 0);
        assert_eq!(cube_face(Vec3::new(-2.0, 1.0, 0.5)), 1);
        assert_eq!(cube_face(Vec3::new(0.0, 3.0, -1.0)), 2);
        assert_eq!(cube_face(Vec3::new(0.0, -5.0, 0.0)), 3);
        assert_eq!(cube_face(Vec3::new(0.1, 0.2, 0.9)), 4);
        assert_eq!(cube_face(Vec3::new(0.1, 0.2, -0.9)), 5);
    }

    #[test]
    fn test_full_screen_triangle() {
        let b = bindings(ProgramConstants::Lighting(LightingConstants::default()));
        let positions: Vec<Vec4> = (0..3)
            .map(|id| run_vertex(&b, id, &Vertex::default()).position)
            .collect();
        assert_eq!(positions[0], vec4(-1.0, 1.0, 0.0, 1.0));
        assert_eq!(positions[1], vec4(3.0, 1.0, 0.0, 1.0));
        assert_eq!(positions[2], vec4(-1.0, -3.0, 0.0, 1.0));
    }

    #[test]
    fn test_geometry_outputs() {
        let constants = GeometryConstants {
            world: Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            world_view: Mat4::IDENTITY,
            world_view_proj: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
        };
        let b = bindings(ProgramConstants::Geometry(constants));
        let vertex = Vertex::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 2.0, 0.0), Vec2::ZERO);

        let clip = run_vertex(&b, 0, &vertex);
        let fragment = Fragment {
            x: 0,
            y: 0,
            depth: 0.5,
            varyings: clip.varyings,
        };
        let out = run_pixel(&b, &fragment);

        assert_eq!(out[0], [1.0, 2.0, 0.0, 1.0]);
        assert_eq!(out[1], [0.8, 0.6, 0.4, 1.0]);
        assert_eq!(out[2], [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_shadow_comparison_uses_bias() {
        let mut cube = TextureEntry::new(TextureDesc::new_cube("shadow", 4, Format::D32Float));
        let constants = LightingConstants {
            shadow_view_proj: [Mat4::IDENTITY; 6],
            params: vec4(0.01, 4.0, 0.0, 0.0),
            ..Default::default()
        };

        // Point straight along +X with identity matrices projects to
        // ndc (1, 0, 0) at depth 0.
        cube.fill(0, [0.5, 0.0, 0.0, 0.0]);
        let world = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(shadow_visibility(&cube, &SamplerDesc::default(), &constants, world), 1.0);

        // Major axis is still +X; z of 0.6 is beyond the stored 0.5.
        let behind = Vec3::new(1.0, 0.0, 0.6);
        assert_eq!(shadow_visibility(&cube, &SamplerDesc::default(), &constants, behind), 0.0);
    }

    #[test]
    fn test_address_modes() {
        assert_eq!(address(-3, 4, AddressMode::Clamp), 0);
        assert_eq!(address(9, 4, AddressMode::Clamp), 3);
        assert_eq!(address(-1, 4, AddressMode::Wrap), 3);
        assert_eq!(address(5, 4, AddressMode::Wrap), 1);
    }
}
