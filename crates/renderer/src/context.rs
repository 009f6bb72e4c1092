//! Per-frame data shared by the passes.

use deferred_core::ShadowConfig;
use deferred_rhi::buffer::{IndexBufferView, VertexBufferView};
use deferred_rhi::command::PrimitiveTopology;
use deferred_scene::{PointLight, normal_matrix};
use glam::{Mat4, Vec3};

use crate::constants::ConstantArena;
use crate::descriptors::SharedDescriptors;
use crate::frame::FrameView;

/// Matrices recomputed once per frame before recording.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMatrices {
    /// Model to world.
    pub world: Mat4,
    /// World to view.
    pub view: Mat4,
    /// View to clip.
    pub projection: Mat4,
    /// Model to view.
    pub world_view: Mat4,
    /// Model to clip.
    pub world_view_proj: Mat4,
    /// Inverse transpose of `world`.
    pub normal_matrix: Mat4,
    /// World to clip for each shadow-cube face, ordered +X, -X, +Y, -Y, +Z, -Z.
    pub shadow_view_proj: [Mat4; 6],
}

impl FrameMatrices {
    /// Derives every matrix from the world, view and projection transforms
    /// and the light.
    pub fn compute(world: Mat4, view: Mat4, projection: Mat4, light: &PointLight, shadow: &ShadowConfig) -> Self {
        let world_view = view * world;
        Self {
            world,
            view,
            projection,
            world_view,
            world_view_proj: projection * world_view,
            normal_matrix: normal_matrix(&world),
            shadow_view_proj: light.shadow_matrices(shadow.near_plane, shadow.far_plane),
        }
    }
}

/// Light data written once per frame before recording.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightState {
    /// Position in world space.
    pub world_position: Vec3,
    /// Position in view space.
    pub view_position: Vec3,
    /// Color, pre-multiplied by intensity.
    pub color: Vec3,
}

impl LightState {
    /// Captures `light` as seen through `view`.
    pub fn new(light: &PointLight, view: &Mat4) -> Self {
        Self {
            world_position: light.position,
            view_position: light.view_position(view),
            color: light.color,
        }
    }
}

/// Arguments of one indexed draw, built once from the model at load time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCallArgs {
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Vertex buffer of the whole model.
    pub vertex_buffer: VertexBufferView,
    /// Index buffer of the whole model.
    pub index_buffer: IndexBufferView,
    /// Number of indices drawn.
    pub index_count: u32,
    /// First index of the mesh.
    pub start_index: u32,
    /// Added to every index; the mesh's first vertex.
    pub vertex_offset: i32,
    /// Material the mesh is shaded with.
    pub material_index: u32,
}

/// Everything a pass reads while recording one frame.
pub struct FrameContext<'a> {
    /// Slot being recorded.
    pub frame: FrameView<'a>,
    /// The slot's transient constants.
    pub constants: &'a mut ConstantArena,
    /// Matrices of this frame.
    pub matrices: &'a FrameMatrices,
    /// Light of this frame.
    pub light: &'a LightState,
    /// Draws in load order.
    pub draws: &'a [DrawCallArgs],
    /// Material table and sampler.
    pub shared: &'a SharedDescriptors,
    /// Shadow settings.
    pub shadow: &'a ShadowConfig,
    /// Color of pixels without geometry.
    pub background: [f32; 4],
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_matrices_compose() {
        let world = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let light = PointLight::default();
        let m = FrameMatrices::compute(world, view, projection, &light, &ShadowConfig::default());

        let p = Vec3::new(0.5, 0.5, 0.5).extend(1.0);
        let expected = projection * (view * (world * p));
        let actual = m.world_view_proj * p;
        assert_relative_eq!(actual.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(actual.w, expected.w, epsilon = 1e-5);
        assert_eq!(m.normal_matrix.transform_vector3(Vec3::Y), Vec3::Y);
    }

    #[test]
    fn test_light_state_view_position() {
        let light = PointLight::new(Vec3::new(0.0, 5.0, 0.0), Vec3::ONE);
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0));
        let state = LightState::new(&light, &view);
        assert_eq!(state.view_position, Vec3::new(0.0, 5.0, -3.0));
        assert_eq!(state.world_position, light.position);
    }
}
