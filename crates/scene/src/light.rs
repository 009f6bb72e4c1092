//! Point light and its shadow-cube matrices.

use glam::{Mat4, Vec3};

/// Number of faces of a shadow cube.
pub const CUBE_FACES: usize = 6;

/// Look direction and up vector of each cube face, ordered
/// +X, -X, +Y, -Y, +Z, -Z.
const FACE_BASES: [(Vec3, Vec3); CUBE_FACES] = [
    (Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::Z),
    (Vec3::Z, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y),
];

/// An omnidirectional light that casts shadows through a depth cube.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    /// Light position in world space
    pub position: Vec3,
    /// Light color, pre-multiplied by intensity
    pub color: Vec3,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 5.0, 0.0),
            color: Vec3::ONE,
        }
    }
}

impl PointLight {
    /// Creates a light at `position` with the given color.
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }

    /// Returns the light position transformed by `view`.
    #[inline]
    pub fn view_position(&self, view: &Mat4) -> Vec3 {
        view.transform_point3(self.position)
    }

    /// View matrix of one cube face.
    ///
    /// # Panics
    ///
    /// Panics if `face >= 6`.
    pub fn face_view(&self, face: usize) -> Mat4 {
        let (direction, up) = FACE_BASES[face];
        Mat4::look_to_rh(self.position, direction, up)
    }

    /// View-projection matrices of the six cube faces.
    ///
    /// Each face uses a 90 degree square frustum, so together they cover
    /// every direction around the light. Depth maps to `[0, 1]` between
    /// `near` and `far`.
    ///
    /// # Example
    ///
    /// ```
    /// use deferred_scene::PointLight;
    /// use glam::Vec3;
    ///
    /// let light = PointLight::new(Vec3::new(0.0, 5.0, 0.0), Vec3::ONE);
    /// let faces = light.shadow_matrices(0.1, 50.0);
    /// // The floor below the light is seen by the -Y face
    /// let clip = faces[3] * Vec3::ZERO.extend(1.0);
    /// assert!(clip.z / clip.w > 0.0 && clip.z / clip.w < 1.0);
    /// ```
    pub fn shadow_matrices(&self, near: f32, far: f32) -> [Mat4; CUBE_FACES] {
        let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
        std::array::from_fn(|face| projection * self.face_view(face))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_each_face_sees_its_axis() {
        let light = PointLight::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE);
        let faces = light.shadow_matrices(0.1, 50.0);
        for (face, (direction, _)) in FACE_BASES.iter().enumerate() {
            let point = light.position + *direction * 4.0;
            let clip = faces[face] * point.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
            assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
            assert!(ndc.z > 0.0 && ndc.z < 1.0, "face {} depth {}", face, ndc.z);
        }
    }

    #[test]
    fn test_closer_points_have_smaller_depth() {
        let light = PointLight::default();
        let faces = light.shadow_matrices(0.1, 50.0);
        let depth = |p: Vec3| {
            let clip = faces[3] * p.extend(1.0);
            clip.z / clip.w
        };
        assert!(depth(Vec3::new(0.0, 2.5, 0.0)) < depth(Vec3::ZERO));
    }

    #[test]
    fn test_view_position() {
        let light = PointLight::new(Vec3::new(0.0, 5.0, 0.0), Vec3::ONE);
        let view = Mat4::from_translation(Vec3::new(0.0, -5.0, 0.0));
        assert_eq!(light.view_position(&view), Vec3::ZERO);
    }
}
