//! World transform of the rendered model.
//!
//! # Example
//!
//! ```
//! use deferred_scene::Transform;
//! use glam::{Quat, Vec3};
//!
//! let transform = Transform::new()
//!     .with_position(Vec3::new(1.0, 0.0, 0.0))
//!     .with_rotation(Quat::from_rotation_y(0.5));
//! let world = transform.matrix();
//! assert!((world.transform_point3(Vec3::ZERO) - Vec3::X).length() < 1e-5);
//! ```

use glam::{Mat4, Quat, Vec3};

/// Position, rotation and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Position in world space
    pub position: Vec3,
    /// Rotation as a quaternion
    pub rotation: Quat,
    /// Scale factor
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform with the given position.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Create a transform with the given rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Get the transformation matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Inverse transpose of `world`, used to transform normals.
///
/// Non-invertible matrices (zero scale) yield the identity instead of
/// NaN values.
pub fn normal_matrix(world: &Mat4) -> Mat4 {
    const EPSILON: f32 = 1e-6;
    if world.determinant().abs() < EPSILON {
        Mat4::IDENTITY
    } else {
        world.inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let t = Transform {
            scale: Vec3::new(1.0, 2.0, 1.0),
            ..Transform::default()
        };
        let normal = normal_matrix(&t.matrix());
        assert_eq!(normal, t.matrix().inverse().transpose());

        // A normal of a surface stretched along Y shrinks along Y
        let n = normal.transform_vector3(Vec3::new(0.0, 1.0, 0.0));
        assert!((n.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_normal_matrix_non_invertible() {
        let t = Transform {
            scale: Vec3::ZERO,
            ..Transform::default()
        };
        let normal = normal_matrix(&t.matrix());
        assert_eq!(normal, Mat4::IDENTITY);
        assert!(normal.is_finite());
    }

    #[test]
    fn test_rotation_applies_before_translation() {
        let t = Transform::new()
            .with_position(Vec3::new(0.0, 1.0, 0.0))
            .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let p = t.matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(0.0, 1.0, -1.0)).length() < 1e-5);
    }
}
