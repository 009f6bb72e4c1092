//! Camera used to build the view and projection matrices.
//!
//! Projections map depth to `[0, 1]` with +Y up in clip space, which is the
//! convention the raster stage and the shadow lookups agree on.

use glam::{Mat4, Quat, Vec3};

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Width over height
    pub aspect: f32,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
}

/// A camera for rendering the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Camera rotation
    pub rotation: Quat,
    /// Projection settings
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            projection: Projection {
                fov_y: 45.0_f32.to_radians(),
                aspect: 16.0 / 9.0,
                near: 0.1,
                far: 1000.0,
            },
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a perspective camera at `position` looking at `target`.
    ///
    /// # Example
    ///
    /// ```
    /// use deferred_scene::Camera;
    /// use glam::Vec3;
    ///
    /// let camera = Camera::looking_at(Vec3::new(0.0, 3.0, 8.0), Vec3::ZERO, 1.0);
    /// assert!(camera.forward().z < 0.0);
    /// ```
    pub fn looking_at(position: Vec3, target: Vec3, aspect: f32) -> Self {
        let mut camera = Self {
            position,
            ..Self::default()
        };
        camera.set_aspect(aspect);
        camera.look_at(target);
        camera
    }

    /// Set the perspective projection.
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection {
            fov_y,
            aspect,
            near,
            far,
        };
    }

    /// Update the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.projection.aspect = aspect;
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.up())
    }

    /// Get the projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        let Projection {
            fov_y,
            aspect,
            near,
            far,
        } = self.projection;
        Mat4::perspective_rh(fov_y, aspect, near, far)
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Get the right direction vector.
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Get the up direction vector.
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Turns the camera toward `target`, keeping world +Y as up.
    ///
    /// Does nothing if `target` is the camera position.
    pub fn look_at(&mut self, target: Vec3) {
        let Some(forward) = (target - self.position).try_normalize() else {
            return;
        };
        // Rotation of look_to_rh, inverted to go from view to world space
        let view = Mat4::look_to_rh(Vec3::ZERO, forward, up_hint(forward));
        self.rotation = Quat::from_mat4(&view).inverse();
    }
}

fn up_hint(forward: Vec3) -> Vec3 {
    if forward.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}
