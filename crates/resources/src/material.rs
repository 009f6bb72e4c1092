//! Material definitions.

use glam::Vec4;

/// Surface colors of a mesh.
///
/// Materials are immutable once the model is loaded and are referenced by
/// index from each mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Color added regardless of lighting
    pub ambient_color: Vec4,
    /// Color scaled by the diffuse light term
    pub diffuse_color: Vec4,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient_color: Vec4::new(0.1, 0.1, 0.1, 1.0),
            diffuse_color: Vec4::new(0.8, 0.8, 0.8, 1.0),
        }
    }
}

impl Material {
    /// Creates a material from ambient and diffuse colors.
    pub fn new(ambient_color: Vec4, diffuse_color: Vec4) -> Self {
        Self {
            ambient_color,
            diffuse_color,
        }
    }

    /// Creates a material whose ambient color is `ambient` times the
    /// diffuse color.
    pub fn from_diffuse(diffuse_color: Vec4, ambient: f32) -> Self {
        Self {
            ambient_color: (diffuse_color.truncate() * ambient).extend(1.0),
            diffuse_color,
        }
    }
}
