//! Procedural meshes.
//!
//! Every generator winds its triangles counter-clockwise when seen from the
//! side the normal points to.
//!
//! # Example
//!
//! ```
//! use deferred_resources::{Material, Model, primitives};
//! use glam::Vec3;
//!
//! let mut model = Model::default();
//! let floor = model.push_material(Material::default());
//! model.push_mesh(primitives::plane(0.0, 4.0, floor));
//! model.push_mesh(primitives::cuboid(Vec3::new(0.0, 1.0, 0.0), Vec3::splat(0.5), floor));
//! assert!(model.validate().is_ok());
//! ```

use glam::Vec3;

use crate::model::Mesh;

/// A single triangle with a flat normal.
pub fn triangle(corners: [Vec3; 3], material_index: u32) -> Mesh {
    let [a, b, c] = corners;
    let normal = (b - a).cross(c - a).normalize_or_zero();
    Mesh::new(corners.to_vec(), vec![normal; 3], vec![0, 1, 2], material_index)
}

/// A parallelogram spanned by `u` and `v` around `center`.
///
/// The normal is `u × v`.
pub fn quad(center: Vec3, u: Vec3, v: Vec3, material_index: u32) -> Mesh {
    let normal = u.cross(v).normalize_or_zero();
    let positions = vec![
        center - u - v,
        center + u - v,
        center + u + v,
        center - u + v,
    ];
    Mesh::new(positions, vec![normal; 4], vec![0, 1, 2, 0, 2, 3], material_index)
}

/// A square at height `y`, `2 * half_size` wide, facing +Y.
pub fn plane(y: f32, half_size: f32, material_index: u32) -> Mesh {
    quad(
        Vec3::new(0.0, y, 0.0),
        Vec3::X * half_size,
        Vec3::NEG_Z * half_size,
        material_index,
    )
}

/// A box with outward-facing normals.
pub fn cuboid(center: Vec3, half_extents: Vec3, material_index: u32) -> Mesh {
    // (normal, u, v) with u × v = normal
    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let extent = |axis: Vec3| axis * half_extents.dot(axis.abs());
    let mut mesh = Mesh {
        material_index,
        ..Mesh::default()
    };
    for (normal, u, v) in FACES {
        mesh.append(&quad(center + extent(normal), extent(u), extent(v), material_index));
    }
    mesh
}

impl Mesh {
    /// Appends the vertices and triangles of `other`, keeping this mesh's
    /// material.
    pub fn append(&mut self, other: &Mesh) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn winding_normal(mesh: &Mesh, triangle: usize) -> Vec3 {
        let i = &mesh.indices[triangle * 3..triangle * 3 + 3];
        let [a, b, c] = [0, 1, 2].map(|k| mesh.positions[i[k] as usize]);
        (b - a).cross(c - a).normalize()
    }

    #[test]
    fn test_triangle_normal() {
        let mesh = triangle([Vec3::ZERO, Vec3::X, Vec3::Y], 2);
        assert_eq!(mesh.normals, vec![Vec3::Z; 3]);
        assert_eq!(mesh.material_index, 2);
    }

    #[test]
    fn test_plane_faces_up() {
        let mesh = plane(1.5, 2.0, 0);
        assert_eq!(mesh.normals[0], Vec3::Y);
        assert!(mesh.positions.iter().all(|p| p.y == 1.5));
        assert_relative_eq!(winding_normal(&mesh, 0).y, 1.0);
        assert_relative_eq!(winding_normal(&mesh, 1).y, 1.0);
    }

    #[test]
    fn test_cuboid_winding_matches_normals() {
        let mesh = cuboid(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 1.0, 2.0), 0);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        for t in 0..mesh.triangle_count() {
            let normal = mesh.normals[mesh.indices[t * 3] as usize];
            assert_relative_eq!(winding_normal(&mesh, t).dot(normal), 1.0, epsilon = 1e-5);
        }
        let min = mesh.positions.iter().copied().reduce(Vec3::min).unwrap();
        let max = mesh.positions.iter().copied().reduce(Vec3::max).unwrap();
        assert_eq!(min, Vec3::new(0.5, 1.0, 1.0));
        assert_eq!(max, Vec3::new(1.5, 3.0, 5.0));
    }

    #[test]
    fn test_append_offsets_indices() {
        let mut mesh = triangle([Vec3::ZERO, Vec3::X, Vec3::Y], 0);
        mesh.append(&triangle([Vec3::ZERO, Vec3::Y, Vec3::Z], 1));
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.material_index, 0);
    }
}
