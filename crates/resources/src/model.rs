//! Model and mesh data.
//!
//! A [`Model`] is a list of indexed triangle meshes plus the materials they
//! reference. The renderer concatenates every mesh into one vertex buffer
//! and one index buffer and issues one draw per mesh, in mesh order.

use glam::Vec3;
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};
use crate::material::Material;

/// A mesh containing vertex and index data.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Mesh {
    /// Vertex positions in model space
    pub positions: Vec<Vec3>,
    /// Vertex normals, one per position
    pub normals: Vec<Vec3>,
    /// Triangle list indices into the vertex data
    pub indices: Vec<u32>,
    /// Index into [`Model::materials`]
    pub material_index: u32,
}

impl Mesh {
    /// Creates a mesh from its vertex and index data.
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, indices: Vec<u32>, material_index: u32) -> Self {
        Self {
            positions,
            normals,
            indices,
            material_index,
        }
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of indices.
    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn validate(&self, mesh: usize, material_count: usize) -> ResourceResult<()> {
        if self.positions.is_empty() {
            return Err(ResourceError::NoPositionData(mesh));
        }
        if self.normals.len() != self.positions.len() {
            return Err(ResourceError::AttributeMismatch {
                mesh,
                positions: self.positions.len(),
                normals: self.normals.len(),
            });
        }
        if self.indices.len() % 3 != 0 {
            return Err(ResourceError::IncompleteTriangles {
                mesh,
                count: self.indices.len(),
            });
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.positions.len())
        {
            return Err(ResourceError::IndexOutOfRange {
                mesh,
                index,
                vertex_count: self.positions.len(),
            });
        }
        if self.material_index as usize >= material_count {
            return Err(ResourceError::MaterialOutOfRange {
                mesh,
                material: self.material_index,
                count: material_count,
            });
        }
        Ok(())
    }
}

/// A model containing one or more meshes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Model {
    /// Meshes in draw order
    pub meshes: Vec<Mesh>,
    /// Materials referenced by the meshes
    pub materials: Vec<Material>,
    /// Axis-aligned bounding box minimum
    pub aabb_min: Vec3,
    /// Axis-aligned bounding box maximum
    pub aabb_max: Vec3,
}

impl Model {
    /// Creates a model and computes its bounding box.
    pub fn new(meshes: Vec<Mesh>, materials: Vec<Material>) -> Self {
        let mut model = Self {
            meshes,
            materials,
            aabb_min: Vec3::ZERO,
            aabb_max: Vec3::ZERO,
        };
        model.update_bounds();
        model
    }

    /// Appends a mesh, keeping the bounding box current.
    pub fn push_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
        self.update_bounds();
    }

    /// Appends a material and returns its index.
    pub fn push_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        (self.materials.len() - 1) as u32
    }

    /// Recomputes the bounding box from every position.
    pub fn update_bounds(&mut self) {
        let mut positions = self.meshes.iter().flat_map(|m| m.positions.iter().copied());
        let Some(first) = positions.next() else {
            self.aabb_min = Vec3::ZERO;
            self.aabb_max = Vec3::ZERO;
            return;
        };
        let (min, max) = positions.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        self.aabb_min = min;
        self.aabb_max = max;
    }

    /// Checks that the model can be uploaded and drawn.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: no meshes or materials, missing or
    /// mismatched attributes, incomplete triangles, out-of-range indices or
    /// material references.
    pub fn validate(&self) -> ResourceResult<()> {
        if self.meshes.is_empty() {
            return Err(ResourceError::NoMeshes);
        }
        if self.materials.is_empty() {
            return Err(ResourceError::NoMaterials);
        }
        for (i, mesh) in self.meshes.iter().enumerate() {
            mesh.validate(i, self.materials.len())?;
        }
        debug!(
            "Model validated: {} meshes, {} vertices, {} indices, {} materials",
            self.meshes.len(),
            self.vertex_count(),
            self.index_count(),
            self.materials.len()
        );
        Ok(())
    }

    /// Total number of vertices across all meshes.
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }

    /// Total number of indices across all meshes.
    pub fn index_count(&self) -> usize {
        self.meshes.iter().map(Mesh::index_count).sum()
    }

    /// Center of the bounding box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.aabb_min + self.aabb_max) * 0.5
    }

    /// Extent of the bounding box.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.aabb_max - self.aabb_min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_mesh(material_index: u32) -> Mesh {
        Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Vec3::Z; 3],
            vec![0, 1, 2],
            material_index,
        )
    }

    #[test]
    fn test_bounds_cover_all_meshes() {
        let mut second = triangle_mesh(0);
        second.positions[2] = Vec3::new(-2.0, 4.0, 1.0);
        let model = Model::new(vec![triangle_mesh(0), second], vec![Material::default()]);
        assert_eq!(model.aabb_min, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(model.aabb_max, Vec3::new(1.0, 4.0, 1.0));
        assert_eq!(model.center(), Vec3::new(-0.5, 2.0, 0.5));
        assert_eq!(model.vertex_count(), 6);
        assert_eq!(model.index_count(), 6);
    }

    #[test]
    fn test_validate_accepts_well_formed_model() {
        let model = Model::new(vec![triangle_mesh(0)], vec![Material::default()]);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_index() {
        let mut mesh = triangle_mesh(0);
        mesh.indices[1] = 3;
        let model = Model::new(vec![mesh], vec![Material::default()]);
        assert!(matches!(
            model.validate(),
            Err(ResourceError::IndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_material() {
        let model = Model::new(vec![triangle_mesh(1)], vec![Material::default()]);
        assert!(matches!(
            model.validate(),
            Err(ResourceError::MaterialOutOfRange { material: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_attribute_mismatch() {
        let mut mesh = triangle_mesh(0);
        mesh.normals.pop();
        let model = Model::new(vec![mesh], vec![Material::default()]);
        assert!(matches!(
            model.validate(),
            Err(ResourceError::AttributeMismatch { normals: 2, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        assert!(matches!(Model::default().validate(), Err(ResourceError::NoMeshes)));
    }
}
