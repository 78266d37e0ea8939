//! Validation and conversion of the triangle soup a build starts from.

use glam::{UVec3, Vec3, Vec3A};
use nmgen_recast::{Aabb3d, AreaType, TriMesh};
use thiserror::Error;

/// The triangle mesh a navmesh is built from. Read-only to the pipeline.
///
/// Use [`SourceMesh::from_flat`] to build one from raw buffers, which validates the data.
/// A mesh assembled by hand is validated at the start of every build.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceMesh {
    /// The vertices of the mesh. `[Units: wu]`
    pub vertices: Vec<Vec3>,
    /// Indices into [`SourceMesh::vertices`], one triple per triangle.
    pub triangles: Vec<[u32; 3]>,
}

impl SourceMesh {
    /// Creates a source mesh from a flat vertex buffer (`x, y, z` per vertex) and a flat triangle list.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer length is not a multiple of 3 or the resulting mesh fails [`SourceMesh::validate`].
    pub fn from_flat(vertices: &[f32], indices: &[u32]) -> Result<Self, SourceMeshError> {
        if vertices.len() % 3 != 0 {
            return Err(SourceMeshError::VertexBufferLength { len: vertices.len() });
        }
        if indices.len() % 3 != 0 {
            return Err(SourceMeshError::IndexBufferLength { len: indices.len() });
        }
        let mesh = Self {
            vertices: vertices.chunks_exact(3).map(Vec3::from_slice).collect(),
            triangles: indices
                .chunks_exact(3)
                .map(|triangle| [triangle[0], triangle[1], triangle[2]])
                .collect(),
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Checks that the mesh is non-empty, finite, and only references existing vertices.
    pub fn validate(&self) -> Result<(), SourceMeshError> {
        if self.vertices.is_empty() || self.triangles.is_empty() {
            return Err(SourceMeshError::Empty {
                vertices: self.vertices.len(),
                triangles: self.triangles.len(),
            });
        }
        if let Some(vertex) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(SourceMeshError::NonFiniteVertex { vertex });
        }
        for (triangle, indices) in self.triangles.iter().enumerate() {
            if let Some(&index) = indices
                .iter()
                .find(|&&i| i as usize >= self.vertices.len())
            {
                return Err(SourceMeshError::IndexOutOfBounds {
                    triangle,
                    index,
                    vertex_count: self.vertices.len(),
                });
            }
        }
        Ok(())
    }

    /// The number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The bounds of the mesh. Returns `None` if the mesh has no vertices.
    pub fn aabb(&self) -> Option<Aabb3d> {
        let (first, rest) = self.vertices.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Aabb3d { min, max })
    }

    /// Converts the mesh into rasterization input. Every triangle starts out as [`AreaType::NOT_WALKABLE`].
    pub fn to_trimesh(&self) -> TriMesh {
        TriMesh {
            vertices: self.vertices.iter().copied().map(Vec3A::from).collect(),
            indices: self.triangles.iter().copied().map(UVec3::from).collect(),
            area_types: vec![AreaType::NOT_WALKABLE; self.triangles.len()],
        }
    }
}

/// Errors that can occur when validating a [`SourceMesh`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceMeshError {
    /// The vertex buffer does not hold whole vertices.
    #[error("Vertex buffer length {len} is not a multiple of 3")]
    VertexBufferLength {
        /// Length of the flat vertex buffer
        len: usize,
    },
    /// The index buffer does not hold whole triangles.
    #[error("Index buffer length {len} is not a multiple of 3")]
    IndexBufferLength {
        /// Length of the flat index buffer
        len: usize,
    },
    /// The mesh has no vertices or no triangles.
    #[error("Source mesh is empty: {vertices} vertices and {triangles} triangles")]
    Empty {
        /// Number of vertices
        vertices: usize,
        /// Number of triangles
        triangles: usize,
    },
    /// A vertex has a NaN or infinite coordinate.
    #[error("Vertex {vertex} has a non-finite coordinate")]
    NonFiniteVertex {
        /// Index of the offending vertex
        vertex: usize,
    },
    /// A triangle references a vertex that does not exist.
    #[error("Triangle {triangle} references vertex {index}, but the mesh only has {vertex_count} vertices")]
    IndexOutOfBounds {
        /// Index of the offending triangle
        triangle: usize,
        /// The vertex index that was out of bounds
        index: u32,
        /// Number of vertices in the mesh
        vertex_count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE_VERTICES: [f32; 12] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0];

    #[test]
    fn from_flat_groups_by_three() {
        let mesh = SourceMesh::from_flat(&SQUARE_VERTICES, &[0, 2, 1, 0, 3, 2]).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[2], Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(mesh.triangles, [[0, 2, 1], [0, 3, 2]]);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn rejects_partial_buffers() {
        assert_eq!(
            SourceMesh::from_flat(&SQUARE_VERTICES[..11], &[0, 1, 2]),
            Err(SourceMeshError::VertexBufferLength { len: 11 })
        );
        assert_eq!(
            SourceMesh::from_flat(&SQUARE_VERTICES, &[0, 1, 2, 3]),
            Err(SourceMeshError::IndexBufferLength { len: 4 })
        );
    }

    #[test]
    fn rejects_empty_mesh() {
        assert_eq!(
            SourceMesh::from_flat(&SQUARE_VERTICES, &[]),
            Err(SourceMeshError::Empty {
                vertices: 4,
                triangles: 0
            })
        );
        assert!(SourceMesh::default().validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert_eq!(
            SourceMesh::from_flat(&SQUARE_VERTICES, &[0, 2, 1, 0, 4, 2]),
            Err(SourceMeshError::IndexOutOfBounds {
                triangle: 1,
                index: 4,
                vertex_count: 4
            })
        );
    }

    #[test]
    fn rejects_non_finite_vertex() {
        let mut vertices = SQUARE_VERTICES;
        vertices[4] = f32::NAN;
        assert_eq!(
            SourceMesh::from_flat(&vertices, &[0, 2, 1]),
            Err(SourceMeshError::NonFiniteVertex { vertex: 1 })
        );
    }

    #[test]
    fn trimesh_conversion() {
        let mesh = SourceMesh::from_flat(&SQUARE_VERTICES, &[0, 2, 1, 0, 3, 2]).unwrap();
        let trimesh = mesh.to_trimesh();
        assert_eq!(trimesh.indices, [UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)]);
        assert_eq!(trimesh.area_types, [AreaType::NOT_WALKABLE; 2]);
        assert_eq!(trimesh.compute_aabb(), mesh.aabb());
    }
}
