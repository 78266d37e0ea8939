//! Fuses the independent sub-meshes of a [`DetailNavmesh`] into one indexed triangle mesh.

use glam::Vec3;
use nmgen_recast::DetailNavmesh;
use thiserror::Error;

use crate::dedup::deduplicate_vertices;

/// A triangle mesh with shared vertices, produced by [`flatten_detail_mesh`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FlattenedMesh {
    /// The unique vertices of the mesh. `[Units: wu]`
    pub vertices: Vec<Vec3>,
    /// Triangle list indices into [`FlattenedMesh::vertices`].
    pub indices: Vec<u32>,
}

impl FlattenedMesh {
    /// The number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterates over the index triples of the mesh.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|triangle| [triangle[0], triangle[1], triangle[2]])
    }
}

/// Merges the sub-meshes of a detail mesh, welding vertices that are within
/// [`DEDUP_TOLERANCE`](crate::DEDUP_TOLERANCE) of each other.
///
/// Triangles keep their order: sub-mesh by sub-mesh, and within a sub-mesh as stored. Triangle flags are discarded.
///
/// # Errors
///
/// Returns an error without allocating if the detail mesh has no vertices, triangles or sub-meshes,
/// and an error if a sub-mesh or one of its triangles points outside of the shared arrays.
pub fn flatten_detail_mesh(detail: &DetailNavmesh) -> Result<FlattenedMesh, FlattenError> {
    if detail.vertices.is_empty() || detail.triangles.is_empty() || detail.meshes.is_empty() {
        return Err(FlattenError::EmptyDetailMesh {
            vertices: detail.vertices.len(),
            triangles: detail.triangles.len(),
            meshes: detail.meshes.len(),
        });
    }
    for (mesh_index, mesh) in detail.meshes.iter().enumerate() {
        let vertex_end = mesh.base_vertex_index as usize + mesh.vertex_count as usize;
        let triangle_end = mesh.base_triangle_index as usize + mesh.triangle_count as usize;
        if vertex_end > detail.vertices.len() || triangle_end > detail.triangles.len() {
            return Err(FlattenError::SubMeshOutOfBounds { mesh: mesh_index });
        }
    }

    let unique = deduplicate_vertices(&detail.vertices);

    let mut indices = Vec::new();
    indices
        .try_reserve_exact(detail.triangles.len() * 3)
        .map_err(|_| FlattenError::OutOfMemory {
            len: detail.triangles.len() * 3,
        })?;
    for (mesh_index, mesh) in detail.meshes.iter().enumerate() {
        let first = mesh.base_triangle_index as usize;
        let triangles = &detail.triangles[first..first + mesh.triangle_count as usize];
        for (triangle_index, triangle) in triangles.iter().enumerate() {
            for &local in triangle {
                if local as u32 >= mesh.vertex_count {
                    return Err(FlattenError::IndexOutOfBounds {
                        mesh: mesh_index,
                        triangle: first + triangle_index,
                        index: local,
                    });
                }
                let global = mesh.base_vertex_index as usize + local as usize;
                indices.push(unique.remap[global]);
            }
        }
    }

    Ok(FlattenedMesh {
        vertices: unique.vertices,
        indices,
    })
}

/// Errors that can occur when flattening a detail mesh with [`flatten_detail_mesh`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlattenError {
    /// The detail mesh has nothing to flatten.
    #[error(
        "Detail mesh is empty: {vertices} vertices, {triangles} triangles and {meshes} sub-meshes"
    )]
    EmptyDetailMesh {
        /// Number of vertices in the detail mesh
        vertices: usize,
        /// Number of triangles in the detail mesh
        triangles: usize,
        /// Number of sub-meshes in the detail mesh
        meshes: usize,
    },
    /// A sub-mesh covers vertices or triangles that do not exist.
    #[error("Sub-mesh {mesh} points outside of the detail mesh arrays")]
    SubMeshOutOfBounds {
        /// Index of the offending sub-mesh
        mesh: usize,
    },
    /// A triangle references a vertex outside of its sub-mesh.
    #[error("Triangle {triangle} of sub-mesh {mesh} references local vertex {index}, which does not exist")]
    IndexOutOfBounds {
        /// Index of the sub-mesh
        mesh: usize,
        /// Global index of the triangle
        triangle: usize,
        /// The local vertex index that was out of bounds
        index: u8,
    },
    /// The index array could not be allocated.
    #[error("Out of memory while allocating {len} indices")]
    OutOfMemory {
        /// Number of indices that were requested
        len: usize,
    },
}
