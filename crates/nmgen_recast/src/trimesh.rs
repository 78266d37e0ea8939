//! Triangle soup used as rasterization input.

use glam::{UVec3, Vec3A};

use crate::{Aabb3d, math::TriangleIndices as _, span::AreaType};

/// A mesh used as input for [`Heightfield`](crate::Heightfield) rasterization.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices composing the mesh.
    /// Follows the convention of a triangle list.
    pub vertices: Vec<Vec3A>,

    /// The indices composing the mesh.
    /// Follows the convention of a triangle list.
    pub indices: Vec<UVec3>,

    /// The area types of the trimesh. Each index corresponds 1:1 to the [`TriMesh::indices`].
    pub area_types: Vec<AreaType>,
}

impl TriMesh {
    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// Marks the triangles as walkable or not based on the threshold angle.
    ///
    /// The triangles are marked as walkable if the normal angle is less than the threshold angle.
    /// Triangles already carrying a non-default walkable area keep it; steep and degenerate triangles
    /// are set to [`AreaType::NOT_WALKABLE`].
    ///
    /// # Arguments
    ///
    /// * `threshold_rad` - The threshold angle in radians.
    pub fn mark_walkable_triangles(&mut self, threshold_rad: f32) {
        let threshold_cos = threshold_rad.cos();
        self.area_types
            .resize(self.indices.len(), AreaType::NOT_WALKABLE);
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);
            if normal.y > threshold_cos {
                if !self.area_types[i].is_walkable() {
                    self.area_types[i] = AreaType::DEFAULT_WALKABLE;
                }
            } else {
                self.area_types[i] = AreaType::NOT_WALKABLE;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(y_far: f32) -> TriMesh {
        TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(1.0, 0.0, 0.0),
                Vec3A::new(1.0, y_far, 1.0),
                Vec3A::new(0.0, y_far, 1.0),
            ],
            indices: vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
            area_types: vec![],
        }
    }

    #[test]
    fn flat_upward_triangles_are_walkable() {
        let mut trimesh = quad(0.0);
        trimesh.mark_walkable_triangles(45.0_f32.to_radians());
        assert_eq!(
            trimesh.area_types,
            vec![AreaType::DEFAULT_WALKABLE, AreaType::DEFAULT_WALKABLE]
        );
    }

    #[test]
    fn steep_triangles_are_not_walkable() {
        let mut trimesh = quad(3.0);
        trimesh.mark_walkable_triangles(45.0_f32.to_radians());
        assert_eq!(
            trimesh.area_types,
            vec![AreaType::NOT_WALKABLE, AreaType::NOT_WALKABLE]
        );
    }

    #[test]
    fn degenerate_triangles_are_not_walkable() {
        let mut trimesh = TriMesh {
            vertices: vec![Vec3A::ZERO, Vec3A::X, Vec3A::X * 2.0],
            indices: vec![UVec3::new(0, 1, 2)],
            area_types: vec![],
        };
        trimesh.mark_walkable_triangles(85.0_f32.to_radians());
        assert_eq!(trimesh.area_types, vec![AreaType::NOT_WALKABLE]);
    }
}
