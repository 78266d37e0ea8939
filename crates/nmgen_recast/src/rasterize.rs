//! Conservative rasterization of triangles into a [`Heightfield`].

use glam::Vec3;
use thiserror::Error;

use crate::{
    heightfield::{Heightfield, SpanInsertion, SpanInsertionError},
    span::{AreaType, Span, SpanBuilder},
    trimesh::TriMesh,
};

impl Heightfield {
    /// Rasterizes the triangles of a [`TriMesh`] into the heightfield.
    ///
    /// Triangles are clipped against the grid and every covered cell receives a span from the lowest
    /// to the highest point of the clipped polygon. The area of each span comes from
    /// [`TriMesh::area_types`], so call [`TriMesh::mark_walkable_triangles`] first.
    ///
    /// # Arguments
    ///
    /// - `trimesh` - The triangles to rasterize.
    /// - `flag_merge_threshold` - The distance where the walkable flag is favored over the non-walkable flag. `[Limit: >= 0] [Units: vx]`
    pub fn rasterize_triangles(
        &mut self,
        trimesh: &TriMesh,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        if trimesh.area_types.len() != trimesh.indices.len() {
            return Err(RasterizationError::AreaCountMismatch {
                triangles: trimesh.indices.len(),
                areas: trimesh.area_types.len(),
            });
        }
        for (i, triangle) in trimesh.indices.iter().enumerate() {
            let mut vertices = [Vec3::ZERO; 3];
            for (vertex, index) in vertices.iter_mut().zip(triangle.to_array()) {
                let Some(v) = trimesh.vertices.get(index as usize) else {
                    return Err(RasterizationError::IndexOutOfBounds {
                        triangle: i,
                        index,
                    });
                };
                *vertex = (*v).into();
            }
            self.rasterize_triangle(vertices, trimesh.area_types[i], flag_merge_threshold)?;
        }
        Ok(())
    }

    fn rasterize_triangle(
        &mut self,
        triangle: [Vec3; 3],
        area: AreaType,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        let tri_min = triangle[0].min(triangle[1]).min(triangle[2]);
        let tri_max = triangle[0].max(triangle[1]).max(triangle[2]);
        // If the triangle does not touch the bounding box of the heightfield, skip the triangle.
        if tri_min.x > self.aabb.max.x
            || tri_max.x < self.aabb.min.x
            || tri_min.y > self.aabb.max.y
            || tri_max.y < self.aabb.min.y
            || tri_min.z > self.aabb.max.z
            || tri_max.z < self.aabb.min.z
        {
            return Ok(());
        }
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        let w = self.width as i32;
        let h = self.height as i32;
        let by = self.aabb.max.y - self.aabb.min.y;
        let inverse_cell_size = 1.0 / self.cell_size;
        let inverse_cell_height = 1.0 / self.cell_height;

        // Calculate the footprint of the triangle on the grid's z-axis.
        let z0 = ((tri_min.z - self.aabb.min.z) * inverse_cell_size) as i32;
        let z1 = ((tri_max.z - self.aabb.min.z) * inverse_cell_size) as i32;
        // Use -1 rather than 0 to cut the polygon properly at the start of the tile.
        let z0 = z0.clamp(-1, h - 1);
        let z1 = z1.clamp(0, h - 1);

        let mut remaining = triangle.to_vec();
        let mut row = Vec::with_capacity(7);
        let mut rest = Vec::with_capacity(7);
        let mut cell = Vec::with_capacity(7);
        let mut row_rest = Vec::with_capacity(7);

        for z in z0..=z1 {
            // Clip polygon to row. Store the remaining polygon as well.
            let cell_z = self.aabb.min.z + z as f32 * self.cell_size;
            divide_polygon(&remaining, cell_z + self.cell_size, 2, &mut row, &mut rest);
            std::mem::swap(&mut remaining, &mut rest);
            if row.len() < 3 || z < 0 {
                continue;
            }

            // Find the x-axis bounds of the row.
            let (min_x, max_x) = row
                .iter()
                .fold((row[0].x, row[0].x), |(min, max), v| (min.min(v.x), max.max(v.x)));
            let x0 = ((min_x - self.aabb.min.x) * inverse_cell_size) as i32;
            let x1 = ((max_x - self.aabb.min.x) * inverse_cell_size) as i32;
            if x1 < 0 || x0 >= w {
                continue;
            }
            let x0 = x0.clamp(-1, w - 1);
            let x1 = x1.clamp(0, w - 1);

            for x in x0..=x1 {
                // Clip polygon to column. Store the remaining polygon as well.
                let cell_x = self.aabb.min.x + x as f32 * self.cell_size;
                divide_polygon(&row, cell_x + self.cell_size, 0, &mut cell, &mut row_rest);
                std::mem::swap(&mut row, &mut row_rest);
                if cell.len() < 3 || x < 0 {
                    continue;
                }

                // Calculate min and max of the span.
                let (span_min, span_max) = cell
                    .iter()
                    .fold((cell[0].y, cell[0].y), |(min, max), v| (min.min(v.y), max.max(v.y)));
                let span_min = span_min - self.aabb.min.y;
                let span_max = span_max - self.aabb.min.y;
                // Skip the span if it's completely outside the heightfield bounding box.
                if span_max < 0.0 || span_min > by {
                    continue;
                }
                // Clamp the span to the heightfield bounding box.
                let span_min = span_min.max(0.0);
                let span_max = span_max.min(by);

                // Snap the span to the heightfield height grid.
                // Spans above the representable height are squashed into the topmost voxel.
                let min = ((span_min * inverse_cell_height).floor() as i32)
                    .clamp(0, Span::MAX_HEIGHT as i32 - 1) as u16;
                let max = ((span_max * inverse_cell_height).ceil() as i32)
                    .clamp(min as i32 + 1, Span::MAX_HEIGHT as i32) as u16;

                self.add_span(SpanInsertion {
                    x: x as u16,
                    z: z as u16,
                    flag_merge_threshold,
                    span: SpanBuilder {
                        min,
                        max,
                        area,
                        next: None,
                    }
                    .build(),
                })?;
            }
        }
        Ok(())
    }
}

/// Divides a convex polygon along the plane `axis = axis_offset`.
///
/// Vertices below the plane go into `below`, the rest into `above`. Points on the plane end up in both.
fn divide_polygon(
    polygon: &[Vec3],
    axis_offset: f32,
    axis: usize,
    below: &mut Vec<Vec3>,
    above: &mut Vec<Vec3>,
) {
    below.clear();
    above.clear();
    if polygon.is_empty() {
        return;
    }
    let delta = |v: Vec3| axis_offset - v[axis];

    let mut b = polygon.len() - 1;
    for a in 0..polygon.len() {
        let va = polygon[a];
        let vb = polygon[b];
        let delta_a = delta(va);
        let delta_b = delta(vb);
        let same_side = (delta_a >= 0.0) == (delta_b >= 0.0);
        if !same_side {
            let s = delta_b / (delta_b - delta_a);
            let intersection = vb + (va - vb) * s;
            below.push(intersection);
            above.push(intersection);
            // Points on the dividing line were already added above.
            if delta_a > 0.0 {
                below.push(va);
            } else if delta_a < 0.0 {
                above.push(va);
            }
        } else {
            // Points on the dividing line are added to both polygons.
            if delta_a >= 0.0 {
                below.push(va);
                if delta_a != 0.0 {
                    b = a;
                    continue;
                }
            }
            above.push(va);
        }
        b = a;
    }
}

/// Errors that can occur during [`Heightfield::rasterize_triangles`].
#[derive(Error, Debug)]
pub enum RasterizationError {
    /// A triangle references a vertex that does not exist.
    #[error("Triangle {triangle} references vertex {index}, which does not exist")]
    IndexOutOfBounds {
        /// Index of the offending triangle
        triangle: usize,
        /// The vertex index that was out of bounds
        index: u32,
    },
    /// Every triangle needs exactly one area type.
    #[error("Got {triangles} triangles but {areas} area types")]
    AreaCountMismatch {
        /// Number of triangles
        triangles: usize,
        /// Number of area types
        areas: usize,
    },
    /// A span could not be inserted.
    #[error(transparent)]
    SpanInsertion(#[from] SpanInsertionError),
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3A};

    use crate::{Aabb3d, HeightfieldBuilder};

    use super::*;

    fn flat_square() -> TriMesh {
        TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(1.0, 0.0, 0.0),
                Vec3A::new(1.0, 0.0, 1.0),
                Vec3A::new(0.0, 0.0, 1.0),
            ],
            indices: vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
            area_types: vec![AreaType::DEFAULT_WALKABLE; 2],
        }
    }

    fn heightfield_for(trimesh: &TriMesh, cell_size: f32) -> Heightfield {
        HeightfieldBuilder {
            aabb: trimesh.compute_aabb().unwrap(),
            cell_size,
            cell_height: cell_size,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn flat_square_covers_every_column_once() {
        let trimesh = flat_square();
        let mut heightfield = heightfield_for(&trimesh, 0.1);
        heightfield.rasterize_triangles(&trimesh, 1).unwrap();

        assert_eq!(heightfield.width, 10);
        assert_eq!(heightfield.height, 10);
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let keys: Vec<_> = heightfield.column_keys(x, z).collect();
                assert_eq!(keys.len(), 1, "column [{x}, {z}] should hold one span");
                let span = heightfield.span(keys[0]);
                assert_eq!(span.min, 0);
                assert_eq!(span.max, 1);
                assert_eq!(span.area, AreaType::DEFAULT_WALKABLE);
            }
        }
    }

    #[test]
    fn triangle_outside_bounds_is_ignored() {
        let trimesh = flat_square();
        let mut heightfield = heightfield_for(&trimesh, 0.1);
        let far_away = TriMesh {
            vertices: vec![
                Vec3A::new(10.0, 0.0, 10.0),
                Vec3A::new(11.0, 0.0, 10.0),
                Vec3A::new(11.0, 0.0, 11.0),
            ],
            indices: vec![UVec3::new(0, 2, 1)],
            area_types: vec![AreaType::DEFAULT_WALKABLE],
        };
        heightfield.rasterize_triangles(&far_away, 1).unwrap();
        assert_eq!(heightfield.span_count(), 0);
    }

    #[test]
    fn spans_above_max_height_are_clamped() {
        // Two floors 900 units apart, with a cell height that cannot represent the upper one.
        let mut trimesh = flat_square();
        trimesh.vertices.extend(
            flat_square()
                .vertices
                .into_iter()
                .map(|v| v + Vec3A::new(0.0, 900.0, 0.0)),
        );
        trimesh.indices.extend([UVec3::new(4, 6, 5), UVec3::new(4, 7, 6)]);
        trimesh.area_types.extend([AreaType::DEFAULT_WALKABLE; 2]);
        let mut heightfield = HeightfieldBuilder {
            aabb: trimesh.compute_aabb().unwrap(),
            cell_size: 0.1,
            cell_height: 0.1,
        }
        .build()
        .unwrap();
        heightfield.rasterize_triangles(&trimesh, 1).unwrap();

        let keys: Vec<_> = heightfield.column_keys(3, 3).collect();
        assert_eq!(keys.len(), 2);
        let top = heightfield.span(keys[1]);
        assert_eq!(top.min, Span::MAX_HEIGHT - 1);
        assert_eq!(top.max, Span::MAX_HEIGHT);
    }

    #[test]
    fn invalid_index_is_reported() {
        let mut trimesh = flat_square();
        trimesh.indices.push(UVec3::new(0, 1, 7));
        trimesh.area_types.push(AreaType::DEFAULT_WALKABLE);
        let mut heightfield = HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::splat(0.5), [0.5, 0.5, 0.5]),
            cell_size: 0.1,
            cell_height: 0.1,
        }
        .build()
        .unwrap();
        let result = heightfield.rasterize_triangles(&trimesh, 1);
        assert!(matches!(
            result,
            Err(RasterizationError::IndexOutOfBounds { triangle: 2, index: 7 })
        ));
    }

    #[test]
    fn divide_polygon_splits_square() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let mut below = Vec::new();
        let mut above = Vec::new();
        divide_polygon(&square, 1.0, 0, &mut below, &mut above);
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 4);
        assert!(below.iter().all(|v| v.x <= 1.0));
        assert!(above.iter().all(|v| v.x >= 1.0));
    }
}
