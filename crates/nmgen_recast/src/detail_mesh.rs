//! Height detail for the polygons of a [`PolygonMesh`].

use glam::{Vec2, Vec3, Vec3Swizzles as _};
use thiserror::Error;

use crate::{
    CompactHeightfield, PolygonMesh, RegionId,
    math::{distance_squared_point_segment, distance_squared_point_segment_3d, next, prev},
};

/// Upper limit of vertices in a single sub-mesh.
const MAX_VERTS: usize = 127;
/// Upper limit of samples along a single polygon edge.
const MAX_VERTS_PER_EDGE: usize = 32;

/// Contains triangle meshes that represent detailed height data associated
/// with the polygons in its associated polygon mesh object.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailNavmesh {
    /// The sub-mesh data, one per polygon of the source mesh.
    pub meshes: Vec<SubMesh>,
    /// The mesh vertices in world space.
    pub vertices: Vec<Vec3>,
    /// The mesh triangles. The indices are local to the sub-mesh they belong to.
    pub triangles: Vec<[u8; 3]>,
    /// Per triangle edge flags. Bit `2 * i` is set if edge `i` lies on the boundary of the source polygon.
    pub triangle_flags: Vec<u8>,
}

/// The location of one polygon's detail triangles inside a [`DetailNavmesh`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMesh {
    /// Index of the first vertex of the sub-mesh in [`DetailNavmesh::vertices`].
    pub base_vertex_index: u32,
    /// Number of vertices in the sub-mesh.
    pub vertex_count: u32,
    /// Index of the first triangle of the sub-mesh in [`DetailNavmesh::triangles`].
    pub base_triangle_index: u32,
    /// Number of triangles in the sub-mesh.
    pub triangle_count: u32,
}

impl DetailNavmesh {
    /// Builds a detail mesh from the provided polygon mesh.
    ///
    /// Every polygon becomes a triangulated sub-mesh. When `sample_distance` is positive, the polygon edges
    /// are sampled at that interval (in world units) against the heightfield and samples deviating more than
    /// `sample_max_error` from the straight edge are kept as extra hull vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if a polygon references a missing vertex or the output cannot be allocated.
    pub fn new(
        mesh: &PolygonMesh,
        heightfield: &CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
    ) -> Result<Self, DetailNavmeshError> {
        let mut dmesh = DetailNavmesh::default();
        let polygon_count = mesh.polygon_count();
        if mesh.vertices.is_empty() || polygon_count == 0 {
            return Ok(dmesh);
        }

        let cs = mesh.cell_size;
        let ch = mesh.cell_height;
        let orig = mesh.aabb.min;
        let sampler = HeightSampler {
            heightfield,
            border_size: mesh.border_size,
            search_radius: 1.max(mesh.max_edge_error.ceil() as u16),
        };

        let vertex_capacity = mesh.polygons.len() + mesh.polygons.len() / 2;
        reserve(&mut dmesh.meshes, polygon_count)?;
        reserve(&mut dmesh.vertices, vertex_capacity)?;
        reserve(&mut dmesh.triangles, vertex_capacity * 2)?;
        reserve(&mut dmesh.triangle_flags, vertex_capacity * 2)?;

        let mut polygon = Vec::with_capacity(mesh.max_vertices_per_polygon);
        let mut vertices = Vec::with_capacity(MAX_VERTS);
        let mut hull = Vec::with_capacity(MAX_VERTS);
        let mut triangles = Vec::new();

        for i in 0..polygon_count {
            // Store polygon vertices for processing.
            polygon.clear();
            for &index in mesh.polygon(i) {
                let v = mesh.vertices.get(index as usize).ok_or(
                    DetailNavmeshError::VertexIndexOutOfBounds {
                        polygon: i,
                        index,
                    },
                )?;
                polygon.push(v.as_vec3() * Vec3::new(cs, ch, cs));
            }
            if polygon.len() < 3 {
                dmesh.meshes.push(SubMesh {
                    base_vertex_index: dmesh.vertices.len() as u32,
                    base_triangle_index: dmesh.triangles.len() as u32,
                    ..Default::default()
                });
                continue;
            }

            build_poly_detail(
                &polygon,
                mesh.regions[i],
                sample_distance,
                sample_max_error,
                &sampler,
                &mut vertices,
                &mut hull,
                &mut triangles,
            );
            if triangles.is_empty() {
                // Could not triangulate the poly, make sure there is some valid data there.
                tracing::warn!(
                    "Could not triangulate polygon {i} ({} vertices)",
                    vertices.len()
                );
            }

            // Store detail submesh.
            dmesh.meshes.push(SubMesh {
                base_vertex_index: dmesh.vertices.len() as u32,
                vertex_count: vertices.len() as u32,
                base_triangle_index: dmesh.triangles.len() as u32,
                triangle_count: triangles.len() as u32,
            });

            // Move detail verts to world space.
            reserve(&mut dmesh.vertices, vertices.len())?;
            dmesh.vertices.extend(
                vertices
                    .iter()
                    .map(|v| *v + orig + Vec3::new(0.0, heightfield.cell_height, 0.0)),
            );

            reserve(&mut dmesh.triangles, triangles.len())?;
            reserve(&mut dmesh.triangle_flags, triangles.len())?;
            for &[a, b, c] in &triangles {
                dmesh.triangles.push([a as u8, b as u8, c as u8]);
                dmesh.triangle_flags.push(triangle_flags(
                    vertices[a],
                    vertices[b],
                    vertices[c],
                    &polygon,
                ));
            }
        }

        Ok(dmesh)
    }
}

fn reserve<T>(vec: &mut Vec<T>, additional: usize) -> Result<(), DetailNavmeshError> {
    vec.try_reserve(additional)
        .map_err(|_| DetailNavmeshError::OutOfMemory { len: additional })
}

/// Looks up walkable surface heights in the compact heightfield the polygon mesh was built from.
struct HeightSampler<'a> {
    heightfield: &'a CompactHeightfield,
    border_size: u16,
    search_radius: u16,
}

impl HeightSampler<'_> {
    /// The surface height in voxels below the local position `point`.
    ///
    /// Prefers spans of `region` in the column containing the point, then the closest
    /// columns within the search radius. Falls back to the height of `point` itself.
    fn height(&self, point: Vec3, region: RegionId) -> u16 {
        let chf = self.heightfield;
        let ics = 1.0 / chf.cell_size;
        let reference = (point.y / chf.cell_height).round().max(0.0) as u16;
        let x = (point.x * ics + 0.01).floor() as i32 + self.border_size as i32;
        let z = (point.z * ics + 0.01).floor() as i32 + self.border_size as i32;
        let x = x.clamp(0, chf.width as i32 - 1);
        let z = z.clamp(0, chf.height as i32 - 1);

        if let Some(height) = self.column_height(x, z, region, reference) {
            return height;
        }

        // Special case when data might be bad.
        // Find nearest neighbour pixel which has valid height.
        let radius = self.search_radius as i32;
        let mut best: Option<(i32, u16)> = None;
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let Some(height) = self.column_height(x + dx, z + dz, region, reference) else {
                    continue;
                };
                let distance = dx * dx + dz * dz;
                let is_better = best.is_none_or(|(best_distance, best_height)| {
                    distance < best_distance
                        || (distance == best_distance
                            && height.abs_diff(reference) < best_height.abs_diff(reference))
                });
                if is_better {
                    best = Some((distance, height));
                }
            }
        }
        best.map_or(reference, |(_, height)| height)
    }

    fn column_height(&self, x: i32, z: i32, region: RegionId, reference: u16) -> Option<u16> {
        let chf = self.heightfield;
        if !chf.contains(x, z) {
            return None;
        }
        let cell = chf.cell_at(x as u16, z as u16);
        cell.index_range()
            .filter(|&i| chf.spans[i].region == region)
            .map(|i| chf.spans[i].y)
            .min_by_key(|y| y.abs_diff(reference))
    }
}

/// Triangulates one polygon, optionally adding height samples along its edges.
///
/// `vertices` receives the local vertices, `triangles` the triangles indexing into them.
fn build_poly_detail(
    polygon: &[Vec3],
    region: RegionId,
    sample_distance: f32,
    sample_max_error: f32,
    sampler: &HeightSampler,
    vertices: &mut Vec<Vec3>,
    hull: &mut Vec<usize>,
    triangles: &mut Vec<[usize; 3]>,
) {
    let nin = polygon.len();
    vertices.clear();
    vertices.extend_from_slice(polygon);
    hull.clear();
    triangles.clear();

    let ch = sampler.heightfield.cell_height;
    let mut edge = [Vec3::ZERO; MAX_VERTS_PER_EDGE + 1];
    let mut samples = Vec::with_capacity(MAX_VERTS_PER_EDGE);

    // Tessellate outlines.
    // This is done in separate pass in order to ensure
    // seamless height values across the ply boundaries.
    if sample_distance > 0.0 {
        for i in 0..nin {
            let j = prev(i, nin);
            let mut vj = polygon[j];
            let mut vi = polygon[i];
            // Make sure the segments are always handled in same order
            // using lexological sort or else there will be seams.
            let swapped = if (vj.x - vi.x).abs() < 1e-6 {
                vj.z > vi.z
            } else {
                vj.x > vi.x
            };
            if swapped {
                std::mem::swap(&mut vj, &mut vi);
            }

            // Create samples along the edge.
            let delta = vi - vj;
            let d = delta.xz().length();
            let mut nn = 1 + (d / sample_distance).floor() as usize;
            if nn >= MAX_VERTS_PER_EDGE {
                nn = MAX_VERTS_PER_EDGE - 1;
            }
            if vertices.len() + nn >= MAX_VERTS {
                nn = (MAX_VERTS - 1).saturating_sub(vertices.len());
            }

            hull.push(j);
            if nn < 2 {
                continue;
            }

            for (k, sample) in edge.iter_mut().enumerate().take(nn + 1) {
                let u = k as f32 / nn as f32;
                let mut pos = vj + delta * u;
                pos.y = sampler.height(pos, region) as f32 * ch;
                *sample = pos;
            }

            // Simplify samples.
            samples.clear();
            samples.extend([0, nn]);
            let max_error_sq = sample_max_error * sample_max_error;
            let mut k = 0;
            while k < samples.len() - 1 {
                let a = samples[k];
                let b = samples[k + 1];
                let segment = (edge[a], edge[b]);

                // Find maximum deviation along the segment.
                let mut max_d = 0.0;
                let mut max_i = None;
                for (m, sample) in edge.iter().enumerate().take(b).skip(a + 1) {
                    let deviation = distance_squared_point_segment_3d(*sample, segment);
                    if deviation > max_d {
                        max_d = deviation;
                        max_i = Some(m);
                    }
                }

                // If the max deviation is larger than accepted error,
                // add new point, else continue to next segment.
                match max_i {
                    Some(m) if max_d > max_error_sq => samples.insert(k + 1, m),
                    _ => k += 1,
                }
            }

            // Add new vertices.
            let inner = &samples[1..samples.len() - 1];
            let mut add = |sample: usize| {
                hull.push(vertices.len());
                vertices.push(edge[sample]);
            };
            if swapped {
                inner.iter().rev().copied().for_each(&mut add);
            } else {
                inner.iter().copied().for_each(&mut add);
            }
        }
    } else {
        hull.extend(0..nin);
    }

    triangulate_hull(vertices, hull, nin, triangles);
}

/// Fans the hull into triangles, starting at the ear with the shortest perimeter and
/// advancing along whichever side yields the shorter next triangle.
fn triangulate_hull(vertices: &[Vec3], hull: &[usize], nin: usize, triangles: &mut Vec<[usize; 3]>) {
    let nhull = hull.len();
    if nhull < 3 {
        return;
    }
    let distance = |a: usize, b: usize| vertices[a].xz().distance_squared(vertices[b].xz());

    let mut start = 0;
    let mut left = 1;
    let mut right = nhull - 1;

    // Start from an ear with shortest perimeter.
    // This tends to favor well formed triangles as starting point.
    let mut d_min = f32::MAX;
    for i in 0..nhull {
        // Ears are triangles with original vertices as middle vertex while others are actually line segments on edges
        if hull[i] >= nin {
            continue;
        }
        let pi = prev(i, nhull);
        let ni = next(i, nhull);
        let d = distance(hull[pi], hull[i]) + distance(hull[i], hull[ni]) + distance(hull[ni], hull[pi]);
        if d < d_min {
            start = i;
            left = ni;
            right = pi;
            d_min = d;
        }
    }

    // Add first triangle
    triangles.push([hull[start], hull[left], hull[right]]);

    // Triangulate the polygon by moving left or right,
    // depending on which triangle has shorter perimeter.
    // This heuristic was chose empirically, since it seems
    // handle tessellated straight edges well.
    while next(left, nhull) != right {
        // Check to see if se should advance left or right.
        let n_left = next(left, nhull);
        let n_right = prev(right, nhull);

        let d_left = distance(hull[left], hull[n_left]) + distance(hull[n_left], hull[right]);
        let d_right = distance(hull[right], hull[n_right]) + distance(hull[left], hull[n_right]);

        if d_left < d_right {
            triangles.push([hull[left], hull[n_left], hull[right]]);
            left = n_left;
        } else {
            triangles.push([hull[left], hull[n_right], hull[right]]);
            right = n_right;
        }
    }
}

/// Whether the edge `(a, b)` lies on the boundary of `polygon`.
fn is_polygon_edge(a: Vec3, b: Vec3, polygon: &[Vec3]) -> bool {
    const THRESHOLD_SQ: f32 = 0.001 * 0.001;
    let (a, b) = (a.xz(), b.xz());
    (0..polygon.len()).any(|i| {
        let segment: (Vec2, Vec2) = (polygon[prev(i, polygon.len())].xz(), polygon[i].xz());
        distance_squared_point_segment(a, segment) < THRESHOLD_SQ
            && distance_squared_point_segment(b, segment) < THRESHOLD_SQ
    })
}

fn triangle_flags(a: Vec3, b: Vec3, c: Vec3, polygon: &[Vec3]) -> u8 {
    (is_polygon_edge(a, b, polygon) as u8)
        | (is_polygon_edge(b, c, polygon) as u8) << 2
        | (is_polygon_edge(c, a, polygon) as u8) << 4
}

/// Errors that can occur during [`DetailNavmesh::new`].
#[derive(Error, Debug)]
pub enum DetailNavmeshError {
    /// A polygon references a vertex that does not exist.
    #[error("Polygon {polygon} references missing vertex {index}")]
    VertexIndexOutOfBounds {
        /// The polygon containing the index
        polygon: usize,
        /// The offending vertex index
        index: u16,
    },
    /// The output arrays could not be allocated.
    #[error("Out of memory while allocating {len} detail mesh entries")]
    OutOfMemory {
        /// Number of entries that were requested
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use crate::{BuildContoursFlags, compact_heightfield::tests::flat_compact_heightfield};

    use super::*;

    fn flat_meshes() -> (PolygonMesh, CompactHeightfield) {
        let mut compact = flat_compact_heightfield(1.0);
        compact.build_distance_field(1).unwrap();
        compact.build_regions(0, 1, 400).unwrap();
        let mesh = compact
            .build_contours(1.3, 0, BuildContoursFlags::default())
            .unwrap()
            .into_polygon_mesh(6)
            .unwrap();
        (mesh, compact)
    }

    #[test]
    fn empty_polygon_mesh_yields_empty_detail_mesh() {
        let (_, compact) = flat_meshes();
        let dmesh = DetailNavmesh::new(&PolygonMesh::default(), &compact, 0.0, 1.0).unwrap();
        assert_eq!(dmesh, DetailNavmesh::default());
    }

    #[test]
    fn quad_without_sampling_is_two_triangles() {
        let (mesh, compact) = flat_meshes();
        let dmesh = DetailNavmesh::new(&mesh, &compact, 0.0, 1.0).unwrap();
        assert_eq!(dmesh.meshes.len(), 1);
        assert_eq!(dmesh.vertices.len(), 4);
        assert_eq!(dmesh.triangles.len(), 2);
        assert_eq!(
            dmesh.meshes[0],
            SubMesh {
                base_vertex_index: 0,
                vertex_count: 4,
                base_triangle_index: 0,
                triangle_count: 2,
            }
        );
        for v in &dmesh.vertices {
            // Surface at voxel 1 plus one cell of clearance.
            approx::assert_relative_eq!(v.y, 0.2, epsilon = 1e-5);
            assert!((-1e-5..=1.0 + 1e-5).contains(&v.x));
            assert!((-1e-5..=1.0 + 1e-5).contains(&v.z));
        }
        // Each triangle has two polygon edges and the shared diagonal.
        for flags in &dmesh.triangle_flags {
            assert_eq!(flags.count_ones(), 2);
        }
    }

    #[test]
    fn sampling_flat_edges_adds_no_vertices() {
        let (mesh, compact) = flat_meshes();
        let dmesh = DetailNavmesh::new(&mesh, &compact, 0.2, 0.01).unwrap();
        assert_eq!(dmesh.vertices.len(), 4);
        assert_eq!(dmesh.triangles.len(), 2);
    }

    #[test]
    fn hull_triangulation_covers_all_vertices() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(2.0, 0.0, 0.5),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let hull: Vec<usize> = (0..vertices.len()).collect();
        let mut triangles = Vec::new();
        triangulate_hull(&vertices, &hull, vertices.len(), &mut triangles);
        assert_eq!(triangles.len(), vertices.len() - 2);
        let mut used: Vec<usize> = triangles.iter().flatten().copied().collect();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used, hull);
    }
}
