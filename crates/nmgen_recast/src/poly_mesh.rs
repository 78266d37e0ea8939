use std::collections::HashMap;

use glam::{IVec2, U16Vec3};
use thiserror::Error;

use crate::{
    Aabb3d, AreaType, RegionId,
    contours::{ContourSet, RegionVertexId},
    math::{intersect, intersect_prop, left, left_on, next, prev, try_filled},
};

/// The upper limit for [`ContourSet::into_polygon_mesh`]'s `max_vertices_per_polygon`.
pub const MAX_VERTICES_PER_POLYGON: usize = 6;

/// A value which indicates an invalid index within a mesh.
pub const RC_MESH_NULL_IDX: u16 = 0xffff;

/// Marks an external edge of the mesh that lies on the heightfield border.
/// The lower bits hold the direction of the border.
const PORTAL_FLAG: u16 = 0x8000;

/// Represents a polygon mesh suitable for use in building a navigation mesh.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolygonMesh {
    /// The mesh vertices in voxel coordinates relative to [`PolygonMesh::aabb`].
    pub vertices: Vec<U16Vec3>,
    /// Polygon vertex indices. [Length: `polygon_count * max_vertices_per_polygon`]
    ///
    /// Unused slots are set to [`RC_MESH_NULL_IDX`].
    pub polygons: Vec<u16>,
    /// Neighbor polygon per polygon edge. [Length: `polygon_count * max_vertices_per_polygon`]
    ///
    /// [`RC_MESH_NULL_IDX`] marks an external edge, `0x8000 | dir` a heightfield border edge.
    pub polygon_neighbors: Vec<u16>,
    /// The region id assigned to each polygon.
    pub regions: Vec<RegionId>,
    /// The user defined flags for each polygon.
    pub flags: Vec<u16>,
    /// The area id assigned to each polygon.
    pub areas: Vec<AreaType>,
    /// The maximum number of vertices per polygon
    pub max_vertices_per_polygon: usize,
    /// The bounding box of the mesh in world space.
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The AABB border size used to generate the source data from which the mesh was derived.
    pub border_size: u16,
    /// The max error of the polygon edges in the mesh.
    pub max_edge_error: f32,
}

impl PolygonMesh {
    /// The number of polygons in the mesh.
    pub fn polygon_count(&self) -> usize {
        self.polygons
            .len()
            .checked_div(self.max_vertices_per_polygon)
            .unwrap_or_default()
    }

    /// The vertex indices of polygon `index`, without the unused slots.
    pub fn polygon(&self, index: usize) -> &[u16] {
        let nvp = self.max_vertices_per_polygon;
        let slots = &self.polygons[index * nvp..(index + 1) * nvp];
        let len = count_polygon_vertices(slots);
        &slots[..len]
    }

    /// The neighbor slots of polygon `index`.
    pub fn neighbors(&self, index: usize) -> &[u16] {
        let nvp = self.max_vertices_per_polygon;
        &self.polygon_neighbors[index * nvp..(index + 1) * nvp]
    }
}

impl ContourSet {
    /// Builds a polygon mesh from the provided contours, consuming the contour set.
    ///
    /// Each contour is triangulated by ear clipping and the triangles are greedily merged into convex polygons
    /// with at most `max_vertices_per_polygon` vertices, which is clamped to `3..=MAX_VERTICES_PER_POLYGON`.
    ///
    /// Vertices on the tile border of a contour set built with a non-zero border size are kept,
    /// unlike in Recast where they are removed together with the polygons that touch them.
    /// Edges lying on the border are flagged as portals.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh would need more vertices or polygons than a `u16` index can address,
    /// or if its arrays cannot be allocated.
    pub fn into_polygon_mesh(
        self,
        max_vertices_per_polygon: usize,
    ) -> Result<PolygonMesh, PolygonMeshError> {
        let nvp = max_vertices_per_polygon.clamp(3, MAX_VERTICES_PER_POLYGON);
        let mut mesh = PolygonMesh {
            max_vertices_per_polygon: nvp,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            border_size: self.border_size,
            max_edge_error: self.max_error,
            ..Default::default()
        };

        let mut max_vertices = 0;
        let mut max_triangles = 0;
        let mut max_vertices_per_contour = 0;
        for contour in &self.contours {
            // Skip null contours.
            if contour.vertices.len() < 3 {
                continue;
            }
            max_vertices += contour.vertices.len();
            max_triangles += contour.vertices.len() - 2;
            max_vertices_per_contour = max_vertices_per_contour.max(contour.vertices.len());
        }
        if max_vertices >= 0xfffe {
            return Err(PolygonMeshError::TooManyVertices {
                count: max_vertices,
            });
        }

        try_reserve(&mut mesh.vertices, max_vertices)?;
        try_reserve(&mut mesh.polygons, max_triangles * nvp)?;
        try_reserve(&mut mesh.regions, max_triangles)?;
        try_reserve(&mut mesh.areas, max_triangles)?;

        let mut vertex_buckets: HashMap<(u16, u16), Vec<u16>> = HashMap::new();
        let mut border_vertices = 0;
        let mut indices = Vec::with_capacity(max_vertices_per_contour);
        let mut triangles = Vec::with_capacity(max_vertices_per_contour * 3);
        let mut polygons: Vec<Vec<u16>> = Vec::with_capacity(max_vertices_per_contour);

        for (contour_index, contour) in self.contours.iter().enumerate() {
            // Skip null contours.
            if contour.vertices.len() < 3 {
                continue;
            }

            // Triangulate contour
            let points: Vec<IVec2> = contour
                .vertices
                .iter()
                .map(|v| IVec2::new(v.x as i32, v.z as i32))
                .collect();
            triangles.clear();
            if !triangulate(&points, &mut triangles) {
                // Bad triangulation, should not happen.
                tracing::warn!("Bad triangulation of contour {contour_index}");
            }

            // Add and merge vertices.
            indices.clear();
            for v in &contour.vertices {
                let index = add_vertex(
                    U16Vec3::new(v.x as u16, v.y as u16, v.z as u16),
                    &mut mesh.vertices,
                    &mut vertex_buckets,
                );
                indices.push(index);
                if v.w & RegionVertexId::BORDER_VERTEX.bits() != 0 {
                    border_vertices += 1;
                }
            }

            // Build initial polygons.
            polygons.clear();
            for &triangle in &triangles {
                let [a, b, c] = triangle.map(|t: usize| indices[t]);
                if a != b && a != c && b != c {
                    polygons.push(vec![a, b, c]);
                }
            }
            if polygons.is_empty() {
                continue;
            }

            // Merge polygons.
            if nvp > 3 {
                merge_polygons(&mut polygons, &mesh.vertices, nvp);
            }

            // Store polygons.
            for polygon in &polygons {
                mesh.polygons.extend(polygon.iter().copied());
                mesh.polygons
                    .extend(std::iter::repeat_n(RC_MESH_NULL_IDX, nvp - polygon.len()));
                mesh.regions.push(contour.region);
                mesh.areas.push(contour.area);
                if mesh.regions.len() > max_triangles {
                    return Err(PolygonMeshError::TooManyPolygons {
                        count: mesh.regions.len(),
                        max: max_triangles,
                    });
                }
            }
        }
        if border_vertices > 0 {
            tracing::debug!("Kept {border_vertices} tile border vertices in the polygon mesh");
        }

        // Calculate adjacency.
        let len = mesh.polygons.len();
        mesh.polygon_neighbors = try_filled(len, RC_MESH_NULL_IDX)
            .map_err(|_| PolygonMeshError::OutOfMemory { len })?;
        build_mesh_adjacency(&mut mesh);

        // Find portal edges
        if mesh.border_size > 0 {
            mark_portal_edges(&mut mesh, self.width, self.height);
        }

        // Just allocate the mesh flags array. The user is responsible to fill it.
        let len = mesh.regions.len();
        mesh.flags = try_filled(len, 0).map_err(|_| PolygonMeshError::OutOfMemory { len })?;

        if mesh.vertices.len() > u16::MAX as usize {
            return Err(PolygonMeshError::TooManyVertices {
                count: mesh.vertices.len(),
            });
        }
        if mesh.regions.len() > u16::MAX as usize {
            return Err(PolygonMeshError::TooManyPolygons {
                count: mesh.regions.len(),
                max: u16::MAX as usize,
            });
        }
        Ok(mesh)
    }
}

fn try_reserve<T>(vec: &mut Vec<T>, additional: usize) -> Result<(), PolygonMeshError> {
    vec.try_reserve(additional)
        .map_err(|_| PolygonMeshError::OutOfMemory { len: additional })
}

fn count_polygon_vertices(slots: &[u16]) -> usize {
    slots
        .iter()
        .position(|&index| index == RC_MESH_NULL_IDX)
        .unwrap_or(slots.len())
}

/// Returns the index of an existing vertex at the same xz-position whose height is within 2 voxels,
/// or appends `vertex`.
fn add_vertex(
    vertex: U16Vec3,
    vertices: &mut Vec<U16Vec3>,
    buckets: &mut HashMap<(u16, u16), Vec<u16>>,
) -> u16 {
    let bucket = buckets.entry((vertex.x, vertex.z)).or_default();
    if let Some(&existing) = bucket
        .iter()
        .rev()
        .find(|&&i| vertices[i as usize].y.abs_diff(vertex.y) <= 2)
    {
        return existing;
    }
    let index = vertices.len() as u16;
    vertices.push(vertex);
    bucket.push(index);
    index
}

/// Ear-clipping triangulation of a simple polygon.
///
/// Returns `false` if the polygon could not be fully triangulated. The triangles found so far are kept.
fn triangulate(points: &[IVec2], triangles: &mut Vec<[usize; 3]>) -> bool {
    // (vertex, removable)
    let mut indices: Vec<(usize, bool)> = (0..points.len()).map(|i| (i, false)).collect();
    let mut n = indices.len();

    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, points, &indices) {
            indices[i1].1 = true;
        }
    }

    while n > 3 {
        let mut min_len = None;
        let mut min_i = None;
        for i in 0..n {
            let i1 = next(i, n);
            if indices[i1].1 {
                let p0 = points[indices[i].0];
                let p2 = points[indices[next(i1, n)].0];
                let len = (p2 - p0).as_i64vec2().length_squared();
                if min_len.is_none_or(|min_len| len < min_len) {
                    min_len = Some(len);
                    min_i = Some(i);
                }
            }
        }

        if min_i.is_none() {
            // We might get here because the contour has overlapping segments.
            // Try to recover by loosing up the inCone test a bit so that a diagonal
            // can be found and we can continue.
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonal_loose(i, i2, points, &indices) {
                    let p0 = points[indices[i].0];
                    let p2 = points[indices[i2].0];
                    let len = (p2 - p0).as_i64vec2().length_squared();
                    if min_len.is_none_or(|min_len| len < min_len) {
                        min_len = Some(len);
                        min_i = Some(i);
                    }
                }
            }
        }

        let Some(i) = min_i else {
            // The contour is messed up. This sometimes happens
            // if the contour simplification is too aggressive.
            return false;
        };
        let i1 = next(i, n);
        let i2 = next(i1, n);
        triangles.push([indices[i].0, indices[i1].0, indices[i2].0]);

        // Removes P[i1] by copying P[i+1]...P[n-1] left one index.
        indices.remove(i1);
        n -= 1;
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);
        // Update diagonal flags.
        indices[i].1 = diagonal(prev(i, n), i1, points, &indices);
        indices[i1].1 = diagonal(i, next(i1, n), points, &indices);
    }

    // Append the remaining triangle.
    triangles.push([indices[0].0, indices[1].0, indices[2].0]);
    true
}

fn vertex(points: &[IVec2], indices: &[(usize, bool)], i: usize) -> IVec2 {
    points[indices[i].0]
}

/// Returns true iff the diagonal `(i, j)` is strictly internal to the polygon in the neighborhood of `i`.
fn in_cone(i: usize, j: usize, points: &[IVec2], indices: &[(usize, bool)]) -> bool {
    let n = indices.len();
    let pi = vertex(points, indices, i);
    let pj = vertex(points, indices, j);
    let pi1 = vertex(points, indices, next(i, n));
    let pin1 = vertex(points, indices, prev(i, n));

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn in_cone_loose(i: usize, j: usize, points: &[IVec2], indices: &[(usize, bool)]) -> bool {
    let n = indices.len();
    let pi = vertex(points, indices, i);
    let pj = vertex(points, indices, j);
    let pi1 = vertex(points, indices, next(i, n));
    let pin1 = vertex(points, indices, prev(i, n));

    if left_on(pin1, pi, pi1) {
        return left_on(pi, pj, pin1) && left_on(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Returns true iff `(i, j)` is a proper internal or external diagonal of the polygon,
/// ignoring edges incident to `i` and `j`.
fn diagonalie(
    i: usize,
    j: usize,
    points: &[IVec2],
    indices: &[(usize, bool)],
    intersects: fn(IVec2, IVec2, IVec2, IVec2) -> bool,
) -> bool {
    let n = indices.len();
    let d0 = vertex(points, indices, i);
    let d1 = vertex(points, indices, j);

    // For each edge (k,k+1) of P
    for k in 0..n {
        let k1 = next(k, n);
        // Skip edges incident to i or j
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vertex(points, indices, k);
        let p1 = vertex(points, indices, k1);
        if d0 == p0 || d1 == p0 || d0 == p1 || d1 == p1 {
            continue;
        }
        if intersects(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

fn diagonal(i: usize, j: usize, points: &[IVec2], indices: &[(usize, bool)]) -> bool {
    in_cone(i, j, points, indices) && diagonalie(i, j, points, indices, intersect)
}

fn diagonal_loose(i: usize, j: usize, points: &[IVec2], indices: &[(usize, bool)]) -> bool {
    in_cone_loose(i, j, points, indices) && diagonalie(i, j, points, indices, intersect_prop)
}

#[inline]
fn xz(vertex: U16Vec3) -> IVec2 {
    IVec2::new(vertex.x as i32, vertex.z as i32)
}

/// Repeatedly merges the pair of polygons sharing the longest edge while the result stays convex.
fn merge_polygons(polygons: &mut Vec<Vec<u16>>, vertices: &[U16Vec3], nvp: usize) {
    loop {
        // Find best polygons to merge.
        let mut best_merge_value = 0;
        let mut best = None;
        for j in 0..polygons.len().saturating_sub(1) {
            for k in j + 1..polygons.len() {
                if let Some((value, ea, eb)) =
                    poly_merge_value(&polygons[j], &polygons[k], vertices, nvp)
                    && value > best_merge_value
                {
                    best_merge_value = value;
                    best = Some((j, k, ea, eb));
                }
            }
        }

        let Some((pa, pb, ea, eb)) = best else {
            break;
        };
        // Found best, merge.
        let merged = merge_polygon_vertices(&polygons[pa], &polygons[pb], ea, eb);
        polygons[pa] = merged;
        polygons.swap_remove(pb);
    }
}

/// Returns the squared length of the shared edge and the edge indices in `a` and `b`,
/// or `None` if the polygons cannot be merged into a convex polygon.
fn poly_merge_value(
    a: &[u16],
    b: &[u16],
    vertices: &[U16Vec3],
    nvp: usize,
) -> Option<(i64, usize, usize)> {
    let na = a.len();
    let nb = b.len();

    // If the merged polygon would be too big, do not merge.
    if na + nb - 2 > nvp {
        return None;
    }

    // Check if the polygons share an edge.
    let sorted = |v0: u16, v1: u16| if v0 > v1 { (v1, v0) } else { (v0, v1) };
    let mut shared = None;
    'outer: for i in 0..na {
        let edge_a = sorted(a[i], a[(i + 1) % na]);
        for j in 0..nb {
            if edge_a == sorted(b[j], b[(j + 1) % nb]) {
                shared = Some((i, j));
                break 'outer;
            }
        }
    }
    // No common edge, cannot merge.
    let (ea, eb) = shared?;

    let position = |i: u16| xz(vertices[i as usize]);
    // Check to see if the merged polygon would be convex.
    let va = a[(ea + na - 1) % na];
    let vb = a[ea];
    let vc = b[(eb + 2) % nb];
    if !left(position(va), position(vb), position(vc)) {
        return None;
    }

    let va = b[(eb + nb - 1) % nb];
    let vb = b[eb];
    let vc = a[(ea + 2) % na];
    if !left(position(va), position(vb), position(vc)) {
        return None;
    }

    let edge = (position(a[ea]) - position(a[(ea + 1) % na])).as_i64vec2();
    Some((edge.length_squared(), ea, eb))
}

fn merge_polygon_vertices(a: &[u16], b: &[u16], ea: usize, eb: usize) -> Vec<u16> {
    let na = a.len();
    let nb = b.len();
    let mut merged = Vec::with_capacity(na + nb - 2);
    // Add pa
    for i in 0..na - 1 {
        merged.push(a[(ea + 1 + i) % na]);
    }
    // Add pb
    for i in 0..nb - 1 {
        merged.push(b[(eb + 1 + i) % nb]);
    }
    merged
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    vertices: [u16; 2],
    polygons: [usize; 2],
    polygon_edges: [usize; 2],
}

fn build_mesh_adjacency(mesh: &mut PolygonMesh) {
    let nvp = mesh.max_vertices_per_polygon;
    let polygon_count = mesh.polygon_count();

    let mut edges: Vec<Edge> = Vec::with_capacity(polygon_count * nvp);
    let mut edges_by_vertex: Vec<Vec<usize>> = vec![Vec::new(); mesh.vertices.len()];

    let polygon_edges = |mesh: &PolygonMesh, i: usize| {
        let polygon = mesh.polygon(i).to_vec();
        let n = polygon.len();
        (0..n).map(move |j| (j, polygon[j], polygon[(j + 1) % n]))
    };

    for i in 0..polygon_count {
        for (j, v0, v1) in polygon_edges(&*mesh, i) {
            if v0 < v1 {
                edges_by_vertex[v0 as usize].push(edges.len());
                edges.push(Edge {
                    vertices: [v0, v1],
                    polygons: [i, i],
                    polygon_edges: [j, 0],
                });
            }
        }
    }

    for i in 0..polygon_count {
        for (j, v0, v1) in polygon_edges(&*mesh, i) {
            if v0 > v1 {
                for &e in &edges_by_vertex[v1 as usize] {
                    let edge = &mut edges[e];
                    if edge.vertices[1] == v0 && edge.polygons[0] == edge.polygons[1] {
                        edge.polygons[1] = i;
                        edge.polygon_edges[1] = j;
                        break;
                    }
                }
            }
        }
    }

    // Store adjacency
    for edge in &edges {
        if edge.polygons[0] != edge.polygons[1] {
            let [p0, p1] = edge.polygons;
            let [e0, e1] = edge.polygon_edges;
            mesh.polygon_neighbors[p0 * nvp + e0] = p1 as u16;
            mesh.polygon_neighbors[p1 * nvp + e1] = p0 as u16;
        }
    }
}

fn mark_portal_edges(mesh: &mut PolygonMesh, width: u16, height: u16) {
    let nvp = mesh.max_vertices_per_polygon;
    for i in 0..mesh.polygon_count() {
        let polygon = mesh.polygon(i).to_vec();
        let n = polygon.len();
        for j in 0..n {
            // Skip connected edges.
            if mesh.polygon_neighbors[i * nvp + j] != RC_MESH_NULL_IDX {
                continue;
            }
            let va = mesh.vertices[polygon[j] as usize];
            let vb = mesh.vertices[polygon[(j + 1) % n] as usize];
            let direction = if va.x == 0 && vb.x == 0 {
                0
            } else if va.z == height && vb.z == height {
                1
            } else if va.x == width && vb.x == width {
                2
            } else if va.z == 0 && vb.z == 0 {
                3
            } else {
                continue;
            };
            mesh.polygon_neighbors[i * nvp + j] = PORTAL_FLAG | direction;
        }
    }
}

/// Errors that can occur during [`ContourSet::into_polygon_mesh`].
#[derive(Error, Debug)]
pub enum PolygonMeshError {
    /// The contours have more vertices than a polygon mesh can index.
    #[error("Too many vertices: {count}")]
    TooManyVertices {
        /// Number of vertices required
        count: usize,
    },
    /// More polygons were generated than a polygon mesh can index.
    #[error("Too many polygons: {count} (max: {max})")]
    TooManyPolygons {
        /// Number of polygons generated
        count: usize,
        /// Maximum number of polygons
        max: usize,
    },
    /// An array of the mesh could not be allocated.
    #[error("Out of memory while allocating {len} polygon mesh entries")]
    OutOfMemory {
        /// Number of entries that were requested
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use glam::UVec4;

    use crate::{BuildContoursFlags, Contour, compact_heightfield::tests::flat_compact_heightfield};

    use super::*;

    fn contour_set(contours: Vec<Contour>, border_size: u16) -> ContourSet {
        ContourSet {
            contours,
            aabb: Aabb3d::default(),
            cell_size: 1.0,
            cell_height: 1.0,
            width: 10,
            height: 10,
            border_size,
            max_error: 1.0,
        }
    }

    fn contour(points: &[(u32, u32)]) -> Contour {
        let vertices: Vec<UVec4> = points
            .iter()
            .map(|&(x, z)| UVec4::new(x, 0, z, 0))
            .collect();
        Contour {
            raw_vertices: vertices.clone(),
            vertices,
            region: RegionId::from(1),
            area: AreaType::DEFAULT_WALKABLE,
        }
    }

    #[test]
    fn square_becomes_single_quad() {
        let cset = contour_set(vec![contour(&[(0, 0), (0, 10), (10, 10), (10, 0)])], 0);
        let mesh = cset.into_polygon_mesh(6).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.polygon(0).len(), 4);
        assert_eq!(mesh.regions, vec![RegionId::from(1)]);
        assert_eq!(mesh.flags, vec![0]);
        assert!(mesh.neighbors(0).iter().all(|&n| n == RC_MESH_NULL_IDX));
    }

    #[test]
    fn triangles_only_when_limited_to_three_vertices() {
        let cset = contour_set(vec![contour(&[(0, 0), (0, 10), (10, 10), (10, 0)])], 0);
        let mesh = cset.into_polygon_mesh(3).unwrap();
        assert_eq!(mesh.polygon_count(), 2);
        // The two triangles share the diagonal.
        assert_eq!(mesh.neighbors(0).iter().filter(|&&n| n == 1).count(), 1);
        assert_eq!(mesh.neighbors(1).iter().filter(|&&n| n == 0).count(), 1);
    }

    #[test]
    fn concave_contour_yields_convex_polygons() {
        // An L shape.
        let cset = contour_set(
            vec![contour(&[(0, 0), (0, 10), (5, 10), (5, 5), (10, 5), (10, 0)])],
            0,
        );
        let mesh = cset.into_polygon_mesh(6).unwrap();
        assert!(mesh.polygon_count() >= 2);
        for i in 0..mesh.polygon_count() {
            let polygon = mesh.polygon(i);
            let n = polygon.len();
            for j in 0..n {
                let a = xz(mesh.vertices[polygon[j] as usize]);
                let b = xz(mesh.vertices[polygon[(j + 1) % n] as usize]);
                let c = xz(mesh.vertices[polygon[(j + 2) % n] as usize]);
                assert!(left_on(a, b, c), "polygon {i} is not convex");
            }
        }
    }

    #[test]
    fn shared_vertices_are_welded() {
        let cset = contour_set(
            vec![
                contour(&[(0, 0), (0, 10), (5, 10), (5, 0)]),
                contour(&[(5, 0), (5, 10), (10, 10), (10, 0)]),
            ],
            0,
        );
        let mesh = cset.into_polygon_mesh(6).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.polygon_count(), 2);
        assert!(mesh.neighbors(0).contains(&1));
    }

    #[test]
    fn border_edges_become_portals() {
        let cset = contour_set(vec![contour(&[(0, 0), (0, 10), (10, 10), (10, 0)])], 2);
        let mesh = cset.into_polygon_mesh(6).unwrap();
        let mut portals: Vec<u16> = mesh.neighbors(0)[..4]
            .iter()
            .map(|&n| n & !PORTAL_FLAG)
            .collect();
        portals.sort_unstable();
        assert_eq!(portals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn tile_border_vertices_are_kept() {
        let mut square = contour(&[(0, 0), (0, 10), (10, 10), (10, 0)]);
        for vertex in &mut square.vertices[..2] {
            vertex.w |= RegionVertexId::BORDER_VERTEX.bits();
        }
        let mesh = contour_set(vec![square], 2).into_polygon_mesh(6).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.polygon(0).len(), 4);
        assert_eq!(mesh.border_size, 2);
    }

    #[test]
    fn flat_heightfield_produces_mesh() {
        let mut compact = flat_compact_heightfield(1.0);
        compact.build_distance_field(1).unwrap();
        compact.build_regions(0, 1, 400).unwrap();
        let cset = compact
            .build_contours(1.3, 0, BuildContoursFlags::default())
            .unwrap();
        let mesh = cset.into_polygon_mesh(6).unwrap();
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.vertices.len(), 4);
        approx::assert_relative_eq!(mesh.cell_size, 0.1);
    }
}
