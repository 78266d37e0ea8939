//! Region outlines traced from a [`CompactHeightfield`].

use glam::{IVec2, UVec4, Vec2};
use thiserror::Error;

use crate::{
    Aabb3d, AreaType, CompactHeightfield, RegionId,
    math::{distance_squared_point_segment, intersect, left, left_on, next, prev},
};

impl CompactHeightfield {
    /// Builds a contour set from the region outlines in the heightfield.
    ///
    /// The raw contours will match the region outlines exactly. The `max_error` and `max_edge_len`
    /// parameters control how closely the simplified contours will match the raw contours.
    ///
    /// Simplified contours are generated such that the vertices for portals between areas match up.
    /// (They are considered mandatory vertices.)
    ///
    /// Setting `max_edge_len` to zero will disable the edge length feature.
    ///
    /// # Errors
    ///
    /// Returns an error if the per-span edge flags cannot be allocated.
    pub fn build_contours(
        &self,
        max_error: f32,
        max_edge_len: u16,
        build_flags: BuildContoursFlags,
    ) -> Result<ContourSet, ContourError> {
        let border_size = self.border_size;
        let mut cset = ContourSet {
            contours: Vec::new(),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            width: self.width.saturating_sub(border_size * 2),
            height: self.height.saturating_sub(border_size * 2),
            border_size,
            max_error,
        };
        if border_size > 0 {
            // If the heightfield was built with border_size, remove the offset
            let pad = border_size as f32 * self.cell_size;
            cset.aabb.min.x += pad;
            cset.aabb.min.z += pad;
            cset.aabb.max.x -= pad;
            cset.aabb.max.z -= pad;
        }

        let mut flags = Vec::new();
        flags
            .try_reserve_exact(self.spans.len())
            .map_err(|_| ContourError::OutOfMemory {
                len: self.spans.len(),
            })?;
        flags.resize(self.spans.len(), 0_u8);

        // Mark boundaries.
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let region = self.spans[i].region;
                    if region == RegionId::NONE || region.is_border() {
                        continue;
                    }
                    let mut res = 0;
                    for dir in 0..4 {
                        let neighbor_region = self
                            .neighbor(x, z, i, dir)
                            .map_or(RegionId::NONE, |(_, _, a)| self.spans[a].region);
                        if neighbor_region == region {
                            res |= 1 << dir;
                        }
                    }
                    // Inverse, mark non connected edges.
                    flags[i] = res ^ 0xf;
                }
            }
        }

        let mut verts = Vec::with_capacity(256);
        let mut simplified = Vec::with_capacity(64);

        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let region = self.spans[i].region;
                    if region == RegionId::NONE || region.is_border() {
                        continue;
                    }
                    let area = self.areas[i];

                    verts.clear();
                    simplified.clear();

                    self.walk_contour(x, z, i, &mut flags, &mut verts);
                    simplify_contour(&verts, &mut simplified, max_error, max_edge_len, build_flags);
                    remove_degenerate_segments(&mut simplified);

                    // Create contour.
                    if simplified.len() >= 3 {
                        let offset = |v: &UVec4| {
                            UVec4::new(
                                v.x.saturating_sub(border_size as u32),
                                v.y,
                                v.z.saturating_sub(border_size as u32),
                                v.w,
                            )
                        };
                        cset.contours.push(Contour {
                            vertices: simplified.iter().map(offset).collect(),
                            raw_vertices: verts.iter().map(offset).collect(),
                            region,
                            area,
                        });
                    }
                }
            }
        }

        cset.merge_holes(self.max_region);
        Ok(cset)
    }

    fn walk_contour(&self, mut x: u16, mut z: u16, mut i: usize, flags: &mut [u8], points: &mut Vec<UVec4>) {
        // Choose the first non-connected edge
        let mut dir = 0_u8;
        while flags[i] & (1 << dir) == 0 {
            dir += 1;
        }

        let start_dir = dir;
        let start_i = i;
        let area = self.areas[i];

        for _ in 0..40_000 {
            if flags[i] & (1 << dir) != 0 {
                // Choose the edge corner
                let (py, is_border_vertex) = self.corner_height(x, z, i, dir);
                let (px, pz) = match dir {
                    0 => (x, z + 1),
                    1 => (x + 1, z + 1),
                    2 => (x + 1, z),
                    _ => (x, z),
                };
                let mut r = 0_u32;
                let mut is_area_border = false;
                if let Some((_, _, a)) = self.neighbor(x, z, i, dir) {
                    r = self.spans[a].region.bits() as u32;
                    is_area_border = area != self.areas[a];
                }
                if is_border_vertex {
                    r |= RegionVertexId::BORDER_VERTEX.bits();
                }
                if is_area_border {
                    r |= RegionVertexId::AREA_BORDER.bits();
                }
                points.push(UVec4::new(px as u32, py as u32, pz as u32, r));

                // Remove visited edges
                flags[i] &= !(1 << dir);
                // Rotate clockwise
                dir = (dir + 1) & 0x3;
            } else {
                let Some((nx, nz, ni)) = self.neighbor(x, z, i, dir) else {
                    // Should not happen.
                    return;
                };
                x = nx;
                z = nz;
                i = ni;
                // Rotate counterclockwise
                dir = (dir + 3) & 0x3;
            }
            if start_i == i && start_dir == dir {
                break;
            }
        }
    }

    /// Height of the corner shared by span `i` and its neighbours in `dir` and `dir + 1`,
    /// along with whether the corner is a tile border vertex.
    fn corner_height(&self, x: u16, z: u16, i: usize, dir: u8) -> (u16, bool) {
        let mut height = self.spans[i].y;
        let dir_p = (dir + 1) & 0x3;

        // Combine region and area codes in order to prevent
        // border vertices which are in between two areas to be removed.
        let region_and_area =
            |i: usize| self.spans[i].region.bits() as u32 | ((self.areas[i].0 as u32) << 16);
        let mut regs = [0_u32; 4];
        regs[0] = region_and_area(i);

        if let Some((ax, az, a)) = self.neighbor(x, z, i, dir) {
            height = height.max(self.spans[a].y);
            regs[1] = region_and_area(a);
            if let Some((_, _, b)) = self.neighbor(ax, az, a, dir_p) {
                height = height.max(self.spans[b].y);
                regs[2] = region_and_area(b);
            }
        }
        if let Some((ax, az, a)) = self.neighbor(x, z, i, dir_p) {
            height = height.max(self.spans[a].y);
            regs[3] = region_and_area(a);
            if let Some((_, _, b)) = self.neighbor(ax, az, a, dir) {
                height = height.max(self.spans[b].y);
                regs[2] = region_and_area(b);
            }
        }

        // Check if the vertex is special edge vertex, these vertices will be removed later.
        let border = RegionId::BORDER_REGION.bits() as u32;
        let is_border_vertex = (0..4).any(|j| {
            let a = regs[j];
            let b = regs[(j + 1) & 0x3];
            let c = regs[(j + 2) & 0x3];
            let d = regs[(j + 3) & 0x3];

            // The vertex is a border vertex there are two same exterior cells in a row,
            // followed by two interior cells and none of the regions are out of bounds.
            let two_same_exts = (a & b & border) != 0 && a == b;
            let two_ints = ((c | d) & border) == 0;
            let ints_same_area = (c >> 16) == (d >> 16);
            let no_zeros = a != 0 && b != 0 && c != 0 && d != 0;
            two_same_exts && two_ints && ints_same_area && no_zeros
        });
        (height, is_border_vertex)
    }
}

fn simplify_contour(
    points: &[UVec4],
    simplified: &mut Vec<UVec4>,
    max_error: f32,
    max_edge_len: u16,
    flags: BuildContoursFlags,
) {
    let region_mask = RegionVertexId::REGION_MASK.bits();
    let area_border = RegionVertexId::AREA_BORDER.bits();
    let pn = points.len();

    // Add initial points.
    let has_connections = points.iter().any(|p| p.w & region_mask != 0);
    if has_connections {
        // The contour has some portals to other regions.
        // Add a new point to every location where the region changes.
        for (i, point) in points.iter().enumerate() {
            let next_point = points[(i + 1) % pn];
            let different_regs = (point.w & region_mask) != (next_point.w & region_mask);
            let area_borders = (point.w & area_border) != (next_point.w & area_border);
            if different_regs || area_borders {
                simplified.push(point.with_w(i as u32));
            }
        }
    }

    if simplified.is_empty() {
        // If there is no connections at all,
        // create some initial points for the simplification process.
        // Find lower-left and upper-right vertices of the contour.
        let mut lower_left = 0;
        let mut upper_right = 0;
        for (i, p) in points.iter().enumerate() {
            let ll = points[lower_left];
            if p.x < ll.x || (p.x == ll.x && p.z < ll.z) {
                lower_left = i;
            }
            let ur = points[upper_right];
            if p.x > ur.x || (p.x == ur.x && p.z > ur.z) {
                upper_right = i;
            }
        }
        simplified.push(points[lower_left].with_w(lower_left as u32));
        simplified.push(points[upper_right].with_w(upper_right as u32));
    }

    // Add points until all raw points are within
    // error tolerance to the simplified shape.
    let max_error_sq = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();

        let mut a = simplified[i];
        let mut b = simplified[ii];
        let ai = a.w as usize;
        let bi = b.w as usize;

        // Find maximum deviation from the segment.
        let mut max_d = 0.0;
        let mut max_i = None;

        // Traverse the segment in lexilogical order so that the
        // max deviation is calculated similarly when traversing
        // opposite segments.
        let (mut ci, c_inc, end_i) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            ((ai + 1) % pn, 1, bi)
        } else {
            std::mem::swap(&mut a, &mut b);
            ((bi + pn - 1) % pn, pn - 1, ai)
        };

        // Tessellate only outer edges or edges between areas.
        if points[ci].w & region_mask == 0 || points[ci].w & area_border != 0 {
            let segment = (xz(a), xz(b));
            while ci != end_i {
                let d = distance_squared_point_segment(xz(points[ci]), segment);
                if d > max_d {
                    max_d = d;
                    max_i = Some(ci);
                }
                ci = (ci + c_inc) % pn;
            }
        }

        // If the max deviation is larger than accepted error,
        // add new point, else continue to next segment.
        match max_i {
            Some(max_i) if max_d > max_error_sq => {
                simplified.insert(i + 1, points[max_i].with_w(max_i as u32));
            }
            _ => i += 1,
        }
    }

    // Split too long edges.
    let tessellate_walls = flags.contains(BuildContoursFlags::TESSELLATE_SOLID_WALL_EDGES);
    let tessellate_areas = flags.contains(BuildContoursFlags::TESSELLATE_AREA_EDGES);
    if max_edge_len > 0 && (tessellate_walls || tessellate_areas) {
        let max_edge_len_sq = max_edge_len as i64 * max_edge_len as i64;
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();

            let a = simplified[i];
            let b = simplified[ii];
            let ai = a.w as usize;
            let bi = b.w as usize;

            // Find maximum deviation from the segment.
            let mut max_i = None;
            let ci = (ai + 1) % pn;

            // Tessellate only outer edges or edges between areas.
            let tessellate = (tessellate_walls && points[ci].w & region_mask == 0)
                || (tessellate_areas && points[ci].w & area_border != 0);

            if tessellate {
                let dx = b.x as i64 - a.x as i64;
                let dz = b.z as i64 - a.z as i64;
                if dx * dx + dz * dz > max_edge_len_sq {
                    // Round based on the segments in lexilogical order so that the
                    // max tesselation is consistent regardless in which direction
                    // segments are traversed.
                    let n = if bi < ai { bi + pn - ai } else { bi - ai };
                    if n > 1 {
                        max_i = Some(if b.x > a.x || (b.x == a.x && b.z > a.z) {
                            (ai + n / 2) % pn
                        } else {
                            (ai + n.div_ceil(2)) % pn
                        });
                    }
                }
            }

            // If the max deviation is larger than accepted error,
            // add new point, else continue to next segment.
            match max_i {
                Some(max_i) => simplified.insert(i + 1, points[max_i].with_w(max_i as u32)),
                None => i += 1,
            }
        }
    }

    for vertex in simplified.iter_mut() {
        // The edge vertex flag is take from the current raw point,
        // and the neighbour region is take from the next raw point.
        let ai = (vertex.w as usize + 1) % pn;
        let bi = vertex.w as usize;
        vertex.w = (points[ai].w & (region_mask | area_border))
            | (points[bi].w & RegionVertexId::BORDER_VERTEX.bits());
    }
}

fn remove_degenerate_segments(simplified: &mut Vec<UVec4>) {
    // Remove adjacent vertices which are equal on xz-plane,
    // or else the triangulator will get confused.
    let mut i = 0;
    while i < simplified.len() {
        let ni = next(i, simplified.len());
        if equal_xz(simplified[i], simplified[ni]) {
            // Degenerate segment, remove.
            simplified.remove(i);
        }
        i += 1;
    }
}

#[inline]
fn xz(v: UVec4) -> Vec2 {
    Vec2::new(v.x as f32, v.z as f32)
}

#[inline]
fn ixz(v: UVec4) -> IVec2 {
    IVec2::new(v.x as i32, v.z as i32)
}

#[inline]
fn equal_xz(a: UVec4, b: UVec4) -> bool {
    a.x == b.x && a.z == b.z
}

/// Twice the signed area of the contour on the xz-plane, rounded like the integer original.
fn signed_area(vertices: &[UVec4]) -> i64 {
    let mut area = 0_i64;
    let n = vertices.len();
    for i in 0..n {
        let vi = vertices[i];
        let vj = vertices[prev(i, n)];
        area += vi.x as i64 * vj.z as i64 - vj.x as i64 * vi.z as i64;
    }
    (area + 1) / 2
}

/// Whether `point` lies in the cone spanned by vertex `i` of `vertices` and its two neighbours.
fn in_cone(i: usize, vertices: &[UVec4], point: UVec4) -> bool {
    let n = vertices.len();
    let pi = ixz(vertices[i]);
    let pi1 = ixz(vertices[next(i, n)]);
    let pin1 = ixz(vertices[prev(i, n)]);
    let pj = ixz(point);

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Whether the segment `d0 d1` crosses any edge of `vertices` not incident to vertex `skip`.
fn intersects_contour(d0: UVec4, d1: UVec4, skip: Option<usize>, vertices: &[UVec4]) -> bool {
    let n = vertices.len();
    // For each edge (k,k+1) of P
    (0..n).any(|k| {
        let k1 = next(k, n);
        // Skip edges incident to i.
        if skip == Some(k) || skip == Some(k1) {
            return false;
        }
        let p0 = vertices[k];
        let p1 = vertices[k1];
        if equal_xz(d0, p0) || equal_xz(d1, p0) || equal_xz(d0, p1) || equal_xz(d1, p1) {
            return false;
        }
        intersect(ixz(d0), ixz(d1), ixz(p0), ixz(p1))
    })
}

/// Index and position of the lowest (x, then z) vertex.
fn leftmost_vertex(vertices: &[UVec4]) -> (usize, u32, u32) {
    let mut best = (0, vertices[0].x, vertices[0].z);
    for (i, v) in vertices.iter().enumerate().skip(1) {
        if v.x < best.1 || (v.x == best.1 && v.z < best.2) {
            best = (i, v.x, v.z);
        }
    }
    best
}

impl ContourSet {
    /// Splices every hole contour of a region into the outline of that region.
    fn merge_holes(&mut self, max_region: RegionId) {
        // Calculate winding of all polygons.
        let windings: Vec<bool> = self
            .contours
            .iter()
            .map(|contour| signed_area(&contour.vertices) < 0)
            .collect();
        if !windings.iter().any(|&is_hole| is_hole) {
            return;
        }

        // Collect outline contour and holes contours per region.
        // We assume that there is one outline and multiple holes.
        let region_count = max_region.bits() as usize + 1;
        let mut outlines: Vec<Option<usize>> = vec![None; region_count];
        let mut holes: Vec<Vec<usize>> = vec![Vec::new(); region_count];
        for (i, contour) in self.contours.iter().enumerate() {
            let region = contour.region.bits() as usize;
            if region >= region_count {
                continue;
            }
            // Positively would contours are outlines, negative holes.
            if windings[i] {
                holes[region].push(i);
            } else {
                if outlines[region].is_some() {
                    tracing::error!("Multiple outlines for region {region}");
                }
                outlines[region] = Some(i);
            }
        }

        // Finally merge each regions holes into the outline.
        for (region, region_holes) in holes.iter().enumerate() {
            if region_holes.is_empty() {
                continue;
            }
            let Some(outline) = outlines[region] else {
                tracing::error!(
                    "Missing outline for region {region}, contour with {} holes",
                    region_holes.len()
                );
                continue;
            };
            self.merge_region_holes(outline, region_holes);
        }

        self.contours.retain(|contour| !contour.vertices.is_empty());
    }

    fn merge_region_holes(&mut self, outline: usize, holes: &[usize]) {
        // Sort holes from left to right.
        let mut holes: Vec<(usize, usize, u32, u32)> = holes
            .iter()
            .map(|&hole| {
                let (leftmost, min_x, min_z) = leftmost_vertex(&self.contours[hole].vertices);
                (hole, leftmost, min_x, min_z)
            })
            .collect();
        holes.sort_by_key(|&(_, _, min_x, min_z)| (min_x, min_z));

        let mut diagonals: Vec<(usize, i64)> = Vec::new();
        for i in 0..holes.len() {
            let (hole, leftmost, _, _) = holes[i];
            let hole_vertex_count = self.contours[hole].vertices.len();
            let mut best_vertex = leftmost;
            let mut index = None;

            for _ in 0..hole_vertex_count {
                // Find potential diagonals.
                // The 'best' vertex must be in the cone described by 3 consecutive vertices of the outline.
                let outline_vertices = &self.contours[outline].vertices;
                let corner = self.contours[hole].vertices[best_vertex];
                diagonals.clear();
                for j in 0..outline_vertices.len() {
                    if in_cone(j, outline_vertices, corner) {
                        let dx = outline_vertices[j].x as i64 - corner.x as i64;
                        let dz = outline_vertices[j].z as i64 - corner.z as i64;
                        diagonals.push((j, dx * dx + dz * dz));
                    }
                }
                // Sort potential diagonals by distance, we want to make the connection as short as possible.
                diagonals.sort_by_key(|&(_, distance)| distance);

                // Find a diagonal that is not intersecting the outline not the remaining holes.
                index = diagonals.iter().map(|&(vertex, _)| vertex).find(|&vertex| {
                    let pt = outline_vertices[vertex];
                    !intersects_contour(pt, corner, Some(vertex), outline_vertices)
                        && !holes[i..].iter().any(|&(other, ..)| {
                            intersects_contour(pt, corner, None, &self.contours[other].vertices)
                        })
                });
                // If found non-intersecting diagonal, stop looking.
                if index.is_some() {
                    break;
                }
                // All the potential diagonals for the current vertex were intersecting, try next vertex.
                best_vertex = (best_vertex + 1) % hole_vertex_count;
            }

            let Some(index) = index else {
                tracing::warn!(
                    "Failed to find merge points for contours {outline} and {hole}."
                );
                continue;
            };
            let hole_vertices = std::mem::take(&mut self.contours[hole].vertices);
            let merged = merge_contours(
                &self.contours[outline].vertices,
                &hole_vertices,
                index,
                best_vertex,
            );
            self.contours[outline].vertices = merged;
        }
    }
}

/// Joins contour `b` into contour `a` through the diagonal between `a[ia]` and `b[ib]`.
fn merge_contours(a: &[UVec4], b: &[UVec4], ia: usize, ib: usize) -> Vec<UVec4> {
    let mut vertices = Vec::with_capacity(a.len() + b.len() + 2);
    // Copy contour A.
    for i in 0..=a.len() {
        vertices.push(a[(ia + i) % a.len()]);
    }
    // Copy contour B
    for i in 0..=b.len() {
        vertices.push(b[(ib + i) % b.len()]);
    }
    vertices
}

/// Represents a group of related contours.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourSet {
    /// An array of the contours in the set.
    pub contours: Vec<Contour>,
    /// The AABB in world space
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The width of the set. (Along the x-axis in cell units.)
    pub width: u16,
    /// The height of the set. (Along the z-axis in cell units.)
    pub height: u16,
    /// The AABB border size used to generate the source data from which the contours were derived.
    pub border_size: u16,
    /// The max edge error that this contour set was simplified with.
    pub max_error: f32,
}

bitflags::bitflags! {
    /// Flags stored in the `w` component of [`Contour`] vertices next to the neighbour region id.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct RegionVertexId: u32 {
        /// Applied to the region id field of contour vertices in order to extract the region id.
        /// The region id field of a vertex may have several flags applied to it.  So the
        /// fields value can't be used directly.
        const REGION_MASK = 0xffff;

        /// Border vertex flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// a tile border. [`ContourSet::into_polygon_mesh`] keeps such vertices.
        const BORDER_VERTEX = 0x10_000;

        /// Area border flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// the border of an area.
        const AREA_BORDER = 0x20_000;
    }
}

impl From<u32> for RegionVertexId {
    fn from(bits: u32) -> Self {
        RegionVertexId::from_bits_retain(bits)
    }
}

impl RegionVertexId {
    /// The neighbour region stored in the flags.
    pub fn region(self) -> RegionId {
        RegionId::from((self.bits() & Self::REGION_MASK.bits()) as u16)
    }
}

/// Represents a simple, non-overlapping contour in field space.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Contour {
    /// Simplified contour vertex and connection data: `(x, y, z, flags)` in voxels.
    /// See [`RegionVertexId`] for the flags.
    pub vertices: Vec<UVec4>,
    /// Raw contour vertex and connection data.
    pub raw_vertices: Vec<UVec4>,
    /// Region ID of the contour.
    pub region: RegionId,
    /// Area type of the contour.
    pub area: AreaType,
}

bitflags::bitflags! {
    /// Contour build flags used in [`CompactHeightfield::build_contours`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct BuildContoursFlags: u8 {
        /// Tessellate solid (impassable) edges during contour simplification.
        const TESSELLATE_SOLID_WALL_EDGES = 1;
        /// Tessellate edges between areas during contour simplification.
        const TESSELLATE_AREA_EDGES = 2;

        /// Default flags for building contours.
        const DEFAULT = Self::TESSELLATE_SOLID_WALL_EDGES.bits();
    }
}

impl Default for BuildContoursFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Errors that can occur during [`CompactHeightfield::build_contours`].
#[derive(Error, Debug)]
pub enum ContourError {
    /// The working buffers could not be allocated.
    #[error("Out of memory while allocating {len} contour edge flags")]
    OutOfMemory {
        /// Number of entries that were requested
        len: usize,
    },
}
