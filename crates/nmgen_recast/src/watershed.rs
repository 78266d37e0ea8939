//! Watershed partitioning of a [`CompactHeightfield`] into regions.

use thiserror::Error;

use crate::{CompactHeightfield, math::try_filled, region::RegionId, span::AreaType};

const BORDER_REGION: u16 = RegionId::BORDER_REGION.bits();
const LOG_NB_STACKS: u16 = 3;
const NB_STACKS: usize = 1 << LOG_NB_STACKS;
const EXPAND_ITERS: u16 = 8;

#[derive(Debug, Clone, Copy)]
struct LevelStackEntry {
    x: u16,
    z: u16,
    /// `None` once the span has been assigned to a region.
    index: Option<usize>,
}

impl CompactHeightfield {
    /// Partitions the walkable surface into non-overlapping regions using watershed partitioning.
    ///
    /// [`CompactHeightfield::build_distance_field`] must be called first.
    ///
    /// # Arguments
    ///
    /// - `border_size`: The size of the non-navigable border around the heightfield. `[Limit: >=0] [Units: vx]`
    /// - `min_region_area`: The minimum number of cells allowed to form isolated island areas. `[Limit: >=0] [Units: vx]`
    /// - `merge_region_area`: Any regions with a span count smaller than this value will, if possible,
    ///   be merged with larger regions. `[Limit: >=0] [Units: vx]`
    ///
    /// # Errors
    ///
    /// Returns an error if the distance field has not been built, the region ids overflow,
    /// or the working buffers cannot be allocated.
    pub fn build_regions(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionError> {
        if self.dist.len() != self.spans.len() {
            return Err(RegionError::MissingDistanceField);
        }
        let w = self.width;
        let h = self.height;
        let len = self.spans.len();
        let mut src_reg = try_filled(len, 0_u16).map_err(|_| RegionError::OutOfMemory { len })?;
        let mut src_dist = try_filled(len, 0_u16).map_err(|_| RegionError::OutOfMemory { len })?;

        let mut lvl_stacks: [Vec<LevelStackEntry>; NB_STACKS] =
            std::array::from_fn(|_| Vec::with_capacity(256));
        let mut stack = Vec::with_capacity(256);

        let mut region_id = 1_u16;
        let mut level = (self.max_distance.saturating_add(1)) & !1;

        if border_size > 0 {
            // Make sure border will not overflow.
            let bw = w.min(border_size);
            let bh = h.min(border_size);
            // Paint regions
            self.paint_rect_region(0, bw, 0, h, region_id | BORDER_REGION, &mut src_reg);
            region_id += 1;
            self.paint_rect_region(w - bw, w, 0, h, region_id | BORDER_REGION, &mut src_reg);
            region_id += 1;
            self.paint_rect_region(0, w, 0, bh, region_id | BORDER_REGION, &mut src_reg);
            region_id += 1;
            self.paint_rect_region(0, w, h - bh, h, region_id | BORDER_REGION, &mut src_reg);
            region_id += 1;
        }
        self.border_size = border_size;

        let mut stack_id: Option<usize> = None;
        while level > 0 {
            level = level.saturating_sub(2);
            let s_id = stack_id.map_or(0, |id| (id + 1) & (NB_STACKS - 1));
            stack_id = Some(s_id);

            if s_id == 0 {
                self.sort_cells_by_level(level, &src_reg, &mut lvl_stacks, 1);
            } else {
                // Copy left overs from last level.
                let (previous, current) = lvl_stacks.split_at_mut(s_id);
                append_stacks(&previous[s_id - 1], &mut current[0], &src_reg);
            }

            self.expand_regions(
                EXPAND_ITERS,
                level,
                &mut src_reg,
                &mut src_dist,
                &mut lvl_stacks[s_id],
                false,
            );

            // Mark new regions with IDs.
            for j in 0..lvl_stacks[s_id].len() {
                let current = lvl_stacks[s_id][j];
                let Some(i) = current.index else {
                    continue;
                };
                if src_reg[i] != 0 {
                    continue;
                }
                if self.flood_region(
                    current.x,
                    current.z,
                    i,
                    level,
                    region_id,
                    &mut src_reg,
                    &mut src_dist,
                    &mut stack,
                ) {
                    if region_id >= BORDER_REGION - 1 {
                        return Err(RegionError::RegionIdOverflow);
                    }
                    region_id += 1;
                }
            }
        }

        // Expand current regions until no empty connected cells found.
        self.expand_regions(
            EXPAND_ITERS * 8,
            0,
            &mut src_reg,
            &mut src_dist,
            &mut stack,
            true,
        );

        // Merge regions and filter out small regions.
        let max_region = self.merge_and_filter_regions(
            min_region_area as usize,
            merge_region_area as usize,
            region_id,
            &mut src_reg,
        );
        self.max_region = RegionId::from(max_region);

        // Write the result out.
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = RegionId::from(region);
        }
        Ok(())
    }

    fn paint_rect_region(
        &self,
        min_x: u16,
        max_x: u16,
        min_z: u16,
        max_z: u16,
        region_id: u16,
        src_reg: &mut [u16],
    ) {
        for z in min_z..max_z {
            for x in min_x..max_x {
                for i in self.cell_at(x, z).index_range() {
                    if self.areas[i].is_walkable() {
                        src_reg[i] = region_id;
                    }
                }
            }
        }
    }

    fn sort_cells_by_level(
        &self,
        start_level: u16,
        src_reg: &[u16],
        stacks: &mut [Vec<LevelStackEntry>; NB_STACKS],
        log_levels_per_stack: u16,
    ) {
        let start_level = (start_level >> log_levels_per_stack) as i32;
        for stack in stacks.iter_mut() {
            stack.clear();
        }

        // Put all cells in the level range into the appropriate stacks.
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if !self.areas[i].is_walkable() || src_reg[i] != 0 {
                        continue;
                    }
                    let level = (self.dist[i] >> log_levels_per_stack) as i32;
                    let s_id = (start_level - level).max(0) as usize;
                    if s_id >= NB_STACKS {
                        continue;
                    }
                    stacks[s_id].push(LevelStackEntry {
                        x,
                        z,
                        index: Some(i),
                    });
                }
            }
        }
    }

    fn expand_regions(
        &self,
        max_iter: u16,
        level: u16,
        src_reg: &mut [u16],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
        fill_stack: bool,
    ) {
        if fill_stack {
            // Find cells revealed by the raised level.
            stack.clear();
            for z in 0..self.height {
                for x in 0..self.width {
                    for i in self.cell_at(x, z).index_range() {
                        if self.dist[i] >= level && src_reg[i] == 0 && self.areas[i].is_walkable() {
                            stack.push(LevelStackEntry {
                                x,
                                z,
                                index: Some(i),
                            });
                        }
                    }
                }
            }
        } else {
            // Mark all cells which already have a region.
            for entry in stack.iter_mut() {
                if entry.index.is_some_and(|i| src_reg[i] != 0) {
                    entry.index = None;
                }
            }
        }

        let mut dirty_entries = Vec::new();
        let mut iter = 0;
        while !stack.is_empty() {
            let mut failed = 0;
            dirty_entries.clear();

            for entry in stack.iter_mut() {
                let Some(i) = entry.index else {
                    failed += 1;
                    continue;
                };
                let mut region = src_reg[i];
                let mut distance = u16::MAX;
                let area = self.areas[i];
                for dir in 0..4 {
                    let Some((_, _, a)) = self.neighbor(entry.x, entry.z, i, dir) else {
                        continue;
                    };
                    if self.areas[a] != area {
                        continue;
                    }
                    if src_reg[a] > 0
                        && (src_reg[a] & BORDER_REGION) == 0
                        && (src_dist[a] as u32 + 2) < distance as u32
                    {
                        region = src_reg[a];
                        distance = src_dist[a] + 2;
                    }
                }
                if region != 0 {
                    // Mark as used.
                    entry.index = None;
                    dirty_entries.push((i, region, distance));
                } else {
                    failed += 1;
                }
            }

            // Copy entries that differ to keep them in sync.
            for &(i, region, distance) in &dirty_entries {
                src_reg[i] = region;
                src_dist[i] = distance;
            }

            if failed == stack.len() {
                break;
            }

            if level > 0 {
                iter += 1;
                if iter >= max_iter {
                    break;
                }
            }
        }
    }

    fn flood_region(
        &self,
        x: u16,
        z: u16,
        i: usize,
        level: u16,
        region: u16,
        src_reg: &mut [u16],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
    ) -> bool {
        let area = self.areas[i];

        // Flood fill mark region.
        stack.clear();
        stack.push(LevelStackEntry {
            x,
            z,
            index: Some(i),
        });
        src_reg[i] = region;
        src_dist[i] = 0;

        let lev = level.saturating_sub(2);
        let mut count = 0;

        while let Some(back) = stack.pop() {
            let Some(ci) = back.index else {
                continue;
            };
            let (cx, cz) = (back.x, back.z);

            // Check if any of the neighbours already have a valid region set.
            let mut adjacent_region = 0;
            for dir in 0..4 {
                // 8 connected
                let Some((ax, az, ai)) = self.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[ai] != area {
                    continue;
                }
                let neighbor_region = src_reg[ai];
                // Do not take borders into account.
                if neighbor_region & BORDER_REGION != 0 {
                    continue;
                }
                if neighbor_region != 0 && neighbor_region != region {
                    adjacent_region = neighbor_region;
                    break;
                }

                let dir2 = (dir + 1) & 0x3;
                if let Some((_, _, ai2)) = self.neighbor(ax, az, ai, dir2) {
                    if self.areas[ai2] != area {
                        continue;
                    }
                    let diagonal_region = src_reg[ai2];
                    if diagonal_region != 0 && diagonal_region != region {
                        adjacent_region = diagonal_region;
                        break;
                    }
                }
            }
            if adjacent_region != 0 {
                src_reg[ci] = 0;
                continue;
            }

            count += 1;

            // Expand neighbours.
            for dir in 0..4 {
                let Some((ax, az, ai)) = self.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[ai] != area {
                    continue;
                }
                if self.dist[ai] >= lev && src_reg[ai] == 0 {
                    src_reg[ai] = region;
                    src_dist[ai] = 0;
                    stack.push(LevelStackEntry {
                        x: ax,
                        z: az,
                        index: Some(ai),
                    });
                }
            }
        }

        count > 0
    }

    fn is_solid_edge(&self, src_reg: &[u16], x: u16, z: u16, i: usize, dir: u8) -> bool {
        let neighbor_region = self
            .neighbor(x, z, i, dir)
            .map_or(0, |(_, _, a)| src_reg[a]);
        neighbor_region != src_reg[i]
    }

    /// Walks the boundary of the region starting at span `i` and records the sequence of neighbouring region ids.
    fn walk_region_contour(
        &self,
        mut x: u16,
        mut z: u16,
        mut i: usize,
        mut dir: u8,
        src_reg: &[u16],
        connections: &mut Vec<u16>,
    ) {
        let start_dir = dir;
        let start_i = i;

        let mut current_region = self.neighbor(x, z, i, dir).map_or(0, |(_, _, a)| src_reg[a]);
        connections.push(current_region);

        let mut iter = 0;
        loop {
            iter += 1;
            if iter >= 40000 {
                break;
            }
            if self.is_solid_edge(src_reg, x, z, i, dir) {
                // Choose the edge corner
                let region = self.neighbor(x, z, i, dir).map_or(0, |(_, _, a)| src_reg[a]);
                if region != current_region {
                    current_region = region;
                    connections.push(current_region);
                }
                // Rotate CW
                dir = (dir + 1) & 0x3;
            } else {
                let Some((nx, nz, ni)) = self.neighbor(x, z, i, dir) else {
                    // Should not happen.
                    return;
                };
                x = nx;
                z = nz;
                i = ni;
                // Rotate CCW
                dir = (dir + 3) & 0x3;
            }
            if start_i == i && start_dir == dir {
                break;
            }
        }

        remove_adjacent_duplicates(connections);
    }

    /// Removes small isolated regions and merges small regions into their neighbours.
    ///
    /// Returns the number of regions left after compacting their ids.
    fn merge_and_filter_regions(
        &self,
        min_region_area: usize,
        merge_region_size: usize,
        region_count: u16,
        src_reg: &mut [u16],
    ) -> u16 {
        let nreg = region_count as usize;
        let mut regions: Vec<Region> = (0..nreg).map(|id| Region::new(id as u16)).collect();

        // Find edge of a region and find connections around the contour.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cell_at(x, z);
                for i in cell.index_range() {
                    let r = src_reg[i] as usize;
                    if r == 0 || r >= nreg {
                        continue;
                    }
                    regions[r].span_count += 1;

                    // Update floors.
                    for j in cell.index_range() {
                        if i == j {
                            continue;
                        }
                        let floor_id = src_reg[j];
                        if floor_id == 0 || floor_id as usize >= nreg {
                            continue;
                        }
                        if floor_id as usize == r {
                            regions[r].overlap = true;
                        }
                        add_unique(&mut regions[r].floors, floor_id);
                    }

                    // Have found contour
                    if !regions[r].connections.is_empty() {
                        continue;
                    }
                    regions[r].area = self.areas[i];

                    // Check if this cell is next to a border.
                    let Some(dir) = (0..4).find(|&dir| self.is_solid_edge(src_reg, x, z, i, dir))
                    else {
                        continue;
                    };
                    // The cell is at border.
                    // Walk around the contour to find all the neighbours.
                    let mut connections = Vec::new();
                    self.walk_region_contour(x, z, i, dir, src_reg, &mut connections);
                    regions[r].connections = connections;
                }
            }
        }

        // Remove too small regions.
        let mut stack = Vec::new();
        let mut trace = Vec::new();
        for i in 0..nreg {
            if regions[i].id == 0 || regions[i].id & BORDER_REGION != 0 {
                continue;
            }
            if regions[i].span_count == 0 || regions[i].visited {
                continue;
            }

            // Count the total size of all the connected regions.
            // Also keep track of the regions connects to a tile border.
            let mut connects_to_border = false;
            let mut span_count = 0;
            stack.clear();
            trace.clear();

            regions[i].visited = true;
            stack.push(i);

            while let Some(ri) = stack.pop() {
                span_count += regions[ri].span_count;
                trace.push(ri);

                for j in 0..regions[ri].connections.len() {
                    let connection = regions[ri].connections[j];
                    if connection & BORDER_REGION != 0 {
                        connects_to_border = true;
                        continue;
                    }
                    let neighbor = &mut regions[connection as usize];
                    if neighbor.visited {
                        continue;
                    }
                    if neighbor.id == 0 || neighbor.id & BORDER_REGION != 0 {
                        continue;
                    }
                    // Visit
                    neighbor.visited = true;
                    stack.push(neighbor.id as usize);
                }
            }

            // If the accumulated regions size is too small, remove it.
            // Do not remove areas which connect to tile borders
            // as their size cannot be estimated correctly and removing them
            // can potentially remove necessary areas.
            if span_count < min_region_area && !connects_to_border {
                // Kill all visited regions.
                for &t in &trace {
                    regions[t].span_count = 0;
                    regions[t].id = 0;
                }
            }
        }

        // Merge too small regions to neighbour regions.
        loop {
            let mut merge_count = 0;
            for i in 0..nreg {
                let reg = &regions[i];
                if reg.id == 0 || reg.id & BORDER_REGION != 0 {
                    continue;
                }
                if reg.overlap || reg.span_count == 0 {
                    continue;
                }

                // Check to see if the region should be merged.
                if reg.span_count > merge_region_size && reg.is_connected_to_border() {
                    continue;
                }

                // Small region with more than 1 connection.
                // Or region which is not connected to a border at all.
                // Find smallest neighbour region that connects to this one.
                let mut smallest = usize::MAX;
                let mut merge_id = reg.id;
                for &connection in &reg.connections {
                    if connection & BORDER_REGION != 0 {
                        continue;
                    }
                    let mreg = &regions[connection as usize];
                    if mreg.id == 0 || mreg.id & BORDER_REGION != 0 || mreg.overlap {
                        continue;
                    }
                    if mreg.span_count < smallest
                        && reg.can_merge_with(mreg)
                        && mreg.can_merge_with(reg)
                    {
                        smallest = mreg.span_count;
                        merge_id = mreg.id;
                    }
                }
                // Found new id.
                if merge_id != reg.id {
                    let old_id = reg.id;
                    // Merge neighbours.
                    if merge_regions(&mut regions, merge_id as usize, i) {
                        // Fixup regions pointing to current region.
                        for region in regions.iter_mut() {
                            if region.id == 0 || region.id & BORDER_REGION != 0 {
                                continue;
                            }
                            // If another region was already merged into current region
                            // change the nid of the previous region too.
                            if region.id == old_id {
                                region.id = merge_id;
                            }
                            // Replace the current region with the new one if the
                            // current regions is neighbour.
                            region.replace_neighbor(old_id, merge_id);
                        }
                        merge_count += 1;
                    }
                }
            }
            if merge_count == 0 {
                break;
            }
        }

        // Compress region Ids.
        // Slots that never received a span and were not merged away, such as the
        // ids reserved for the painted border, do not get an id of their own.
        for (i, region) in regions.iter_mut().enumerate() {
            if region.span_count == 0 && region.id as usize == i {
                region.id = 0;
            }
            region.remap = region.id != 0 && region.id & BORDER_REGION == 0;
        }
        let mut region_id_gen = 0_u16;
        for i in 0..nreg {
            if !regions[i].remap {
                continue;
            }
            let old_id = regions[i].id;
            region_id_gen += 1;
            for region in regions[i..].iter_mut() {
                if region.id == old_id {
                    region.id = region_id_gen;
                    region.remap = false;
                }
            }
        }

        // Remap regions.
        for region in src_reg.iter_mut() {
            if *region & BORDER_REGION == 0 {
                *region = regions[*region as usize].id;
            }
        }

        let overlapping = regions.iter().filter(|region| region.overlap).count();
        if overlapping > 0 {
            tracing::debug!("Watershed produced {overlapping} overlapping regions");
        }

        region_id_gen
    }
}

fn append_stacks(src: &[LevelStackEntry], dst: &mut Vec<LevelStackEntry>, src_reg: &[u16]) {
    dst.extend(
        src.iter()
            .filter(|entry| entry.index.is_some_and(|i| src_reg[i] == 0))
            .copied(),
    );
}

fn add_unique(values: &mut Vec<u16>, value: u16) {
    if !values.contains(&value) {
        values.push(value);
    }
}

fn remove_adjacent_duplicates(connections: &mut Vec<u16>) {
    let mut i = 0;
    while i < connections.len() && connections.len() > 1 {
        let ni = (i + 1) % connections.len();
        if connections[i] == connections[ni] {
            connections.remove(i);
        } else {
            i += 1;
        }
    }
}

#[derive(Debug, Clone)]
struct Region {
    /// Number of spans belonging to this region
    span_count: usize,
    /// ID of the region
    id: u16,
    /// Area type.
    area: AreaType,
    remap: bool,
    visited: bool,
    overlap: bool,
    /// Neighbouring region ids in boundary order. 0 stands for open space.
    connections: Vec<u16>,
    /// Regions stacked above or below this one.
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            span_count: 0,
            id,
            area: AreaType::NOT_WALKABLE,
            remap: false,
            visited: false,
            overlap: false,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }

    fn is_connected_to_border(&self) -> bool {
        // Region is connected to border if one of the neighbours is null id.
        self.connections.contains(&0)
    }

    fn can_merge_with(&self, other: &Region) -> bool {
        if self.area != other.area {
            return false;
        }
        let shared_edges = self
            .connections
            .iter()
            .filter(|&&connection| connection == other.id)
            .count();
        if shared_edges > 1 {
            return false;
        }
        !self.floors.contains(&other.id)
    }

    fn replace_neighbor(&mut self, old_id: u16, new_id: u16) {
        let mut neighbor_changed = false;
        for connection in self.connections.iter_mut() {
            if *connection == old_id {
                *connection = new_id;
                neighbor_changed = true;
            }
        }
        for floor in self.floors.iter_mut() {
            if *floor == old_id {
                *floor = new_id;
            }
        }
        if neighbor_changed {
            remove_adjacent_duplicates(&mut self.connections);
        }
    }
}

/// Merges region `b` into region `a`. Returns false if they do not share a boundary.
fn merge_regions(regions: &mut [Region], a: usize, b: usize) -> bool {
    let a_id = regions[a].id;
    let b_id = regions[b].id;

    // Duplicate current neighbourhood.
    let a_connections = regions[a].connections.clone();
    let b_connections = regions[b].connections.clone();

    // Find insertion point on A.
    let Some(insert_a) = a_connections.iter().position(|&c| c == b_id) else {
        return false;
    };
    // Find insertion point on B.
    let Some(insert_b) = b_connections.iter().position(|&c| c == a_id) else {
        return false;
    };

    // Merge neighbours.
    let mut connections = Vec::with_capacity(a_connections.len() + b_connections.len());
    let na = a_connections.len();
    for i in 0..na - 1 {
        connections.push(a_connections[(insert_a + 1 + i) % na]);
    }
    let nb = b_connections.len();
    for i in 0..nb - 1 {
        connections.push(b_connections[(insert_b + 1 + i) % nb]);
    }
    remove_adjacent_duplicates(&mut connections);
    regions[a].connections = connections;

    let b_floors = std::mem::take(&mut regions[b].floors);
    for floor in b_floors {
        add_unique(&mut regions[a].floors, floor);
    }
    regions[a].span_count += regions[b].span_count;
    regions[b].span_count = 0;
    regions[b].connections.clear();

    true
}

/// Errors that can occur during [`CompactHeightfield::build_regions`].
#[derive(Error, Debug)]
pub enum RegionError {
    /// The distance field must be built before regions.
    #[error("The distance field has not been built")]
    MissingDistanceField,
    /// More regions were created than fit in a region id.
    #[error("Region ID overflow")]
    RegionIdOverflow,
    /// The working buffers could not be allocated.
    #[error("Out of memory while allocating {len} span regions")]
    OutOfMemory {
        /// Number of entries that were requested
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3A};

    use crate::{
        HeightfieldBuilder, TriMesh, compact_heightfield::tests::flat_compact_heightfield,
    };

    use super::*;

    #[test]
    fn flat_square_is_one_region() {
        let mut compact = flat_compact_heightfield(1.0);
        compact.build_distance_field(1).unwrap();
        compact.build_regions(0, 1, 400).unwrap();
        assert_eq!(compact.max_region, RegionId::from(1));
        assert!(compact.spans.iter().all(|span| span.region == RegionId::from(1)));
    }

    #[test]
    fn regions_require_distance_field() {
        let mut compact = flat_compact_heightfield(1.0);
        assert!(matches!(
            compact.build_regions(0, 1, 4),
            Err(RegionError::MissingDistanceField)
        ));
    }

    #[test]
    fn border_is_painted_as_border_regions() {
        let mut compact = flat_compact_heightfield(1.0);
        compact.build_distance_field(1).unwrap();
        compact.build_regions(2, 1, 400).unwrap();
        assert_eq!(compact.border_size, 2);
        let corner = compact.cell_at(0, 0).index() as usize;
        assert!(compact.spans[corner].region.is_border());
        let center = compact.cell_at(5, 5).index() as usize;
        assert_eq!(compact.spans[center].region, RegionId::from(1));
        assert_eq!(compact.max_region, RegionId::from(1));
    }

    #[test]
    fn small_islands_are_removed() {
        // A 1x1 and a 0.3x0.3 square far apart.
        let mut trimesh = TriMesh::default();
        for (offset, size) in [(0.0, 1.0), (2.0, 0.3)] {
            let base = trimesh.vertices.len() as u32;
            trimesh.vertices.extend([
                Vec3A::new(offset, 0.0, 0.0),
                Vec3A::new(offset + size, 0.0, 0.0),
                Vec3A::new(offset + size, 0.0, size),
                Vec3A::new(offset, 0.0, size),
            ]);
            trimesh.indices.extend([
                UVec3::new(base, base + 2, base + 1),
                UVec3::new(base, base + 3, base + 2),
            ]);
            trimesh
                .area_types
                .extend([AreaType::DEFAULT_WALKABLE; 2]);
        }
        let mut heightfield = HeightfieldBuilder {
            aabb: trimesh.compute_aabb().unwrap(),
            cell_size: 0.1,
            cell_height: 0.1,
        }
        .build()
        .unwrap();
        heightfield.rasterize_triangles(&trimesh, 1).unwrap();
        let mut compact = heightfield.into_compact(2, 1).unwrap();
        compact.build_distance_field(1).unwrap();
        compact.build_regions(0, 20, 400).unwrap();

        assert_eq!(compact.max_region, RegionId::from(1));
        let island = compact.cell_at(21, 1).index() as usize;
        assert_eq!(compact.spans[island].region, RegionId::NONE);
        let main = compact.cell_at(5, 5).index() as usize;
        assert_eq!(compact.spans[main].region, RegionId::from(1));
    }
}
