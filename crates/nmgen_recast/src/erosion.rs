use thiserror::Error;

use crate::{CompactHeightfield, math::try_filled, span::AreaType};

impl CompactHeightfield {
    /// Erode the walkable area by agent radius.
    ///
    /// Every walkable span closer than `walkable_radius` cells to an unwalkable span or to the edge of the
    /// walkable surface is marked [`AreaType::NOT_WALKABLE`]. A radius of zero leaves the field untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance buffer cannot be allocated.
    pub fn erode_walkable_area(&mut self, walkable_radius: u16) -> Result<(), ErosionError> {
        let len = self.spans.len();
        let mut distance_to_boundary =
            try_filled(len, u8::MAX).map_err(|_| ErosionError::OutOfMemory { len })?;

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                for span_index in self.cell_at(x, z).index_range() {
                    if !self.areas[span_index].is_walkable() {
                        distance_to_boundary[span_index] = 0;
                        continue;
                    }
                    // Check that there is a non-null adjacent span in each of the 4 cardinal directions.
                    let neighbor_count = (0..4)
                        .filter_map(|direction| self.neighbor(x, z, span_index, direction))
                        .filter(|(_, _, neighbor)| self.areas[*neighbor].is_walkable())
                        .count();
                    // At least one missing neighbour, so this is a boundary cell.
                    if neighbor_count != 4 {
                        distance_to_boundary[span_index] = 0;
                    }
                }
            }
        }

        let relax = |distance: &mut [u8], target: usize, source: usize, cost: u8| {
            let new_distance = distance[source].saturating_add(cost);
            if new_distance < distance[target] {
                distance[target] = new_distance;
            }
        };

        // Pass 1
        for z in 0..self.height {
            for x in 0..self.width {
                for span_index in self.cell_at(x, z).index_range() {
                    if let Some((ax, az, a)) = self.neighbor(x, z, span_index, 0) {
                        // (-1,0)
                        relax(&mut distance_to_boundary, span_index, a, 2);
                        // (-1,-1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 3) {
                            relax(&mut distance_to_boundary, span_index, aa, 3);
                        }
                    }
                    if let Some((ax, az, a)) = self.neighbor(x, z, span_index, 3) {
                        // (0,-1)
                        relax(&mut distance_to_boundary, span_index, a, 2);
                        // (1,-1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 2) {
                            relax(&mut distance_to_boundary, span_index, aa, 3);
                        }
                    }
                }
            }
        }

        // Pass 2
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                for span_index in self.cell_at(x, z).index_range() {
                    if let Some((ax, az, a)) = self.neighbor(x, z, span_index, 2) {
                        // (1,0)
                        relax(&mut distance_to_boundary, span_index, a, 2);
                        // (1,1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 1) {
                            relax(&mut distance_to_boundary, span_index, aa, 3);
                        }
                    }
                    if let Some((ax, az, a)) = self.neighbor(x, z, span_index, 1) {
                        // (0,1)
                        relax(&mut distance_to_boundary, span_index, a, 2);
                        // (-1,1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 0) {
                            relax(&mut distance_to_boundary, span_index, aa, 3);
                        }
                    }
                }
            }
        }

        let min_boundary_distance = (walkable_radius as u32 * 2).min(u8::MAX as u32) as u8;
        for (area, distance) in self.areas.iter_mut().zip(distance_to_boundary) {
            if distance < min_boundary_distance {
                *area = AreaType::NOT_WALKABLE;
            }
        }
        Ok(())
    }
}

/// Errors that can occur during [`CompactHeightfield::erode_walkable_area`].
#[derive(Error, Debug)]
pub enum ErosionError {
    /// The distance buffer could not be allocated.
    #[error("Out of memory while allocating {len} boundary distances")]
    OutOfMemory {
        /// Number of entries that were requested
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use crate::compact_heightfield::tests::flat_compact_heightfield;

    #[test]
    fn zero_radius_keeps_everything() {
        let mut compact = flat_compact_heightfield(1.0);
        compact.erode_walkable_area(0).unwrap();
        assert_eq!(compact.walkable_span_count(), 100);
    }

    #[test]
    fn erosion_removes_outer_ring() {
        let mut compact = flat_compact_heightfield(1.0);
        compact.erode_walkable_area(1).unwrap();
        // The outer ring is at distance 0, the next ring at distance 2 which is not below the threshold.
        assert_eq!(compact.walkable_span_count(), 64);
        let corner = compact.cell_at(0, 0).index() as usize;
        assert!(!compact.areas[corner].is_walkable());
        let inner = compact.cell_at(1, 1).index() as usize;
        assert!(compact.areas[inner].is_walkable());
    }
}
