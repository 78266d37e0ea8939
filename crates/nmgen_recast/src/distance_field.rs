use std::collections::TryReserveError;

use thiserror::Error;

use crate::{CompactHeightfield, math::try_filled};

impl CompactHeightfield {
    /// Builds the distance field for the compact heightfield.
    ///
    /// Each span receives its chamfer distance (2 per straight step, 3 per diagonal step) to the closest
    /// span that borders a different area or an unconnected edge. The result is stored in [`CompactHeightfield::dist`]
    /// and its maximum in [`CompactHeightfield::max_distance`].
    ///
    /// `blur_passes` box-blur passes are applied afterwards to smooth the field. Zero disables blurring.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance buffers cannot be allocated. The previous distance field is kept in that case.
    pub fn build_distance_field(&mut self, blur_passes: u8) -> Result<(), DistanceFieldError> {
        let len = self.spans.len();
        let out_of_memory = |_: TryReserveError| DistanceFieldError::OutOfMemory { len };
        let mut src = try_filled(len, u16::MAX).map_err(out_of_memory)?;
        let mut dst = try_filled(len, 0).map_err(out_of_memory)?;

        self.calculate_distance_field(&mut src);
        self.max_distance = src.iter().copied().max().unwrap_or_default();

        for _ in 0..blur_passes {
            self.box_blur(1, &src, &mut dst);
            std::mem::swap(&mut src, &mut dst);
        }
        self.dist = src;
        Ok(())
    }

    /// Fills `distance`, which must start out as `u16::MAX` for every span.
    fn calculate_distance_field(&self, distance: &mut [u16]) {
        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let area = self.areas[i];
                    let same_area_neighbors = (0..4)
                        .filter_map(|dir| self.neighbor(x, z, i, dir))
                        .filter(|(_, _, neighbor)| self.areas[*neighbor] == area)
                        .count();
                    if same_area_neighbors != 4 {
                        distance[i] = 0;
                    }
                }
            }
        }

        let relax = |distance: &mut [u16], target: usize, source: usize, cost: u32| {
            let new_distance = distance[source] as u32 + cost;
            if new_distance < distance[target] as u32 {
                distance[target] = new_distance as u16;
            }
        };

        // Pass 1
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if let Some((ax, az, a)) = self.neighbor(x, z, i, 0) {
                        // (-1,0)
                        relax(distance, i, a, 2);
                        // (-1,-1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 3) {
                            relax(distance, i, aa, 3);
                        }
                    }
                    if let Some((ax, az, a)) = self.neighbor(x, z, i, 3) {
                        // (0,-1)
                        relax(distance, i, a, 2);
                        // (1,-1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 2) {
                            relax(distance, i, aa, 3);
                        }
                    }
                }
            }
        }

        // Pass 2
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                for i in self.cell_at(x, z).index_range() {
                    if let Some((ax, az, a)) = self.neighbor(x, z, i, 2) {
                        // (1,0)
                        relax(distance, i, a, 2);
                        // (1,1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 1) {
                            relax(distance, i, aa, 3);
                        }
                    }
                    if let Some((ax, az, a)) = self.neighbor(x, z, i, 1) {
                        // (0,1)
                        relax(distance, i, a, 2);
                        // (-1,1)
                        if let Some((_, _, aa)) = self.neighbor(ax, az, a, 0) {
                            relax(distance, i, aa, 3);
                        }
                    }
                }
            }
        }
    }

    /// Averages each span's distance with its 8 neighbours. Spans within `threshold` cells of a boundary are kept as is.
    fn box_blur(&self, threshold: u16, src: &[u16], dst: &mut [u16]) {
        let threshold = threshold as u32 * 2;
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let center = src[i] as u32;
                    if center <= threshold {
                        dst[i] = center as u16;
                        continue;
                    }
                    let mut sum = center;
                    for dir in 0..4 {
                        let Some((ax, az, a)) = self.neighbor(x, z, i, dir) else {
                            sum += center * 2;
                            continue;
                        };
                        sum += src[a] as u32;
                        let diagonal_dir = (dir + 1) & 0x3;
                        match self.neighbor(ax, az, a, diagonal_dir) {
                            Some((_, _, aa)) => sum += src[aa] as u32,
                            None => sum += center,
                        }
                    }
                    dst[i] = ((sum + 5) / 9) as u16;
                }
            }
        }
    }
}

/// Errors that can occur during [`CompactHeightfield::build_distance_field`].
#[derive(Error, Debug)]
pub enum DistanceFieldError {
    /// The distance buffers could not be allocated.
    #[error("Out of memory while allocating {len} span distances")]
    OutOfMemory {
        /// Number of entries that were requested
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use crate::compact_heightfield::tests::flat_compact_heightfield;

    #[test]
    fn distance_grows_towards_center() {
        let mut compact = flat_compact_heightfield(1.0);
        compact.build_distance_field(0).unwrap();
        let edge = compact.cell_at(0, 5).index() as usize;
        let next = compact.cell_at(1, 5).index() as usize;
        let center = compact.cell_at(5, 5).index() as usize;
        assert_eq!(compact.dist[edge], 0);
        assert_eq!(compact.dist[next], 2);
        assert!(compact.dist[center] > compact.dist[next]);
        assert_eq!(compact.max_distance, 8);
    }

    #[test]
    fn blur_keeps_boundary_values() {
        let mut compact = flat_compact_heightfield(1.0);
        compact.build_distance_field(1).unwrap();
        let edge = compact.cell_at(0, 5).index() as usize;
        let next = compact.cell_at(1, 5).index() as usize;
        assert_eq!(compact.dist[edge], 0);
        assert_eq!(compact.dist[next], 2);
        assert_eq!(compact.dist.len(), compact.spans.len());
    }
}
