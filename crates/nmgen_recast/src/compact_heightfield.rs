use thiserror::Error;

use crate::{
    Aabb3d,
    compact_cell::CompactCell,
    compact_span::CompactSpan,
    heightfield::Heightfield,
    math::{self, dir_offset_x, dir_offset_z},
    region::RegionId,
    span::AreaType,
};

/// A packed representation of the open space above the walkable spans of a [`Heightfield`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactHeightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The walkable height used during the build of the field
    pub walkable_height: u16,
    /// The walkable climb used during the build of the field.
    pub walkable_climb: u16,
    /// The AABB border size used during the build of the field.
    pub border_size: u16,
    /// The maximum distance value of any span within the field.
    pub max_distance: u16,
    /// The maximum region id of any span within the field.
    pub max_region: RegionId,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The cells in the heightfield [Size: `width * height`]
    pub cells: Vec<CompactCell>,
    /// All walkable spans in the heightfield
    pub spans: Vec<CompactSpan>,
    /// Vector containing border distance data. [Size: `spans.len()`]
    pub dist: Vec<u16>,
    /// Vector containing area type data. [Size: `spans.len()`]
    pub areas: Vec<AreaType>,
}

impl Heightfield {
    /// Builds a compact heightfield from the walkable spans, consuming the heightfield.
    ///
    /// # Errors
    ///
    /// Returns an error if the heightfield has too many layers or the span arrays cannot be allocated.
    pub fn into_compact(
        self,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<CompactHeightfield, CompactHeightfieldError> {
        CompactHeightfield::from_heightfield(self, walkable_height, walkable_climb)
    }
}

impl CompactHeightfield {
    const MAX_HEIGHT: u32 = 0xffff;

    /// Builds a compact heightfield from a heightfield.
    ///
    /// # Errors
    ///
    /// Returns an error if the heightfield has too many layers or the span arrays cannot be allocated.
    pub fn from_heightfield(
        heightfield: Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<Self, CompactHeightfieldError> {
        let walkable_span_count = heightfield.walkable_span_count();
        let column_count = heightfield.width as usize * heightfield.height as usize;

        let cells = try_filled(column_count, CompactCell::default())?;
        let spans = try_filled(walkable_span_count, CompactSpan::default())?;
        let areas = try_filled(walkable_span_count, AreaType::NOT_WALKABLE)?;

        let mut compact_heightfield = Self {
            width: heightfield.width,
            height: heightfield.height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            aabb: heightfield.aabb,
            max_distance: 0,
            max_region: RegionId::NONE,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells,
            spans,
            dist: Vec::new(),
            areas,
        };
        compact_heightfield.aabb.max.y += walkable_height as f32 * compact_heightfield.cell_height;

        let mut span_index = 0_usize;
        // Fill in cells and spans
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let Some(span_key) = heightfield.span_key_at(x, z) else {
                    // If there are no spans at this cell, just leave the data to index=0, count=0.
                    continue;
                };
                let column_index = heightfield.column_index(x, z);
                let cell = &mut compact_heightfield.cells[column_index];
                cell.set_index(span_index as u32);

                let mut span_key_iter = Some(span_key);
                while let Some(span_key) = span_key_iter {
                    let span = heightfield.span(span_key);
                    span_key_iter = span.next;
                    if !span.area.is_walkable() {
                        continue;
                    }
                    let bot = span.max as u32;
                    let top = span
                        .next
                        .map_or(Self::MAX_HEIGHT, |next| heightfield.span(next).min as u32);
                    let compact_span = &mut compact_heightfield.spans[span_index];
                    compact_span.y = bot.min(Self::MAX_HEIGHT) as u16;
                    compact_span.set_height(top.saturating_sub(bot).min(u8::MAX as u32) as u8);
                    compact_heightfield.areas[span_index] = span.area;
                    span_index += 1;
                    cell.inc_count();
                }
            }
        }
        // The solid heightfield is no longer needed.
        drop(heightfield);

        // Find neighbour connections
        const MAX_LAYERS: u8 = CompactSpan::NOT_CONNECTED - 1;
        let mut max_layer_index = 0_usize;
        for z in 0..compact_heightfield.height {
            for x in 0..compact_heightfield.width {
                let cell = *compact_heightfield.cell_at(x, z);
                for i in cell.index_range() {
                    let span = compact_heightfield.spans[i];
                    for dir in 0..4_u8 {
                        compact_heightfield.spans[i].set_con(dir, None);
                        let neighbor_x = x as i32 + dir_offset_x(dir);
                        let neighbor_z = z as i32 + dir_offset_z(dir);
                        // First check that the neighbour cell is in bounds.
                        if !compact_heightfield.contains(neighbor_x, neighbor_z) {
                            continue;
                        }

                        // Iterate over all neighbour spans and check if any of them is
                        // accessible from the current cell.
                        let neighbor_cell =
                            *compact_heightfield.cell_at(neighbor_x as u16, neighbor_z as u16);
                        for k in neighbor_cell.index_range() {
                            let neighbor_span = compact_heightfield.spans[k];
                            let bot = span.y.max(neighbor_span.y) as i32;
                            let top = (span.y as i32 + span.height() as i32)
                                .min(neighbor_span.y as i32 + neighbor_span.height() as i32);

                            // Check that the gap between the spans is walkable,
                            // and that the climb height between the gaps is not too high.
                            let is_walkable = top - bot >= walkable_height as i32;
                            let is_climbable = (neighbor_span.y as i32 - span.y as i32).abs()
                                <= walkable_climb as i32;
                            if !is_walkable || !is_climbable {
                                continue;
                            }
                            // Mark direction as walkable.
                            let layer_index = k - neighbor_cell.index() as usize;
                            if layer_index > MAX_LAYERS as usize {
                                max_layer_index = max_layer_index.max(layer_index);
                                continue;
                            }
                            compact_heightfield.spans[i].set_con(dir, Some(layer_index as u8));
                            break;
                        }
                    }
                }
            }
        }
        if max_layer_index > MAX_LAYERS as usize {
            return Err(CompactHeightfieldError::TooManyLayers {
                max_layer_index: MAX_LAYERS,
                layer_index: max_layer_index,
            });
        }
        Ok(compact_heightfield)
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.height as i32
    }

    /// Returns the cell at the given coordinates. Returns `None` if the coordinates are invalid.
    #[inline]
    pub fn get_cell_at(&self, x: u16, z: u16) -> Option<&CompactCell> {
        if x >= self.width || z >= self.height {
            return None;
        }
        self.cells.get(self.column_index(x, z))
    }

    /// Returns the cell at the given coordinates. Panics if the coordinates are invalid.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> &CompactCell {
        &self.cells[self.column_index(x, z)]
    }

    /// Index of the span connected to span `span` of column `(x, z)` in `direction`, if any.
    ///
    /// Returns the neighbor's coordinates along with its span index.
    #[inline]
    pub(crate) fn neighbor(&self, x: u16, z: u16, span: usize, direction: u8) -> Option<(u16, u16, usize)> {
        let con = self.spans[span].con(direction)?;
        let neighbor_x = (x as i32 + dir_offset_x(direction)) as u16;
        let neighbor_z = (z as i32 + dir_offset_z(direction)) as u16;
        let index = self.cell_at(neighbor_x, neighbor_z).index() as usize + con as usize;
        Some((neighbor_x, neighbor_z, index))
    }

    /// Number of spans that still carry a walkable area.
    pub fn walkable_span_count(&self) -> usize {
        self.areas.iter().filter(|area| area.is_walkable()).count()
    }
}

fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>, CompactHeightfieldError> {
    math::try_filled(len, value).map_err(|_| CompactHeightfieldError::OutOfMemory { len })
}

/// Errors that can occur when building a compact heightfield.
#[derive(Debug, Error)]
pub enum CompactHeightfieldError {
    /// The heightfield has too many layers.
    #[error(
        "Heightfield has too many layers. Max layer index is {max_layer_index}, but got {layer_index}"
    )]
    TooManyLayers {
        /// The maximum layer index.
        max_layer_index: u8,
        /// The layer index that caused the error.
        layer_index: usize,
    },
    /// An array of the compact heightfield could not be allocated.
    #[error("Out of memory while allocating {len} compact heightfield entries")]
    OutOfMemory {
        /// Number of entries that were requested
        len: usize,
    },
}
