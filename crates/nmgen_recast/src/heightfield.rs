//! The heightfield module contains the types and functions for working with [`Heightfield`]s.
//!
//! A heightfield is a 3D grid of [`Span`]s, where each column contains 0, 1, or more spans.

use thiserror::Error;

use crate::{
    Aabb3d,
    span::{Span, SpanKey, Spans},
};

/// A dense grid of span columns produced by rasterizing solid geometry.
/// Build with [`HeightfieldBuilder`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Heightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The indices to the spans in the heightfield in width*height order
    /// Each index corresponds to a column in the heightfield by pointing to the lowest span in the column
    pub spans: Vec<Option<SpanKey>>,
    /// All spans in the heightfield
    pub allocated_spans: Spans,
}

impl Heightfield {
    #[inline]
    pub(crate) fn add_span(&mut self, insertion: SpanInsertion) -> Result<(), SpanInsertionError> {
        let column_index = self.column_index(insertion.x, insertion.z);
        if column_index >= self.spans.len() {
            return Err(SpanInsertionError::ColumnIndexOutOfBounds {
                x: insertion.x,
                z: insertion.z,
            });
        }

        let mut new_span = insertion.span;
        let mut previous_span_key = None;
        let mut current_span_key_iter = self.spans[column_index];
        // Insert the new span, possibly merging it with existing spans.
        while let Some(current_span_key) = current_span_key_iter {
            let current_span = self.span(current_span_key).clone();
            if current_span.min > new_span.max {
                // Current span is completely above the new span, break.
                break;
            }
            current_span_key_iter = current_span.next;
            if current_span.max < new_span.min {
                // Current span is completely below the new span. Keep going.
                previous_span_key = Some(current_span_key);
                continue;
            }
            // The new span overlaps with an existing span. Merge them.
            if current_span.min < new_span.min {
                new_span.set_min(current_span.min);
            }
            if current_span.max > new_span.max {
                new_span.set_max(current_span.max);
            }

            // Merge flags.
            if (new_span.max as i32 - current_span.max as i32).unsigned_abs()
                <= insertion.flag_merge_threshold as u32
            {
                // Higher area ID numbers indicate higher resolution priority.
                let area = new_span.area.max(current_span.area);
                new_span.set_area(area);
            }

            // Remove the current span since it's now merged with the new span.
            // Keep going because there might be other overlapping spans that also need to be merged.
            self.allocated_spans.remove(current_span_key);
            if let Some(previous_span_key) = previous_span_key {
                self.span_mut(previous_span_key).set_next(current_span.next);
            } else {
                self.spans[column_index] = current_span.next;
            }
        }

        if let Some(previous_span_key) = previous_span_key {
            // Insert new span after prev
            new_span.set_next(self.span(previous_span_key).next);
            let new_span_key = self.allocated_spans.insert(new_span);
            self.span_mut(previous_span_key).set_next(new_span_key);
        } else {
            // This span should go before the others in the list
            new_span.set_next(self.spans[column_index]);
            let new_span_key = self.allocated_spans.insert(new_span);
            self.spans[column_index] = Some(new_span_key);
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.height as i32
    }

    /// Returns the key of the lowest span in the column at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_key_at(&self, x: u16, z: u16) -> Option<SpanKey> {
        if x >= self.width || z >= self.height {
            return None;
        }
        self.spans.get(self.column_index(x, z)).copied().flatten()
    }

    /// Returns the span at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_at(&self, x: u16, z: u16) -> Option<&Span> {
        let span_key = self.span_key_at(x, z)?;
        Some(self.span(span_key))
    }

    /// Returns a reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span(&self, key: SpanKey) -> &Span {
        &self.allocated_spans[key]
    }

    /// Returns a mutable reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span_mut(&mut self, key: SpanKey) -> &mut Span {
        &mut self.allocated_spans[key]
    }

    /// Iterates over the keys of all spans in the column at the given coordinates, lowest first.
    pub fn column_keys(&self, x: u16, z: u16) -> impl Iterator<Item = SpanKey> + '_ {
        std::iter::successors(self.span_key_at(x, z), |key| self.span(*key).next)
    }

    /// Total number of spans in the heightfield.
    pub fn span_count(&self) -> usize {
        self.allocated_spans.len()
    }

    /// Number of spans whose area is walkable.
    pub fn walkable_span_count(&self) -> usize {
        self.allocated_spans
            .values()
            .filter(|span| span.area.is_walkable())
            .count()
    }
}

/// A builder for [`Heightfield`]s.
pub struct HeightfieldBuilder {
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// The grid dimensions the builder would produce, `(width, height)` in cells.
    pub fn grid_size(&self) -> (f32, f32) {
        let width = ((self.aabb.max.x - self.aabb.min.x) / self.cell_size + 0.5).floor();
        let height = ((self.aabb.max.z - self.aabb.min.z) / self.cell_size + 0.5).floor();
        (width, height)
    }

    /// Builds the heightfield.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell sizes are not positive, if a grid axis exceeds `u16::MAX` cells,
    /// or if the column array cannot be allocated.
    pub fn build(self) -> Result<Heightfield, HeightfieldBuilderError> {
        if !(self.cell_size > 0.0) || !(self.cell_height > 0.0) {
            return Err(HeightfieldBuilderError::InvalidCellSize {
                cell_size: self.cell_size,
                cell_height: self.cell_height,
            });
        }
        let (width, height) = self.grid_size();
        if !(width <= u16::MAX as f32) || !(height <= u16::MAX as f32) {
            return Err(HeightfieldBuilderError::GridTooLarge { width, height });
        }
        let width = width.max(0.0) as u16;
        let height = height.max(0.0) as u16;
        let column_count = width as usize * height as usize;

        let mut spans = Vec::new();
        spans
            .try_reserve_exact(column_count)
            .map_err(|_| HeightfieldBuilderError::OutOfMemory { column_count })?;
        spans.resize(column_count, None);

        Ok(Heightfield {
            width,
            height,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            spans,
            allocated_spans: Spans::with_min_capacity(column_count),
        })
    }
}

/// Errors that can occur when building a [`Heightfield`] with [`HeightfieldBuilder::build`].
#[derive(Error, Debug)]
pub enum HeightfieldBuilderError {
    /// Happens when a cell dimension is zero, negative or NaN.
    #[error("Cell size and cell height must be positive, got {cell_size} and {cell_height}")]
    InvalidCellSize {
        /// The size of each cell on the xz-plane
        cell_size: f32,
        /// The size of each cell along the y-axis
        cell_height: f32,
    },
    /// Happens when a grid axis has more cells than fit in a `u16`.
    #[error("Grid is too large, got {width}x{height} cells but max is {max} per axis", max = u16::MAX)]
    GridTooLarge {
        /// The width of the heightfield along the x-axis in cell units
        width: f32,
        /// The height of the heightfield along the z-axis in cell units
        height: f32,
    },
    /// Happens when the column array cannot be allocated.
    #[error("Out of memory while allocating {column_count} heightfield columns")]
    OutOfMemory {
        /// Number of columns that were requested
        column_count: usize,
    },
}

/// Errors that can occur when inserting a span into a [`Heightfield`]
#[derive(Error, Debug)]
pub enum SpanInsertionError {
    /// Happens when the column index is out of bounds.
    #[error("column index out of bounds: x={x}, z={z}")]
    ColumnIndexOutOfBounds {
        /// The x-coordinate of the span
        x: u16,
        /// The z-coordinate of the span
        z: u16,
    },
}

pub(crate) struct SpanInsertion {
    /// The x-coordinate of the span
    pub(crate) x: u16,
    /// The z-coordinate of the span
    pub(crate) z: u16,
    /// Maximum difference between the ceilings of two spans to merge area type IDs
    pub(crate) flag_merge_threshold: u16,
    /// The span to insert
    pub(crate) span: Span,
}
