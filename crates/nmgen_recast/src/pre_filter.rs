//! Filters that run on a freshly rasterized [`Heightfield`] to remove spans an agent cannot stand on.

use crate::{
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    span::{AreaType, SpanKey},
};

/// Open space above the topmost span of a column.
const MAX_HEIGHT: i32 = 0xffff;

impl Heightfield {
    /// Marks non-walkable spans as walkable if their maximum is within `walkable_climb` of the span below them.
    ///
    /// This removes small obstacles and rasterization artifacts that the agent would be able to walk over
    /// such as curbs. It also allows agents to move up terraced structures like stairs.
    ///
    /// Obstacle spans are marked walkable if: `obstacle_span.max - walkable_span.max < walkable_climb`
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: u16) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut previous: Option<SpanKey> = None;
                let mut previous_was_walkable = false;
                let mut previous_area = AreaType::NOT_WALKABLE;

                let mut span_key_iter = self.span_key_at(x, z);
                while let Some(span_key) = span_key_iter {
                    let span = self.span(span_key);
                    span_key_iter = span.next;
                    let walkable = span.area.is_walkable();
                    let span_max = span.max;
                    // If current span is not walkable, but there is walkable span just below it and the height
                    // difference is small enough for the agent to walk over, mark the current span as walkable too.
                    if let Some(previous) = previous
                        && !walkable
                        && previous_was_walkable
                        && span_max as i32 - self.span(previous).max as i32 <= walkable_climb as i32
                    {
                        self.span_mut(span_key).set_area(previous_area);
                    }
                    // Copy the original walkable value regardless of whether we changed it.
                    // This prevents multiple consecutive non-walkable spans from being erroneously marked as walkable.
                    previous_was_walkable = walkable;
                    previous_area = self.span(span_key).area;
                    previous = Some(span_key);
                }
            }
        }
    }

    /// Marks spans that are ledges as not-walkable.
    ///
    /// A ledge is a span with one or more neighbors whose maximum is further away than `walkable_climb`
    /// from the current span's maximum.
    /// This method removes the impact of the overestimation of conservative voxelization
    /// so the resulting mesh will not have regions hanging in the air over ledges.
    ///
    /// A span is a ledge if: `|current_span.max - neighbor_span.max| > walkable_climb`
    pub fn filter_ledge_spans(&mut self, walkable_height: u16, walkable_climb: u16) {
        let walkable_height = walkable_height as i32;
        let walkable_climb = walkable_climb as i32;
        let mut ledges = Vec::new();
        for z in 0..self.height {
            for x in 0..self.width {
                for span_key in self.column_keys(x, z) {
                    let span = self.span(span_key);
                    // Skip non-walkable spans.
                    if !span.area.is_walkable() {
                        continue;
                    }
                    let floor = span.max as i32;
                    let ceiling = span
                        .next
                        .map_or(MAX_HEIGHT, |next| self.span(next).min as i32);

                    // The difference between this walkable area and the lowest neighbor walkable area.
                    // This is the difference between the current span and all neighbor spans that have
                    // enough space for an agent to move between, but not accounting at all for surface slope.
                    let mut lowest_neighbor_floor_difference = MAX_HEIGHT;

                    // Min and max height of accessible neighbours.
                    let mut lowest_traversable_neighbor_floor = floor;
                    let mut highest_traversable_neighbor_floor = floor;

                    for direction in 0..4 {
                        let neighbor_x = x as i32 + dir_offset_x(direction);
                        let neighbor_z = z as i32 + dir_offset_z(direction);
                        // Skip neighbours which are out of bounds.
                        if !self.contains(neighbor_x, neighbor_z) {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }
                        let mut neighbor_key = self.span_key_at(neighbor_x as u16, neighbor_z as u16);

                        // The most we can step down to the neighbor is the walkable climb distance.
                        let neighbor_ceiling =
                            neighbor_key.map_or(MAX_HEIGHT, |key| self.span(key).min as i32);

                        // Skip neighbour if the gap between the spans is too small.
                        if ceiling.min(neighbor_ceiling) - floor >= walkable_height {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }

                        // For each span in the neighboring column...
                        while let Some(key) = neighbor_key {
                            let neighbor_span = self.span(key);
                            neighbor_key = neighbor_span.next;
                            let neighbor_floor = neighbor_span.max as i32;
                            let neighbor_ceiling = neighbor_span
                                .next
                                .map_or(MAX_HEIGHT, |next| self.span(next).min as i32);

                            // Only consider neighboring areas that have enough overlap to be potentially traversable.
                            if ceiling.min(neighbor_ceiling) - floor.max(neighbor_floor) < walkable_height {
                                // No space to traverse between them.
                                continue;
                            }

                            let neighbor_floor_difference = neighbor_floor - floor;
                            lowest_neighbor_floor_difference =
                                lowest_neighbor_floor_difference.min(neighbor_floor_difference);

                            // Find min/max accessible neighbor height.
                            // Only consider neighbors that are at most walkable_climb away.
                            if neighbor_floor_difference.abs() <= walkable_climb {
                                // There is space to move to the neighbor cell and the slope isn't too much.
                                lowest_traversable_neighbor_floor =
                                    lowest_traversable_neighbor_floor.min(neighbor_floor);
                                highest_traversable_neighbor_floor =
                                    highest_traversable_neighbor_floor.max(neighbor_floor);
                            } else if neighbor_floor_difference < -walkable_climb {
                                // We already know this will be considered a ledge span so we can early-out.
                                break;
                            }
                        }
                    }

                    // The current span is close to a ledge if the magnitude of the drop to any neighbour span
                    // is greater than the walkable climb distance.
                    // That is, there is a gap that is large enough to let an agent move between them, but the drop
                    // (surface slope) is too large to allow it.
                    if lowest_neighbor_floor_difference < -walkable_climb
                        // If the difference between all neighbor floors is too large, this is a steep slope,
                        // so mark the span as an unwalkable ledge.
                        || highest_traversable_neighbor_floor - lowest_traversable_neighbor_floor
                            > walkable_climb
                    {
                        ledges.push(span_key);
                    }
                }
            }
        }
        for span_key in ledges {
            self.span_mut(span_key).set_area(AreaType::NOT_WALKABLE);
        }
    }

    /// Marks walkable spans as not walkable if the clearance above the span is less than the specified walkable height.
    ///
    /// For this filter, the clearance above the span is the distance from the span's
    /// maximum to the minimum of the next higher span in the same column.
    /// If there is no higher span in the column, the clearance is computed as the
    /// distance from the top of the span to the maximum heightfield height.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: u16) {
        let mut too_low = Vec::new();
        for (span_key, span) in self.allocated_spans.iter() {
            if !span.area.is_walkable() {
                continue;
            }
            let floor = span.max as i32;
            let ceiling = span
                .next
                .map_or(MAX_HEIGHT, |next| self.span(next).min as i32);
            if ceiling - floor < walkable_height as i32 {
                too_low.push(span_key);
            }
        }
        for span_key in too_low {
            self.span_mut(span_key).set_area(AreaType::NOT_WALKABLE);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use crate::{
        Aabb3d, HeightfieldBuilder,
        heightfield::SpanInsertion,
        span::SpanBuilder,
    };

    use super::*;

    fn heightfield(size: f32) -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::splat(size / 2.0), [size / 2.0; 3]),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn insert(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16, area: AreaType) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: 0,
                span: SpanBuilder {
                    min,
                    max,
                    area,
                    next: None,
                }
                .build(),
            })
            .unwrap();
    }

    fn fill_floor(heightfield: &mut Heightfield, max: u16) {
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                insert(heightfield, x, z, 0, max, AreaType::DEFAULT_WALKABLE);
            }
        }
    }

    #[test]
    fn low_hanging_obstacle_becomes_walkable() {
        let mut heightfield = heightfield(3.0);
        insert(&mut heightfield, 1, 1, 0, 2, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 1, 1, 3, 4, AreaType::NOT_WALKABLE);
        heightfield.filter_low_hanging_walkable_obstacles(2);
        let areas: Vec<_> = heightfield
            .column_keys(1, 1)
            .map(|key| heightfield.span(key).area)
            .collect();
        assert_eq!(areas, vec![AreaType::DEFAULT_WALKABLE; 2]);
    }

    #[test]
    fn tall_obstacle_stays_unwalkable() {
        let mut heightfield = heightfield(3.0);
        insert(&mut heightfield, 1, 1, 0, 2, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 1, 1, 3, 9, AreaType::NOT_WALKABLE);
        heightfield.filter_low_hanging_walkable_obstacles(2);
        let top = heightfield.column_keys(1, 1).last().unwrap();
        assert_eq!(heightfield.span(top).area, AreaType::NOT_WALKABLE);
    }

    #[test]
    fn grid_edges_are_ledges() {
        let mut heightfield = heightfield(4.0);
        fill_floor(&mut heightfield, 1);
        heightfield.filter_ledge_spans(2, 1);
        for z in 0..4 {
            for x in 0..4 {
                let interior = (1..3).contains(&x) && (1..3).contains(&z);
                let area = heightfield.span_at(x, z).unwrap().area;
                assert_eq!(area.is_walkable(), interior, "column [{x}, {z}]");
            }
        }
    }

    #[test]
    fn cramped_spans_are_filtered() {
        let mut heightfield = heightfield(3.0);
        insert(&mut heightfield, 0, 0, 0, 1, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 0, 0, 3, 4, AreaType::DEFAULT_WALKABLE);
        heightfield.filter_walkable_low_height_spans(3);
        let areas: Vec<_> = heightfield
            .column_keys(0, 0)
            .map(|key| heightfield.span(key).area)
            .collect();
        assert_eq!(areas, vec![AreaType::NOT_WALKABLE, AreaType::DEFAULT_WALKABLE]);
    }
}
