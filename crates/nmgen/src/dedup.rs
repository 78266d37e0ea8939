//! Tolerance-based merging of near-identical vertices.

use glam::Vec3;

/// The per-axis distance below which two vertices are considered the same. `[Units: wu]`
pub const DEDUP_TOLERANCE: f32 = 0.0001;

/// The output of [`deduplicate_vertices`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DedupResult {
    /// The unique vertices in the order they were first seen.
    pub vertices: Vec<Vec3>,
    /// For every input vertex, the index of its unique counterpart in [`DedupResult::vertices`].
    pub remap: Vec<u32>,
}

/// Merges vertices that are within [`DEDUP_TOLERANCE`] of each other on every axis.
///
/// Each vertex is compared against the unique vertices accepted so far, in order, and mapped to the first match.
/// This is quadratic in the number of unique vertices, which is fine for detail meshes.
pub fn deduplicate_vertices(vertices: &[Vec3]) -> DedupResult {
    let mut unique: Vec<Vec3> = Vec::new();
    let remap = vertices
        .iter()
        .map(|vertex| {
            let index = match unique.iter().position(|u| sloppy_equals(*u, *vertex)) {
                Some(index) => index,
                None => {
                    unique.push(*vertex);
                    unique.len() - 1
                }
            };
            index as u32
        })
        .collect();
    DedupResult {
        vertices: unique,
        remap,
    }
}

fn sloppy_equals(a: Vec3, b: Vec3) -> bool {
    let within = |a: f32, b: f32| !(b < a - DEDUP_TOLERANCE || b > a + DEDUP_TOLERANCE);
    within(a.x, b.x) && within(a.y, b.y) && within(a.z, b.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_boundary() {
        let merged = deduplicate_vertices(&[Vec3::ZERO, Vec3::new(0.0001, 0.0, 0.0)]);
        assert_eq!(merged.vertices, [Vec3::ZERO]);
        assert_eq!(merged.remap, [0, 0]);

        let kept = deduplicate_vertices(&[Vec3::ZERO, Vec3::new(0.00011, 0.0, 0.0)]);
        assert_eq!(kept.vertices.len(), 2);
        assert_eq!(kept.remap, [0, 1]);
    }

    #[test]
    fn every_axis_is_checked() {
        let result = deduplicate_vertices(&[
            Vec3::ZERO,
            Vec3::new(0.0, 0.01, 0.0),
            Vec3::new(0.0, 0.0, 0.01),
            Vec3::new(0.00005, 0.00005, -0.00005),
        ]);
        assert_eq!(result.vertices.len(), 3);
        assert_eq!(result.remap, [0, 1, 2, 0]);
    }

    #[test]
    fn first_seen_order_is_kept() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(-1.0, 0.0, 5.0);
        let c = Vec3::new(4.0, 4.0, 4.0);
        let result = deduplicate_vertices(&[b, a, b, c, a]);
        assert_eq!(result.vertices, [b, a, c]);
        assert_eq!(result.remap, [0, 1, 0, 2, 1]);
    }

    #[test]
    fn deduplicating_twice_changes_nothing() {
        let input = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(0.50005, 0.0, 0.0),
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(0.0, 0.00002, 0.0),
        ];
        let once = deduplicate_vertices(&input);
        let twice = deduplicate_vertices(&once.vertices);
        assert_eq!(twice.vertices, once.vertices);
        assert_eq!(twice.remap, (0..once.vertices.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn distinct_vertices_are_all_kept() {
        let input: Vec<_> = (0..20).map(|i| Vec3::new(i as f32 * 0.001, 0.0, 0.0)).collect();
        let result = deduplicate_vertices(&input);
        assert_eq!(result.vertices, input);
        assert_eq!(result.remap, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn output_is_deterministic() {
        let input: Vec<_> = (0..50)
            .map(|i| Vec3::new((i % 7) as f32 * 0.00003, (i % 3) as f32, 0.0))
            .collect();
        assert_eq!(deduplicate_vertices(&input), deduplicate_vertices(&input));
    }

    #[test]
    fn empty_input() {
        assert_eq!(deduplicate_vertices(&[]), DedupResult::default());
    }
}
