use std::collections::TryReserveError;

use glam::{IVec2, UVec3, Vec2, Vec3, Vec3A};

/// An axis-aligned bounding box in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner
    pub min: Vec3,
    /// The maximum corner
    pub max: Vec3,
}

impl Aabb3d {
    /// Creates an AABB from its center and half extents.
    pub fn new(center: impl Into<Vec3>, half_size: impl Into<Vec3>) -> Self {
        let center = center.into();
        let half_size = half_size.into();
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Computes the tightest AABB around the given vertices.
    /// Returns `None` if `vertices` is empty.
    pub fn from_verts(vertices: &[Vec3A]) -> Option<Self> {
        let (first, rest) = vertices.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Self {
            min: min.into(),
            max: max.into(),
        })
    }
}

pub(crate) trait TriangleIndices {
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A;
}

impl TriangleIndices for UVec3 {
    #[inline]
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A {
        let a = vertices[self[0] as usize];
        let b = vertices[self[1] as usize];
        let c = vertices[self[2] as usize];
        let ab = b - a;
        let ac = c - a;
        ab.cross(ac).normalize_or_zero()
    }
}

/// Gets the standard width (x-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The width offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i32 {
    const OFFSET: [i32; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard height (z-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The height offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_z(direction: u8) -> i32 {
    const OFFSET: [i32; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

#[inline]
pub(crate) fn next(i: usize, n: usize) -> usize {
    if i + 1 < n { i + 1 } else { 0 }
}

#[inline]
pub(crate) fn prev(i: usize, n: usize) -> usize {
    if i >= 1 { i - 1 } else { n - 1 }
}

/// Twice the signed area of the triangle `abc` on the xz-plane.
#[inline]
pub(crate) fn area2(a: IVec2, b: IVec2, c: IVec2) -> i64 {
    (b.x - a.x) as i64 * (c.y - a.y) as i64 - (c.x - a.x) as i64 * (b.y - a.y) as i64
}

/// Returns true iff `c` is strictly to the left of the directed line through `a` to `b`.
#[inline]
pub(crate) fn left(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(crate) fn left_on(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
pub(crate) fn collinear(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) == 0
}

/// Returns true iff `ab` properly intersects `cd`: they share a point interior to both segments.
/// The properness of the intersection is ensured by using strict leftness.
pub(crate) fn intersect_prop(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    // Eliminate improper cases.
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// Returns true iff `(a, b, c)` are collinear and point `c` lies on the closed segment `ab`.
fn between(a: IVec2, b: IVec2, c: IVec2) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    // If ab not vertical, check betweenness on x; else on y.
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.y <= c.y && c.y <= b.y) || (a.y >= c.y && c.y >= b.y)
    }
}

/// Returns true iff segments `ab` and `cd` intersect, properly or improperly.
pub(crate) fn intersect(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Squared distance from `point` to the segment `(a, b)`.
pub(crate) fn distance_squared_point_segment(point: Vec2, (a, b): (Vec2, Vec2)) -> f32 {
    let ab = b - a;
    let ap = point - a;
    let d = ab.length_squared();
    let mut t = ab.dot(ap);
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    (a + ab * t - point).length_squared()
}

/// Squared distance from `point` to the segment `(a, b)` in 3D.
pub(crate) fn distance_squared_point_segment_3d(point: Vec3, (a, b): (Vec3, Vec3)) -> f32 {
    let ab = b - a;
    let ap = point - a;
    let d = ab.length_squared();
    let mut t = ab.dot(ap);
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    (a + ab * t - point).length_squared()
}

/// Allocates `len` copies of `value`, reporting allocation failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)?;
    vec.resize(len, value);
    Ok(vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_from_verts_covers_all_points() {
        let aabb = Aabb3d::from_verts(&[
            Vec3A::new(1.0, -2.0, 3.0),
            Vec3A::new(-1.0, 4.0, 0.5),
            Vec3A::new(0.0, 0.0, 5.0),
        ])
        .unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.5));
        assert_eq!(aabb.max, Vec3::new(1.0, 4.0, 5.0));
        assert!(Aabb3d::from_verts(&[]).is_none());
    }

    #[test]
    fn crossing_segments_intersect() {
        let a = IVec2::new(0, 0);
        let b = IVec2::new(4, 4);
        let c = IVec2::new(0, 4);
        let d = IVec2::new(4, 0);
        assert!(intersect_prop(a, b, c, d));
        assert!(intersect(a, b, c, d));
    }

    #[test]
    fn touching_segments_only_intersect_improperly() {
        let a = IVec2::new(0, 0);
        let b = IVec2::new(4, 0);
        let c = IVec2::new(2, 0);
        let d = IVec2::new(2, 3);
        assert!(!intersect_prop(a, b, c, d));
        assert!(intersect(a, b, c, d));
    }

    #[test]
    fn point_segment_distance_clamps_to_endpoints() {
        let seg = (Vec2::ZERO, Vec2::new(2.0, 0.0));
        assert_eq!(distance_squared_point_segment(Vec2::new(1.0, 1.0), seg), 1.0);
        assert_eq!(distance_squared_point_segment(Vec2::new(3.0, 0.0), seg), 1.0);
        assert_eq!(distance_squared_point_segment(Vec2::new(-2.0, 0.0), seg), 4.0);
    }
}
