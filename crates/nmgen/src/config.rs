//! Build parameters and the voxel-unit settings derived from them.

use nmgen_recast::{Aabb3d, MAX_VERTICES_PER_POLYGON};

/// Parameters for a single navmesh build. Every value is in world units unless noted otherwise.
///
/// The pipeline converts the world-unit values into voxel counts with [`BuildParameters::voxel_settings`]
/// once the bounds of the source mesh are known.
///
/// A build only accepts parameters that have been passed through [`BuildParameters::apply_limits`].
/// [`build_navmesh`](crate::build_navmesh) does this on its own copy, so callers only need to normalize
/// when they want to inspect the values that will actually be used.
///
/// > Note:
/// >
/// > The defaults describe a human-sized agent in a world that uses meters as units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildParameters {
    /// The xz-plane voxel size to use when sampling the source geometry. `[Limit: > 0] [Units: wu]`
    ///
    /// Smaller values increase the fidelity of the generated mesh at the cost of build time,
    /// which grows with the square of the grid resolution.
    /// A good starting point is a third of the agent radius.
    pub xz_cell_size: f32,

    /// The y-axis voxel size to use when sampling the source geometry. `[Limit: > 0] [Units: wu]`
    ///
    /// The vertical resolution is kept separate so height tests can be more precise than the grid.
    /// A good starting point is half of [`Self::xz_cell_size`].
    pub y_cell_size: f32,

    /// Minimum floor to 'ceiling' height that still allows the floor area to be considered traversable.
    /// `[Limit: > 0] [Units: wu]`
    ///
    /// Permits detection of overhangs that make the geometry below them untraversable.
    /// Usually the height of the agent.
    pub min_traversable_height: f32,

    /// Maximum ledge height that is still considered traversable. `[Limit: >= 0] [Units: wu]`
    ///
    /// Allows the mesh to flow over curbs and up and down stairs.
    pub max_traversable_step: f32,

    /// The maximum slope that is considered traversable. `[Limits: 0 <= value <= 85] [Units: Degrees]`
    pub max_traversable_slope: f32,

    /// Whether ledges should be marked as untraversable.
    ///
    /// A ledge is a span with a neighbor whose maximum is further down than [`Self::max_traversable_step`].
    pub clip_ledges: bool,

    /// The closest the mesh may come to an obstruction. `[Limit: >= 0] [Units: wu]`
    ///
    /// Usually the agent radius. A value of zero produces a mesh that hugs every wall,
    /// which means a runtime has to collide the whole agent cylinder with the mesh edges.
    pub traversable_area_border_size: f32,

    /// The size of the non-traversable border around the heightfield. `[Limit: >= 0] [Units: wu]`
    ///
    /// Only needed when meshes are built in tiles that must line up. The border is not
    /// part of the final mesh.
    pub heightfield_border_size: f32,

    /// The number of smoothing passes applied to the distance field before regions are formed.
    /// `[Limits: 0 <= value <= 4]`
    ///
    /// Higher values produce rounder regions at the cost of extra work.
    pub smoothing_threshold: u8,

    /// The minimum number of spans an isolated island needs to be kept. `[Limit: >= 1] [Units: spans]`
    ///
    /// Removes the tiny islands that form on table tops, box tops and the like.
    pub min_island_region_size: u16,

    /// Regions with fewer spans than this are merged into a larger neighbor if possible. `[Limit: >= 0] [Units: spans]`
    pub merge_region_size: u16,

    /// The maximum length of a contour edge along the border of the mesh. `[Limit: >= 0] [Units: wu]`
    ///
    /// Long border edges produce long thin triangles. Extra vertices are inserted to keep every edge below this length.
    /// Zero disables the feature.
    pub max_edge_length: f32,

    /// The maximum distance a simplified contour may deviate from the raw contour. `[Limit: >= 0] [Units: vx]`
    ///
    /// Good values are in the range `[1.1, 1.5]`. Lower values produce saw-tooth edges.
    /// Higher values cut corners.
    pub edge_max_deviation: f32,

    /// The distance between height samples on the detail mesh edges. `[Limits: 0 or >= 0.9] [Units: wu]`
    ///
    /// Values below 0.9 disable sampling, so the detail mesh only contains the polygon mesh vertices.
    pub contour_sample_distance: f32,

    /// The maximum distance the detail mesh surface may deviate from the heightfield. `[Limit: >= 0] [Units: wu]`
    pub contour_max_deviation: f32,

    /// The maximum number of vertices per polygon in the polygon mesh. `[Limits: 3 <= value <= 6]`
    pub max_verts_per_poly: u16,
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self {
            xz_cell_size: 0.2,
            y_cell_size: 0.1,
            min_traversable_height: 1.5,
            max_traversable_step: 0.25,
            max_traversable_slope: 45.5,
            clip_ledges: false,
            traversable_area_border_size: 0.2,
            heightfield_border_size: 0.0,
            smoothing_threshold: 1,
            min_island_region_size: 1,
            merge_region_size: 4,
            max_edge_length: 0.0,
            edge_max_deviation: 2.0,
            contour_sample_distance: 8.0,
            contour_max_deviation: 2.0,
            max_verts_per_poly: 6,
        }
    }
}

impl BuildParameters {
    /// The lower bound of the voxel sizes and the traversable height.
    pub const EPSILON: f32 = 0.00001;
    /// The steepest slope that can be declared traversable, in degrees.
    pub const MAX_ALLOWED_SLOPE: f32 = 85.0;
    /// The highest number of distance field smoothing passes.
    pub const MAX_SMOOTHING: u8 = 4;
    /// Sample distances below this value disable detail sampling.
    pub const MIN_SAMPLE_DISTANCE: f32 = 0.9;

    /// Clamps every value into its legal range.
    ///
    /// This never fails. NaN values are replaced with the lower bound of their range.
    pub fn apply_limits(&mut self) {
        self.xz_cell_size = at_least(self.xz_cell_size, Self::EPSILON);
        self.y_cell_size = at_least(self.y_cell_size, Self::EPSILON);
        self.min_traversable_height = at_least(self.min_traversable_height, Self::EPSILON);
        self.max_traversable_step = at_least(self.max_traversable_step, 0.0);
        self.max_traversable_slope =
            at_least(self.max_traversable_slope, 0.0).min(Self::MAX_ALLOWED_SLOPE);
        self.traversable_area_border_size = at_least(self.traversable_area_border_size, 0.0);
        self.heightfield_border_size = at_least(self.heightfield_border_size, 0.0);
        self.smoothing_threshold = self.smoothing_threshold.min(Self::MAX_SMOOTHING);
        self.min_island_region_size = self.min_island_region_size.max(1);
        self.max_edge_length = at_least(self.max_edge_length, 0.0);
        self.edge_max_deviation = at_least(self.edge_max_deviation, 0.0);
        self.contour_max_deviation = at_least(self.contour_max_deviation, 0.0);
        self.max_verts_per_poly = self
            .max_verts_per_poly
            .clamp(3, MAX_VERTICES_PER_POLYGON as u16);
        if self.contour_sample_distance.is_nan()
            || self.contour_sample_distance < Self::MIN_SAMPLE_DISTANCE
        {
            self.contour_sample_distance = 0.0;
        }
    }

    /// Returns a copy with [`BuildParameters::apply_limits`] applied.
    pub fn normalized(mut self) -> Self {
        self.apply_limits();
        self
    }

    /// Converts the world-unit parameters into voxel units for a source mesh with the given bounds.
    pub fn voxel_settings(&self, aabb: &Aabb3d) -> VoxelSettings {
        VoxelSettings {
            width: ((aabb.max.x - aabb.min.x) / self.xz_cell_size + 0.5) as u16,
            height: ((aabb.max.z - aabb.min.z) / self.xz_cell_size + 0.5) as u16,
            aabb: *aabb,
            cell_size: self.xz_cell_size,
            cell_height: self.y_cell_size,
            walkable_slope_angle: self.max_traversable_slope.to_radians(),
            walkable_height: (self.min_traversable_height / self.y_cell_size).ceil() as u16,
            walkable_climb: (self.max_traversable_step / self.y_cell_size).floor() as u16,
            walkable_radius: (self.traversable_area_border_size / self.xz_cell_size).ceil() as u16,
            border_size: (self.heightfield_border_size / self.xz_cell_size).ceil() as u16,
            max_edge_len: (self.max_edge_length / self.xz_cell_size).ceil() as u16,
            max_simplification_error: self.edge_max_deviation,
            blur_passes: self.smoothing_threshold,
            min_region_area: self.min_island_region_size,
            merge_region_area: self.merge_region_size,
            max_vertices_per_polygon: self.max_verts_per_poly,
            clip_ledges: self.clip_ledges,
            detail_sample_dist: self.contour_sample_distance,
            detail_sample_max_error: self.contour_max_deviation,
        }
    }
}

/// `max(value, min)` that maps NaN to `min`.
fn at_least(value: f32, min: f32) -> f32 {
    if value >= min { value } else { min }
}

/// The parameters of a build expressed in the units the geometry stages work with.
/// Created by [`BuildParameters::voxel_settings`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VoxelSettings {
    /// The width of the field along the x-axis. `[Units: vx]`
    pub width: u16,
    /// The height of the field along the z-axis. `[Units: vx]`
    pub height: u16,
    /// The bounds of the source mesh. `[Units: wu]`
    pub aabb: Aabb3d,
    /// The xz-plane cell size. `[Units: wu]`
    pub cell_size: f32,
    /// The y-axis cell size. `[Units: wu]`
    pub cell_height: f32,
    /// The maximum traversable slope. `[Units: Radians]`
    pub walkable_slope_angle: f32,
    /// Minimum floor to 'ceiling' height. `[Units: vx]`
    pub walkable_height: u16,
    /// Maximum ledge height that can be stepped over. `[Units: vx]`
    pub walkable_climb: u16,
    /// The distance the traversable area is eroded away from obstructions. `[Units: vx]`
    pub walkable_radius: u16,
    /// The size of the non-traversable border around the heightfield. `[Units: vx]`
    pub border_size: u16,
    /// The maximum contour edge length. `[Units: vx]`
    pub max_edge_len: u16,
    /// The maximum contour simplification error. `[Units: vx]`
    pub max_simplification_error: f32,
    /// Number of distance field smoothing passes.
    pub blur_passes: u8,
    /// Islands with fewer spans are removed. `[Units: spans]`
    pub min_region_area: u16,
    /// Regions with fewer spans are merged. `[Units: spans]`
    pub merge_region_area: u16,
    /// The maximum number of vertices per polygon.
    pub max_vertices_per_polygon: u16,
    /// Whether the ledge filter runs.
    pub clip_ledges: bool,
    /// The detail sample distance. Zero disables sampling. `[Units: wu]`
    pub detail_sample_dist: f32,
    /// The maximum detail surface deviation. `[Units: wu]`
    pub detail_sample_max_error: f32,
}
