//! Geometry primitives used by the `nmgen` navmesh build pipeline.
//!
//! The crate follows the classic Recast flow:
//! [`TriMesh`] → [`Heightfield`] → [`CompactHeightfield`] → [`ContourSet`] → [`PolygonMesh`] → [`DetailNavmesh`].
//! Every step is exposed on its own so a caller can drive, inspect or replace individual stages.

mod compact_cell;
mod compact_heightfield;
mod compact_span;
mod contours;
mod detail_mesh;
mod distance_field;
mod erosion;
mod heightfield;
pub(crate) mod math;
mod poly_mesh;
mod pre_filter;
mod rasterize;
mod region;
mod span;
mod trimesh;
mod watershed;

pub use compact_cell::CompactCell;
pub use compact_heightfield::{CompactHeightfield, CompactHeightfieldError};
pub use compact_span::CompactSpan;
pub use contours::{BuildContoursFlags, Contour, ContourError, ContourSet, RegionVertexId};
pub use detail_mesh::{DetailNavmesh, DetailNavmeshError, SubMesh};
pub use distance_field::DistanceFieldError;
pub use erosion::ErosionError;
pub use heightfield::{Heightfield, HeightfieldBuilder, HeightfieldBuilderError};
pub use math::Aabb3d;
pub use poly_mesh::{MAX_VERTICES_PER_POLYGON, PolygonMesh, PolygonMeshError, RC_MESH_NULL_IDX};
pub use rasterize::RasterizationError;
pub use region::RegionId;
pub use span::{AreaType, Span, SpanKey, Spans};
pub use trimesh::TriMesh;
pub use watershed::RegionError;
