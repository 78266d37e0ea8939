//! The seam between the build pipeline and the geometry algorithms it drives.

use std::error::Error as StdError;

use nmgen_recast::{
    BuildContoursFlags, CompactHeightfield, CompactHeightfieldError, ContourError, ContourSet,
    DetailNavmesh, DetailNavmeshError, DistanceFieldError, ErosionError, Heightfield,
    HeightfieldBuilder, HeightfieldBuilderError, PolygonMesh, PolygonMeshError,
    RasterizationError, RegionError,
};
use thiserror::Error;

use crate::{SourceMesh, VoxelSettings};

/// The geometry primitives a [`NavmeshBuilder`](crate::NavmeshBuilder) runs, one method per stage.
///
/// Every stage either consumes the structure it supersedes or works on it in place,
/// so a failing stage drops everything built before it.
/// The counting methods only feed the build log.
pub trait NavmeshGeometry {
    /// Voxelized solid geometry.
    type Heightfield;
    /// Open spans with neighbor connections, distances and regions.
    type CompactHeightfield;
    /// Region outlines.
    type ContourSet;
    /// The traversable polygon mesh.
    type PolygonMesh;
    /// The per-polygon height detail.
    type DetailMesh;

    /// Allocates an empty heightfield covering `settings.aabb`.
    fn create_heightfield(
        &mut self,
        settings: &VoxelSettings,
    ) -> Result<Self::Heightfield, StageError>;

    /// Marks traversable triangles by slope and rasterizes the source mesh into the heightfield.
    fn rasterize(
        &mut self,
        heightfield: &mut Self::Heightfield,
        source: &SourceMesh,
        settings: &VoxelSettings,
    ) -> Result<(), StageError>;

    /// Removes spans an agent cannot stand on.
    fn filter_heightfield(
        &mut self,
        heightfield: &mut Self::Heightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError>;

    /// Builds the compact heightfield, consuming the solid one.
    fn build_compact_heightfield(
        &mut self,
        heightfield: Self::Heightfield,
        settings: &VoxelSettings,
    ) -> Result<Self::CompactHeightfield, StageError>;

    /// Erodes the traversable area away from obstructions.
    fn erode_walkable_area(
        &mut self,
        compact: &mut Self::CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError>;

    /// Computes the distance of every span to the closest boundary.
    fn build_distance_field(
        &mut self,
        compact: &mut Self::CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError>;

    /// Partitions the traversable spans into regions.
    fn build_regions(
        &mut self,
        compact: &mut Self::CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError>;

    /// Traces the outlines of the regions.
    fn build_contours(
        &mut self,
        compact: &Self::CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<Self::ContourSet, StageError>;

    /// Builds the polygon mesh, consuming the contours.
    fn build_polygon_mesh(
        &mut self,
        contours: Self::ContourSet,
        settings: &VoxelSettings,
    ) -> Result<Self::PolygonMesh, StageError>;

    /// Builds the height detail for every polygon.
    fn build_detail_mesh(
        &mut self,
        polygon_mesh: &Self::PolygonMesh,
        compact: &Self::CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<Self::DetailMesh, StageError>;

    /// Number of spans in the heightfield.
    fn span_count(&self, heightfield: &Self::Heightfield) -> usize;

    /// Number of spans in the heightfield that are still traversable.
    fn walkable_span_count(&self, heightfield: &Self::Heightfield) -> usize;

    /// Number of traversable spans and total spans in the compact heightfield.
    fn compact_span_counts(&self, compact: &Self::CompactHeightfield) -> (usize, usize);

    /// The largest value of the distance field.
    fn max_distance(&self, compact: &Self::CompactHeightfield) -> u16;

    /// Number of regions in the compact heightfield.
    fn region_count(&self, compact: &Self::CompactHeightfield) -> usize;

    /// Number of contours.
    fn contour_count(&self, contours: &Self::ContourSet) -> usize;

    /// Number of polygons.
    fn polygon_count(&self, polygon_mesh: &Self::PolygonMesh) -> usize;

    /// Sizes of the detail mesh.
    fn detail_mesh_stats(&self, detail: &Self::DetailMesh) -> DetailMeshStats;
}

/// Sizes of a detail mesh, as reported by [`NavmeshGeometry::detail_mesh_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetailMeshStats {
    /// Number of sub-meshes
    pub meshes: usize,
    /// Number of vertices
    pub vertices: usize,
    /// Number of triangles
    pub triangles: usize,
}

/// The failure of a single geometry stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// A structure could not be allocated.
    #[error("Out of memory while allocating {len} elements")]
    OutOfMemory {
        /// Number of elements that were requested
        len: usize,
    },
    /// The stage ran and reported a failure.
    #[error(transparent)]
    Failed(Box<dyn StdError + Send + Sync + 'static>),
}

impl StageError {
    /// Wraps a stage specific error.
    pub fn failed(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(error))
    }
}

impl From<HeightfieldBuilderError> for StageError {
    fn from(error: HeightfieldBuilderError) -> Self {
        match error {
            HeightfieldBuilderError::OutOfMemory { column_count } => {
                Self::OutOfMemory { len: column_count }
            }
            error => Self::failed(error),
        }
    }
}

impl From<RasterizationError> for StageError {
    fn from(error: RasterizationError) -> Self {
        Self::failed(error)
    }
}

impl From<CompactHeightfieldError> for StageError {
    fn from(error: CompactHeightfieldError) -> Self {
        match error {
            CompactHeightfieldError::OutOfMemory { len } => Self::OutOfMemory { len },
            error => Self::failed(error),
        }
    }
}

impl From<ErosionError> for StageError {
    fn from(error: ErosionError) -> Self {
        match error {
            ErosionError::OutOfMemory { len } => Self::OutOfMemory { len },
        }
    }
}

impl From<DistanceFieldError> for StageError {
    fn from(error: DistanceFieldError) -> Self {
        match error {
            DistanceFieldError::OutOfMemory { len } => Self::OutOfMemory { len },
        }
    }
}

impl From<RegionError> for StageError {
    fn from(error: RegionError) -> Self {
        match error {
            RegionError::OutOfMemory { len } => Self::OutOfMemory { len },
            error => Self::failed(error),
        }
    }
}

impl From<ContourError> for StageError {
    fn from(error: ContourError) -> Self {
        match error {
            ContourError::OutOfMemory { len } => Self::OutOfMemory { len },
        }
    }
}

impl From<PolygonMeshError> for StageError {
    fn from(error: PolygonMeshError) -> Self {
        match error {
            PolygonMeshError::OutOfMemory { len } => Self::OutOfMemory { len },
            error => Self::failed(error),
        }
    }
}

impl From<DetailNavmeshError> for StageError {
    fn from(error: DetailNavmeshError) -> Self {
        match error {
            DetailNavmeshError::OutOfMemory { len } => Self::OutOfMemory { len },
            error => Self::failed(error),
        }
    }
}

/// The default backend, running the algorithms of [`nmgen_recast`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecastGeometry;

impl NavmeshGeometry for RecastGeometry {
    type Heightfield = Heightfield;
    type CompactHeightfield = CompactHeightfield;
    type ContourSet = ContourSet;
    type PolygonMesh = PolygonMesh;
    type DetailMesh = DetailNavmesh;

    fn create_heightfield(&mut self, settings: &VoxelSettings) -> Result<Heightfield, StageError> {
        let heightfield = HeightfieldBuilder {
            aabb: settings.aabb,
            cell_size: settings.cell_size,
            cell_height: settings.cell_height,
        }
        .build()?;
        Ok(heightfield)
    }

    fn rasterize(
        &mut self,
        heightfield: &mut Heightfield,
        source: &SourceMesh,
        settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        let mut trimesh = source.to_trimesh();
        trimesh.mark_walkable_triangles(settings.walkable_slope_angle);
        heightfield.rasterize_triangles(&trimesh, settings.walkable_climb)?;
        Ok(())
    }

    fn filter_heightfield(
        &mut self,
        heightfield: &mut Heightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        heightfield.filter_low_hanging_walkable_obstacles(settings.walkable_climb);
        if settings.clip_ledges {
            heightfield.filter_ledge_spans(settings.walkable_height, settings.walkable_climb);
        }
        heightfield.filter_walkable_low_height_spans(settings.walkable_height);
        Ok(())
    }

    fn build_compact_heightfield(
        &mut self,
        heightfield: Heightfield,
        settings: &VoxelSettings,
    ) -> Result<CompactHeightfield, StageError> {
        let compact = heightfield.into_compact(settings.walkable_height, settings.walkable_climb)?;
        Ok(compact)
    }

    fn erode_walkable_area(
        &mut self,
        compact: &mut CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        compact.erode_walkable_area(settings.walkable_radius)?;
        Ok(())
    }

    fn build_distance_field(
        &mut self,
        compact: &mut CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        compact.build_distance_field(settings.blur_passes)?;
        Ok(())
    }

    fn build_regions(
        &mut self,
        compact: &mut CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        compact.build_regions(
            settings.border_size,
            settings.min_region_area,
            settings.merge_region_area,
        )?;
        Ok(())
    }

    fn build_contours(
        &mut self,
        compact: &CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<ContourSet, StageError> {
        let contours = compact.build_contours(
            settings.max_simplification_error,
            settings.max_edge_len,
            BuildContoursFlags::default(),
        )?;
        Ok(contours)
    }

    fn build_polygon_mesh(
        &mut self,
        contours: ContourSet,
        settings: &VoxelSettings,
    ) -> Result<PolygonMesh, StageError> {
        let mesh = contours.into_polygon_mesh(settings.max_vertices_per_polygon as usize)?;
        Ok(mesh)
    }

    fn build_detail_mesh(
        &mut self,
        polygon_mesh: &PolygonMesh,
        compact: &CompactHeightfield,
        settings: &VoxelSettings,
    ) -> Result<DetailNavmesh, StageError> {
        let detail = DetailNavmesh::new(
            polygon_mesh,
            compact,
            settings.detail_sample_dist,
            settings.detail_sample_max_error,
        )?;
        Ok(detail)
    }

    fn span_count(&self, heightfield: &Heightfield) -> usize {
        heightfield.span_count()
    }

    fn walkable_span_count(&self, heightfield: &Heightfield) -> usize {
        heightfield.walkable_span_count()
    }

    fn compact_span_counts(&self, compact: &CompactHeightfield) -> (usize, usize) {
        (compact.walkable_span_count(), compact.spans.len())
    }

    fn max_distance(&self, compact: &CompactHeightfield) -> u16 {
        compact.max_distance
    }

    fn region_count(&self, compact: &CompactHeightfield) -> usize {
        compact.max_region.id() as usize
    }

    fn contour_count(&self, contours: &ContourSet) -> usize {
        contours.contours.len()
    }

    fn polygon_count(&self, polygon_mesh: &PolygonMesh) -> usize {
        polygon_mesh.polygon_count()
    }

    fn detail_mesh_stats(&self, detail: &DetailNavmesh) -> DetailMeshStats {
        DetailMeshStats {
            meshes: detail.meshes.len(),
            vertices: detail.vertices.len(),
            triangles: detail.triangles.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_failures_of_every_geometry_stage_are_out_of_memory() {
        let errors = [
            StageError::from(HeightfieldBuilderError::OutOfMemory { column_count: 7 }),
            StageError::from(CompactHeightfieldError::OutOfMemory { len: 7 }),
            StageError::from(ErosionError::OutOfMemory { len: 7 }),
            StageError::from(DistanceFieldError::OutOfMemory { len: 7 }),
            StageError::from(RegionError::OutOfMemory { len: 7 }),
            StageError::from(ContourError::OutOfMemory { len: 7 }),
            StageError::from(PolygonMeshError::OutOfMemory { len: 7 }),
            StageError::from(DetailNavmeshError::OutOfMemory { len: 7 }),
        ];
        for error in errors {
            assert!(
                matches!(error, StageError::OutOfMemory { len: 7 }),
                "{error:?}"
            );
        }
    }

    #[test]
    fn other_region_errors_are_failures() {
        let error = StageError::from(RegionError::MissingDistanceField);
        assert!(matches!(error, StageError::Failed(_)));
        assert_eq!(error.to_string(), "The distance field has not been built");
    }

    #[test]
    fn recast_stages_run_on_a_flat_floor() {
        let source = SourceMesh::from_flat(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            &[0, 2, 1, 0, 3, 2],
        )
        .unwrap();
        let parameters = crate::BuildParameters {
            xz_cell_size: 0.1,
            y_cell_size: 0.1,
            traversable_area_border_size: 0.0,
            merge_region_size: 400,
            ..Default::default()
        }
        .normalized();
        let settings = parameters.voxel_settings(&source.aabb().unwrap());

        let mut backend = RecastGeometry;
        let mut heightfield = backend.create_heightfield(&settings).unwrap();
        backend
            .rasterize(&mut heightfield, &source, &settings)
            .unwrap();
        let mut compact = backend
            .build_compact_heightfield(heightfield, &settings)
            .unwrap();
        backend.erode_walkable_area(&mut compact, &settings).unwrap();
        backend.build_distance_field(&mut compact, &settings).unwrap();
        assert!(backend.max_distance(&compact) > 0);
        backend.build_regions(&mut compact, &settings).unwrap();
        assert_eq!(backend.region_count(&compact), 1);
    }
}
