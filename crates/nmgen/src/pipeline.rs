//! Runs the build stages in order and reports on them.

use nmgen_recast::{Aabb3d, DetailNavmesh, PolygonMesh};

use crate::{
    BuildError, BuildLog, BuildParameters, BuildStage, FlattenedMesh, MessageDetail,
    NavmeshGeometry, RecastGeometry, SourceMesh, SourceMeshError, StageError, VoxelSettings,
    flatten_detail_mesh,
};

/// The result of a successful build.
#[derive(Debug, Clone, PartialEq)]
pub struct NavmeshOutput<P = PolygonMesh, D = DetailNavmesh> {
    /// The traversable polygon mesh.
    pub polygon_mesh: P,
    /// The height detail of every polygon.
    pub detail_mesh: D,
}

/// Builds a polygon mesh and its detail mesh from a [`SourceMesh`] with the given geometry backend.
///
/// The stages run strictly in this order:
/// solid heightfield, filters, compact heightfield, border erosion, distance field,
/// regions, contours, polygon mesh, detail mesh.
/// A failing stage stops the build. Everything built up to that point is dropped.
#[derive(Debug, Clone, Default)]
pub struct NavmeshBuilder<B = RecastGeometry> {
    backend: B,
    parameters: BuildParameters,
}

impl NavmeshBuilder<RecastGeometry> {
    /// Creates a builder using [`RecastGeometry`].
    pub fn new(parameters: BuildParameters) -> Self {
        Self::with_backend(RecastGeometry, parameters)
    }
}

impl<B: NavmeshGeometry> NavmeshBuilder<B> {
    /// Creates a builder that runs the stages of `backend`.
    pub fn with_backend(backend: B, parameters: BuildParameters) -> Self {
        Self {
            backend,
            parameters,
        }
    }

    /// The parameters as given. They are normalized at the start of every build.
    pub fn parameters(&self) -> &BuildParameters {
        &self.parameters
    }

    /// The geometry backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consumes the builder and returns its backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Runs the whole pipeline on `source`, writing diagnostics to `log`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source mesh is invalid, a stage fails, or the build produces an empty detail mesh.
    /// The reason has also been logged.
    pub fn build(
        &mut self,
        source: &SourceMesh,
        log: &mut BuildLog,
    ) -> Result<NavmeshOutput<B::PolygonMesh, B::DetailMesh>, BuildError> {
        let aabb = match validated_aabb(source) {
            Ok(aabb) => aabb,
            Err(error) => {
                log.error("Invalid source mesh.");
                return Err(error.into());
            }
        };
        let parameters = self.parameters.clone().normalized();
        let settings = parameters.voxel_settings(&aabb);
        log_configuration(log, source, &parameters, &settings);

        let backend = &mut self.backend;

        let mut heightfield = run(
            log,
            BuildStage::SolidHeightfield,
            backend.create_heightfield(&settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            log.progress("Initialized solid heightfield.");
        }
        run(
            log,
            BuildStage::SolidHeightfield,
            backend.rasterize(&mut heightfield, source, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            log.progress(format!(
                "Built solid heightfield: {} spans.",
                backend.span_count(&heightfield)
            ));
        }

        run(
            log,
            BuildStage::Filters,
            backend.filter_heightfield(&mut heightfield, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            log.progress(format!(
                "Applied solid heightfield filters: {} remaining spans.",
                backend.walkable_span_count(&heightfield)
            ));
        }

        let mut compact = run(
            log,
            BuildStage::CompactHeightfield,
            backend.build_compact_heightfield(heightfield, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            let (walkable, total) = backend.compact_span_counts(&compact);
            log.progress(format!(
                "Built compact heightfield: {walkable} of {total} traversable spans."
            ));
        }

        run(
            log,
            BuildStage::BorderErosion,
            backend.erode_walkable_area(&mut compact, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            let (walkable, total) = backend.compact_span_counts(&compact);
            log.progress(format!(
                "Applied border: {walkable} of {total} traversable spans."
            ));
        }

        run(
            log,
            BuildStage::DistanceField,
            backend.build_distance_field(&mut compact, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            log.progress(format!(
                "Built distance field: {} max distance.",
                backend.max_distance(&compact)
            ));
        }

        run(
            log,
            BuildStage::Regions,
            backend.build_regions(&mut compact, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            log.progress(format!(
                "Built regions: {} regions.",
                backend.region_count(&compact)
            ));
            let (walkable, total) = backend.compact_span_counts(&compact);
            log.progress(format!(
                "Compact final: {walkable} of {total} traversable spans."
            ));
        }

        let contours = run(
            log,
            BuildStage::Contours,
            backend.build_contours(&compact, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            log.progress(format!(
                "Built contours: {} contours.",
                backend.contour_count(&contours)
            ));
        }

        let polygon_mesh = run(
            log,
            BuildStage::PolygonMesh,
            backend.build_polygon_mesh(contours, &settings),
        )?;
        if log.wants(MessageDetail::Trace) {
            log.progress(format!(
                "Built poly mesh: {} polygons.",
                backend.polygon_count(&polygon_mesh)
            ));
        }

        let detail_mesh = run(
            log,
            BuildStage::DetailMesh,
            backend.build_detail_mesh(&polygon_mesh, &compact, &settings),
        )?;
        drop(compact);

        let stats = backend.detail_mesh_stats(&detail_mesh);
        if log.wants(MessageDetail::Trace) {
            log.progress(format!(
                "Built detail mesh: {} submeshes, {} vertices, {} triangles",
                stats.meshes, stats.vertices, stats.triangles
            ));
        }
        if stats.vertices == 0 {
            log.warning("Build process did not result in a final mesh.");
            return Err(BuildError::EmptyResult);
        }

        Ok(NavmeshOutput {
            polygon_mesh,
            detail_mesh,
        })
    }
}

/// Builds a navmesh with the default [`RecastGeometry`] backend.
///
/// The parameters are normalized with [`BuildParameters::apply_limits`] before use.
///
/// # Errors
///
/// See [`NavmeshBuilder::build`].
pub fn build_navmesh(
    parameters: &BuildParameters,
    source: &SourceMesh,
    log: &mut BuildLog,
) -> Result<NavmeshOutput, BuildError> {
    NavmeshBuilder::new(parameters.clone()).build(source, log)
}

/// Builds a navmesh and flattens its detail mesh into a single triangle mesh with shared vertices.
///
/// # Errors
///
/// See [`NavmeshBuilder::build`]. Additionally fails if the detail mesh cannot be flattened.
pub fn build_flattened_mesh(
    parameters: &BuildParameters,
    source: &SourceMesh,
    log: &mut BuildLog,
) -> Result<FlattenedMesh, BuildError> {
    if log.wants(MessageDetail::Summary) {
        log.progress("Building mesh: Simple");
    }
    let output = build_navmesh(parameters, source, log)?;
    let mesh = match flatten_detail_mesh(&output.detail_mesh) {
        Ok(mesh) => mesh,
        Err(error) => {
            log.error(format!("Could not flatten detail mesh: {error}"));
            return Err(error.into());
        }
    };
    if log.wants(MessageDetail::Trace) {
        log.progress(format!(
            "Vertices merged: {}.",
            output.detail_mesh.vertices.len() - mesh.vertices.len()
        ));
    }
    if log.wants(MessageDetail::Summary) {
        log.progress(format!(
            "Built simple mesh: {} vertices, {} triangles.",
            mesh.vertices.len(),
            mesh.triangle_count()
        ));
    }
    Ok(mesh)
}

fn validated_aabb(source: &SourceMesh) -> Result<Aabb3d, SourceMeshError> {
    source.validate()?;
    source.aabb().ok_or(SourceMeshError::Empty {
        vertices: source.vertices.len(),
        triangles: source.triangles.len(),
    })
}

/// Logs the failure of `stage` and converts it into a [`BuildError`].
fn run<T>(
    log: &mut BuildLog,
    stage: BuildStage,
    result: Result<T, StageError>,
) -> Result<T, BuildError> {
    result.map_err(|error| match error {
        StageError::OutOfMemory { .. } => {
            log.error(stage.out_of_memory_message());
            BuildError::Allocation {
                stage,
                source: error,
            }
        }
        StageError::Failed(source) => {
            log.error(stage.failure_message());
            BuildError::Stage { stage, source }
        }
    })
}

fn log_configuration(
    log: &mut BuildLog,
    source: &SourceMesh,
    parameters: &BuildParameters,
    settings: &VoxelSettings,
) {
    if log.wants(MessageDetail::Summary) {
        log.progress(format!(
            "Source: {} vertices, {} triangles",
            source.vertices.len(),
            source.triangles.len()
        ));
        log.progress(format!(
            "Source: {} x {} cells",
            settings.width, settings.height
        ));
    }
    if !log.wants(MessageDetail::Trace) {
        return;
    }
    let (min, max) = (settings.aabb.min, settings.aabb.max);
    log.progress(format!(
        "Source: Min:({:.3}, {:.3}, {:.3}) to Max:({:.3}, {:.3}, {:.3})",
        min.x, min.y, min.z, max.x, max.y, max.z
    ));
    log.progress(format!(
        "Config: xz_cell_size: {:.3} wu",
        parameters.xz_cell_size
    ));
    log.progress(format!("Config: y_cell_size: {:.3} wu", parameters.y_cell_size));
    log.progress(format!(
        "Config: max_traversable_slope: {:.2} degrees",
        parameters.max_traversable_slope
    ));
    log.progress(format!(
        "Config: max_traversable_step: {} vx",
        settings.walkable_climb
    ));
    log.progress(format!(
        "Config: min_traversable_height: {} vx",
        settings.walkable_height
    ));
    log.progress(format!(
        "Config: traversable_area_border_size: {} vx",
        settings.walkable_radius
    ));
    log.progress(format!(
        "Config: heightfield_border_size: {} vx",
        settings.border_size
    ));
    log.progress(format!(
        "Config: smoothing_threshold: {}",
        parameters.smoothing_threshold
    ));
    log.progress(format!(
        "Config: merge_region_size: {}",
        parameters.merge_region_size
    ));
    log.progress(format!(
        "Config: min_island_region_size: {}",
        parameters.min_island_region_size
    ));
    log.progress(format!(
        "Config: max_edge_length: {} vx",
        settings.max_edge_len
    ));
    log.progress(format!(
        "Config: edge_max_deviation: {:.3} wu",
        parameters.edge_max_deviation
    ));
    log.progress(format!(
        "Config: contour_sample_distance: {:.3} wu",
        parameters.contour_sample_distance
    ));
    log.progress(format!(
        "Config: contour_max_deviation: {:.3} wu",
        parameters.contour_max_deviation
    ));
    log.progress(format!(
        "Config: max_verts_per_poly: {}",
        parameters.max_verts_per_poly
    ));
    log.progress(format!("Config: clip_ledges: {}", parameters.clip_ledges));
}
