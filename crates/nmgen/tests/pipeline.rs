//! End-to-end builds and stage ordering of the navmesh pipeline.

use std::{cell::Cell, collections::BTreeSet, env, rc::Rc};

use anyhow::Context as _;
use approx::assert_abs_diff_eq;
use nmgen::{
    BuildError, BuildLog, BuildParameters, BuildStage, DetailMeshStats, MessageDetail,
    NavmeshBuilder, NavmeshGeometry, Severity, SourceMesh, StageError, VoxelSettings,
    build_flattened_mesh, build_navmesh,
};
use serde::{Deserialize, de::DeserializeOwned};

fn unit_square() -> SourceMesh {
    SourceMesh::from_flat(
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        &[0, 2, 1, 0, 3, 2],
    )
    .unwrap()
}

fn generous_parameters() -> BuildParameters {
    BuildParameters {
        xz_cell_size: 0.1,
        y_cell_size: 0.1,
        traversable_area_border_size: 0.0,
        merge_region_size: 400,
        ..Default::default()
    }
}

#[test]
fn unit_square_builds_one_region() {
    let mut log = BuildLog::new(MessageDetail::Trace);
    let output = build_navmesh(&generous_parameters(), &unit_square(), &mut log).unwrap();

    assert!(
        log.texts(Severity::Progress)
            .any(|text| text == "Built regions: 1 regions.")
    );
    assert_eq!(output.polygon_mesh.polygon_count(), 1);
    assert_eq!(output.polygon_mesh.polygon(0).len(), 4);
    assert!(!output.detail_mesh.vertices.is_empty());
    assert!(!output.detail_mesh.triangles.is_empty());
    for vertex in &output.detail_mesh.vertices {
        assert!((0.0..=1.0).contains(&vertex.x), "x out of bounds: {vertex}");
        assert!((0.0..=1.0).contains(&vertex.z), "z out of bounds: {vertex}");
        assert_abs_diff_eq!(vertex.y, 0.2, epsilon = 1e-4);
    }
    assert_eq!(log.texts(Severity::Error).count(), 0);
    assert_eq!(log.texts(Severity::Warning).count(), 0);
}

#[test]
fn degenerate_triangle_is_empty_result() {
    let source = SourceMesh::from_flat(&[0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 2.0, 0.0, 2.0], &[0, 1, 2])
        .unwrap();
    let mut log = BuildLog::new(MessageDetail::Brief);
    let error = build_navmesh(&generous_parameters(), &source, &mut log).unwrap_err();

    assert!(matches!(error, BuildError::EmptyResult));
    let warnings: Vec<_> = log.texts(Severity::Warning).collect();
    assert_eq!(warnings, ["Build process did not result in a final mesh."]);
    assert_eq!(log.texts(Severity::Progress).count(), 0);
}

#[test]
fn invalid_source_is_rejected_before_any_stage() {
    let source = SourceMesh {
        vertices: vec![glam::Vec3::ZERO; 3],
        triangles: vec![[0, 1, 3]],
    };
    let mut builder = NavmeshBuilder::with_backend(
        InstrumentedGeometry::default(),
        BuildParameters::default(),
    );
    let mut log = BuildLog::new(MessageDetail::Brief);
    let error = builder.build(&source, &mut log).unwrap_err();

    assert!(matches!(error, BuildError::InvalidInput(_)));
    assert!(builder.backend().calls.is_empty());
    let errors: Vec<_> = log.texts(Severity::Error).collect();
    assert_eq!(errors, ["Invalid source mesh."]);
}

#[test]
fn summary_log_of_flattened_build() {
    let mut log = BuildLog::new(MessageDetail::Summary);
    let mesh = build_flattened_mesh(&generous_parameters(), &unit_square(), &mut log).unwrap();

    let texts: Vec<_> = log.texts(Severity::Progress).collect();
    assert_eq!(
        texts,
        [
            "Building mesh: Simple".to_string(),
            "Source: 4 vertices, 2 triangles".to_string(),
            "Source: 10 x 10 cells".to_string(),
            format!(
                "Built simple mesh: {} vertices, {} triangles.",
                mesh.vertices.len(),
                mesh.triangle_count()
            ),
        ]
    );
}

#[test]
fn trace_log_follows_stage_order() {
    let mut log = BuildLog::new(MessageDetail::Trace);
    build_flattened_mesh(&generous_parameters(), &unit_square(), &mut log).unwrap();

    let expected_prefixes = [
        "Building mesh: Simple",
        "Source: 4 vertices",
        "Source: 10 x 10 cells",
        "Source: Min:(0.000, 0.000, 0.000) to Max:(1.000, 0.000, 1.000)",
        "Config: xz_cell_size: 0.100 wu",
        "Initialized solid heightfield.",
        "Built solid heightfield: 100 spans.",
        "Applied solid heightfield filters: 100 remaining spans.",
        "Built compact heightfield: 100 of 100 traversable spans.",
        "Applied border: 100 of 100 traversable spans.",
        "Built distance field:",
        "Built regions: 1 regions.",
        "Compact final: 100 of 100 traversable spans.",
        "Built contours: 1 contours.",
        "Built poly mesh: 1 polygons.",
        "Built detail mesh: 1 submeshes",
        "Vertices merged: 0.",
        "Built simple mesh:",
    ];
    let texts: Vec<_> = log.texts(Severity::Progress).collect();
    let mut position = 0;
    for prefix in expected_prefixes {
        let found = texts[position..]
            .iter()
            .position(|text| text.starts_with(prefix))
            .unwrap_or_else(|| panic!("missing or out of order: {prefix:?} in {texts:#?}"));
        position += found + 1;
    }
}

#[test]
fn disabled_log_stays_empty() {
    let mut log = BuildLog::disabled();
    build_navmesh(&generous_parameters(), &unit_square(), &mut log).unwrap();
    assert_eq!(log.message_count(), 0);
}

#[test]
fn stages_run_in_order() {
    let mut builder = NavmeshBuilder::with_backend(
        InstrumentedGeometry::default(),
        BuildParameters::default(),
    );
    let mut log = BuildLog::new(MessageDetail::Trace);
    let output = builder.build(&unit_square(), &mut log).unwrap();

    assert_eq!(
        builder.backend().calls,
        [
            BuildStage::SolidHeightfield,
            BuildStage::SolidHeightfield,
            BuildStage::Filters,
            BuildStage::CompactHeightfield,
            BuildStage::BorderErosion,
            BuildStage::DistanceField,
            BuildStage::Regions,
            BuildStage::Contours,
            BuildStage::PolygonMesh,
            BuildStage::DetailMesh,
        ]
    );
    // Only the polygon mesh and the detail mesh survive the build.
    let live = builder.backend().live.clone();
    assert_eq!(live.get(), 2);
    drop(output);
    assert_eq!(live.get(), 0);
}

#[test]
fn failing_stage_stops_the_build_and_releases_everything() {
    for stage in BuildStage::ALL {
        let mut builder = NavmeshBuilder::with_backend(
            InstrumentedGeometry {
                fail_at: Some(stage),
                ..Default::default()
            },
            BuildParameters::default(),
        );
        let mut log = BuildLog::new(MessageDetail::Brief);
        let error = builder.build(&unit_square(), &mut log).unwrap_err();

        assert_eq!(error.stage(), Some(stage), "{stage}: failing stage");
        assert!(
            matches!(error, BuildError::Stage { .. }),
            "{stage}: error kind"
        );
        let calls = &builder.backend().calls;
        assert_eq!(calls.last(), Some(&stage), "{stage}: last stage that ran");
        assert!(
            calls.iter().all(|called| *called <= stage),
            "{stage}: a later stage ran: {calls:?}"
        );
        assert_eq!(builder.backend().live.get(), 0, "{stage}: leaked structures");
        let errors: Vec<_> = log.texts(Severity::Error).collect();
        assert_eq!(errors, [stage.failure_message()], "{stage}: logged errors");
    }
}

#[test]
fn allocation_failure_is_reported() {
    let mut builder = NavmeshBuilder::with_backend(
        InstrumentedGeometry {
            fail_at: Some(BuildStage::Contours),
            out_of_memory: true,
            ..Default::default()
        },
        BuildParameters::default(),
    );
    let mut log = BuildLog::new(MessageDetail::Brief);
    let error = builder.build(&unit_square(), &mut log).unwrap_err();

    assert!(matches!(
        error,
        BuildError::Allocation {
            stage: BuildStage::Contours,
            source: StageError::OutOfMemory { len: 1 },
        }
    ));
    assert_eq!(builder.backend().live.get(), 0);
    let errors: Vec<_> = log.texts(Severity::Error).collect();
    assert_eq!(errors, ["Out of memory: Contour set."]);
}

#[test]
fn allocation_failure_of_every_stage_is_logged() {
    for stage in BuildStage::ALL {
        let mut builder = NavmeshBuilder::with_backend(
            InstrumentedGeometry {
                fail_at: Some(stage),
                out_of_memory: true,
                ..Default::default()
            },
            BuildParameters::default(),
        );
        let mut log = BuildLog::new(MessageDetail::Brief);
        let error = builder.build(&unit_square(), &mut log).unwrap_err();

        assert!(
            matches!(error, BuildError::Allocation { stage: failed, .. } if failed == stage),
            "{stage}: error kind"
        );
        assert_eq!(builder.backend().live.get(), 0, "{stage}: leaked structures");
        let errors: Vec<_> = log.texts(Severity::Error).collect();
        assert_eq!(errors, [stage.out_of_memory_message()], "{stage}: logged errors");
    }
    assert_eq!(
        BuildStage::DistanceField.out_of_memory_message(),
        "Could not build distance field."
    );
}

#[test]
fn floors_above_the_voxel_height_limit_are_clamped() {
    // Two 4 by 4 floors 900 units apart. The upper one is out of range of the default cell height.
    let source = SourceMesh::from_flat(
        &[
            0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 4.0, 0.0, 4.0, 0.0, 0.0, 4.0, //
            0.0, 900.0, 0.0, 4.0, 900.0, 0.0, 4.0, 900.0, 4.0, 0.0, 900.0, 4.0,
        ],
        &[0, 2, 1, 0, 3, 2, 4, 6, 5, 4, 7, 6],
    )
    .unwrap();
    let mut log = BuildLog::new(MessageDetail::Brief);
    let output = build_navmesh(&BuildParameters::default(), &source, &mut log).unwrap();

    assert!(output.polygon_mesh.polygon_count() >= 2);
    assert_eq!(log.texts(Severity::Error).count(), 0);
}

#[test]
fn heightfield_border_does_not_count_as_regions() {
    let parameters = BuildParameters {
        heightfield_border_size: 0.2,
        ..generous_parameters()
    };
    let mut log = BuildLog::new(MessageDetail::Trace);
    let output = build_navmesh(&parameters, &unit_square(), &mut log).unwrap();

    assert!(
        log.texts(Severity::Progress)
            .any(|text| text == "Built regions: 1 regions."),
        "{:#?}",
        log.texts(Severity::Progress).collect::<Vec<_>>()
    );
    assert_eq!(output.polygon_mesh.polygon_count(), 1);
}

#[test]
fn empty_detail_mesh_from_any_backend_is_empty_result() {
    let mut builder = NavmeshBuilder::with_backend(
        InstrumentedGeometry {
            detail_vertices: 0,
            ..Default::default()
        },
        BuildParameters::default(),
    );
    let mut log = BuildLog::new(MessageDetail::Brief);
    let error = builder.build(&unit_square(), &mut log).unwrap_err();

    assert!(matches!(error, BuildError::EmptyResult));
    assert_eq!(builder.backend().live.get(), 0);
    assert_eq!(log.texts(Severity::Warning).count(), 1);
}

#[test]
fn scenarios() -> anyhow::Result<()> {
    let scenarios: Vec<Scenario> = load_json("scenarios")?;
    for scenario in scenarios {
        let name = &scenario.name;
        let source = SourceMesh::from_flat(
            scenario.vertices.as_flattened(),
            scenario.triangles.as_flattened(),
        )
        .with_context(|| format!("{name}: invalid source mesh"))?;
        let parameters = BuildParameters {
            xz_cell_size: scenario.xz_cell_size,
            y_cell_size: scenario.y_cell_size,
            traversable_area_border_size: scenario.traversable_area_border_size,
            merge_region_size: scenario.merge_region_size,
            ..Default::default()
        };

        let mut log = BuildLog::new(MessageDetail::Brief);
        let output = build_navmesh(&parameters, &source, &mut log)
            .with_context(|| format!("{name}: build failed"))?;
        let expected = &scenario.expected;

        let regions: BTreeSet<_> = output.polygon_mesh.regions.iter().collect();
        assert_eq!(regions.len(), expected.regions, "{name}: region count");
        assert_eq!(
            output.polygon_mesh.polygon_count(),
            expected.polygons,
            "{name}: polygon count"
        );
        assert_eq!(
            output.detail_mesh.vertices.len(),
            expected.detail_vertices,
            "{name}: detail vertex count"
        );
        assert_eq!(
            output.detail_mesh.triangles.len(),
            expected.detail_triangles,
            "{name}: detail triangle count"
        );

        let mut log = BuildLog::new(MessageDetail::Brief);
        let flattened = build_flattened_mesh(&parameters, &source, &mut log)
            .with_context(|| format!("{name}: flattened build failed"))?;
        assert_eq!(
            flattened.vertices.len(),
            expected.flattened_vertices,
            "{name}: flattened vertex count"
        );
        assert_eq!(
            flattened.triangle_count(),
            expected.detail_triangles,
            "{name}: flattened triangle count"
        );
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    xz_cell_size: f32,
    y_cell_size: f32,
    traversable_area_border_size: f32,
    merge_region_size: u16,
    vertices: Vec<[f32; 3]>,
    triangles: Vec<[u32; 3]>,
    expected: Expected,
}

#[derive(Debug, Deserialize)]
struct Expected {
    regions: usize,
    polygons: usize,
    detail_vertices: usize,
    detail_triangles: usize,
    flattened_vertices: usize,
}

#[track_caller]
fn load_json<T: DeserializeOwned>(name: &str) -> anyhow::Result<T> {
    let path = env::current_dir()?
        .join("tests")
        .join("data")
        .join(format!("{name}.json"));
    let file = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&file)
        .with_context(|| format!("Failed to deserialize JSON: {}", path.display()))
}

/// Counts how many of its structures are alive.
#[derive(Debug)]
struct Tracked {
    live: Rc<Cell<usize>>,
}

impl Tracked {
    fn new(live: &Rc<Cell<usize>>) -> Self {
        live.set(live.get() + 1);
        Self { live: live.clone() }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

/// A backend that records the stages it runs and can be told to fail at one of them.
struct InstrumentedGeometry {
    calls: Vec<BuildStage>,
    live: Rc<Cell<usize>>,
    fail_at: Option<BuildStage>,
    out_of_memory: bool,
    detail_vertices: usize,
}

impl Default for InstrumentedGeometry {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            live: Rc::default(),
            fail_at: None,
            out_of_memory: false,
            detail_vertices: 4,
        }
    }
}

impl InstrumentedGeometry {
    fn enter(&mut self, stage: BuildStage) -> Result<(), StageError> {
        self.calls.push(stage);
        if self.fail_at != Some(stage) {
            return Ok(());
        }
        if self.out_of_memory {
            Err(StageError::OutOfMemory { len: 1 })
        } else {
            Err(StageError::failed(std::fmt::Error))
        }
    }

    fn create(&mut self, stage: BuildStage) -> Result<Tracked, StageError> {
        self.enter(stage)?;
        Ok(Tracked::new(&self.live))
    }
}

impl NavmeshGeometry for InstrumentedGeometry {
    type Heightfield = Tracked;
    type CompactHeightfield = Tracked;
    type ContourSet = Tracked;
    type PolygonMesh = Tracked;
    type DetailMesh = Tracked;

    fn create_heightfield(&mut self, _settings: &VoxelSettings) -> Result<Tracked, StageError> {
        self.create(BuildStage::SolidHeightfield)
    }

    fn rasterize(
        &mut self,
        _heightfield: &mut Tracked,
        _source: &SourceMesh,
        _settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        self.enter(BuildStage::SolidHeightfield)
    }

    fn filter_heightfield(
        &mut self,
        _heightfield: &mut Tracked,
        _settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        self.enter(BuildStage::Filters)
    }

    fn build_compact_heightfield(
        &mut self,
        heightfield: Tracked,
        _settings: &VoxelSettings,
    ) -> Result<Tracked, StageError> {
        drop(heightfield);
        self.create(BuildStage::CompactHeightfield)
    }

    fn erode_walkable_area(
        &mut self,
        _compact: &mut Tracked,
        _settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        self.enter(BuildStage::BorderErosion)
    }

    fn build_distance_field(
        &mut self,
        _compact: &mut Tracked,
        _settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        self.enter(BuildStage::DistanceField)
    }

    fn build_regions(
        &mut self,
        _compact: &mut Tracked,
        _settings: &VoxelSettings,
    ) -> Result<(), StageError> {
        self.enter(BuildStage::Regions)
    }

    fn build_contours(
        &mut self,
        _compact: &Tracked,
        _settings: &VoxelSettings,
    ) -> Result<Tracked, StageError> {
        self.create(BuildStage::Contours)
    }

    fn build_polygon_mesh(
        &mut self,
        contours: Tracked,
        _settings: &VoxelSettings,
    ) -> Result<Tracked, StageError> {
        drop(contours);
        self.create(BuildStage::PolygonMesh)
    }

    fn build_detail_mesh(
        &mut self,
        _polygon_mesh: &Tracked,
        _compact: &Tracked,
        _settings: &VoxelSettings,
    ) -> Result<Tracked, StageError> {
        self.create(BuildStage::DetailMesh)
    }

    fn span_count(&self, _heightfield: &Tracked) -> usize {
        0
    }

    fn walkable_span_count(&self, _heightfield: &Tracked) -> usize {
        0
    }

    fn compact_span_counts(&self, _compact: &Tracked) -> (usize, usize) {
        (0, 0)
    }

    fn max_distance(&self, _compact: &Tracked) -> u16 {
        0
    }

    fn region_count(&self, _compact: &Tracked) -> usize {
        0
    }

    fn contour_count(&self, _contours: &Tracked) -> usize {
        0
    }

    fn polygon_count(&self, _polygon_mesh: &Tracked) -> usize {
        0
    }

    fn detail_mesh_stats(&self, _detail: &Tracked) -> DetailMeshStats {
        DetailMeshStats {
            meshes: 1,
            vertices: self.detail_vertices,
            triangles: 2,
        }
    }
}
