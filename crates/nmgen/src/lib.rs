#![doc = include_str!("../../../readme.md")]

mod backend;
mod build_log;
mod config;
mod dedup;
mod error;
mod flatten;
mod pipeline;
mod source_mesh;

pub use backend::{DetailMeshStats, NavmeshGeometry, RecastGeometry, StageError};
pub use build_log::{BuildLog, LogMessage, MessageDetail, Severity};
pub use config::{BuildParameters, VoxelSettings};
pub use dedup::{DEDUP_TOLERANCE, DedupResult, deduplicate_vertices};
pub use error::{BuildError, BuildStage};
pub use flatten::{FlattenError, FlattenedMesh, flatten_detail_mesh};
pub use pipeline::{NavmeshBuilder, NavmeshOutput, build_flattened_mesh, build_navmesh};
pub use source_mesh::{SourceMesh, SourceMeshError};

/// Re-export of the geometry crate the default backend is built on.
pub use nmgen_recast as recast;
