//! Build stages and the errors a build can end with.

use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::{FlattenError, SourceMeshError, StageError};

/// The stages of a navmesh build, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BuildStage {
    /// Allocating the solid heightfield and rasterizing the source mesh into it.
    SolidHeightfield,
    /// Filtering spans an agent cannot stand on.
    Filters,
    /// Building the compact heightfield.
    CompactHeightfield,
    /// Eroding the traversable area away from obstructions.
    BorderErosion,
    /// Building the distance field.
    DistanceField,
    /// Partitioning the traversable area into regions.
    Regions,
    /// Tracing region outlines.
    Contours,
    /// Building the polygon mesh.
    PolygonMesh,
    /// Building the detail mesh.
    DetailMesh,
}

impl BuildStage {
    /// Every stage, in build order.
    pub const ALL: [BuildStage; 9] = [
        BuildStage::SolidHeightfield,
        BuildStage::Filters,
        BuildStage::CompactHeightfield,
        BuildStage::BorderErosion,
        BuildStage::DistanceField,
        BuildStage::Regions,
        BuildStage::Contours,
        BuildStage::PolygonMesh,
        BuildStage::DetailMesh,
    ];

    /// The message logged when a structure of this stage fails to allocate.
    pub fn out_of_memory_message(self) -> &'static str {
        match self {
            BuildStage::SolidHeightfield | BuildStage::Filters => {
                "Out of memory: Solid heightfield."
            }
            BuildStage::CompactHeightfield => "Out of memory: Compact heightfield.",
            BuildStage::Contours => "Out of memory: Contour set.",
            BuildStage::PolygonMesh => "Out of memory: Poly mesh.",
            BuildStage::DetailMesh => "Out of memory: Detail mesh.",
            stage => stage.failure_message(),
        }
    }

    /// The message logged when this stage reports a failure.
    pub fn failure_message(self) -> &'static str {
        match self {
            BuildStage::SolidHeightfield => "Could not create solid heightfield.",
            BuildStage::Filters => "Could not apply solid heightfield filters.",
            BuildStage::CompactHeightfield => "Could not build compact heightfield.",
            BuildStage::BorderErosion => "Could not generate open area border.",
            BuildStage::DistanceField => "Could not build distance field.",
            BuildStage::Regions => "Could not build regions.",
            BuildStage::Contours => "Could not create contours.",
            BuildStage::PolygonMesh => "Could not create polygon mesh.",
            BuildStage::DetailMesh => "Could not build detail mesh.",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::SolidHeightfield => "solid heightfield",
            BuildStage::Filters => "heightfield filters",
            BuildStage::CompactHeightfield => "compact heightfield",
            BuildStage::BorderErosion => "border erosion",
            BuildStage::DistanceField => "distance field",
            BuildStage::Regions => "regions",
            BuildStage::Contours => "contours",
            BuildStage::PolygonMesh => "polygon mesh",
            BuildStage::DetailMesh => "detail mesh",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during [`build_navmesh`](crate::build_navmesh) and related functions.
///
/// Every variant has also been logged to the [`BuildLog`](crate::BuildLog) of the build.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The source mesh failed validation.
    #[error("Invalid source mesh")]
    InvalidInput(#[from] SourceMeshError),
    /// An intermediate structure could not be allocated.
    #[error("Out of memory during the {stage} stage")]
    Allocation {
        /// The stage that failed
        stage: BuildStage,
        /// The failed allocation
        #[source]
        source: StageError,
    },
    /// A geometry stage reported a failure.
    #[error("The {stage} stage failed")]
    Stage {
        /// The stage that failed
        stage: BuildStage,
        /// What went wrong
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
    /// All stages succeeded, but the detail mesh has no vertices.
    #[error("Build process did not result in a final mesh")]
    EmptyResult,
    /// The detail mesh could not be flattened.
    #[error("Could not flatten the detail mesh")]
    Flatten(#[from] FlattenError),
}

impl BuildError {
    /// The stage that failed, if the error came from a geometry stage.
    pub fn stage(&self) -> Option<BuildStage> {
        match self {
            BuildError::Allocation { stage, .. } | BuildError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
