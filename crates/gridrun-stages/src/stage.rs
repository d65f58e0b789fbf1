//! The stage capability set.

use std::path::PathBuf;

use async_trait::async_trait;
use gridrun_core::{CellIndex, GridCoordinate, WorkLayout};

use crate::StageError;

/// Where a point-scoped stage runs.
#[derive(Debug, Clone)]
pub struct PointContext {
    /// Point being simulated.
    pub coordinate: GridCoordinate,

    /// The point's private working directory. Stages must not write
    /// anywhere else except the shared outputs directory.
    pub work_dir: PathBuf,

    /// Directory layout of the tile run.
    pub layout: WorkLayout,
}

impl PointContext {
    /// Context for a point under a tile layout.
    pub fn new(coordinate: GridCoordinate, layout: WorkLayout) -> Self {
        Self {
            work_dir: layout.point_dir(coordinate.point),
            coordinate,
            layout,
        }
    }
}

/// Where a tile-scoped stage runs.
#[derive(Debug, Clone)]
pub struct TileContext {
    /// Tile at the coarse tile delta.
    pub tile: CellIndex,

    /// Sub-tile being processed.
    pub subtile: CellIndex,

    /// Combined sub-tile index, used in tile-level file names.
    pub band: CellIndex,

    /// Directory layout of the tile run.
    pub layout: WorkLayout,
}

/// One unit of pipeline work.
///
/// `run` returning `Ok(false)` is the ordinary "declined" outcome and makes
/// the executor switch to the fallback stage. `Err` means the stage crashed;
/// the point is abandoned and never retried.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Registered class name, used in logs.
    fn class_name(&self) -> &'static str;

    /// Per-point work, executed inside the point's working directory.
    async fn run(&self, ctx: &PointContext) -> Result<bool, StageError>;

    /// Per-tile work, executed once before fan-out or after combination.
    async fn run_tile(&self, _ctx: &TileContext) -> Result<bool, StageError> {
        Ok(true)
    }

    /// Cheap pre-flight check of the stage's parameters. No side effects.
    fn verify(&self, _coordinate: &GridCoordinate) -> (bool, String) {
        (
            true,
            format!("{} stage accepts its parameters", self.class_name()),
        )
    }
}
