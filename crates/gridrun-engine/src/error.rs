//! Engine errors.
//!
//! Everything here is tile-fatal. Point-level failures never surface as an
//! `EngineError`; they are absorbed by the fallback stage.

use std::path::PathBuf;

use gridrun_core::{CellIndex, GridError, ParamsError};
use gridrun_stages::{RegistryError, StageError};
use thiserror::Error;

/// Errors that abort a tile run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A slot could not be resolved to a stage.
    #[error("Configuration error: {0}")]
    Configuration(#[from] RegistryError),

    /// Run parameters are missing or malformed.
    #[error("Parameter error: {0}")]
    Params(#[from] ParamsError),

    /// Pre-flight verification rejected a stage.
    #[error("Verification failed for {slot} stage: {message}")]
    Verification { slot: String, message: String },

    /// Tile-level input staging declined.
    #[error("Error staging in tile inputs ({slot} stage declined)")]
    TileSetup { slot: String },

    /// Tile-level output staging declined.
    #[error("Error staging out tile outputs ({slot} stage declined)")]
    TileStageOut { slot: String },

    /// A tile-scoped stage crashed, or the single debug point crashed.
    #[error("Stage crashed: {0}")]
    Stage(#[from] StageError),

    /// The requested debug point does not belong to the tile being run.
    #[error("Point {point} is not part of tile {tile} sub-tile {subtile}")]
    PointOutsideTile {
        point: CellIndex,
        tile: CellIndex,
        subtile: CellIndex,
    },

    /// Output combination failed.
    #[error("Combine failed: {0}")]
    Combine(#[from] CombineError),

    /// Filesystem failure outside any stage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Grid decomposition failed.
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),
}

/// Errors raised while reducing point outputs.
#[derive(Debug, Error)]
pub enum CombineError {
    /// A scheduled point left no output for a product.
    #[error("Missing {product} output for point {point}")]
    MissingPoint { product: String, point: CellIndex },

    /// A scheduled point has no outcome in the run manifest.
    #[error("Point {point} was scheduled but never finished")]
    Unfinished { point: CellIndex },

    /// A point archive disagrees with how the point finished, e.g. a file
    /// left by an earlier run.
    #[error("{product} output for {point} does not match its outcome (fallback: {fell_back})")]
    OutcomeMismatch {
        product: String,
        point: CellIndex,
        fell_back: bool,
    },

    /// A combined archive does not hold one entry per point.
    #[error("{path} holds {found} entries, expected {expected}")]
    EntryCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// Points crashed during execution, so the tile cannot be complete.
    #[error("{count} point(s) crashed, first {point}: {reason}")]
    PointsCrashed {
        count: usize,
        point: CellIndex,
        reason: String,
    },

    /// An external archive tool exited with an error.
    #[error("{program} exited with status {code}: {stderr}")]
    Tool {
        program: String,
        code: i32,
        stderr: String,
    },

    /// An archive document could not be read or written.
    #[error("Invalid archive document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
