//! GridRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Async runtimes
//! - Subprocesses
//! - Archive backends
//!
//! All types here describe how a geographic domain is cut into tiles and
//! points, and what a point run produces.

pub mod archive;
pub mod error;
pub mod grid;
pub mod ids;
pub mod outcome;
pub mod params;
pub mod paths;
pub mod status;

// Re-export commonly used types
pub use archive::{ArchiveDocument, Axis, Cell, CANONICAL_LAYOUT, JSON_ARCHIVE_EXT};
pub use error::{GridError, ParamsError};
pub use grid::{BoundingBox, CellIndex, Delta, GridCoordinate, TileLayout};
pub use ids::RunId;
pub use outcome::{PointFailure, PointOutcome, RunManifest, StageResult};
pub use params::Params;
pub use paths::{Product, WorkLayout, POINT_TARBALL};
pub use status::PointState;
