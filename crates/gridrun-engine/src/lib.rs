//! GridRun orchestration engine.
//!
//! Builds the stage pipeline once, runs it for every point of a sub-tile on
//! a bounded worker pool, and reduces the per-point archives into tile-level
//! archives.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gridrun_core::{CellIndex, Params};
//! use gridrun_engine::{EngineConfig, TileRequest, TileRun};
//! use gridrun_stages::StageRegistry;
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = Arc::new(
//!         Params::new()
//!             .with("delta", "30")
//!             .with("tdelta", "60")
//!             .with("fallback", "archive_placeholder")
//!             .with("output_writer", "archive_placeholder"),
//!     );
//!     let config = EngineConfig::from_params(&params)?;
//!     let request = TileRequest::whole(CellIndex::new(1, 1));
//!
//!     let run = TileRun::new(&StageRegistry::new(), params, config, request, "/tmp/tile")?;
//!     let report = run.run().await?;
//!     let manifest = &report.manifest;
//!     println!("{} points, {} fell back", manifest.len(), manifest.fallback_count());
//!     Ok(())
//! }
//! ```

mod archiver;
mod combiner;
mod config;
mod error;
mod executor;
mod pipeline;
pub mod provenance;
mod runner;
mod scheduler;

// Re-export main types
pub use archiver::{Archiver, JsonArchiver, NcoArchiver};
pub use combiner::{Combiner, TileArchive};
pub use config::{ArchiveFormat, EngineConfig};
pub use error::{CombineError, EngineError};
pub use executor::PointExecutor;
pub use pipeline::PipelineSpec;
pub use runner::{TileReport, TileRequest, TileRun};
pub use scheduler::WorkerPool;
