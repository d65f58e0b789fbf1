//! GridRun pipeline stages.
//!
//! A stage is one step of the per-point pipeline. The engine only ever sees
//! the [`Stage`] trait; concrete stages are resolved from configuration
//! through the [`StageRegistry`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gridrun_core::Params;
//! use gridrun_stages::{Slot, StageRegistry};
//!
//! fn build() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = Arc::new(Params::new());
//!     let registry = StageRegistry::new();
//!
//!     // Unconfigured slot: resolves to the no-op stage.
//!     let checker = registry.resolve(&params, Slot::Checker)?;
//!     assert_eq!(checker.class_name(), "noop");
//!     Ok(())
//! }
//! ```

mod builtin;
mod error;
mod fs;
mod registry;
mod slot;
mod stage;

// Re-export main types
pub use builtin::{
    ArchiveOutput, ArchivePlaceholder, BBoxChecker, CommandStage, Noop, SharedFsInputs,
    SharedFsOutputs,
};
pub use error::{RegistryError, StageError};
pub use registry::{StageConfig, StageFactory, StageRegistry};
pub use slot::Slot;
pub use stage::{PointContext, Stage, TileContext};
