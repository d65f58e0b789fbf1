//! Error types for stages and stage resolution.

use gridrun_core::ParamsError;
use thiserror::Error;

/// A stage crashed instead of returning.
///
/// Declining to produce output is not an error: stages return `Ok(false)`
/// for that and the executor falls back.
#[derive(Debug, Error)]
pub enum StageError {
    /// Filesystem failure the stage cannot recover from.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameter lookup failed at run time.
    #[error(transparent)]
    Params(#[from] ParamsError),

    /// Archive document could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors resolving a slot to a stage. Fatal before any point runs.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The configured class is not registered.
    #[error("Invalid {slot} stage class '{class}'. Valid classes are {valid}")]
    UnknownClass {
        slot: String,
        class: String,
        valid: String,
    },

    /// The slot's sub-namespace is malformed.
    #[error("Invalid configuration for {slot} stage: {reason}")]
    InvalidStageConfig { slot: String, reason: String },
}
