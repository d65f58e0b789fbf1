//! Built-in stage classes.

mod archive;
mod bbox;
mod command;
mod noop;
mod shared_fs;

pub use archive::{ArchiveOutput, ArchivePlaceholder};
pub use bbox::BBoxChecker;
pub use command::CommandStage;
pub use noop::Noop;
pub use shared_fs::{SharedFsInputs, SharedFsOutputs};
