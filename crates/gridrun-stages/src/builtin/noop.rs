//! The stage bound to unconfigured slots.

use async_trait::async_trait;

use crate::{PointContext, Stage, StageError};

/// Does nothing and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl Stage for Noop {
    fn class_name(&self) -> &'static str {
        "noop"
    }

    async fn run(&self, _ctx: &PointContext) -> Result<bool, StageError> {
        Ok(true)
    }
}
