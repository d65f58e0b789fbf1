//! Per-point execution state.

use serde::{Deserialize, Serialize};

/// State of one point's pipeline execution.
///
/// `Pending -> Running(0) -> ... -> Running(n-1) -> Succeeded`, or from any
/// `Running(k)` straight to `FallenBack` when stage `k` declines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointState {
    /// Not started yet.
    #[default]
    Pending,
    /// Executing the stage at this pipeline position.
    Running { stage_index: usize },
    /// Every stage succeeded.
    Succeeded,
    /// A stage declined and the fallback stage produced the output.
    FallenBack,
}

impl PointState {
    /// Returns true if the point has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FallenBack)
    }

    /// Advance to the next stage. Only valid from `Pending` or `Running`.
    pub fn advance(self) -> Self {
        match self {
            Self::Pending => Self::Running { stage_index: 0 },
            Self::Running { stage_index } => Self::Running {
                stage_index: stage_index + 1,
            },
            terminal => terminal,
        }
    }

    /// Stage index currently executing, if any.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Self::Running { stage_index } => Some(*stage_index),
            _ => None,
        }
    }
}
