//! Stage results, point outcomes and the per-tile run manifest.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CellIndex, GridCoordinate, PointState, RunId};

/// Timing of one stage invocation. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Slot the stage is bound to.
    pub stage_name: String,

    /// Whether `run` returned true.
    pub success: bool,

    /// Wall-clock time spent in the stage.
    pub elapsed: Duration,
}

/// What one point produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOutcome {
    /// Point address.
    pub coordinate: GridCoordinate,

    /// Files the point left behind in its working directory.
    pub output_paths: Vec<PathBuf>,

    /// Whether the fallback stage produced the output.
    pub used_fallback: bool,

    /// When the point finished.
    pub finished_at: DateTime<Utc>,
}

impl PointOutcome {
    /// Outcome of a point whose stages all succeeded.
    pub fn succeeded(coordinate: GridCoordinate, output_paths: Vec<PathBuf>) -> Self {
        Self {
            coordinate,
            output_paths,
            used_fallback: false,
            finished_at: Utc::now(),
        }
    }

    /// Outcome of a point that fell back.
    pub fn fallen_back(coordinate: GridCoordinate, output_paths: Vec<PathBuf>) -> Self {
        Self {
            used_fallback: true,
            ..Self::succeeded(coordinate, output_paths)
        }
    }

    /// Terminal state this outcome represents.
    pub fn state(&self) -> PointState {
        if self.used_fallback {
            PointState::FallenBack
        } else {
            PointState::Succeeded
        }
    }
}

/// A point whose stage crashed instead of returning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFailure {
    /// Point address.
    pub coordinate: GridCoordinate,

    /// Error or panic message.
    pub reason: String,
}

/// All outcomes of one sub-tile, in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Identifier used to correlate log lines.
    pub run_id: RunId,

    /// Tile being processed.
    pub tile: CellIndex,

    /// Sub-tile being processed.
    pub subtile: CellIndex,

    /// When scheduling started.
    pub created_at: DateTime<Utc>,

    outcomes: Vec<PointOutcome>,
    failures: Vec<PointFailure>,
}

impl RunManifest {
    /// Create an empty manifest.
    pub fn new(tile: CellIndex, subtile: CellIndex) -> Self {
        Self {
            run_id: RunId::for_subtile(tile, subtile),
            tile,
            subtile,
            created_at: Utc::now(),
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Record a finished point.
    pub fn record(&mut self, outcome: PointOutcome) {
        self.outcomes.push(outcome);
    }

    /// Record a crashed point.
    pub fn record_failure(&mut self, failure: PointFailure) {
        self.failures.push(failure);
    }

    /// Outcomes in completion order.
    pub fn outcomes(&self) -> &[PointOutcome] {
        &self.outcomes
    }

    /// Crashed points in completion order.
    pub fn failures(&self) -> &[PointFailure] {
        &self.failures
    }

    /// Outcomes re-sorted into ascending `(lat, lon)` order.
    pub fn sorted(&self) -> Vec<&PointOutcome> {
        let mut sorted: Vec<_> = self.outcomes.iter().collect();
        sorted.sort_by_key(|o| o.coordinate.point);
        sorted
    }

    /// Distinct latitude rows with at least one finished point, ascending.
    pub fn latitude_bands(&self) -> Vec<u32> {
        self.outcomes
            .iter()
            .map(|o| o.coordinate.point.lat)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of finished points.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if no point has finished.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of points that fell back.
    pub fn fallback_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.used_fallback).count()
    }
}
