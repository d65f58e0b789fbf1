//! Worker-pool scheduler.
//!
//! Fans the points of a sub-tile out over a bounded pool. Each point gets
//! its own directory and shares nothing with its siblings except the
//! read-only pipeline. Joining every task is the barrier before combination.

use std::any::Any;
use std::sync::Arc;

use gridrun_core::{
    CellIndex, GridCoordinate, PointFailure, PointOutcome, RunManifest, WorkLayout,
};
use gridrun_stages::{PointContext, StageError};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::PointExecutor;

/// How one scheduled point ended.
enum Finished {
    Outcome(PointOutcome),
    Failure(PointFailure),
}

/// Bounded pool running one executor invocation per point.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    executor: PointExecutor,
    pool_size: usize,
}

impl WorkerPool {
    /// Create a pool of `pool_size` workers (at least one).
    pub fn new(executor: PointExecutor, pool_size: usize) -> Self {
        Self {
            executor,
            pool_size: pool_size.max(1),
        }
    }

    /// Number of points allowed to run at once.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run every point and wait for all of them.
    ///
    /// Crashed or panicked points are recorded as failures, never retried.
    pub async fn run(
        &self,
        layout: &WorkLayout,
        tile: CellIndex,
        subtile: CellIndex,
        points: Vec<GridCoordinate>,
    ) -> RunManifest {
        let mut manifest = RunManifest::new(tile, subtile);
        let total = points.len();
        info!(
            run_id = %manifest.run_id,
            tile = %tile,
            subtile = %subtile,
            points = total,
            pool_size = self.pool_size,
            "Dispatching points"
        );

        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks = JoinSet::new();

        for coordinate in points {
            let semaphore = semaphore.clone();
            let executor = self.executor.clone();
            let layout = layout.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return Finished::Failure(PointFailure {
                            coordinate,
                            reason: e.to_string(),
                        })
                    }
                };

                // A nested task isolates panics so the coordinate is never lost
                let point = tokio::spawn(execute_point(executor, layout, coordinate));
                match point.await {
                    Ok(Ok(outcome)) => Finished::Outcome(outcome),
                    Ok(Err(e)) => Finished::Failure(PointFailure {
                        coordinate,
                        reason: e.to_string(),
                    }),
                    Err(e) if e.is_panic() => Finished::Failure(PointFailure {
                        coordinate,
                        reason: format!("panicked: {}", panic_message(e.into_panic())),
                    }),
                    Err(e) => Finished::Failure(PointFailure {
                        coordinate,
                        reason: e.to_string(),
                    }),
                }
            });
        }

        // Barrier
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Finished::Outcome(outcome)) => manifest.record(outcome),
                Ok(Finished::Failure(failure)) => {
                    error!(
                        run_id = %manifest.run_id,
                        point = %failure.coordinate,
                        reason = %failure.reason,
                        "Point crashed"
                    );
                    manifest.record_failure(failure);
                }
                Err(e) => error!(run_id = %manifest.run_id, error = %e, "Worker task aborted"),
            }
        }

        info!(
            run_id = %manifest.run_id,
            finished = manifest.len(),
            fallen_back = manifest.fallback_count(),
            crashed = manifest.failures().len(),
            points = total,
            "All points finished"
        );
        manifest
    }
}

/// Create the point directory and execute the point in it.
pub(crate) async fn execute_point(
    executor: PointExecutor,
    layout: WorkLayout,
    coordinate: GridCoordinate,
) -> Result<PointOutcome, StageError> {
    let ctx = PointContext::new(coordinate, layout);
    fs::create_dir_all(&ctx.work_dir).await?;
    executor.execute(&ctx).await
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
