//! Per-point executor.
//!
//! Runs the pipeline stages of one point in order. The first stage that
//! declines hands the point to the fallback stage, which runs exactly once;
//! no later stage runs after that. A stage error is a crash and propagates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use gridrun_core::{PointOutcome, PointState, Product, StageResult, JSON_ARCHIVE_EXT};
use gridrun_stages::{PointContext, Slot, Stage, StageError};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::PipelineSpec;

/// Executes the pipeline for single points.
#[derive(Debug, Clone)]
pub struct PointExecutor {
    pipeline: Arc<PipelineSpec>,
    products: Vec<Product>,
    extension: &'static str,
}

impl PointExecutor {
    /// Create an executor over a shared pipeline.
    pub fn new(pipeline: Arc<PipelineSpec>) -> Self {
        Self {
            pipeline,
            products: Vec::new(),
            extension: JSON_ARCHIVE_EXT,
        }
    }

    /// Also report the point archives of these products in each outcome.
    pub fn with_archives(mut self, products: Vec<Product>, extension: &'static str) -> Self {
        self.products = products;
        self.extension = extension;
        self
    }

    /// Run one point to a terminal state.
    ///
    /// The point directory must already exist.
    pub async fn execute(&self, ctx: &PointContext) -> Result<PointOutcome, StageError> {
        let mut state = PointState::Pending;

        for (slot, stage) in self.pipeline.stages() {
            state = state.advance();
            let result = invoke(ctx, *slot, stage.as_ref()).await?;
            if result.success {
                continue;
            }

            debug!(
                point = %ctx.coordinate,
                stage_index = ?state.stage_index(),
                slot = %slot,
                "Stage declined, running fallback"
            );
            let fallback = invoke(ctx, Slot::Fallback, self.pipeline.fallback().as_ref()).await?;
            if !fallback.success {
                warn!(point = %ctx.coordinate, "Fallback stage declined");
            }
            state = PointState::FallenBack;
            return self.finish(ctx, state).await;
        }

        self.finish(ctx, PointState::Succeeded).await
    }

    async fn finish(
        &self,
        ctx: &PointContext,
        state: PointState,
    ) -> Result<PointOutcome, StageError> {
        let mut outputs = point_files(&ctx.work_dir).await?;
        let files = outputs.len();
        for product in &self.products {
            let archive = ctx
                .layout
                .point_output(product, ctx.coordinate.point, self.extension);
            if fs::try_exists(&archive).await? {
                outputs.push(archive);
            }
        }
        info!(
            point = %ctx.coordinate,
            state = ?state,
            files,
            archives = outputs.len() - files,
            "Point finished"
        );
        Ok(match state {
            PointState::FallenBack => PointOutcome::fallen_back(ctx.coordinate, outputs),
            _ => PointOutcome::succeeded(ctx.coordinate, outputs),
        })
    }
}

/// Run one stage, timing and logging the result.
async fn invoke(
    ctx: &PointContext,
    slot: Slot,
    stage: &dyn Stage,
) -> Result<StageResult, StageError> {
    let start = Instant::now();
    let outcome = stage.run(ctx).await;
    let elapsed = start.elapsed();

    match outcome {
        Ok(success) => {
            info!(
                point = %ctx.coordinate,
                stage = %slot,
                class = stage.class_name(),
                method = "run",
                elapsed_ms = elapsed.as_millis() as u64,
                success,
                "Stage finished"
            );
            Ok(StageResult {
                stage_name: slot.to_string(),
                success,
                elapsed,
            })
        }
        Err(e) => {
            error!(
                point = %ctx.coordinate,
                stage = %slot,
                class = stage.class_name(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "Stage crashed"
            );
            Err(e)
        }
    }
}

/// Regular files left in a point directory, sorted by name.
async fn point_files(dir: &std::path::Path) -> Result<Vec<PathBuf>, StageError> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
