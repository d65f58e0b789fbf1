//! Tile runner: the whole flow of one sub-tile.
//!
//! verify -> tile stage-in -> clear old point archives -> worker pool ->
//! provenance -> combine -> tile stage-out -> cleanup. Any step failing
//! aborts the sub-tile.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use gridrun_core::{
    CellIndex, GridCoordinate, Params, PointOutcome, RunManifest, TileLayout, WorkLayout,
};
use gridrun_stages::{Slot, StageRegistry, TileContext};
use tokio::fs;
use tracing::{debug, info};

use crate::scheduler::execute_point;
use crate::{
    provenance, Combiner, EngineConfig, EngineError, PipelineSpec, PointExecutor, TileArchive,
    WorkerPool,
};

/// Which sub-tile to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    /// Tile at the tile delta.
    pub tile: CellIndex,

    /// Sub-tile, `1..=split` on each axis.
    pub subtile: CellIndex,

    /// Sub-tiles per tile axis.
    pub split: u32,
}

impl TileRequest {
    /// A whole, unsplit tile.
    pub fn whole(tile: CellIndex) -> Self {
        Self {
            tile,
            subtile: CellIndex::new(1, 1),
            split: 1,
        }
    }
}

/// Result of a completed sub-tile.
#[derive(Debug)]
pub struct TileReport {
    /// Outcomes of every point, in completion order.
    pub manifest: RunManifest,

    /// Combined archives, one per product.
    pub archives: Vec<TileArchive>,

    /// Provenance tarball.
    pub provenance: PathBuf,
}

/// A configured run of one sub-tile.
#[derive(Debug)]
pub struct TileRun {
    request: TileRequest,
    grid: TileLayout,
    work: WorkLayout,
    pipeline: Arc<PipelineSpec>,
    config: EngineConfig,
}

impl TileRun {
    /// Resolve the pipeline and grid for a sub-tile rooted at `workdir`.
    pub fn new(
        registry: &StageRegistry,
        params: Arc<Params>,
        config: EngineConfig,
        request: TileRequest,
        workdir: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        let grid = TileLayout::new(
            params.delta("delta")?,
            params.delta("tdelta")?,
            request.split,
        )?;
        let pipeline = Arc::new(PipelineSpec::build(registry, &params)?);
        Ok(Self {
            request,
            grid,
            work: WorkLayout::new(workdir),
            pipeline,
            config,
        })
    }

    /// Pipeline shared by every point.
    pub fn pipeline(&self) -> &Arc<PipelineSpec> {
        &self.pipeline
    }

    /// Working directory layout.
    pub fn work_layout(&self) -> &WorkLayout {
        &self.work
    }

    /// Combined sub-tile index used in tile-level file names.
    pub fn band(&self) -> CellIndex {
        self.grid.subtile_band(self.request.tile, self.request.subtile)
    }

    /// Points of the sub-tile in ascending `(lat, lon)` order.
    pub fn points(&self) -> Result<Vec<GridCoordinate>, EngineError> {
        Ok(self.grid.points(self.request.tile, self.request.subtile)?)
    }

    /// Run every stage's pre-flight check against the first point.
    pub fn verify(&self) -> Result<(), EngineError> {
        let points = self.points()?;
        match points.first() {
            Some(first) => self.pipeline.verify_all(first),
            None => Ok(()),
        }
    }

    /// Run the whole sub-tile.
    pub async fn run(&self) -> Result<TileReport, EngineError> {
        let start = Instant::now();
        let points = self.points()?;
        let band = self.band();
        info!(
            tile = %self.request.tile,
            subtile = %self.request.subtile,
            band = %band,
            points = points.len(),
            workdir = %self.work.root().display(),
            "Starting tile run"
        );

        if let Some(first) = points.first() {
            self.pipeline.verify_all(first)?;
        }
        self.stage_in().await?;
        self.clear_point_archives(&points).await?;

        let pool = WorkerPool::new(self.executor(), self.config.pool_size);
        let manifest = pool
            .run(&self.work, self.request.tile, self.request.subtile, points.clone())
            .await;

        let provenance =
            provenance::package(&self.work, band, &points, &self.config.outtypes).await?;

        let combiner = Combiner::new(self.config.archiver(), self.config.products.clone());
        let archives = combiner.combine(&self.work, band, &points, &manifest).await?;

        self.stage_out().await?;

        if !self.config.keep_point_dirs {
            self.cleanup(&points).await?;
        }

        info!(
            run_id = %manifest.run_id,
            band = %band,
            points = manifest.len(),
            fallen_back = manifest.fallback_count(),
            archives = archives.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tile run complete"
        );
        Ok(TileReport {
            manifest,
            archives,
            provenance,
        })
    }

    /// Run a single point synchronously after tile stage-in.
    ///
    /// Skips the pool, provenance and combination. Meant for debugging one
    /// point of a tile.
    pub async fn run_point(&self, point: CellIndex) -> Result<PointOutcome, EngineError> {
        let coordinate = self.grid.locate(point)?;
        if coordinate.tile != self.request.tile || coordinate.subtile != self.request.subtile {
            return Err(EngineError::PointOutsideTile {
                point,
                tile: self.request.tile,
                subtile: self.request.subtile,
            });
        }

        info!(point = %point, tile = %self.request.tile, "Running single point");
        self.stage_in().await?;
        self.clear_point_archives(&[coordinate]).await?;

        Ok(execute_point(self.executor(), self.work.clone(), coordinate).await?)
    }

    fn executor(&self) -> PointExecutor {
        PointExecutor::new(self.pipeline.clone()).with_archives(
            self.config.products.clone(),
            self.config.archiver().extension(),
        )
    }

    /// Remove archives an earlier run left for these points, so only this
    /// run's stages can satisfy the combiner.
    async fn clear_point_archives(&self, points: &[GridCoordinate]) -> Result<(), EngineError> {
        fs::create_dir_all(self.work.outputs_dir()).await?;
        let ext = self.config.archiver().extension();
        let mut removed = 0usize;
        for product in &self.config.products {
            for coordinate in points {
                let path = self.work.point_output(product, coordinate.point, ext);
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if removed > 0 {
            info!(removed, "Removed point archives from an earlier run");
        }
        Ok(())
    }

    fn tile_context(&self) -> TileContext {
        TileContext {
            tile: self.request.tile,
            subtile: self.request.subtile,
            band: self.band(),
            layout: self.work.clone(),
        }
    }

    async fn stage_in(&self) -> Result<(), EngineError> {
        if !self.run_tile_stage(Slot::StageInputs).await? {
            return Err(EngineError::TileSetup {
                slot: Slot::StageInputs.to_string(),
            });
        }
        Ok(())
    }

    async fn stage_out(&self) -> Result<(), EngineError> {
        if !self.run_tile_stage(Slot::StageOutputs).await? {
            return Err(EngineError::TileStageOut {
                slot: Slot::StageOutputs.to_string(),
            });
        }
        Ok(())
    }

    async fn run_tile_stage(&self, slot: Slot) -> Result<bool, EngineError> {
        let Some(stage) = self.pipeline.stage(slot) else {
            return Ok(true);
        };

        let start = Instant::now();
        let passed = stage.run_tile(&self.tile_context()).await?;
        info!(
            tile = %self.request.tile,
            stage = %slot,
            class = stage.class_name(),
            method = "run_tile",
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = passed,
            "Stage finished"
        );
        Ok(passed)
    }

    /// Remove the per-point directories, one latitude row at a time.
    async fn cleanup(&self, points: &[GridCoordinate]) -> Result<(), EngineError> {
        let rows: BTreeSet<u32> = points.iter().map(|c| c.point.lat).collect();
        for lat in rows {
            let dir = self.work.root().join(format!("{:04}", lat));
            match fs::remove_dir_all(&dir).await {
                Ok(()) => debug!(dir = %dir.display(), "Removed point directories"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
