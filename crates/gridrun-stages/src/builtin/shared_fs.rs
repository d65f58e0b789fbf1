//! Input and output staging over a shared filesystem.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gridrun_core::{CellIndex, GridCoordinate, Params, ParamsError};
use tokio::fs;
use tracing::{info, warn};

use crate::fs::copy_files;
use crate::{PointContext, RegistryError, Stage, StageConfig, StageError, TileContext};

/// Stages campaign, reference data, soil and weather tiles into the tile
/// working directory once, then copies the small shared inputs into every
/// point directory.
#[derive(Debug, Clone)]
pub struct SharedFsInputs {
    campaign: Option<PathBuf>,
    refdata: Option<PathBuf>,
    params_file: Option<PathBuf>,
    soils: Vec<PathBuf>,
    soils_outputs: Vec<String>,
    weather: Vec<PathBuf>,
    weather_outputs: Vec<String>,
}

impl SharedFsInputs {
    /// Build from the slot namespace, falling back to run-wide keys.
    pub fn from_config(cfg: &StageConfig) -> Result<Self, RegistryError> {
        Self::read(&cfg.params, cfg.slot.key()).map_err(|e| cfg.invalid(e.to_string()))
    }

    fn read(params: &Params, ns: &str) -> Result<Self, ParamsError> {
        let path = |key: &str| {
            params
                .text_in(ns, key)
                .or_else(|| params.text(key))
                .map(PathBuf::from)
        };
        let paths = |key: &str| -> Result<Vec<PathBuf>, ParamsError> {
            let mut list = params.list_in(ns, key)?;
            if list.is_empty() {
                list = params.list(key)?;
            }
            Ok(list.into_iter().map(PathBuf::from).collect())
        };

        Ok(Self {
            campaign: path("campaign"),
            refdata: path("refdata"),
            params_file: params.text("params").map(PathBuf::from),
            soils: paths("soils")?,
            soils_outputs: params.list_in(ns, "soils_outputs")?,
            weather: paths("weather")?,
            weather_outputs: params.list_in(ns, "weather_outputs")?,
        })
    }

    async fn stage_tile(&self, ctx: &TileContext) -> io::Result<()> {
        let root = ctx.layout.root();
        let inputs = ctx.layout.inputs_dir();

        if let Some(campaign) = &self.campaign {
            copy_files(campaign, &inputs.join("campaign"), |_| true).await?;
        }
        if let Some(refdata) = &self.refdata {
            copy_files(refdata, &inputs.join("refdata"), |_| true).await?;
        }
        if let Some(params_file) = &self.params_file {
            if let Some(name) = params_file.file_name() {
                fs::copy(params_file, root.join(name)).await?;
            }
        }

        for (i, dir) in self.soils.iter().enumerate() {
            let src = tile_file(dir, "soil", ctx.tile);
            let dest = staged_name(root, &self.soils_outputs, i, "soil");
            fs::copy(&src, &dest).await?;
        }
        for (i, dir) in self.weather.iter().enumerate() {
            let src = tile_file(dir, "clim", ctx.tile);
            let dest = staged_name(root, &self.weather_outputs, i, "clim");
            fs::copy(&src, &dest).await?;
        }
        Ok(())
    }

    async fn stage_point(&self, ctx: &PointContext) -> io::Result<()> {
        let inputs = ctx.layout.inputs_dir();
        for sub in ["refdata", "campaign"] {
            let src = inputs.join(sub);
            if fs::metadata(&src).await.is_ok() {
                copy_files(&src, &ctx.work_dir, |_| true).await?;
            }
        }
        Ok(())
    }
}

/// `<dir>/<tlat>/<kind>_<tlat>_<tlon>.tile.nc4`
fn tile_file(dir: &Path, kind: &str, tile: CellIndex) -> PathBuf {
    dir.join(format!("{:04}", tile.lat))
        .join(format!("{}_{:04}_{:04}.tile.nc4", kind, tile.lat, tile.lon))
}

/// Configured destination, or `<root>/<n>.<kind>.tile.nc4`.
fn staged_name(root: &Path, outputs: &[String], index: usize, kind: &str) -> PathBuf {
    match outputs.get(index).filter(|name| !name.is_empty()) {
        Some(name) => root.join(name),
        None => root.join(format!("{}.{}.tile.nc4", index + 1, kind)),
    }
}

#[async_trait]
impl Stage for SharedFsInputs {
    fn class_name(&self) -> &'static str {
        "stage_inputs_sharedfs"
    }

    async fn run(&self, ctx: &PointContext) -> Result<bool, StageError> {
        match self.stage_point(ctx).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(point = %ctx.coordinate, error = %e, "Failed to stage point inputs");
                Ok(false)
            }
        }
    }

    async fn run_tile(&self, ctx: &TileContext) -> Result<bool, StageError> {
        match self.stage_tile(ctx).await {
            Ok(()) => {
                info!(
                    tile = %ctx.tile,
                    soils = self.soils.len(),
                    weather = self.weather.len(),
                    "Staged tile inputs"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(tile = %ctx.tile, error = %e, "Failed to stage tile inputs");
                Ok(false)
            }
        }
    }

    fn verify(&self, _coordinate: &GridCoordinate) -> (bool, String) {
        let dirs = self
            .campaign
            .iter()
            .chain(self.refdata.iter())
            .chain(self.soils.iter())
            .chain(self.weather.iter());
        for dir in dirs {
            if !dir.is_dir() {
                return (
                    false,
                    format!("input directory {} does not exist", dir.display()),
                );
            }
        }
        (true, "input directories exist".to_string())
    }
}

/// Copies tile-level archives and provenance tarballs into the run directory.
/// Without a `rundir` parameter the outputs stay in the tile directory.
#[derive(Debug, Clone)]
pub struct SharedFsOutputs {
    rundir: Option<PathBuf>,
}

impl SharedFsOutputs {
    /// Build from run-wide parameters.
    pub fn from_config(cfg: &StageConfig) -> Self {
        Self {
            rundir: cfg.params.text("rundir").map(PathBuf::from),
        }
    }

    async fn stage_out(&self, rundir: &Path, ctx: &TileContext) -> io::Result<()> {
        let parts = rundir.join("parts").join(format!("{:04}", ctx.band.lat));
        let outputs = rundir.join("outputs");

        let part_files = copy_files(&ctx.layout.parts_dir(ctx.band), &parts, |name| {
            name.starts_with("output") || name.starts_with("daily")
        })
        .await?;
        let tarballs =
            copy_files(&ctx.layout.outputs_dir(), &outputs, |name| name.ends_with(".tar")).await?;

        info!(
            rundir = %rundir.display(),
            part_files,
            tarballs,
            "Staged tile outputs"
        );
        Ok(())
    }
}

#[async_trait]
impl Stage for SharedFsOutputs {
    fn class_name(&self) -> &'static str {
        "stage_outputs_sharedfs"
    }

    async fn run(&self, _ctx: &PointContext) -> Result<bool, StageError> {
        Ok(true)
    }

    async fn run_tile(&self, ctx: &TileContext) -> Result<bool, StageError> {
        let Some(rundir) = &self.rundir else {
            return Ok(true);
        };
        match self.stage_out(rundir, ctx).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(tile = %ctx.tile, error = %e, "Failed to stage tile outputs");
                Ok(false)
            }
        }
    }
}
