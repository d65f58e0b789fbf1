//! Stages writing per-point archives in the built-in document format.

use std::path::PathBuf;

use async_trait::async_trait;
use gridrun_core::{
    ArchiveDocument, Cell, Delta, GridCoordinate, Product, JSON_ARCHIVE_EXT,
};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info};

use crate::{PointContext, RegistryError, Slot, Stage, StageConfig, StageError};

async fn write_cells<F>(
    ctx: &PointContext,
    products: &[Product],
    cell: F,
) -> Result<Vec<PathBuf>, StageError>
where
    F: Fn(&Product) -> Cell,
{
    fs::create_dir_all(ctx.layout.outputs_dir()).await?;

    let mut written = Vec::with_capacity(products.len());
    for product in products {
        let path = ctx
            .layout
            .point_output(product, ctx.coordinate.point, JSON_ARCHIVE_EXT);
        let doc = ArchiveDocument::single(cell(product));
        fs::write(&path, serde_json::to_vec_pretty(&doc)?).await?;
        written.push(path);
    }
    Ok(written)
}

fn read_grid(cfg: &StageConfig) -> Result<(Delta, Vec<Product>), RegistryError> {
    let delta = cfg
        .params
        .delta("delta")
        .map_err(|e| cfg.invalid(e.to_string()))?;
    let products = Product::configured(&cfg.params).map_err(|e| cfg.invalid(e.to_string()))?;
    Ok((delta, products))
}

/// Collects model output files into the point's archive entry.
///
/// Declines the point when any configured file is missing.
#[derive(Debug, Clone)]
pub struct ArchiveOutput {
    slot: Slot,
    delta: Delta,
    products: Vec<Product>,
    files: Vec<String>,
}

impl ArchiveOutput {
    /// Build from the slot namespace; `files` lists the captured outputs.
    pub fn from_config(cfg: &StageConfig) -> Result<Self, RegistryError> {
        let (delta, products) = read_grid(cfg)?;
        let files = cfg
            .params
            .list_in(cfg.slot.key(), "files")
            .map_err(|e| cfg.invalid(e.to_string()))?;
        Ok(Self {
            slot: cfg.slot,
            delta,
            products,
            files,
        })
    }
}

#[async_trait]
impl Stage for ArchiveOutput {
    fn class_name(&self) -> &'static str {
        "archive_output"
    }

    async fn run(&self, ctx: &PointContext) -> Result<bool, StageError> {
        let mut payload = Map::new();
        for name in &self.files {
            match fs::read_to_string(ctx.work_dir.join(name)).await {
                Ok(content) => {
                    payload.insert(name.clone(), Value::String(content));
                }
                Err(e) => {
                    info!(
                        point = %ctx.coordinate,
                        file = %name,
                        error = %e,
                        "Model output missing"
                    );
                    return Ok(false);
                }
            }
        }

        let payload = Value::Object(payload);
        let point = ctx.coordinate.point;
        let written = write_cells(ctx, &self.products, |_| {
            Cell::new(point, self.delta, payload.clone())
        })
        .await?;
        debug!(point = %ctx.coordinate, files = written.len(), "Wrote point archives");
        Ok(true)
    }

    fn verify(&self, _coordinate: &GridCoordinate) -> (bool, String) {
        if self.files.is_empty() {
            return (false, format!("{} lists no output files", self.slot));
        }
        (true, format!("{} captures {} files", self.slot, self.files.len()))
    }
}

/// Fallback stage: writes an empty, flagged entry so the point still
/// contributes to every combined product.
#[derive(Debug, Clone)]
pub struct ArchivePlaceholder {
    delta: Delta,
    products: Vec<Product>,
}

impl ArchivePlaceholder {
    /// Build from run-wide grid parameters.
    pub fn from_config(cfg: &StageConfig) -> Result<Self, RegistryError> {
        let (delta, products) = read_grid(cfg)?;
        Ok(Self { delta, products })
    }
}

#[async_trait]
impl Stage for ArchivePlaceholder {
    fn class_name(&self) -> &'static str {
        "archive_placeholder"
    }

    async fn run(&self, ctx: &PointContext) -> Result<bool, StageError> {
        let point = ctx.coordinate.point;
        write_cells(ctx, &self.products, |_| Cell::placeholder(point, self.delta)).await?;
        Ok(true)
    }
}
