//! Archive backends used by the combiner.
//!
//! The combiner never looks inside archives. It asks a backend to make an
//! axis the record dimension, to concatenate along it, to restore the
//! canonical dimension order, and optionally to count entries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gridrun_core::{ArchiveDocument, Axis, CANONICAL_LAYOUT, JSON_ARCHIVE_EXT};
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::CombineError;

/// Operations the combiner needs from an archive format.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// File extension of archives in this format, without the leading dot.
    fn extension(&self) -> &'static str;

    /// Make `axis` the record dimension of `path`, in place.
    async fn make_record(&self, path: &Path, axis: Axis) -> Result<(), CombineError>;

    /// Concatenate `inputs`, in the given order, along their record dimension.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), CombineError>;

    /// Restore the canonical `(time, scenario, lat, lon)` layout, in place.
    async fn canonicalize(&self, path: &Path) -> Result<(), CombineError>;

    /// Number of point entries in an archive, if the format can tell.
    async fn entry_count(&self, path: &Path) -> Result<Option<usize>, CombineError>;

    /// Whether a point archive is a fallback placeholder, if the format can tell.
    async fn is_placeholder(&self, path: &Path) -> Result<Option<bool>, CombineError>;
}

/// Built-in JSON document backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArchiver;

impl JsonArchiver {
    /// Read an archive document.
    pub async fn read(path: &Path) -> Result<ArchiveDocument, CombineError> {
        let bytes = fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|source| CombineError::Document {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn write(path: &Path, doc: &ArchiveDocument) -> Result<(), CombineError> {
        let bytes = serde_json::to_vec_pretty(doc).map_err(|source| CombineError::Document {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Archiver for JsonArchiver {
    fn extension(&self) -> &'static str {
        JSON_ARCHIVE_EXT
    }

    async fn make_record(&self, path: &Path, axis: Axis) -> Result<(), CombineError> {
        let mut doc = Self::read(path).await?;
        doc.make_record_axis(axis);
        Self::write(path, &doc).await
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), CombineError> {
        let mut combined: Option<ArchiveDocument> = None;
        for input in inputs {
            let doc = Self::read(input).await?;
            match combined.as_mut() {
                Some(acc) => acc.cells.extend(doc.cells),
                None => combined = Some(doc),
            }
        }
        let combined = combined.unwrap_or_else(|| ArchiveDocument {
            layout: CANONICAL_LAYOUT.to_vec(),
            cells: Vec::new(),
        });
        Self::write(output, &combined).await
    }

    async fn canonicalize(&self, path: &Path) -> Result<(), CombineError> {
        let mut doc = Self::read(path).await?;
        doc.layout = CANONICAL_LAYOUT.to_vec();
        Self::write(path, &doc).await
    }

    async fn entry_count(&self, path: &Path) -> Result<Option<usize>, CombineError> {
        Ok(Some(Self::read(path).await?.entry_count()))
    }

    async fn is_placeholder(&self, path: &Path) -> Result<Option<bool>, CombineError> {
        Ok(Some(Self::read(path).await?.fallback_count() > 0))
    }
}

/// netCDF backend driving `ncpdq` and `ncrcat`.
#[derive(Debug, Clone)]
pub struct NcoArchiver {
    ncpdq: String,
    ncrcat: String,
}

impl Default for NcoArchiver {
    fn default() -> Self {
        Self {
            ncpdq: "ncpdq".to_string(),
            ncrcat: "ncrcat".to_string(),
        }
    }
}

impl NcoArchiver {
    /// Use explicit tool paths.
    pub fn new(ncpdq: impl Into<String>, ncrcat: impl Into<String>) -> Self {
        Self {
            ncpdq: ncpdq.into(),
            ncrcat: ncrcat.into(),
        }
    }

    /// Dimension permutation handed to `ncpdq -a`. Point files carry time as
    /// the record dimension, latitude bands carry longitude.
    fn permutation(axis: Axis) -> &'static str {
        match axis {
            Axis::Lon => "lon,time",
            Axis::Lat => "lat,lon",
            Axis::Time => "time,lon",
            Axis::Scenario => "scen,time",
        }
    }

    async fn permute(&self, path: &Path, order: &str) -> Result<(), CombineError> {
        let mut cmd = Command::new(&self.ncpdq);
        cmd.args(["-O", "-h", "-a", order]).arg(path).arg(path);
        run_tool(&self.ncpdq, &mut cmd).await
    }
}

#[async_trait]
impl Archiver for NcoArchiver {
    fn extension(&self) -> &'static str {
        "psims.nc"
    }

    async fn make_record(&self, path: &Path, axis: Axis) -> Result<(), CombineError> {
        self.permute(path, Self::permutation(axis)).await
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), CombineError> {
        let mut cmd = Command::new(&self.ncrcat);
        cmd.args(["-O", "-h"]).args(inputs).arg(output);
        run_tool(&self.ncrcat, &mut cmd).await
    }

    async fn canonicalize(&self, path: &Path) -> Result<(), CombineError> {
        self.permute(path, "lon,lat").await?;
        self.permute(path, "time,lon").await
    }

    async fn entry_count(&self, _path: &Path) -> Result<Option<usize>, CombineError> {
        Ok(None)
    }

    async fn is_placeholder(&self, _path: &Path) -> Result<Option<bool>, CombineError> {
        Ok(None)
    }
}

async fn run_tool(program: &str, cmd: &mut Command) -> Result<(), CombineError> {
    debug!(program = %program, "Running archive tool");
    let output = cmd.kill_on_drop(true).output().await?;
    if output.status.success() {
        return Ok(());
    }
    Err(CombineError::Tool {
        program: program.to_string(),
        code: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
