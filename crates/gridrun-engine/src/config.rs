//! Engine configuration.

use std::num::NonZeroUsize;
use std::sync::Arc;

use gridrun_core::{Params, ParamsError, Product};

use crate::archiver::{Archiver, JsonArchiver, NcoArchiver};

/// Archive backend used by the combiner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Built-in JSON documents.
    #[default]
    Json,
    /// netCDF files driven through the NCO tools.
    Nco,
}

impl ArchiveFormat {
    /// Parse the `archive` parameter.
    pub fn parse(value: &str) -> Result<Self, ParamsError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "nco" | "netcdf" => Ok(Self::Nco),
            _ => Err(ParamsError::WrongType {
                key: "archive".to_string(),
                expected: "'json' or 'nco'",
            }),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of points executing at once.
    pub pool_size: usize,

    /// Archive backend.
    pub archive: ArchiveFormat,

    /// Products the combiner must reduce.
    pub products: Vec<Product>,

    /// File suffixes packaged into the provenance tarball.
    pub outtypes: Vec<String>,

    /// Keep point directories after the run.
    pub keep_point_dirs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            archive: ArchiveFormat::default(),
            products: vec![Product::primary()],
            outtypes: Vec::new(),
            keep_point_dirs: false,
        }
    }
}

impl EngineConfig {
    /// Read engine settings from run parameters, defaulting what is absent.
    pub fn from_params(params: &Params) -> Result<Self, ParamsError> {
        let defaults = Self::default();
        let pool_size = match params.get_u64("pool_size")? {
            Some(0) | None => defaults.pool_size,
            Some(n) => n as usize,
        };
        let archive = match params.text("archive") {
            Some(value) => ArchiveFormat::parse(&value)?,
            None => defaults.archive,
        };

        Ok(Self {
            pool_size,
            archive,
            products: Product::configured(params)?,
            outtypes: params.list("outtypes")?,
            keep_point_dirs: params.get_bool("keep_point_dirs")?.unwrap_or(false),
        })
    }

    /// Instantiate the configured archive backend.
    pub fn archiver(&self) -> Arc<dyn Archiver> {
        match self.archive {
            ArchiveFormat::Json => Arc::new(JsonArchiver),
            ArchiveFormat::Nco => Arc::new(NcoArchiver::default()),
        }
    }
}
