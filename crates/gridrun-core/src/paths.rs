//! Working-directory conventions.
//!
//! Every point runs in `<root>/<lat>/<lon>` with 4-digit zero padded indices,
//! and writes its archive into `<root>/outputs`. The combiner discovers
//! point files purely by these names.

use std::path::{Path, PathBuf};

use crate::{CellIndex, Params, ParamsError};

/// Name of the per-point provenance tarball.
pub const POINT_TARBALL: &str = "output.tar.gz";

/// A family of per-point output files, e.g. `output` or `daily` for one year.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Product {
    name: String,
    tag: Option<String>,
}

impl Product {
    /// Create a product with an optional tag inserted before the extension.
    pub fn new(name: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            name: name.into(),
            tag,
        }
    }

    /// The seasonal output every point must produce.
    pub fn primary() -> Self {
        Self::new("output", None)
    }

    /// Daily output for one simulated year.
    pub fn daily(year: u32) -> Self {
        Self::new("daily", Some(format!("{:04}", year)))
    }

    /// Products a run must combine: always the primary output, plus one
    /// daily product per simulated year when `daily_variables` is set and
    /// `daily_combine` is not disabled.
    pub fn configured(params: &Params) -> Result<Vec<Self>, ParamsError> {
        let mut products = vec![Self::primary()];

        let daily = !params.list("daily_variables")?.is_empty();
        let combine = params.get_bool("daily_combine")?.unwrap_or(true);
        if daily && combine {
            let ref_year = params
                .get_u64("ref_year")?
                .ok_or_else(|| ParamsError::Missing("ref_year".to_string()))?;
            let num_years = params
                .get_u64("num_years")?
                .ok_or_else(|| ParamsError::Missing("num_years".to_string()))?;
            for year in ref_year..ref_year + num_years {
                products.push(Self::daily(year as u32));
            }
        }
        Ok(products)
    }

    /// Product name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn suffix(&self, ext: &str) -> String {
        match &self.tag {
            Some(tag) => format!(".{}.{}", tag, ext),
            None => format!(".{}", ext),
        }
    }

    /// File name for one point, e.g. `output_0011_0013.psims.json`.
    pub fn point_file(&self, point: CellIndex, ext: &str) -> String {
        format!(
            "{}_{:04}_{:04}{}",
            self.name,
            point.lat,
            point.lon,
            self.suffix(ext)
        )
    }

    /// File name for one latitude band, e.g. `output_0011.psims.json`.
    pub fn band_file(&self, lat: u32, ext: &str) -> String {
        format!("{}_{:04}{}", self.name, lat, self.suffix(ext))
    }

    /// Recover the point index from a point file name of this product.
    pub fn parse_point_file(&self, file_name: &str, ext: &str) -> Option<CellIndex> {
        let rest = file_name
            .strip_prefix(self.name.as_str())?
            .strip_prefix('_')?
            .strip_suffix(self.suffix(ext).as_str())?;
        let (lat, lon) = rest.split_once('_')?;
        if lat.len() < 4 || lon.len() < 4 {
            return None;
        }
        Some(CellIndex::new(lat.parse().ok()?, lon.parse().ok()?))
    }
}

/// Directory layout of one tile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    root: PathBuf,
}

impl WorkLayout {
    /// Layout rooted at a tile working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Tile working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Private directory of one point.
    pub fn point_dir(&self, point: CellIndex) -> PathBuf {
        self.root
            .join(format!("{:04}", point.lat))
            .join(format!("{:04}", point.lon))
    }

    /// Shared inputs staged once per tile.
    pub fn inputs_dir(&self) -> PathBuf {
        self.root.join("inputs")
    }

    /// Per-point archives and provenance tarballs.
    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    /// Archive written by one point.
    pub fn point_output(&self, product: &Product, point: CellIndex, ext: &str) -> PathBuf {
        self.outputs_dir().join(product.point_file(point, ext))
    }

    /// Intermediate file holding one latitude band.
    pub fn band_output(&self, product: &Product, lat: u32, ext: &str) -> PathBuf {
        self.root.join(product.band_file(lat, ext))
    }

    /// Directory holding the tile-level archives of a sub-tile row.
    pub fn parts_dir(&self, band: CellIndex) -> PathBuf {
        self.root.join("parts").join(format!("{:04}", band.lat))
    }

    /// Tile-level archive of a sub-tile.
    pub fn tile_output(&self, product: &Product, band: CellIndex, ext: &str) -> PathBuf {
        self.parts_dir(band).join(product.point_file(band, ext))
    }

    /// Provenance tarball of a sub-tile.
    pub fn provenance_tar(&self, band: CellIndex) -> PathBuf {
        self.outputs_dir()
            .join(format!("outputs_{:04}_{:04}.tar", band.lat, band.lon))
    }
}
