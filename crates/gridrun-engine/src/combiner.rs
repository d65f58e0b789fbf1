//! Output combiner.
//!
//! Reduces the per-point archives of a sub-tile: every latitude row is
//! concatenated along longitude into a band file, the band files are
//! concatenated along latitude into the tile file, and the tile file is put
//! back into canonical dimension order. Order comes from the manifest sorted
//! by point index, never from completion order. A scheduled point without an
//! outcome, without an archive, or with an archive that disagrees with its
//! outcome is an error.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use gridrun_core::{
    Axis, CellIndex, GridCoordinate, PointOutcome, Product, RunManifest, WorkLayout,
};
use tokio::fs;
use tracing::{debug, info};

use crate::{Archiver, CombineError};

/// A combined tile-level archive.
#[derive(Debug, Clone, PartialEq)]
pub struct TileArchive {
    /// Product the archive belongs to.
    pub product: Product,

    /// Location under `parts/`.
    pub path: PathBuf,

    /// Number of entries, when the backend can count them.
    pub entries: Option<usize>,
}

/// Reduces point archives into tile archives.
#[derive(Clone)]
pub struct Combiner {
    archiver: Arc<dyn Archiver>,
    products: Vec<Product>,
}

impl Combiner {
    /// Create a combiner for the given products.
    pub fn new(archiver: Arc<dyn Archiver>, products: Vec<Product>) -> Self {
        Self { archiver, products }
    }

    /// Combine every product of a sub-tile.
    ///
    /// `expected` is the full point set that was scheduled and every one of
    /// them must have finished in `manifest`. `band` is the combined
    /// sub-tile index used in tile-level file names.
    pub async fn combine(
        &self,
        layout: &WorkLayout,
        band: CellIndex,
        expected: &[GridCoordinate],
        manifest: &RunManifest,
    ) -> Result<Vec<TileArchive>, CombineError> {
        if let Some(first) = manifest
            .failures()
            .iter()
            .min_by_key(|f| f.coordinate.point)
        {
            return Err(CombineError::PointsCrashed {
                count: manifest.failures().len(),
                point: first.coordinate.point,
                reason: first.reason.clone(),
            });
        }

        let scheduled: BTreeSet<CellIndex> = expected.iter().map(|c| c.point).collect();
        let finished: BTreeSet<CellIndex> =
            manifest.outcomes().iter().map(|o| o.coordinate.point).collect();
        if let Some(point) = scheduled.difference(&finished).next() {
            return Err(CombineError::Unfinished { point: *point });
        }

        let outcomes: Vec<&PointOutcome> = manifest
            .sorted()
            .into_iter()
            .filter(|o| scheduled.contains(&o.coordinate.point))
            .collect();
        let bands: Vec<u32> = manifest
            .latitude_bands()
            .into_iter()
            .filter(|lat| outcomes.iter().any(|o| o.coordinate.point.lat == *lat))
            .collect();

        let mut archives = Vec::with_capacity(self.products.len());
        for product in &self.products {
            archives.push(
                self.combine_product(layout, band, &bands, &outcomes, product)
                    .await?,
            );
        }
        Ok(archives)
    }

    /// Check that every outcome left a matching archive of `product`.
    async fn check_entries(
        &self,
        layout: &WorkLayout,
        outcomes: &[&PointOutcome],
        product: &Product,
    ) -> Result<(), CombineError> {
        let ext = self.archiver.extension();
        let found = discover(layout, product, ext).await?;
        for outcome in outcomes {
            let point = outcome.coordinate.point;
            if !found.contains(&point) {
                return Err(CombineError::MissingPoint {
                    product: product.name().to_string(),
                    point,
                });
            }
            let path = layout.point_output(product, point, ext);
            if let Some(placeholder) = self.archiver.is_placeholder(&path).await? {
                if placeholder != outcome.used_fallback {
                    return Err(CombineError::OutcomeMismatch {
                        product: product.name().to_string(),
                        point,
                        fell_back: outcome.used_fallback,
                    });
                }
            }
        }
        Ok(())
    }

    async fn combine_product(
        &self,
        layout: &WorkLayout,
        band: CellIndex,
        bands: &[u32],
        outcomes: &[&PointOutcome],
        product: &Product,
    ) -> Result<TileArchive, CombineError> {
        self.check_entries(layout, outcomes, product).await?;
        let ext = self.archiver.extension();

        let mut band_files = Vec::with_capacity(bands.len());
        for lat in bands {
            let inputs: Vec<PathBuf> = outcomes
                .iter()
                .filter(|o| o.coordinate.point.lat == *lat)
                .map(|o| layout.point_output(product, o.coordinate.point, ext))
                .collect();
            for input in &inputs {
                self.archiver.make_record(input, Axis::Lon).await?;
            }

            let band_file = layout.band_output(product, *lat, ext);
            self.archiver.concat(&inputs, &band_file).await?;
            self.archiver.make_record(&band_file, Axis::Lat).await?;
            debug!(
                product = %product.name(),
                lat = *lat,
                points = inputs.len(),
                "Combined latitude band"
            );
            band_files.push(band_file);
        }

        fs::create_dir_all(layout.parts_dir(band)).await?;
        let tile_file = layout.tile_output(product, band, ext);
        self.archiver.concat(&band_files, &tile_file).await?;
        self.archiver.canonicalize(&tile_file).await?;

        let entries = self.archiver.entry_count(&tile_file).await?;
        if let Some(found) = entries {
            if found != outcomes.len() {
                return Err(CombineError::EntryCountMismatch {
                    path: tile_file,
                    expected: outcomes.len(),
                    found,
                });
            }
        }

        for band_file in &band_files {
            fs::remove_file(band_file).await?;
        }

        info!(
            product = %product.name(),
            band = %band,
            rows = bands.len(),
            entries = ?entries,
            path = %tile_file.display(),
            "Combined tile archive"
        );
        Ok(TileArchive {
            product: product.clone(),
            path: tile_file,
            entries,
        })
    }
}

/// Points that left an archive of `product` in the outputs directory.
async fn discover(
    layout: &WorkLayout,
    product: &Product,
    ext: &str,
) -> io::Result<BTreeSet<CellIndex>> {
    let mut found = BTreeSet::new();
    let mut entries = match fs::read_dir(layout.outputs_dir()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if let Some(point) = entry
            .file_name()
            .to_str()
            .and_then(|name| product.parse_point_file(name, ext))
        {
            found.insert(point);
        }
    }
    Ok(found)
}
