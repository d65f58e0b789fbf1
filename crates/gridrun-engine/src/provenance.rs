//! Provenance tarballs.
//!
//! Each point's raw outputs matching the configured suffixes are packed into
//! `<point>/output.tar.gz`, and those are collected into one uncompressed
//! `outputs/outputs_<lat>_<lon>.tar` per sub-tile.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use gridrun_core::{CellIndex, GridCoordinate, WorkLayout, POINT_TARBALL};
use tracing::{info, warn};

/// Build the provenance tarball of a sub-tile. Returns its path.
pub async fn package(
    layout: &WorkLayout,
    band: CellIndex,
    points: &[GridCoordinate],
    outtypes: &[String],
) -> io::Result<PathBuf> {
    let layout = layout.clone();
    let outtypes = outtypes.to_vec();
    let mut points: Vec<CellIndex> = points.iter().map(|c| c.point).collect();
    points.sort();

    tokio::task::spawn_blocking(move || package_blocking(&layout, band, &points, &outtypes))
        .await
        .map_err(io::Error::other)?
}

fn package_blocking(
    layout: &WorkLayout,
    band: CellIndex,
    points: &[CellIndex],
    outtypes: &[String],
) -> io::Result<PathBuf> {
    std::fs::create_dir_all(layout.outputs_dir())?;
    let tar_path = layout.provenance_tar(band);
    let mut outputs = tar::Builder::new(File::create(&tar_path)?);

    let mut packed = 0;
    for point in points {
        let dir = layout.point_dir(*point);
        if !dir.is_dir() {
            warn!(point = %point, "Point directory missing, skipping provenance");
            continue;
        }
        let tarball = pack_point(&dir, outtypes)?;
        let name = Path::new(&format!("{:04}", point.lat))
            .join(format!("{:04}", point.lon))
            .join(POINT_TARBALL);
        outputs.append_path_with_name(&tarball, name)?;
        packed += 1;
    }
    outputs.into_inner()?;

    info!(path = %tar_path.display(), points = packed, "Created provenance tarball");
    Ok(tar_path)
}

/// Write `<dir>/output.tar.gz` holding the files whose names end in one of
/// `outtypes`.
fn pack_point(dir: &Path, outtypes: &[String]) -> io::Result<PathBuf> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name != POINT_TARBALL)
        .filter(|name| outtypes.iter().any(|suffix| name.ends_with(suffix.as_str())))
        .collect();
    names.sort();

    let path = dir.join(POINT_TARBALL);
    let encoder = GzEncoder::new(File::create(&path)?, Compression::default());
    let mut tarball = tar::Builder::new(encoder);
    for name in &names {
        tarball.append_path_with_name(dir.join(name), name)?;
    }
    tarball.into_inner()?.finish()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn coord(lat: u32, lon: u32) -> GridCoordinate {
        GridCoordinate {
            tile: CellIndex::new(1, 1),
            subtile: CellIndex::new(1, 1),
            point: CellIndex::new(lat, lon),
        }
    }

    fn entry_names<R: io::Read>(archive: &mut tar::Archive<R>) -> Vec<String> {
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_package_filters_by_suffix() {
        let tmp = TempDir::new().unwrap();
        let layout = WorkLayout::new(tmp.path());
        for c in [coord(1, 2), coord(1, 1)] {
            let dir = layout.point_dir(c.point);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("Summary.OUT"), "yield").unwrap();
            std::fs::write(dir.join("input.MZX"), "x").unwrap();
        }

        let path = package(
            &layout,
            CellIndex::new(2, 3),
            &[coord(1, 2), coord(1, 1)],
            &[".OUT".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(path, tmp.path().join("outputs/outputs_0002_0003.tar"));

        let mut outer = tar::Archive::new(File::open(&path).unwrap());
        assert_eq!(
            entry_names(&mut outer),
            vec!["0001/0001/output.tar.gz", "0001/0002/output.tar.gz"]
        );

        let inner = File::open(layout.point_dir(CellIndex::new(1, 1)).join(POINT_TARBALL)).unwrap();
        let mut inner = tar::Archive::new(GzDecoder::new(inner));
        assert_eq!(entry_names(&mut inner), vec!["Summary.OUT"]);
    }

    #[tokio::test]
    async fn test_package_skips_missing_point_dirs() {
        let tmp = TempDir::new().unwrap();
        let layout = WorkLayout::new(tmp.path());

        let path = package(&layout, CellIndex::new(1, 1), &[coord(1, 1)], &[])
            .await
            .unwrap();
        let mut outer = tar::Archive::new(File::open(&path).unwrap());
        assert!(entry_names(&mut outer).is_empty());
    }
}
