//! Grid indexer.
//!
//! Maps geographic coordinates onto the 1-based global cell grid and back,
//! and decomposes a coarse tile into sub-tiles and fine-resolution points.
//!
//! Row indices grow southwards from 90°N, column indices grow eastwards from
//! 180°W. A point on a cell boundary belongs to the lower-index cell, so
//! latitude −90° and longitude +180° fall in the last row and column. There
//! is no wraparound: +180° is never folded onto column 1.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::GridError;

const MINUTES_PER_DEGREE: f64 = 60.0;
const RATIO_TOLERANCE: f64 = 1e-6;

/// Cell size in degrees along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    lat: f64,
    lon: f64,
}

impl Delta {
    /// Create a delta from degree values.
    pub fn new(lat: f64, lon: f64) -> Result<Self, GridError> {
        for value in [lat, lon] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GridError::NonPositiveDelta(value));
            }
        }
        Ok(Self { lat, lon })
    }

    /// Create a delta from arc-minute values.
    pub fn from_arcminutes(lat: f64, lon: f64) -> Result<Self, GridError> {
        Self::new(lat / MINUTES_PER_DEGREE, lon / MINUTES_PER_DEGREE)
    }

    /// Parse `"d"`, `"dlat,dlon"` or a four value tile delta, all in arc-minutes.
    ///
    /// With four values only the first two are meaningful.
    pub fn parse_arcminutes(text: &str) -> Result<Self, GridError> {
        let values = text
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| GridError::InvalidDelta(text.to_string()))?;

        match values.as_slice() {
            [d] => Self::from_arcminutes(*d, *d),
            [lat, lon] | [lat, lon, _, _] => Self::from_arcminutes(*lat, *lon),
            _ => Err(GridError::InvalidDelta(text.to_string())),
        }
    }

    /// Latitude cell size in degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude cell size in degrees.
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Number of rows covering the globe.
    pub fn lat_cells(&self) -> u32 {
        cells_covering(180.0, self.lat)
    }

    /// Number of columns covering the globe.
    pub fn lon_cells(&self) -> u32 {
        cells_covering(360.0, self.lon)
    }
}

fn cells_covering(span: f64, step: f64) -> u32 {
    (span / step - RATIO_TOLERANCE).ceil() as u32
}

/// Raw row index of a latitude: `floor((90 - lat) / delta) + 1`.
pub fn lat_index(lat: f64, delta_lat: f64) -> i64 {
    ((90.0 - lat) / delta_lat).floor() as i64 + 1
}

/// Raw column index of a longitude: `floor((lon + 180) / delta) + 1`.
pub fn lon_index(lon: f64, delta_lon: f64) -> i64 {
    ((lon + 180.0) / delta_lon).floor() as i64 + 1
}

fn check_range(axis: &'static str, index: i64, max: u32) -> Result<u32, GridError> {
    if index < 1 || index > i64::from(max) {
        return Err(GridError::IndexOutOfRange { axis, index, max });
    }
    Ok(index as u32)
}

/// The south pole and the eastern seam sit one past the last cell; they
/// belong to it.
fn closing_edge(index: i64, cells: u32) -> i64 {
    if index == i64::from(cells) + 1 {
        i64::from(cells)
    } else {
        index
    }
}

/// A 1-based `(row, column)` pair on some grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    /// Row, counted from the north pole.
    pub lat: u32,
    /// Column, counted from the antimeridian.
    pub lon: u32,
}

impl CellIndex {
    /// Create a new index pair.
    pub fn new(lat: u32, lon: u32) -> Self {
        Self { lat, lon }
    }

    /// Find the cell containing a geographic point.
    pub fn locate(lat: f64, lon: f64, delta: Delta) -> Result<Self, GridError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GridError::OutsideGlobe { lat, lon });
        }
        let rows = delta.lat_cells();
        let cols = delta.lon_cells();
        let row = check_range("latitude", closing_edge(lat_index(lat, delta.lat), rows), rows)?;
        let col = check_range("longitude", closing_edge(lon_index(lon, delta.lon), cols), cols)?;
        Ok(Self::new(row, col))
    }

    /// Geographic bounding box of this cell.
    pub fn bounds(&self, delta: Delta) -> BoundingBox {
        BoundingBox {
            north: 90.0 - delta.lat * f64::from(self.lat - 1),
            south: 90.0 - delta.lat * f64::from(self.lat),
            west: -180.0 + delta.lon * f64::from(self.lon - 1),
            east: -180.0 + delta.lon * f64::from(self.lon),
        }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:04}", self.lat, self.lon)
    }
}

/// Geographic extent of one cell, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Centre of the box as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.north + self.south) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Whether a point lies inside the box (edges included).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat <= self.north && lat >= self.south && lon >= self.west && lon <= self.east
    }
}

/// Full hierarchical address of one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoordinate {
    /// Tile at the coarse tile delta.
    pub tile: CellIndex,
    /// Sub-tile within the tile, `1..=split` on each axis.
    pub subtile: CellIndex,
    /// Point at the simulation delta, on the global grid.
    pub point: CellIndex,
}

impl fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.point)
    }
}

/// Nested tile -> sub-tile -> point decomposition for fixed deltas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileLayout {
    point_delta: Delta,
    tile_delta: Delta,
    split: u32,
    tile_points: CellIndex,
}

impl TileLayout {
    /// Build a layout; the tile delta must be an integral multiple of the point
    /// delta and the split factor must divide the resulting point count.
    pub fn new(point_delta: Delta, tile_delta: Delta, split: u32) -> Result<Self, GridError> {
        let lat = integral_ratio(tile_delta.lat, point_delta.lat)?;
        let lon = integral_ratio(tile_delta.lon, point_delta.lon)?;

        for points in [lat, lon] {
            if split == 0 || points % split != 0 {
                return Err(GridError::UnevenSplit { split, points });
            }
        }

        Ok(Self {
            point_delta,
            tile_delta,
            split,
            tile_points: CellIndex::new(lat, lon),
        })
    }

    /// Simulation resolution.
    pub fn point_delta(&self) -> Delta {
        self.point_delta
    }

    /// Tile resolution.
    pub fn tile_delta(&self) -> Delta {
        self.tile_delta
    }

    /// Number of sub-tiles per tile axis.
    pub fn split(&self) -> u32 {
        self.split
    }

    /// Points per sub-tile along each axis.
    pub fn subtile_points(&self) -> CellIndex {
        CellIndex::new(self.tile_points.lat / self.split, self.tile_points.lon / self.split)
    }

    /// Number of points in one sub-tile.
    pub fn point_count(&self) -> usize {
        let per = self.subtile_points();
        per.lat as usize * per.lon as usize
    }

    /// Combined sub-tile index on the `split`-times finer tile grid:
    /// `split * (tile - 1) + subtile`.
    pub fn subtile_band(&self, tile: CellIndex, subtile: CellIndex) -> CellIndex {
        CellIndex::new(
            self.split * (tile.lat - 1) + subtile.lat,
            self.split * (tile.lon - 1) + subtile.lon,
        )
    }

    /// Address of the point at a 1-based local offset inside a sub-tile.
    pub fn coordinate(
        &self,
        tile: CellIndex,
        subtile: CellIndex,
        offset: CellIndex,
    ) -> Result<GridCoordinate, GridError> {
        self.check_tile(tile, subtile)?;
        let per = self.subtile_points();
        check_range("local latitude", i64::from(offset.lat), per.lat)?;
        check_range("local longitude", i64::from(offset.lon), per.lon)?;

        let point = CellIndex::new(
            self.tile_points.lat * (tile.lat - 1) + per.lat * (subtile.lat - 1) + offset.lat,
            self.tile_points.lon * (tile.lon - 1) + per.lon * (subtile.lon - 1) + offset.lon,
        );
        Ok(GridCoordinate {
            tile,
            subtile,
            point,
        })
    }

    /// All points of a sub-tile in ascending `(lat, lon)` order.
    pub fn points(
        &self,
        tile: CellIndex,
        subtile: CellIndex,
    ) -> Result<Vec<GridCoordinate>, GridError> {
        let per = self.subtile_points();
        let mut points = Vec::with_capacity(self.point_count());
        for i in 1..=per.lat {
            for j in 1..=per.lon {
                points.push(self.coordinate(tile, subtile, CellIndex::new(i, j))?);
            }
        }
        Ok(points)
    }

    /// Inverse of [`TileLayout::coordinate`]: recover tile and sub-tile of a point.
    pub fn locate(&self, point: CellIndex) -> Result<GridCoordinate, GridError> {
        check_range("latitude", i64::from(point.lat), self.point_delta.lat_cells())?;
        check_range("longitude", i64::from(point.lon), self.point_delta.lon_cells())?;

        let per = self.subtile_points();
        let within = CellIndex::new(
            (point.lat - 1) % self.tile_points.lat,
            (point.lon - 1) % self.tile_points.lon,
        );
        Ok(GridCoordinate {
            tile: CellIndex::new(
                (point.lat - 1) / self.tile_points.lat + 1,
                (point.lon - 1) / self.tile_points.lon + 1,
            ),
            subtile: CellIndex::new(within.lat / per.lat + 1, within.lon / per.lon + 1),
            point,
        })
    }

    /// Local 1-based offset of a coordinate inside its sub-tile.
    pub fn local_offset(&self, coordinate: &GridCoordinate) -> CellIndex {
        let per = self.subtile_points();
        CellIndex::new(
            (coordinate.point.lat - 1) % per.lat + 1,
            (coordinate.point.lon - 1) % per.lon + 1,
        )
    }

    fn check_tile(&self, tile: CellIndex, subtile: CellIndex) -> Result<(), GridError> {
        check_range("tile latitude", i64::from(tile.lat), self.tile_delta.lat_cells())?;
        check_range("tile longitude", i64::from(tile.lon), self.tile_delta.lon_cells())?;
        check_range("subtile latitude", i64::from(subtile.lat), self.split)?;
        check_range("subtile longitude", i64::from(subtile.lon), self.split)?;
        Ok(())
    }
}

fn integral_ratio(tile: f64, point: f64) -> Result<u32, GridError> {
    let ratio = tile / point;
    let rounded = ratio.round();
    if rounded < 1.0 || (ratio - rounded).abs() > RATIO_TOLERANCE {
        return Err(GridError::NonIntegralRatio { tile, point });
    }
    Ok(rounded as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(point_min: f64, tile_min: f64, split: u32) -> TileLayout {
        TileLayout::new(
            Delta::from_arcminutes(point_min, point_min).unwrap(),
            Delta::from_arcminutes(tile_min, tile_min).unwrap(),
            split,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_delta_variants() {
        let single = Delta::parse_arcminutes("30").unwrap();
        assert_eq!(single.lat(), 0.5);
        assert_eq!(single.lon(), 0.5);

        let pair = Delta::parse_arcminutes("30, 60").unwrap();
        assert_eq!(pair.lat(), 0.5);
        assert_eq!(pair.lon(), 1.0);

        let quad = Delta::parse_arcminutes("120,120,30,30").unwrap();
        assert_eq!(quad.lat(), 2.0);

        assert!(matches!(
            Delta::parse_arcminutes("1,2,3"),
            Err(GridError::InvalidDelta(_))
        ));
        assert!(matches!(
            Delta::parse_arcminutes("abc"),
            Err(GridError::InvalidDelta(_))
        ));
        assert!(matches!(
            Delta::parse_arcminutes("0"),
            Err(GridError::NonPositiveDelta(_))
        ));
    }

    #[test]
    fn test_locate_and_bounds() {
        let delta = Delta::new(0.5, 0.5).unwrap();
        let cell = CellIndex::locate(89.9, -179.9, delta).unwrap();
        assert_eq!(cell, CellIndex::new(1, 1));

        let bounds = CellIndex::new(3, 5).bounds(delta);
        assert_eq!(bounds.north, 89.0);
        assert_eq!(bounds.south, 88.5);
        assert_eq!(bounds.west, -178.0);
        assert_eq!(bounds.east, -177.5);
        assert!(bounds.contains(88.75, -177.75));
    }

    #[test]
    fn test_seam_and_pole_edges() {
        let delta = Delta::new(0.5, 0.5).unwrap();

        // North pole and the western seam fall in the first cells.
        assert_eq!(
            CellIndex::locate(90.0, -180.0, delta).unwrap(),
            CellIndex::new(1, 1)
        );

        // An interior boundary goes to the cell whose north/west edge it is.
        assert_eq!(lat_index(89.5, 0.5), 2);
        assert_eq!(lon_index(-179.5, 0.5), 2);

        // The raw formula puts the south pole and the eastern seam one past
        // the grid; they belong to the last row and column, not to column 1.
        assert_eq!(lat_index(-90.0, 0.5), 361);
        assert_eq!(lon_index(180.0, 0.5), 721);
        assert_eq!(
            CellIndex::locate(0.0, 180.0, delta).unwrap(),
            CellIndex::new(180, 720)
        );
        assert_eq!(
            CellIndex::locate(-90.0, 0.0, delta).unwrap(),
            CellIndex::new(360, 360)
        );
        assert_eq!(
            CellIndex::locate(-90.0, 180.0, delta).unwrap(),
            CellIndex::new(360, 720)
        );
        assert_eq!(
            CellIndex::locate(-89.9, 179.9, delta).unwrap(),
            CellIndex::new(360, 720)
        );

        // Point indices themselves are still range checked.
        assert!(matches!(
            TileLayout::new(delta, Delta::new(1.0, 1.0).unwrap(), 1)
                .unwrap()
                .locate(CellIndex::new(1, 721)),
            Err(GridError::IndexOutOfRange { axis: "longitude", index: 721, max: 720 })
        ));
        assert!(matches!(
            CellIndex::locate(91.0, 0.0, delta),
            Err(GridError::OutsideGlobe { .. })
        ));
    }

    #[test]
    fn test_layout_rejects_bad_ratios() {
        let point = Delta::from_arcminutes(30.0, 30.0).unwrap();
        let tile = Delta::from_arcminutes(45.0, 45.0).unwrap();
        assert!(matches!(
            TileLayout::new(point, tile, 1),
            Err(GridError::NonIntegralRatio { .. })
        ));

        let tile = Delta::from_arcminutes(120.0, 120.0).unwrap();
        assert!(matches!(
            TileLayout::new(point, tile, 3),
            Err(GridError::UnevenSplit { split: 3, points: 4 })
        ));
        assert!(TileLayout::new(point, tile, 0).is_err());
    }

    #[test]
    fn test_points_of_subtile() {
        // 2 degree tiles, 30 arc-minute points, split in two: 2x2 points per subtile.
        let layout = layout(30.0, 120.0, 2);
        assert_eq!(layout.subtile_points(), CellIndex::new(2, 2));
        assert_eq!(layout.point_count(), 4);

        let points = layout
            .points(CellIndex::new(3, 4), CellIndex::new(2, 1))
            .unwrap();
        let cells: Vec<_> = points.iter().map(|p| p.point).collect();
        assert_eq!(
            cells,
            vec![
                CellIndex::new(11, 13),
                CellIndex::new(11, 14),
                CellIndex::new(12, 13),
                CellIndex::new(12, 14),
            ]
        );
        assert_eq!(
            layout.subtile_band(CellIndex::new(3, 4), CellIndex::new(2, 1)),
            CellIndex::new(6, 7)
        );
    }

    #[test]
    fn test_round_trip_through_geography() {
        for (point_min, tile_min, split) in [(30.0, 30.0, 1), (30.0, 120.0, 2), (5.0, 60.0, 3)] {
            let layout = layout(point_min, tile_min, split);
            let delta = layout.point_delta();
            let per = layout.subtile_points();

            for tile in [CellIndex::new(1, 1), CellIndex::new(7, 11), CellIndex::new(90, 180)] {
                if tile.lat > layout.tile_delta().lat_cells()
                    || tile.lon > layout.tile_delta().lon_cells()
                {
                    continue;
                }
                for s in 1..=split {
                    for i in 1..=per.lat {
                        for j in 1..=per.lon {
                            let subtile = CellIndex::new(s, split + 1 - s);
                            let offset = CellIndex::new(i, j);
                            let coord = layout.coordinate(tile, subtile, offset).unwrap();

                            let (lat, lon) = coord.point.bounds(delta).center();
                            let cell = CellIndex::locate(lat, lon, delta).unwrap();
                            assert_eq!(cell, coord.point);

                            let back = layout.locate(cell).unwrap();
                            assert_eq!(back, coord);
                            assert_eq!(layout.local_offset(&back), offset);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_coordinate_rejects_out_of_range() {
        let layout = layout(30.0, 120.0, 2);
        assert!(layout
            .coordinate(CellIndex::new(1, 1), CellIndex::new(3, 1), CellIndex::new(1, 1))
            .is_err());
        assert!(layout
            .coordinate(CellIndex::new(1, 1), CellIndex::new(1, 1), CellIndex::new(3, 1))
            .is_err());
        assert!(layout
            .coordinate(CellIndex::new(0, 1), CellIndex::new(1, 1), CellIndex::new(1, 1))
            .is_err());
    }
}
