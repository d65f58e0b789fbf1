//! Self-describing gridded archive document.
//!
//! This is the interchange format of the built-in archive backend. Each cell
//! is one point's contribution; the payload is opaque to the core.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CellIndex, Delta};

/// Dimension of a gridded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Time,
    Scenario,
    Lat,
    Lon,
}

/// File extension of the built-in archive format.
pub const JSON_ARCHIVE_EXT: &str = "psims.json";

/// Dimension order expected by downstream consumers.
pub const CANONICAL_LAYOUT: [Axis; 4] = [Axis::Time, Axis::Scenario, Axis::Lat, Axis::Lon];

/// One point's entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Global point index.
    pub point: CellIndex,

    /// Cell centre latitude.
    pub latitude: f64,

    /// Cell centre longitude.
    pub longitude: f64,

    /// Whether the entry is a placeholder written by a fallback stage.
    #[serde(default)]
    pub fallback: bool,

    /// Stage-defined content.
    #[serde(default)]
    pub payload: Value,
}

impl Cell {
    /// Create a cell positioned at the centre of `point`.
    pub fn new(point: CellIndex, delta: Delta, payload: Value) -> Self {
        let (latitude, longitude) = point.bounds(delta).center();
        Self {
            point,
            latitude,
            longitude,
            fallback: false,
            payload,
        }
    }

    /// Create an empty placeholder cell.
    pub fn placeholder(point: CellIndex, delta: Delta) -> Self {
        Self {
            fallback: true,
            ..Self::new(point, delta, Value::Null)
        }
    }
}

/// A gridded archive: a dimension layout and an ordered list of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveDocument {
    /// Stored dimension order, record dimension first.
    pub layout: Vec<Axis>,

    /// Entries in storage order.
    pub cells: Vec<Cell>,
}

impl ArchiveDocument {
    /// A single-point archive in the canonical layout.
    pub fn single(cell: Cell) -> Self {
        Self {
            layout: CANONICAL_LAYOUT.to_vec(),
            cells: vec![cell],
        }
    }

    /// Move `axis` to the front of the layout, keeping the others in order.
    pub fn make_record_axis(&mut self, axis: Axis) {
        self.layout.retain(|a| *a != axis);
        self.layout.insert(0, axis);
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of placeholder entries.
    pub fn fallback_count(&self) -> usize {
        self.cells.iter().filter(|c| c.fallback).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_record_axis() {
        let mut doc = ArchiveDocument::single(Cell::placeholder(
            CellIndex::new(1, 1),
            Delta::new(0.5, 0.5).unwrap(),
        ));
        doc.make_record_axis(Axis::Lon);
        assert_eq!(doc.layout, vec![Axis::Lon, Axis::Time, Axis::Scenario, Axis::Lat]);
        doc.make_record_axis(Axis::Lat);
        assert_eq!(doc.layout, vec![Axis::Lat, Axis::Lon, Axis::Time, Axis::Scenario]);
    }

    #[test]
    fn test_placeholder_cell_position() {
        let cell = Cell::placeholder(CellIndex::new(2, 3), Delta::new(0.5, 0.5).unwrap());
        assert!(cell.fallback);
        assert_eq!(cell.latitude, 89.25);
        assert_eq!(cell.longitude, -178.75);

        let doc = ArchiveDocument::single(cell);
        assert_eq!(doc.entry_count(), 1);
        assert_eq!(doc.fallback_count(), 1);
    }
}
