//! Core domain errors.

use thiserror::Error;

/// Errors raised by the grid indexer and tile decomposition.
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    /// A delta string could not be parsed.
    #[error("Invalid delta '{0}': expected 1, 2 or 4 comma separated values")]
    InvalidDelta(String),

    /// A cell size that is zero, negative or not finite.
    #[error("Cell size must be positive and finite, got {0}")]
    NonPositiveDelta(f64),

    /// Tile delta is not an integral multiple of the point delta.
    #[error("Tile delta {tile} is not a multiple of point delta {point}")]
    NonIntegralRatio { tile: f64, point: f64 },

    /// Split factor does not evenly divide the points of a tile.
    #[error("Split factor {split} does not divide {points} points per tile")]
    UnevenSplit { split: u32, points: u32 },

    /// An index outside `[1, max]`.
    #[error("{axis} index {index} out of range 1..={max}")]
    IndexOutOfRange {
        axis: &'static str,
        index: i64,
        max: u32,
    },

    /// A geographic coordinate outside the globe.
    #[error("Coordinate ({lat}, {lon}) is outside [-90, 90] x [-180, 180]")]
    OutsideGlobe { lat: f64, lon: f64 },
}

/// Errors raised when reading run parameters.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// The parameter document root is not a mapping.
    #[error("Parameter document must be a mapping at the top level")]
    NotAMapping,

    /// A required key is absent.
    #[error("Missing parameter: {0}")]
    Missing(String),

    /// A key holds a value of the wrong type.
    #[error("Parameter '{key}' should be {expected}")]
    WrongType { key: String, expected: &'static str },

    /// A grid parameter is malformed.
    #[error(transparent)]
    Grid(#[from] GridError),
}
