//! Run identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::CellIndex;

/// Tags every log line of one sub-tile run.
///
/// Reads as `<tlat>_<tlon>.<slat>_<slon>-<nonce>` so a grep for a tile finds
/// all of its attempts, while repeated attempts still stay apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Fresh id for a run of `subtile` within `tile`.
    pub fn for_subtile(tile: CellIndex, subtile: CellIndex) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{:04}_{:04}.{:04}_{:04}-{}",
            tile.lat,
            tile.lon,
            subtile.lat,
            subtile.lon,
            &nonce[..8]
        ))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
