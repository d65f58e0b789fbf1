//! Checker declining points outside a geographic window.

use async_trait::async_trait;
use gridrun_core::{Delta, GridCoordinate, Params, ParamsError};

use crate::{PointContext, RegistryError, Stage, StageConfig, StageError};

/// Accepts a point only when its cell centre lies inside
/// `[lat_min, lat_max] x [lon_min, lon_max]`.
#[derive(Debug, Clone)]
pub struct BBoxChecker {
    delta: Delta,
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
}

impl BBoxChecker {
    /// Build from the slot namespace. Missing bounds default to the globe.
    pub fn from_config(cfg: &StageConfig) -> Result<Self, RegistryError> {
        Self::read(&cfg.params, cfg.slot.key()).map_err(|e| cfg.invalid(e.to_string()))
    }

    fn read(params: &Params, ns: &str) -> Result<Self, ParamsError> {
        let bound = |key: &str, default: f64| -> Result<f64, ParamsError> {
            match params.text_in(ns, key) {
                None => Ok(default),
                Some(text) => text.trim().parse().map_err(|_| ParamsError::WrongType {
                    key: key.to_string(),
                    expected: "a number",
                }),
            }
        };
        Ok(Self {
            delta: params.delta("delta")?,
            lat_min: bound("lat_min", -90.0)?,
            lat_max: bound("lat_max", 90.0)?,
            lon_min: bound("lon_min", -180.0)?,
            lon_max: bound("lon_max", 180.0)?,
        })
    }

    fn accepts(&self, coordinate: &GridCoordinate) -> bool {
        let (lat, lon) = coordinate.point.bounds(self.delta).center();
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }
}

#[async_trait]
impl Stage for BBoxChecker {
    fn class_name(&self) -> &'static str {
        "bbox_checker"
    }

    async fn run(&self, ctx: &PointContext) -> Result<bool, StageError> {
        Ok(self.accepts(&ctx.coordinate))
    }

    fn verify(&self, _coordinate: &GridCoordinate) -> (bool, String) {
        if self.lat_min > self.lat_max || self.lon_min > self.lon_max {
            return (
                false,
                format!(
                    "bbox_checker bounds are inverted: lat {}..{}, lon {}..{}",
                    self.lat_min, self.lat_max, self.lon_min, self.lon_max
                ),
            );
        }
        (true, "bbox_checker bounds are valid".to_string())
    }
}
