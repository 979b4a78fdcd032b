//! Engine configuration, loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::enums::{BackendPreference, TargetHeight};
use crate::error::ViewError;

/// Defaults and execution settings for visibility engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Observer height used when a feature or query does not set one.
    pub default_observer_height: f64,
    /// Target height rule used when a query does not set one.
    pub default_target_height: TargetHeight,
    /// Radians per bucket for tangential queries.
    pub angular_resolution: f64,
    pub backend: BackendPreference,
    /// Worker threads for the CPU pool. 0 = one per available core.
    pub worker_threads: usize,
    /// Rows computed per chunk on the aggregated path.
    pub rows_per_chunk: usize,
    /// Multi-resolution hand-off distance, in cells of each tile.
    pub near_switch_cells: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            default_observer_height: DEFAULT_OBSERVER_HEIGHT,
            default_target_height: TargetHeight::default(),
            angular_resolution: DEFAULT_ANGULAR_RESOLUTION,
            backend: BackendPreference::default(),
            worker_threads: 0,
            rows_per_chunk: DEFAULT_ROWS_PER_CHUNK,
            near_switch_cells: DEFAULT_NEAR_SWITCH_CELLS,
        }
    }
}

impl ViewConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ViewError> {
        let config: ViewConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ViewError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, ViewError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ViewError> {
        if !self.default_observer_height.is_finite() || self.default_observer_height < 0.0 {
            return Err(ViewError::InvalidConfig(format!(
                "default_observer_height must be finite and >= 0, got {}",
                self.default_observer_height
            )));
        }
        if let TargetHeight::Fixed(h) = self.default_target_height {
            if !h.is_finite() {
                return Err(ViewError::InvalidConfig(format!(
                    "default_target_height must be finite, got {h}"
                )));
            }
        }
        if !(self.angular_resolution > 0.0 && self.angular_resolution <= MAX_ANGULAR_RESOLUTION) {
            return Err(ViewError::InvalidAngularResolution(self.angular_resolution));
        }
        if self.rows_per_chunk == 0 {
            return Err(ViewError::InvalidConfig("rows_per_chunk must be > 0".into()));
        }
        if !(self.near_switch_cells.is_finite() && self.near_switch_cells > 0.0) {
            return Err(ViewError::InvalidConfig(format!(
                "near_switch_cells must be finite and > 0, got {}",
                self.near_switch_cells
            )));
        }
        Ok(())
    }
}
