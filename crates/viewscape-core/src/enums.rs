//! Enumeration types used throughout the engine.

use serde::{Deserialize, Serialize};

/// Three-valued visibility sample stored in planimetric rasters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum Visibility {
    /// Outside the query region (bounds, window or distance band).
    /// Not counted as occluded.
    #[default]
    Outside = -1,
    /// Inside the query region but hidden by terrain.
    Occluded = 0,
    /// Inside the query region and in sight.
    Visible = 1,
}

impl Visibility {
    /// Raw byte value as stored in result rasters.
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Decode a raster byte. Any negative value reads as `Outside`.
    pub fn from_i8(value: i8) -> Self {
        match value.signum() {
            1 => Visibility::Visible,
            0 => Visibility::Occluded,
            _ => Visibility::Outside,
        }
    }

    pub fn from_bool(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::Occluded
        }
    }

    pub fn is_visible(self) -> bool {
        self == Visibility::Visible
    }
}

/// Height added to the target end of a line of sight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetHeight {
    /// A fixed height above ground, in world units.
    Fixed(f64),
    /// The above-ground offset layer value at the target cell
    /// (canopy or roof top). Zero where the tile has no offset layer.
    AboveGround,
}

impl Default for TargetHeight {
    fn default() -> Self {
        TargetHeight::Fixed(crate::constants::DEFAULT_TARGET_HEIGHT)
    }
}

impl TargetHeight {
    /// Height to add at a cell whose offset layer value is `offset`.
    #[inline]
    pub fn resolve(self, offset: f64) -> f64 {
        match self {
            TargetHeight::Fixed(h) => h,
            TargetHeight::AboveGround => offset,
        }
    }
}

/// Shape of a visibility result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    /// Top-down raster over the terrain grid.
    Planimetric,
    /// Azimuth × vertical-angle panorama.
    Tangential,
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewKind::Planimetric => f.write_str("planimetric"),
            ViewKind::Tangential => f.write_str("tangential"),
        }
    }
}

/// Which visibility backend a caller would like to run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendPreference {
    /// Multi-threaded scalar implementation.
    Cpu,
    /// Data-parallel kernel implementation. Falls back to `Cpu`
    /// when no device is detected.
    Accelerator,
    /// Accelerator when available, otherwise CPU.
    #[default]
    Auto,
}
