//! Engine constants and defaults.

use std::f64::consts::{FRAC_PI_2, TAU};

/// Land-cover code marking no-data / out-of-area cells.
pub const NO_DATA_CODE: i32 = -1;

/// Tangential grid value for a bucket with no contributing terrain cell.
pub const NO_CELL: i64 = -1;

// --- Query defaults ---

/// Default observer eye height above ground (world units).
pub const DEFAULT_OBSERVER_HEIGHT: f64 = 1.6;

/// Default target height above ground (world units).
pub const DEFAULT_TARGET_HEIGHT: f64 = 0.0;

/// Default angular resolution for tangential queries (0.5° per bucket).
pub const DEFAULT_ANGULAR_RESOLUTION: f64 = TAU / 720.0;

/// Coarsest legal angular resolution: two buckets per revolution.
pub const MAX_ANGULAR_RESOLUTION: f64 = TAU / 2.0;

/// Lowest vertical angle of a tangential view.
pub const VERTICAL_MIN: f64 = -FRAC_PI_2;

/// Highest vertical angle of a tangential view.
pub const VERTICAL_MAX: f64 = FRAC_PI_2;

// --- Execution ---

/// Rows computed per chunk when streaming into metric accumulators.
pub const DEFAULT_ROWS_PER_CHUNK: usize = 64;

/// Default multi-resolution switch distance, in cells of each tile.
pub const DEFAULT_NEAR_SWITCH_CELLS: f64 = 256.0;

// --- Metric scaling ---

/// Patch density scale: patches per 10⁶ square world units.
pub const PATCH_DENSITY_SCALE: f64 = 1_000_000.0;

/// Edge density scale: edge length per 10⁴ square world units.
pub const EDGE_DENSITY_SCALE: f64 = 10_000.0;
