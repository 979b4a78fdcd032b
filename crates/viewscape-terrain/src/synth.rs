//! Synthetic terrain for fixtures, demos and conformance runs.
//!
//! Every generator is deterministic: random tiles are seeded with
//! `ChaCha8Rng`, so the same seed always yields the same tile.

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use viewscape_core::error::ViewError;

use crate::grid::ScaleData;

/// Perfectly flat tile at elevation 0 with its NW corner at the origin.
pub fn flat(width: usize, height: usize, resolution: f64) -> Result<ScaleData, ViewError> {
    ScaleData::with_origin(
        width,
        height,
        DVec2::ZERO,
        resolution,
        vec![0.0; width * height],
    )
}

/// Flat tile whose land cover cycles through `categories` codes
/// (1..=categories) column by column.
pub fn flat_striped(
    width: usize,
    height: usize,
    resolution: f64,
    categories: i32,
) -> Result<ScaleData, ViewError> {
    let codes = (0..width * height)
        .map(|i| (i % width) as i32 % categories.max(1) + 1)
        .collect();
    flat(width, height, resolution)?.with_landcover(codes)
}

/// Random tile with elevation, canopy offset and land cover.
///
/// Elevation is a sum of a few smooth ridges plus white noise; roughly a
/// third of the cells carry a canopy offset; land cover takes codes
/// `1..=categories`.
pub fn random_tile(
    seed: u64,
    width: usize,
    height: usize,
    resolution: f64,
    categories: i32,
) -> Result<ScaleData, ViewError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let ridges: Vec<(f64, f64, f64)> = (0..3)
        .map(|_| {
            (
                rng.gen_range(4.0..16.0),
                rng.gen_range(4.0..16.0),
                rng.gen_range(5.0..40.0),
            )
        })
        .collect();

    let mut elevation = Vec::with_capacity(width * height);
    let mut offset = Vec::with_capacity(width * height);
    let mut landcover = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let nx = col as f64 / width as f64;
            let ny = row as f64 / height as f64;
            let base: f64 = ridges
                .iter()
                .map(|&(fx, fy, amp)| amp * ((nx * fx).sin() * (ny * fy).cos() * 0.5 + 0.5))
                .sum();
            elevation.push((base + rng.gen_range(0.0..3.0)).round());
            offset.push(if rng.gen_bool(0.3) {
                rng.gen_range(1.0..12.0_f64).round()
            } else {
                0.0
            });
            landcover.push(rng.gen_range(1..=categories.max(1)));
        }
    }

    ScaleData::with_origin(width, height, DVec2::ZERO, resolution, elevation)?
        .with_offset(offset)?
        .with_landcover(landcover)
}

/// Elliptical hill at normalized `(cx, cy)` with semi-axes `(rx, ry)`.
pub fn hill(nx: f64, ny: f64, cx: f64, cy: f64, rx: f64, ry: f64, peak: f64) -> f64 {
    let dx = (nx - cx) / rx;
    let dy = (ny - cy) / ry;
    let dist_sq = dx * dx + dy * dy;
    if dist_sq > 1.0 {
        return 0.0;
    }
    let t = 1.0 - dist_sq;
    peak * t * t
}

/// Tile of a few smooth hills, for demos and multi-resolution fixtures.
pub fn hills(width: usize, height: usize, resolution: f64) -> Result<ScaleData, ViewError> {
    let mut elevation = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let nx = (col as f64 + 0.5) / width as f64;
            let ny = (row as f64 + 0.5) / height as f64;
            let e = hill(nx, ny, 0.3, 0.3, 0.2, 0.15, 80.0)
                .max(hill(nx, ny, 0.7, 0.6, 0.25, 0.2, 120.0))
                .max(hill(nx, ny, 0.5, 0.85, 0.1, 0.1, 40.0));
            elevation.push(e);
        }
    }
    ScaleData::with_origin(width, height, DVec2::ZERO, resolution, elevation)
}
