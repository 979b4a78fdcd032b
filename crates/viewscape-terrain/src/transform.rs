//! Affine transform between world coordinates and continuous grid coordinates.
//!
//! Grid space has its origin at the north-west corner of the tile, x growing
//! east by columns and y growing south by rows; cell `(c, r)` covers
//! `[c, c+1) × [r, r+1)`. World space is x = east, y = north.

use glam::{DAffine2, DVec2};

use viewscape_core::error::ViewError;

/// North-up affine transform anchored at a tile's north-west corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTransform {
    /// World position of the north-west corner.
    origin: DVec2,
    /// World units per cell.
    resolution: f64,
    to_world: DAffine2,
    to_grid: DAffine2,
}

impl GridTransform {
    /// Create a transform for cells of `resolution` world units whose
    /// north-west corner sits at `origin`.
    pub fn new(origin: DVec2, resolution: f64) -> Result<Self, ViewError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(ViewError::InvalidGeometry(format!(
                "resolution must be finite and > 0, got {resolution}"
            )));
        }
        if !origin.is_finite() {
            return Err(ViewError::InvalidGeometry(format!(
                "origin must be finite, got {origin}"
            )));
        }
        let to_world = DAffine2::from_cols(
            DVec2::new(resolution, 0.0),
            DVec2::new(0.0, -resolution),
            origin,
        );
        Ok(Self {
            origin,
            resolution,
            to_world,
            to_grid: to_world.inverse(),
        })
    }

    pub fn origin(&self) -> DVec2 {
        self.origin
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Continuous grid coordinates of a world position.
    pub fn world_to_grid(&self, world: DVec2) -> DVec2 {
        self.to_grid.transform_point2(world)
    }

    /// World position of continuous grid coordinates.
    pub fn grid_to_world(&self, grid: DVec2) -> DVec2 {
        self.to_world.transform_point2(grid)
    }

    /// World position of the center of cell `(col, row)`.
    pub fn cell_center(&self, col: usize, row: usize) -> DVec2 {
        self.grid_to_world(DVec2::new(col as f64 + 0.5, row as f64 + 0.5))
    }
}
