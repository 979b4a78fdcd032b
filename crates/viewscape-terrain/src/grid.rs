//! ScaleData: one terrain tile at one resolution.

use std::collections::BTreeSet;

use glam::DVec2;

use viewscape_core::constants::NO_DATA_CODE;
use viewscape_core::error::ViewError;
use viewscape_core::types::GridCell;

use crate::transform::GridTransform;

/// Immutable, resolution-tagged terrain tile.
///
/// Elevation is mandatory. The land-cover and above-ground offset layers
/// are optional and read as `-1` and `0.0` where absent. All layers are
/// row-major, row 0 north, and share one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleData {
    width: usize,
    height: usize,
    transform: GridTransform,
    elevation: Vec<f64>,
    landcover: Option<Vec<i32>>,
    offset: Option<Vec<f64>>,
}

impl ScaleData {
    /// Create a tile from an elevation grid.
    pub fn new(
        width: usize,
        height: usize,
        transform: GridTransform,
        elevation: Vec<f64>,
    ) -> Result<Self, ViewError> {
        if width == 0 || height == 0 {
            return Err(ViewError::InvalidGeometry(format!(
                "tile must be at least 1x1, got {width}x{height}"
            )));
        }
        check_len("elevation", width * height, elevation.len())?;
        if let Some(bad) = elevation.iter().find(|e| !e.is_finite()) {
            return Err(ViewError::InvalidGeometry(format!(
                "elevation grid holds a non-finite value: {bad}"
            )));
        }
        Ok(Self {
            width,
            height,
            transform,
            elevation,
            landcover: None,
            offset: None,
        })
    }

    /// Tile with the north-west corner at `origin` and square cells.
    pub fn with_origin(
        width: usize,
        height: usize,
        origin: DVec2,
        resolution: f64,
        elevation: Vec<f64>,
    ) -> Result<Self, ViewError> {
        Self::new(width, height, GridTransform::new(origin, resolution)?, elevation)
    }

    /// Attach a land-cover code grid.
    pub fn with_landcover(mut self, codes: Vec<i32>) -> Result<Self, ViewError> {
        check_len("landcover", self.len(), codes.len())?;
        self.landcover = Some(codes);
        Ok(self)
    }

    /// Attach an above-ground offset grid (canopy or building height).
    pub fn with_offset(mut self, offset: Vec<f64>) -> Result<Self, ViewError> {
        check_len("offset", self.len(), offset.len())?;
        if let Some(bad) = offset.iter().find(|o| !o.is_finite()) {
            return Err(ViewError::InvalidGeometry(format!(
                "offset grid holds a non-finite value: {bad}"
            )));
        }
        self.offset = Some(offset);
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolution(&self) -> f64 {
        self.transform.resolution()
    }

    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    pub fn has_landcover(&self) -> bool {
        self.landcover.is_some()
    }

    pub fn has_offset(&self) -> bool {
        self.offset.is_some()
    }

    /// Row-major index of a cell.
    #[inline]
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    pub fn contains(&self, col: i64, row: i64) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.width && (row as usize) < self.height
    }

    #[inline]
    pub fn elevation(&self, col: usize, row: usize) -> f64 {
        self.elevation[self.index(col, row)]
    }

    #[inline]
    pub fn offset(&self, col: usize, row: usize) -> f64 {
        self.offset_at(self.index(col, row))
    }

    /// Elevation plus above-ground offset: the surface that occludes.
    #[inline]
    pub fn surface(&self, col: usize, row: usize) -> f64 {
        self.surface_at(self.index(col, row))
    }

    #[inline]
    pub fn code(&self, col: usize, row: usize) -> i32 {
        self.code_at(self.index(col, row))
    }

    #[inline]
    pub fn elevation_at(&self, index: usize) -> f64 {
        self.elevation[index]
    }

    #[inline]
    pub fn offset_at(&self, index: usize) -> f64 {
        self.offset.as_ref().map_or(0.0, |o| o[index])
    }

    #[inline]
    pub fn surface_at(&self, index: usize) -> f64 {
        self.elevation[index] + self.offset_at(index)
    }

    #[inline]
    pub fn code_at(&self, index: usize) -> i32 {
        self.landcover.as_ref().map_or(NO_DATA_CODE, |l| l[index])
    }

    /// Raw elevation grid.
    pub fn elevations(&self) -> &[f64] {
        &self.elevation
    }

    /// Raw offset grid, if present.
    pub fn offsets(&self) -> Option<&[f64]> {
        self.offset.as_deref()
    }

    /// Raw land-cover grid, if present.
    pub fn landcover(&self) -> Option<&[i32]> {
        self.landcover.as_deref()
    }

    /// Continuous grid coordinates of a world position.
    pub fn world_to_grid(&self, world: DVec2) -> DVec2 {
        self.transform.world_to_grid(world)
    }

    pub fn grid_to_world(&self, grid: DVec2) -> DVec2 {
        self.transform.grid_to_world(grid)
    }

    /// World position of a cell center.
    pub fn cell_center(&self, col: usize, row: usize) -> DVec2 {
        self.transform.cell_center(col, row)
    }

    /// Cell containing a world position, or `None` outside the tile.
    pub fn cell_of(&self, world: DVec2) -> Option<GridCell> {
        let g = self.world_to_grid(world);
        if !g.is_finite() {
            return None;
        }
        let (col, row) = (g.x.floor() as i64, g.y.floor() as i64);
        if self.contains(col, row) {
            Some(GridCell::new(col as usize, row as usize))
        } else {
            None
        }
    }

    /// Land-cover codes present in the tile, excluding no-data.
    pub fn codes_present(&self) -> BTreeSet<i32> {
        self.landcover
            .as_ref()
            .map(|l| l.iter().copied().filter(|&c| c != NO_DATA_CODE).collect())
            .unwrap_or_default()
    }

    /// Copy of this tile with land-cover codes remapped, e.g. to merge
    /// codes into super-categories.
    pub fn map_codes(&self, f: impl Fn(i32) -> i32) -> Self {
        let mut out = self.clone();
        if let Some(l) = out.landcover.as_mut() {
            for code in l.iter_mut() {
                if *code != NO_DATA_CODE {
                    *code = f(*code);
                }
            }
        }
        out
    }

    /// Block-average this tile by an integer `factor`, producing a coarser
    /// tile over the same area. Land cover takes the top-left code of each
    /// block.
    pub fn downsample(&self, factor: usize) -> Result<Self, ViewError> {
        if factor == 0 {
            return Err(ViewError::InvalidGeometry("downsample factor must be > 0".into()));
        }
        let w = self.width.div_ceil(factor);
        let h = self.height.div_ceil(factor);
        let mut elevation = Vec::with_capacity(w * h);
        let mut offset = self.offset.as_ref().map(|_| Vec::with_capacity(w * h));
        let mut landcover = self.landcover.as_ref().map(|_| Vec::with_capacity(w * h));

        for tr in 0..h {
            for tc in 0..w {
                let (mut sum_e, mut sum_o, mut n) = (0.0, 0.0, 0usize);
                for r in tr * factor..((tr + 1) * factor).min(self.height) {
                    for c in tc * factor..((tc + 1) * factor).min(self.width) {
                        sum_e += self.elevation(c, r);
                        sum_o += self.offset(c, r);
                        n += 1;
                    }
                }
                elevation.push(sum_e / n as f64);
                if let Some(o) = offset.as_mut() {
                    o.push(sum_o / n as f64);
                }
                if let Some(l) = landcover.as_mut() {
                    l.push(self.code(tc * factor, tr * factor));
                }
            }
        }

        let transform =
            GridTransform::new(self.transform.origin(), self.resolution() * factor as f64)?;
        let mut tile = Self::new(w, h, transform, elevation)?;
        if let Some(o) = offset {
            tile = tile.with_offset(o)?;
        }
        if let Some(l) = landcover {
            tile = tile.with_landcover(l)?;
        }
        Ok(tile)
    }
}

fn check_len(layer: &'static str, expected: usize, actual: usize) -> Result<(), ViewError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ViewError::GridSizeMismatch {
            layer,
            expected,
            actual,
        })
    }
}
