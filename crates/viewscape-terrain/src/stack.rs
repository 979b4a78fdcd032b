//! Resolution stack: terrain tiles of increasing cell size for
//! multi-resolution queries.

use std::sync::Arc;

use glam::DVec2;

use viewscape_core::error::ViewError;

use crate::grid::ScaleData;

/// Tiles ordered finest first, with the distance bands each one serves.
///
/// Tile `i` is authoritative for distances in `[limit(i-1), limit(i))`,
/// where `limit(i) = near_cells × resolution(i)`; the coarsest tile is
/// unbounded. Cells of the whole stack share one linear index space:
/// tile `i` occupies `[offset(i), offset(i) + len(i))`.
#[derive(Debug, Clone)]
pub struct TileStack {
    tiles: Vec<Arc<ScaleData>>,
    offsets: Vec<usize>,
    near_cells: f64,
}

impl TileStack {
    /// Stack of a single tile; its band is unbounded.
    pub fn single(tile: Arc<ScaleData>) -> Self {
        Self {
            offsets: vec![0],
            tiles: vec![tile],
            near_cells: f64::INFINITY,
        }
    }

    /// Build a stack from tiles in any order.
    pub fn new(
        tiles: impl IntoIterator<Item = Arc<ScaleData>>,
        near_cells: f64,
    ) -> Result<Self, ViewError> {
        let mut tiles: Vec<Arc<ScaleData>> = tiles.into_iter().collect();
        if tiles.is_empty() {
            return Err(ViewError::EmptyTileStack);
        }
        if near_cells.is_nan() || near_cells <= 0.0 {
            return Err(ViewError::InvalidConfig(format!(
                "near switch distance must be > 0 cells, got {near_cells}"
            )));
        }
        tiles.sort_by(|a, b| a.resolution().total_cmp(&b.resolution()));
        if let Some(pair) = tiles.windows(2).find(|w| w[0].resolution() == w[1].resolution()) {
            return Err(ViewError::DuplicateResolution(pair[0].resolution()));
        }
        let mut offsets = Vec::with_capacity(tiles.len());
        let mut next = 0;
        for tile in &tiles {
            offsets.push(next);
            next += tile.len();
        }
        Ok(Self {
            tiles,
            offsets,
            near_cells,
        })
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Arc<ScaleData>] {
        &self.tiles
    }

    pub fn tile(&self, i: usize) -> &Arc<ScaleData> {
        &self.tiles[i]
    }

    /// The finest tile.
    pub fn primary(&self) -> &Arc<ScaleData> {
        &self.tiles[0]
    }

    pub fn near_cells(&self) -> f64 {
        self.near_cells
    }

    /// Outer distance limit of tile `i`'s band.
    pub fn limit(&self, i: usize) -> f64 {
        if i + 1 >= self.tiles.len() {
            f64::INFINITY
        } else {
            self.near_cells * self.tiles[i].resolution()
        }
    }

    /// Distance band `[lo, hi)` served by tile `i`.
    pub fn band(&self, i: usize) -> (f64, f64) {
        let lo = if i == 0 { 0.0 } else { self.limit(i - 1) };
        (lo, self.limit(i))
    }

    /// Stack-wide linear index of a cell in tile `i`.
    pub fn global_index(&self, i: usize, cell_index: usize) -> usize {
        self.offsets[i] + cell_index
    }

    /// Resolve a stack-wide index back to `(tile, cell index)`.
    pub fn resolve(&self, global: usize) -> Option<(usize, usize)> {
        let i = self.offsets.partition_point(|&o| o <= global).checked_sub(1)?;
        let local = global - self.offsets[i];
        (local < self.tiles[i].len()).then_some((i, local))
    }
}
