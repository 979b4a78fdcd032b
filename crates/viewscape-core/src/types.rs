//! Fundamental grid types.

use serde::{Deserialize, Serialize};

/// Integer cell address in a terrain grid (column = x, row = y, row 0 north).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub col: usize,
    pub row: usize,
}

impl GridCell {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

/// Rectangular window over a terrain grid, in grid cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub col0: usize,
    pub row0: usize,
    pub cols: usize,
    pub rows: usize,
}

impl Window {
    pub fn new(col0: usize, row0: usize, cols: usize, rows: usize) -> Self {
        Self {
            col0,
            row0,
            cols,
            rows,
        }
    }

    /// Window centered on `center` with the given radius in cells,
    /// clipped to a `width` × `height` grid.
    pub fn around(center: GridCell, radius: usize, width: usize, height: usize) -> Self {
        let col0 = center.col.saturating_sub(radius);
        let row0 = center.row.saturating_sub(radius);
        let col1 = (center.col + radius + 1).min(width);
        let row1 = (center.row + radius + 1).min(height);
        Self::new(col0, row0, col1 - col0, row1 - row0)
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the grid cell lies inside the window.
    pub fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.col0 && col < self.col0 + self.cols && row >= self.row0 && row < self.row0 + self.rows
    }

    /// Row-major index of a grid cell inside the window.
    pub fn index(&self, col: usize, row: usize) -> Option<usize> {
        if self.contains(col, row) {
            Some((row - self.row0) * self.cols + (col - self.col0))
        } else {
            None
        }
    }

    /// Grid cell of a window-local row-major index.
    pub fn cell(&self, index: usize) -> GridCell {
        GridCell::new(self.col0 + index % self.cols, self.row0 + index / self.cols)
    }
}
