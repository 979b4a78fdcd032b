//! Sample stream shared by visibility results and metric accumulators.
//!
//! Every result shape (planimetric raster or tangential panorama) is
//! consumed by streaming its cells in row-major order into a
//! [`SampleSink`]. Each sample carries its west and north
//! neighbours, so adjacency-based statistics need only the previous row.
//! The aggregated query path produces exactly the same stream without
//! storing the raster, which is what makes both paths numerically equal.

use crate::enums::{ViewKind, Visibility};

/// Side index of the north edge in [`CellSample::edges`].
pub const EDGE_N: usize = 0;
/// Side index of the east edge.
pub const EDGE_E: usize = 1;
/// Side index of the south edge.
pub const EDGE_S: usize = 2;
/// Side index of the west edge.
pub const EDGE_W: usize = 3;

/// Shape of one streamed grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub kind: ViewKind,
    pub cols: usize,
    pub rows: usize,
    /// Column 0 and the last column are adjacent (full 360° panorama).
    pub cylinder: bool,
    /// Radians per bucket for tangential frames, 0 otherwise.
    pub angular_resolution: f64,
    /// World units per cell for planimetric frames, 0 otherwise.
    pub resolution: f64,
}

/// Classification of one cell plus what metrics filter on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellState {
    pub state: Visibility,
    /// Land-cover code, -1 when unknown.
    pub code: i32,
    /// Distance from the observer in world units.
    pub distance: f64,
}

impl CellState {
    pub const OUTSIDE: CellState = CellState {
        state: Visibility::Outside,
        code: crate::constants::NO_DATA_CODE,
        distance: f64::INFINITY,
    };

    pub fn is_visible(&self) -> bool {
        self.state.is_visible()
    }
}

/// Per-row cell geometry. Planimetric rows are uniform; tangential rows
/// shrink towards the poles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowGeometry {
    /// Area (res²) or solid angle (sr) of each cell in the row.
    pub area: f64,
    /// Side lengths N, E, S, W.
    pub edges: [f64; 4],
}

impl RowGeometry {
    /// Square cells of side `resolution`.
    pub fn square(resolution: f64) -> Self {
        Self {
            area: resolution * resolution,
            edges: [resolution; 4],
        }
    }
}

/// One streamed cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSample {
    pub col: usize,
    pub row: usize,
    pub cell: CellState,
    pub area: f64,
    pub edges: [f64; 4],
    /// Cell to the west in the same row, `None` on the first column.
    pub west: Option<CellState>,
    /// Cell to the north in the previous row, `None` on the first row.
    pub north: Option<CellState>,
    /// On the last column of a cylinder frame: the first cell of the row.
    pub wrap_east: Option<CellState>,
}

/// Consumer of a sample stream.
pub trait SampleSink {
    /// Called before the first row of every frame.
    fn begin(&mut self, frame: &Frame);

    fn cell(&mut self, sample: &CellSample);

    /// Horizon distance of one azimuth column (tangential frames only),
    /// emitted in column order after the cells.
    fn horizon(&mut self, _azimuth: f64, _distance: f64) {}
}

/// Anything that can replay itself as a sample stream.
pub trait SampleSource {
    fn kind(&self) -> ViewKind;

    fn stream(&self, sink: &mut dyn SampleSink);
}

/// Feeds rows into a sink, keeping only the previous row for neighbours.
pub struct RowStreamer<'a> {
    frame: Frame,
    sink: &'a mut dyn SampleSink,
    prev: Vec<CellState>,
    row: usize,
}

impl<'a> RowStreamer<'a> {
    /// Start a frame on `sink`.
    pub fn new(frame: Frame, sink: &'a mut dyn SampleSink) -> Self {
        sink.begin(&frame);
        Self {
            frame,
            sink,
            prev: Vec::with_capacity(frame.cols),
            row: 0,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Stream the next row. `cells.len()` must equal the frame width.
    pub fn push_row(&mut self, cells: &[CellState], geometry: RowGeometry) {
        debug_assert_eq!(cells.len(), self.frame.cols);
        let last = cells.len().saturating_sub(1);
        for (col, cell) in cells.iter().enumerate() {
            let sample = CellSample {
                col,
                row: self.row,
                cell: *cell,
                area: geometry.area,
                edges: geometry.edges,
                west: if col > 0 { Some(cells[col - 1]) } else { None },
                north: if self.row > 0 {
                    Some(self.prev[col])
                } else {
                    None
                },
                wrap_east: if self.frame.cylinder && col == last && last > 0 {
                    Some(cells[0])
                } else {
                    None
                },
            };
            self.sink.cell(&sample);
        }
        self.prev.clear();
        self.prev.extend_from_slice(cells);
        self.row += 1;
    }

    pub fn horizon(&mut self, azimuth: f64, distance: f64) {
        self.sink.horizon(azimuth, distance);
    }

    /// Rows streamed so far.
    pub fn rows_done(&self) -> usize {
        self.row
    }
}

