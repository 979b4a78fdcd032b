//! Planimetric results.

use std::collections::BTreeSet;
use std::sync::Arc;

use viewscape_core::enums::{ViewKind, Visibility};
use viewscape_core::stream::{CellState, RowStreamer, SampleSink, SampleSource};
use viewscape_core::types::{GridCell, Window};
use viewscape_metrics::{CodeGroup, Metric, MetricKind};
use viewscape_terrain::ScaleData;

use crate::query::ShedPlan;

/// Stream state of one classified cell.
#[inline]
pub(crate) fn cell_state(tile: &ScaleData, plan: &ShedPlan, col: usize, row: usize, sample: i8) -> CellState {
    match Visibility::from_i8(sample) {
        Visibility::Outside => CellState::OUTSIDE,
        state => CellState {
            state,
            code: tile.code(col, row),
            distance: plan.distance(col, row),
        },
    }
}

/// Stream classified window rows starting at window row `row0`.
pub(crate) fn push_rows(
    streamer: &mut RowStreamer<'_>,
    tile: &ScaleData,
    plan: &ShedPlan,
    row0: usize,
    samples: &[i8],
    buf: &mut Vec<CellState>,
) {
    let w = plan.window;
    if w.cols == 0 {
        return;
    }
    let geometry = plan.row_geometry();
    for (i, row_samples) in samples.chunks(w.cols).enumerate() {
        let row = w.row0 + row0 + i;
        buf.clear();
        buf.extend(
            row_samples
                .iter()
                .enumerate()
                .map(|(k, &s)| cell_state(tile, plan, w.col0 + k, row, s)),
        );
        streamer.push_row(buf, geometry);
    }
}

/// Planimetric visibility over a window of the finest tile.
///
/// Multi-resolution engines classify the same cells as a single-tile
/// engine, so a result always reads as if computed on one tile.
#[derive(Debug, Clone)]
pub struct ViewShedResult {
    tile: Arc<ScaleData>,
    plan: ShedPlan,
    samples: Vec<i8>,
}

impl ViewShedResult {
    pub(crate) fn new(tile: Arc<ScaleData>, plan: ShedPlan, samples: Vec<i8>) -> Self {
        debug_assert_eq!(samples.len(), plan.window.len());
        Self { tile, plan, samples }
    }

    /// Tile the samples index into.
    pub fn tile(&self) -> &Arc<ScaleData> {
        &self.tile
    }

    pub fn plan(&self) -> &ShedPlan {
        &self.plan
    }

    pub fn window(&self) -> Window {
        self.plan.window
    }

    /// Row-major window samples.
    pub fn samples(&self) -> &[i8] {
        &self.samples
    }

    /// Sample at a tile cell; `Outside` beyond the window.
    pub fn sample(&self, col: usize, row: usize) -> Visibility {
        self.plan
            .window
            .index(col, row)
            .map_or(Visibility::Outside, |i| Visibility::from_i8(self.samples[i]))
    }

    pub fn observer_cell(&self) -> GridCell {
        self.plan.observer
    }

    pub fn resolution(&self) -> f64 {
        self.plan.resolution
    }

    /// Visible cells with their tile coordinates.
    pub fn visible_cells(&self) -> impl Iterator<Item = GridCell> + '_ {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, s)| **s > 0)
            .map(|(i, _)| self.plan.window.cell(i))
    }

    fn fold_visible(&self, mut keep: impl FnMut(GridCell) -> bool) -> (usize, f64) {
        let cell_area = self.plan.resolution * self.plan.resolution;
        let count = self.visible_cells().filter(|&c| keep(c)).count();
        (count, count as f64 * cell_area)
    }

    fn in_band(&self, c: GridCell, dmin: f64, dmax: f64) -> bool {
        let d = self.plan.distance(c.col, c.row);
        d >= dmin && d < dmax
    }

    pub fn visible_count(&self) -> usize {
        self.fold_visible(|_| true).0
    }

    pub fn code_count(&self, code: i32) -> usize {
        self.fold_visible(|c| self.tile.code(c.col, c.row) == code).0
    }

    /// Visible area in square world units.
    pub fn area(&self) -> f64 {
        self.fold_visible(|_| true).1
    }

    /// Visible area at distances in `[dmin, dmax)`.
    pub fn area_in(&self, dmin: f64, dmax: f64) -> f64 {
        self.fold_visible(|c| self.in_band(c, dmin, dmax)).1
    }

    pub fn code_area(&self, code: i32) -> f64 {
        self.fold_visible(|c| self.tile.code(c.col, c.row) == code).1
    }

    pub fn code_area_in(&self, code: i32, dmin: f64, dmax: f64) -> f64 {
        self.fold_visible(|c| self.tile.code(c.col, c.row) == code && self.in_band(c, dmin, dmax))
            .1
    }

    /// Codes of visible cells, excluding no-data.
    pub fn codes_present(&self) -> BTreeSet<i32> {
        self.visible_cells()
            .map(|c| self.tile.code(c.col, c.row))
            .filter(|&c| c >= 0)
            .collect()
    }

    /// Perimeter of the visible set in world units.
    pub fn perimeter(&self) -> f64 {
        super::single_value(Metric::new(MetricKind::Perimeter), self)
    }

    /// 4-connected patches of visible cells, restricted to `codes` if given.
    pub fn patch_count(&self, codes: Option<&CodeGroup>) -> usize {
        super::single_value(super::with_group(MetricKind::PatchCount, codes), self) as usize
    }
}

impl SampleSource for ViewShedResult {
    fn kind(&self) -> ViewKind {
        ViewKind::Planimetric
    }

    fn stream(&self, sink: &mut dyn SampleSink) {
        let mut streamer = RowStreamer::new(self.plan.frame(), sink);
        let mut buf = Vec::with_capacity(self.plan.window.cols);
        push_rows(&mut streamer, &self.tile, &self.plan, 0, &self.samples, &mut buf);
    }
}
