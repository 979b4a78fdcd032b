//! Tangential results.

use std::sync::Arc;

use serde::Serialize;

use viewscape_core::constants::{NO_CELL, NO_DATA_CODE};
use viewscape_core::enums::{ViewKind, Visibility};
use viewscape_core::stream::{CellState, RowStreamer, SampleSink, SampleSource};
use viewscape_core::types::GridCell;
use viewscape_metrics::{CodeGroup, Metric, MetricKind};
use viewscape_terrain::TileStack;

use crate::query::TanGeometry;
use crate::sweep::TanColumn;

/// Stream state of one bucket holding stack-wide cell `cell`.
#[inline]
pub(crate) fn bucket_state(stack: &TileStack, cell: i64, distance: f64) -> CellState {
    if cell < 0 {
        return CellState::OUTSIDE;
    }
    let code = stack
        .resolve(cell as usize)
        .map_or(NO_DATA_CODE, |(i, local)| stack.tile(i).code_at(local));
    CellState {
        state: Visibility::Visible,
        code,
        distance,
    }
}

/// Stream a panorama whose bucket `(j, r)` is given by `bucket(j, r)`,
/// followed by the per-column horizon distances.
pub(crate) fn stream_panorama(
    stack: &TileStack,
    geometry: &TanGeometry,
    horizons: &[f64],
    sink: &mut dyn SampleSink,
    bucket: impl Fn(usize, usize) -> (i64, f64),
) {
    let mut streamer = RowStreamer::new(geometry.frame(), sink);
    let mut row = Vec::with_capacity(geometry.n_azimuth);
    for r in 0..geometry.n_vertical {
        row.clear();
        row.extend((0..geometry.n_azimuth).map(|j| {
            let (cell, distance) = bucket(j, r);
            bucket_state(stack, cell, distance)
        }));
        streamer.push_row(&row, geometry.row_geometry(r));
    }
    for (j, &h) in horizons.iter().enumerate() {
        streamer.horizon(geometry.azimuth(j), h);
    }
}

/// Transpose columns into a row-major grid.
fn row_major<T: Copy>(geometry: &TanGeometry, columns: &[TanColumn], field: impl Fn(&TanColumn) -> &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(geometry.len());
    for r in 0..geometry.n_vertical {
        out.extend(columns.iter().map(|c| field(c)[r]));
    }
    out
}

/// Azimuth × vertical-angle panorama, row 0 at the top.
#[derive(Debug, Clone)]
pub struct ViewTanResult {
    stack: Arc<TileStack>,
    geometry: TanGeometry,
    cells: Vec<i64>,
    distances: Vec<f64>,
    elevations: Vec<f64>,
    horizons: Vec<f64>,
}

impl ViewTanResult {
    pub(crate) fn from_columns(stack: Arc<TileStack>, geometry: TanGeometry, columns: &[TanColumn]) -> Self {
        Self {
            cells: row_major(&geometry, columns, |c| c.cells.as_slice()),
            distances: row_major(&geometry, columns, |c| c.distances.as_slice()),
            elevations: row_major(&geometry, columns, |c| c.elevations.as_slice()),
            horizons: columns.iter().map(|c| c.horizon).collect(),
            stack,
            geometry,
        }
    }

    pub fn geometry(&self) -> &TanGeometry {
        &self.geometry
    }

    pub fn n_azimuth(&self) -> usize {
        self.geometry.n_azimuth
    }

    pub fn n_vertical(&self) -> usize {
        self.geometry.n_vertical
    }

    pub fn angular_resolution(&self) -> f64 {
        self.geometry.angular_resolution
    }

    /// True for a full 360° panorama.
    pub fn is_cylinder(&self) -> bool {
        self.geometry.cylinder
    }

    pub fn azimuth(&self, az: usize) -> f64 {
        self.geometry.azimuth(az)
    }

    pub fn vertical(&self, v: usize) -> f64 {
        self.geometry.vertical(v)
    }

    /// Row-major stack-wide cell indices, -1 = no terrain.
    pub fn cells(&self) -> &[i64] {
        &self.cells
    }

    fn index(&self, az: usize, v: usize) -> Option<usize> {
        (az < self.geometry.n_azimuth && v < self.geometry.n_vertical).then(|| v * self.geometry.n_azimuth + az)
    }

    pub fn cell(&self, az: usize, v: usize) -> i64 {
        self.index(az, v).map_or(NO_CELL, |i| self.cells[i])
    }

    /// Terrain cell seen in a bucket: tile index and cell.
    pub fn look_back(&self, az: usize, v: usize) -> Option<(usize, GridCell)> {
        let cell = self.cell(az, v);
        if cell < 0 {
            return None;
        }
        let (tile, local) = self.stack.resolve(cell as usize)?;
        let width = self.stack.tile(tile).width();
        Some((tile, GridCell::new(local % width, local / width)))
    }

    /// Sample distance of a bucket, NaN when empty.
    pub fn distance_at(&self, az: usize, v: usize) -> f64 {
        self.index(az, v).map_or(f64::NAN, |i| self.distances[i])
    }

    /// Surface height of a bucket, NaN when empty.
    pub fn elevation_at(&self, az: usize, v: usize) -> f64 {
        self.index(az, v).map_or(f64::NAN, |i| self.elevations[i])
    }

    pub fn code_at(&self, az: usize, v: usize) -> i32 {
        bucket_state(&self.stack, self.cell(az, v), 0.0).code
    }

    /// Horizon distance of an azimuth column, 0 when nothing is visible.
    pub fn max_distance(&self, az: usize) -> f64 {
        self.horizons.get(az).copied().unwrap_or(0.0)
    }

    pub fn horizons(&self) -> &[f64] {
        &self.horizons
    }

    pub fn distance_raster(&self) -> &[f64] {
        &self.distances
    }

    pub fn elevation_raster(&self) -> &[f64] {
        &self.elevations
    }

    /// Solid angle of visible buckets, in steradians.
    pub fn area(&self) -> f64 {
        super::single_value(Metric::new(MetricKind::Area), self)
    }

    pub fn code_area(&self, code: i32) -> f64 {
        super::single_value(
            super::with_group(MetricKind::Area, Some(&CodeGroup::single(code))),
            self,
        )
    }

    pub fn perimeter(&self) -> f64 {
        super::single_value(Metric::new(MetricKind::Perimeter), self)
    }

    pub fn patch_count(&self, codes: Option<&CodeGroup>) -> usize {
        super::single_value(super::with_group(MetricKind::PatchCount, codes), self) as usize
    }

    /// Raw variant of this panorama.
    pub fn to_raster(&self) -> TanRaster {
        TanRaster {
            geometry: self.geometry,
            distance: self.distances.clone(),
            elevation: self.elevations.clone(),
            horizons: self.horizons.clone(),
        }
    }
}

impl SampleSource for ViewTanResult {
    fn kind(&self) -> ViewKind {
        ViewKind::Tangential
    }

    fn stream(&self, sink: &mut dyn SampleSink) {
        let n = self.geometry.n_azimuth;
        stream_panorama(&self.stack, &self.geometry, &self.horizons, sink, |j, r| {
            let i = r * n + j;
            (self.cells[i], self.distances[i])
        });
    }
}

/// Per-bucket sample distance and surface elevation (NaN when empty),
/// plus the horizon distance of every column.
#[derive(Debug, Clone, Serialize)]
pub struct TanRaster {
    pub geometry: TanGeometry,
    pub distance: Vec<f64>,
    pub elevation: Vec<f64>,
    pub horizons: Vec<f64>,
}

impl TanRaster {
    pub(crate) fn from_columns(geometry: TanGeometry, columns: &[TanColumn]) -> Self {
        Self {
            distance: row_major(&geometry, columns, |c| c.distances.as_slice()),
            elevation: row_major(&geometry, columns, |c| c.elevations.as_slice()),
            horizons: columns.iter().map(|c| c.horizon).collect(),
            geometry,
        }
    }

    /// Bit-for-bit equality, NaN included.
    pub fn bits_eq(&self, other: &TanRaster) -> bool {
        fn same(a: &[f64], b: &[f64]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
        }
        self.geometry == other.geometry
            && same(&self.distance, &other.distance)
            && same(&self.elevation, &other.elevation)
            && same(&self.horizons, &other.horizons)
    }
}
