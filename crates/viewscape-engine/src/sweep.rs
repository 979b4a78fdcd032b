//! Horizon sweep: turns one radial march into one panorama column.
//!
//! Walking outward, a terrain sample is seen iff its elevation angle is not
//! below the highest angle met so far. Each newly seen sample raises the
//! skyline and claims every still-empty vertical bucket whose center angle
//! it now covers, from the bottom of the column upwards.

use viewscape_core::constants::NO_CELL;

use crate::query::{TanGeometry, TanPlan};

/// One azimuth column of a tangential view, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct TanColumn {
    /// Stack-wide index of the terrain cell seen in each bucket, -1 = empty.
    pub cells: Vec<i64>,
    pub distances: Vec<f64>,
    /// Absolute height of the surface seen in each bucket; left empty
    /// when the plan does not record elevations.
    pub elevations: Vec<f64>,
    /// Distance of the farthest visible sample, 0 when none.
    pub horizon: f64,
}

impl TanColumn {
    pub fn empty(n_vertical: usize, with_elevations: bool) -> Self {
        Self {
            cells: vec![NO_CELL; n_vertical],
            distances: vec![f64::NAN; n_vertical],
            elevations: if with_elevations { vec![f64::NAN; n_vertical] } else { Vec::new() },
            horizon: 0.0,
        }
    }
}

/// Incremental state of one column sweep.
pub struct ColumnSweep<'g> {
    geometry: &'g TanGeometry,
    z_eye: f64,
    distance_min: f64,
    max_angle: f64,
    next_row: usize,
    column: TanColumn,
}

impl<'g> ColumnSweep<'g> {
    pub fn new(geometry: &'g TanGeometry, z_eye: f64, distance_min: f64) -> Self {
        Self {
            geometry,
            z_eye,
            distance_min,
            max_angle: f64::NEG_INFINITY,
            next_row: geometry.n_vertical,
            column: TanColumn::empty(geometry.n_vertical, true),
        }
    }

    /// Sweep for `plan`, skipping elevations when the plan does not want them.
    pub fn for_plan(plan: &'g TanPlan) -> Self {
        let mut sweep = Self::new(&plan.geometry, plan.z_eye, plan.distance_min);
        if !plan.elevations {
            sweep.column.elevations = Vec::new();
        }
        sweep
    }

    /// Feed the next sample outward. `cell` is the stack-wide index.
    pub fn visit(&mut self, cell: usize, distance: f64, surface: f64) {
        let angle = (surface - self.z_eye).atan2(distance);
        if angle < self.max_angle {
            return;
        }
        let counted = distance >= self.distance_min;
        while self.next_row > 0 && self.geometry.vertical(self.next_row - 1) <= angle {
            self.next_row -= 1;
            if counted {
                let r = self.next_row;
                self.column.cells[r] = cell as i64;
                self.column.distances[r] = distance;
                if let Some(e) = self.column.elevations.get_mut(r) {
                    *e = surface;
                }
            }
        }
        if counted {
            self.column.horizon = distance;
        }
        self.max_angle = angle;
    }

    /// Every bucket is filled; further samples cannot change the column
    /// except for the horizon distance.
    pub fn is_full(&self) -> bool {
        self.next_row == 0
    }

    pub fn finish(self) -> TanColumn {
        self.column
    }
}
