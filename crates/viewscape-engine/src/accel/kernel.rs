//! Device kernels. One work item per planimetric cell or per azimuth
//! column, reading only flat buffers and a plain parameter block.
//!
//! The arithmetic mirrors the scalar backend operation for operation so
//! both produce bit-identical output.

use std::f64::consts::TAU;

use viewscape_core::constants::NO_CELL;
use viewscape_core::enums::TargetHeight;

use crate::query::{ShedPlan, TanPlan};
use crate::sweep::TanColumn;

use super::device::DeviceBuffers;

const OUTSIDE: i8 = -1;
const OCCLUDED: i8 = 0;
const VISIBLE: i8 = 1;

/// Parameter block of one planimetric dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShedParams {
    pub col0: usize,
    pub row0: usize,
    pub cols: usize,
    pub obs_col: usize,
    pub obs_row: usize,
    pub eye_x: f64,
    pub eye_y: f64,
    pub res: f64,
    pub z_observer: f64,
    pub cell_fixed: f64,
    pub cell_above_ground: bool,
    pub origin_visible: bool,
    pub d_min: f64,
    pub d_max: f64,
    pub az_full: bool,
    pub az_min: f64,
    pub az_span: f64,
    pub v_min: f64,
    pub v_max: f64,
}

impl ShedParams {
    /// Parameters for window rows starting at window row `row0`.
    pub fn new(plan: &ShedPlan, row0: usize) -> Self {
        let (cell_fixed, cell_above_ground) = match plan.cell_height {
            TargetHeight::Fixed(h) => (h, false),
            TargetHeight::AboveGround => (0.0, true),
        };
        let b = &plan.bounds;
        Self {
            col0: plan.window.col0,
            row0: plan.window.row0 + row0,
            cols: plan.window.cols,
            obs_col: plan.observer.col,
            obs_row: plan.observer.row,
            eye_x: plan.eye.x,
            eye_y: plan.eye.y,
            res: plan.resolution,
            z_observer: plan.z_observer,
            cell_fixed,
            cell_above_ground,
            origin_visible: b.distance_min() == 0.0,
            d_min: b.distance_min(),
            d_max: b.distance_max(),
            az_full: b.is_full_circle(),
            az_min: b.azimuth_min(),
            az_span: b.azimuth_span(),
            v_min: b.vertical_min(),
            v_max: b.vertical_max(),
        }
    }
}

/// Parameter block of one tangential dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TanParams {
    pub obs_col: usize,
    pub obs_row: usize,
    pub z_eye: f64,
    pub d_min: f64,
    pub d_max: f64,
    pub n_v: usize,
    pub v_max: f64,
    pub a_res: f64,
    pub az_min: f64,
    pub elevations: bool,
}

impl TanParams {
    pub fn new(plan: &TanPlan) -> Self {
        Self {
            obs_col: plan.observer.col,
            obs_row: plan.observer.row,
            z_eye: plan.z_eye,
            d_min: plan.distance_min,
            d_max: plan.distance_max,
            n_v: plan.geometry.n_vertical,
            v_max: plan.geometry.vertical_max,
            a_res: plan.geometry.angular_resolution,
            az_min: plan.geometry.azimuth_min,
            elevations: plan.elevations,
        }
    }
}

#[inline]
fn surface(buf: &DeviceBuffers, col: usize, row: usize) -> f64 {
    let i = row * buf.width + col;
    buf.elevation[i] + buf.offset[i]
}

#[inline]
fn blend(buf: &DeviceBuffers, c0: usize, r0: usize, c1: usize, r1: usize, frac: f64) -> f64 {
    let s0 = surface(buf, c0, r0);
    if frac == 0.0 {
        s0
    } else {
        s0 + (surface(buf, c1, r1) - s0) * frac
    }
}

fn sight_line(buf: &DeviceBuffers, p: &ShedParams, col: usize, row: usize, z_end: f64) -> bool {
    let dx = col as i64 - p.obs_col as i64;
    let dy = row as i64 - p.obs_row as i64;
    let n = dx.abs().max(dy.abs());
    if n <= 1 {
        return true;
    }
    let x_major = dx.abs() >= dy.abs();
    let (major0, minor0, step, d_minor) = if x_major {
        (p.obs_col as i64, p.obs_row as f64, dx.signum(), dy as f64)
    } else {
        (p.obs_row as i64, p.obs_col as f64, dy.signum(), dx as f64)
    };
    let nf = n as f64;
    let dz = z_end - p.z_observer;
    for k in 1..n {
        let t = k as f64 / nf;
        let major = (major0 + step * k) as usize;
        let minor = minor0 + (d_minor * k as f64) / nf;
        let m0 = minor.floor();
        let frac = minor - m0;
        let m0 = m0 as usize;
        let s = if x_major {
            blend(buf, major, m0, major, m0 + 1, frac)
        } else {
            blend(buf, m0, major, m0 + 1, major, frac)
        };
        if s > p.z_observer + dz * t {
            return false;
        }
    }
    true
}

/// Classify work item `gid` (row-major within the dispatched rows).
pub fn shed_cell(buf: &DeviceBuffers, p: &ShedParams, gid: usize) -> i8 {
    let col = p.col0 + gid % p.cols;
    let row = p.row0 + gid / p.cols;
    if col == p.obs_col && row == p.obs_row {
        return if p.origin_visible { VISIBLE } else { OUTSIDE };
    }
    let dx = (col as f64 + 0.5 - p.eye_x) * p.res;
    let dy = (p.eye_y - (row as f64 + 0.5)) * p.res;
    let distance = (dx * dx + dy * dy).sqrt();
    if !(distance >= p.d_min && distance <= p.d_max) {
        return OUTSIDE;
    }
    if !p.az_full {
        let mut azimuth = dx.atan2(dy);
        if azimuth < 0.0 {
            azimuth += TAU;
        }
        if (azimuth - p.az_min).rem_euclid(TAU) > p.az_span {
            return OUTSIDE;
        }
    }
    let i = row * buf.width + col;
    let lift = if p.cell_above_ground {
        buf.offset[i]
    } else {
        p.cell_fixed
    };
    let z_cell = buf.elevation[i] + lift;
    let vertical = (z_cell - p.z_observer).atan2(distance);
    if !(vertical >= p.v_min && vertical <= p.v_max) {
        return OUTSIDE;
    }
    if sight_line(buf, p, col, row, z_cell) {
        VISIBLE
    } else {
        OCCLUDED
    }
}

/// Sweep azimuth column `gid`.
pub fn tan_column(buf: &DeviceBuffers, p: &TanParams, gid: usize) -> TanColumn {
    let mut cells = vec![NO_CELL; p.n_v];
    let mut distances = vec![f64::NAN; p.n_v];
    let mut elevations = if p.elevations { vec![f64::NAN; p.n_v] } else { Vec::new() };
    let mut horizon = 0.0;

    let azimuth = p.az_min + (gid as f64 + 0.5) * p.a_res;
    let (sin, cos) = azimuth.sin_cos();
    let ox = p.obs_col as f64 + 0.5;
    let oy = p.obs_row as f64 + 0.5;
    let mut max_angle = f64::NEG_INFINITY;
    let mut next_row = p.n_v;
    let mut step = 1usize;
    loop {
        let s = step as f64;
        let distance = s * buf.resolution;
        if distance > p.d_max {
            break;
        }
        let col = (ox + s * sin).floor() as i64;
        let row = (oy - s * cos).floor() as i64;
        if col < 0 || row < 0 || col as usize >= buf.width || row as usize >= buf.height {
            break;
        }
        let index = row as usize * buf.width + col as usize;
        let z = buf.elevation[index] + buf.offset[index];
        let angle = (z - p.z_eye).atan2(distance);
        if angle >= max_angle {
            let counted = distance >= p.d_min;
            while next_row > 0 && p.v_max - ((next_row - 1) as f64 + 0.5) * p.a_res <= angle {
                next_row -= 1;
                if counted {
                    cells[next_row] = index as i64;
                    distances[next_row] = distance;
                    if let Some(e) = elevations.get_mut(next_row) {
                        *e = z;
                    }
                }
            }
            if counted {
                horizon = distance;
            }
            max_angle = angle;
        }
        step += 1;
    }
    TanColumn {
        cells,
        distances,
        elevations,
        horizon,
    }
}
