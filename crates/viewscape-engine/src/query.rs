//! Query parameters and the per-query plans every backend executes.
//!
//! A plan resolves a query against terrain once (observer cell, heights at
//! both ends of the sight line, window, bucket layout) so that backends only
//! differ in how they run the per-cell or per-ray work.

use std::f64::consts::TAU;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use viewscape_core::bounds::Bounds;
use viewscape_core::config::ViewConfig;
use viewscape_core::constants::{DEFAULT_OBSERVER_HEIGHT, MAX_ANGULAR_RESOLUTION, VERTICAL_MIN};
use viewscape_core::enums::{TargetHeight, ViewKind};
use viewscape_core::error::{check_finite, ViewError};
use viewscape_core::stream::{Frame, RowGeometry};
use viewscape_core::types::{GridCell, Window};
use viewscape_terrain::{ScaleData, TileStack};

/// Planimetric query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShedQuery {
    /// Observer position in world coordinates.
    pub observer: DVec2,
    /// Eye height above ground, >= 0.
    pub observer_height: f64,
    pub target_height: TargetHeight,
    /// `true`: observer looks at each cell. `false`: each cell looks at the
    /// observer.
    pub direct: bool,
    pub bounds: Bounds,
}

impl ShedQuery {
    pub fn new(observer: DVec2) -> Self {
        Self {
            observer,
            observer_height: DEFAULT_OBSERVER_HEIGHT,
            target_height: TargetHeight::default(),
            direct: true,
            bounds: Bounds::default(),
        }
    }

    /// Query using the configured default heights.
    pub fn from_config(observer: DVec2, config: &ViewConfig) -> Self {
        Self {
            observer_height: config.default_observer_height,
            target_height: config.default_target_height,
            ..Self::new(observer)
        }
    }

    pub fn with_observer_height(mut self, height: f64) -> Self {
        self.observer_height = height;
        self
    }

    pub fn with_target_height(mut self, target: TargetHeight) -> Self {
        self.target_height = target;
        self
    }

    pub fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn validate(&self) -> Result<(), ViewError> {
        check_observer_height(self.observer_height)?;
        if let TargetHeight::Fixed(h) = self.target_height {
            check_finite("target height", h)?;
        }
        Ok(())
    }
}

/// Tangential query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TanQuery {
    pub observer: DVec2,
    pub observer_height: f64,
    pub bounds: Bounds,
}

impl TanQuery {
    pub fn new(observer: DVec2) -> Self {
        Self {
            observer,
            observer_height: DEFAULT_OBSERVER_HEIGHT,
            bounds: Bounds::default(),
        }
    }

    pub fn from_config(observer: DVec2, config: &ViewConfig) -> Self {
        Self {
            observer_height: config.default_observer_height,
            ..Self::new(observer)
        }
    }

    pub fn with_observer_height(mut self, height: f64) -> Self {
        self.observer_height = height;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn validate(&self) -> Result<(), ViewError> {
        check_observer_height(self.observer_height).map(|_| ())
    }
}

fn check_observer_height(h: f64) -> Result<f64, ViewError> {
    let h = check_finite("observer height", h)?;
    if h < 0.0 {
        return Err(ViewError::NegativeHeight(h));
    }
    Ok(h)
}

/// Angular resolution must allow at least two buckets per revolution.
pub fn check_angular_resolution(a: f64) -> Result<f64, ViewError> {
    if a.is_finite() && a > 0.0 && a <= MAX_ANGULAR_RESOLUTION {
        Ok(a)
    } else {
        Err(ViewError::InvalidAngularResolution(a))
    }
}

fn observer_cell(tile: &ScaleData, observer: DVec2) -> Result<GridCell, ViewError> {
    tile.cell_of(observer).ok_or(ViewError::ObserverOutsideGrid {
        x: observer.x,
        y: observer.y,
    })
}

// ---- Planimetric ----

/// Resolved planimetric query: a window over the finest tile of the stack.
///
/// Every engine classifies the same cells; coarser tiles of a stack only
/// change how the sight line to a far cell is sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShedPlan {
    pub window: Window,
    /// Cell holding the eye.
    pub observer: GridCell,
    /// Eye position in continuous grid coordinates.
    pub eye: DVec2,
    pub resolution: f64,
    /// Absolute height of the sight line at the observer end.
    pub z_observer: f64,
    /// Height rule added to each cell's ground at the cell end.
    pub cell_height: TargetHeight,
    pub bounds: Bounds,
}

/// Region tests for one cell, before any line of sight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Outside,
    /// The observer's own cell: no azimuth or vertical angle.
    Origin,
    Test {
        distance: f64,
        z_cell: f64,
    },
}

impl ShedPlan {
    /// World offset (east, north) from the eye to a cell center.
    #[inline]
    pub fn offset_to(&self, col: usize, row: usize) -> (f64, f64) {
        (
            (col as f64 + 0.5 - self.eye.x) * self.resolution,
            (self.eye.y - (row as f64 + 0.5)) * self.resolution,
        )
    }

    #[inline]
    pub fn distance(&self, col: usize, row: usize) -> f64 {
        let (dx, dy) = self.offset_to(col, row);
        (dx * dx + dy * dy).sqrt()
    }

    /// Apply the origin rule and the distance, azimuth and vertical bounds.
    pub fn region(&self, tile: &ScaleData, col: usize, row: usize) -> Region {
        if col == self.observer.col && row == self.observer.row {
            return if self.bounds.distance_min() == 0.0 {
                Region::Origin
            } else {
                Region::Outside
            };
        }
        let (dx, dy) = self.offset_to(col, row);
        let distance = (dx * dx + dy * dy).sqrt();
        if !self.bounds.contains_distance(distance) {
            return Region::Outside;
        }
        if !self.bounds.is_full_circle() {
            let mut azimuth = dx.atan2(dy);
            if azimuth < 0.0 {
                azimuth += TAU;
            }
            if !self.bounds.contains_azimuth(azimuth) {
                return Region::Outside;
            }
        }
        let z_cell = tile.elevation(col, row) + self.cell_height.resolve(tile.offset(col, row));
        let vertical = (z_cell - self.z_observer).atan2(distance);
        if !self.bounds.contains_vertical(vertical) {
            return Region::Outside;
        }
        Region::Test { distance, z_cell }
    }

    /// Stream frame of the classified window.
    pub fn frame(&self) -> Frame {
        Frame {
            kind: ViewKind::Planimetric,
            cols: self.window.cols,
            rows: self.window.rows,
            cylinder: false,
            angular_resolution: 0.0,
            resolution: self.resolution,
        }
    }

    pub fn row_geometry(&self) -> RowGeometry {
        RowGeometry::square(self.resolution)
    }
}

/// Resolve a planimetric query against the finest tile of `stack`.
///
/// The sight line always runs from the observer end to the cell end; an
/// indirect query swaps which end carries the observer height.
pub fn plan_shed(stack: &TileStack, query: &ShedQuery) -> Result<ShedPlan, ViewError> {
    query.validate()?;
    let primary = stack.primary();
    let cell = observer_cell(primary, query.observer)?;
    let ground = primary.elevation(cell.col, cell.row);
    let (z_observer, cell_height) = if query.direct {
        (ground + query.observer_height, query.target_height)
    } else {
        (
            ground + query.target_height.resolve(primary.offset(cell.col, cell.row)),
            TargetHeight::Fixed(query.observer_height),
        )
    };

    let (w, h) = (primary.width(), primary.height());
    let reach = query.bounds.distance_max();
    let window = if reach.is_infinite() {
        Window::new(0, 0, w, h)
    } else {
        let radius = ((reach / primary.resolution()).ceil() as usize).min(w.max(h));
        Window::around(cell, radius, w, h)
    };
    Ok(ShedPlan {
        window,
        observer: cell,
        eye: DVec2::new(cell.col as f64 + 0.5, cell.row as f64 + 0.5),
        resolution: primary.resolution(),
        z_observer,
        cell_height,
        bounds: query.bounds,
    })
}

// ---- Tangential ----

/// Bucket layout of a tangential view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TanGeometry {
    pub n_azimuth: usize,
    pub n_vertical: usize,
    pub angular_resolution: f64,
    pub azimuth_min: f64,
    pub vertical_min: f64,
    pub vertical_max: f64,
    pub cylinder: bool,
}

/// Buckets needed to cover `span`, tolerating rounding in `span / a`.
fn bucket_count(span: f64, a: f64) -> usize {
    ((span / a) - 1e-9).ceil().max(0.0) as usize
}

impl TanGeometry {
    pub fn new(bounds: &Bounds, angular_resolution: f64) -> Self {
        let vertical_min = bounds.vertical_min();
        let vertical_max = bounds.vertical_max();
        Self {
            n_azimuth: bucket_count(bounds.azimuth_span(), angular_resolution),
            n_vertical: bucket_count(vertical_max - vertical_min, angular_resolution),
            angular_resolution,
            azimuth_min: bounds.azimuth_min(),
            vertical_min,
            vertical_max,
            cylinder: bounds.is_full_circle(),
        }
    }

    pub fn len(&self) -> usize {
        self.n_azimuth * self.n_vertical
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Center azimuth of column `j`.
    #[inline]
    pub fn azimuth(&self, j: usize) -> f64 {
        self.azimuth_min + (j as f64 + 0.5) * self.angular_resolution
    }

    /// Center vertical angle of row `r` (row 0 at the top).
    #[inline]
    pub fn vertical(&self, r: usize) -> f64 {
        self.vertical_max - (r as f64 + 0.5) * self.angular_resolution
    }

    /// Solid angle and side lengths of the cells in row `r`.
    pub fn row_geometry(&self, r: usize) -> RowGeometry {
        let a = self.angular_resolution;
        let top = self.vertical_max - r as f64 * a;
        let bottom = (self.vertical_max - (r + 1) as f64 * a).max(VERTICAL_MIN);
        RowGeometry {
            area: a * (top.sin() - bottom.sin()),
            edges: [a * top.cos(), a, a * bottom.cos(), a],
        }
    }

    pub fn frame(&self) -> Frame {
        Frame {
            kind: ViewKind::Tangential,
            cols: self.n_azimuth,
            rows: self.n_vertical,
            cylinder: self.cylinder,
            angular_resolution: self.angular_resolution,
            resolution: 0.0,
        }
    }
}

/// Resolved tangential query.
#[derive(Debug, Clone, PartialEq)]
pub struct TanPlan {
    /// Observer cell on the finest tile.
    pub observer: GridCell,
    /// Eye position in each tile's continuous grid coordinates.
    pub eyes: Vec<DVec2>,
    pub z_eye: f64,
    pub distance_min: f64,
    pub distance_max: f64,
    pub geometry: TanGeometry,
    /// Record the surface height of every bucket. Metric aggregation only
    /// needs cells and distances, so it turns this off.
    pub elevations: bool,
}

pub fn plan_tan(
    stack: &TileStack,
    query: &TanQuery,
    angular_resolution: f64,
) -> Result<TanPlan, ViewError> {
    query.validate()?;
    check_angular_resolution(angular_resolution)?;
    let primary = stack.primary();
    let cell = observer_cell(primary, query.observer)?;
    let eye_world = primary.cell_center(cell.col, cell.row);
    let eyes = stack
        .tiles()
        .iter()
        .enumerate()
        .map(|(i, tile)| {
            if i == 0 {
                DVec2::new(cell.col as f64 + 0.5, cell.row as f64 + 0.5)
            } else {
                tile.world_to_grid(eye_world)
            }
        })
        .collect();
    Ok(TanPlan {
        observer: cell,
        eyes,
        z_eye: primary.elevation(cell.col, cell.row) + query.observer_height,
        distance_min: query.bounds.distance_min(),
        distance_max: query.bounds.distance_max(),
        geometry: TanGeometry::new(&query.bounds, angular_resolution),
        elevations: true,
    })
}
