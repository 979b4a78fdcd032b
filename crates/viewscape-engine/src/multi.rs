//! Multi-resolution fusion over a tile stack.
//!
//! Tangential rays march one cell of the current tile per step and hand
//! off to the next coarser tile when they leave the current tile's band or
//! extent; the sweep state (running max angle) is carried across, so near
//! terrain keeps occluding far terrain.
//!
//! Planimetric results cover the finest tile, cell for cell, exactly like
//! a single-tile query. A cell inside the finest tile's band is tested on
//! that tile alone. Beyond it, the sight line is sampled on every tile of
//! the stack over that tile's band, so near samples come from fine terrain
//! and far samples from coarse terrain. Samples a tile does not cover are
//! not tested, so each tile should cover its band around the observer.

use std::sync::Arc;

use glam::DVec2;
use log::info;
use rayon::prelude::*;
use rayon::ThreadPool;

use viewscape_core::config::ViewConfig;
use viewscape_core::enums::Visibility;
use viewscape_core::types::GridCell;
use viewscape_terrain::{grid_line_visible, segment_visible, ScaleData, TileStack};

use crate::cpu::{build_pool, run_in};
use crate::error::EngineError;
use crate::query::{check_angular_resolution, Region, ShedPlan, TanPlan};
use crate::sweep::{ColumnSweep, TanColumn};
use crate::view::ViewEngine;

pub struct MultiResolutionEngine {
    stack: Arc<TileStack>,
    pool: Option<ThreadPool>,
    angular_resolution: f64,
    rows_per_chunk: usize,
}

impl MultiResolutionEngine {
    pub fn new(stack: Arc<TileStack>, config: &ViewConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = build_pool(config.worker_threads)?;
        info!(
            "multi-resolution engine: {} tile(s), resolutions {:?}, hand-off at {} cells",
            stack.len(),
            stack.tiles().iter().map(|t| t.resolution()).collect::<Vec<_>>(),
            stack.near_cells()
        );
        Ok(Self {
            stack,
            pool,
            angular_resolution: config.angular_resolution,
            rows_per_chunk: config.rows_per_chunk,
        })
    }

    /// Build the stack from tiles with the configured hand-off distance.
    pub fn from_tiles(
        tiles: impl IntoIterator<Item = Arc<ScaleData>>,
        config: &ViewConfig,
    ) -> Result<Self, EngineError> {
        let stack = TileStack::new(tiles, config.near_switch_cells)?;
        Self::new(Arc::new(stack), config)
    }

    fn classify(&self, plan: &ShedPlan, eyes: &[DVec2], col: usize, row: usize) -> i8 {
        let primary = self.stack.primary();
        let (distance, z_cell) = match plan.region(primary, col, row) {
            Region::Outside => return Visibility::Outside.as_i8(),
            Region::Origin => return Visibility::Visible.as_i8(),
            Region::Test { distance, z_cell } => (distance, z_cell),
        };
        let visible = if distance < self.stack.limit(0) {
            grid_line_visible(
                primary,
                plan.observer,
                GridCell::new(col, row),
                plan.z_observer,
                z_cell,
                0.0,
                distance,
            )
        } else {
            let world = primary.cell_center(col, row);
            self.stack.tiles().iter().zip(eyes).enumerate().all(|(j, (tile, &eye))| {
                let target = if j == 0 {
                    DVec2::new(col as f64 + 0.5, row as f64 + 0.5)
                } else {
                    tile.world_to_grid(world)
                };
                segment_visible(
                    tile,
                    eye,
                    target,
                    plan.z_observer,
                    z_cell,
                    distance,
                    self.stack.band(j),
                )
            })
        };
        Visibility::from_bool(visible).as_i8()
    }

    fn sweep_column(&self, plan: &TanPlan, j: usize) -> TanColumn {
        let g = &plan.geometry;
        let (sin, cos) = g.azimuth(j).sin_cos();
        let mut sweep = ColumnSweep::for_plan(plan);
        let mut step = 1usize;
        let mut last = 0.0;
        for (i, tile) in self.stack.tiles().iter().enumerate() {
            if i > 0 {
                step = (last / tile.resolution()).floor() as usize + 1;
            }
            let eye = plan.eyes[i];
            let limit = self.stack.limit(i);
            loop {
                let s = step as f64;
                let distance = s * tile.resolution();
                if distance > plan.distance_max {
                    return sweep.finish();
                }
                if distance >= limit {
                    break;
                }
                let col = (eye.x + s * sin).floor() as i64;
                let row = (eye.y - s * cos).floor() as i64;
                if !tile.contains(col, row) {
                    break;
                }
                let index = tile.index(col as usize, row as usize);
                sweep.visit(self.stack.global_index(i, index), distance, tile.surface_at(index));
                last = distance;
                step += 1;
            }
        }
        sweep.finish()
    }
}

impl ViewEngine for MultiResolutionEngine {
    fn backend(&self) -> &'static str {
        "multi-resolution"
    }

    fn stack(&self) -> &Arc<TileStack> {
        &self.stack
    }

    fn angular_resolution(&self) -> f64 {
        self.angular_resolution
    }

    fn set_angular_resolution(&mut self, a: f64) -> Result<(), EngineError> {
        self.angular_resolution = check_angular_resolution(a)?;
        Ok(())
    }

    fn rows_per_chunk(&self) -> usize {
        self.rows_per_chunk
    }

    fn shed_rows(&self, plan: &ShedPlan, row0: usize, rows: usize) -> Result<Vec<i8>, EngineError> {
        let w = plan.window;
        let mut out = vec![Visibility::Outside.as_i8(); w.cols * rows];
        if w.cols == 0 {
            return Ok(out);
        }
        let primary = self.stack.primary();
        let eye_world = primary.cell_center(plan.observer.col, plan.observer.row);
        let eyes: Vec<DVec2> = self
            .stack
            .tiles()
            .iter()
            .enumerate()
            .map(|(j, t)| if j == 0 { plan.eye } else { t.world_to_grid(eye_world) })
            .collect();
        run_in(self.pool.as_ref(), || {
            out.par_chunks_mut(w.cols).enumerate().for_each(|(i, line)| {
                let row = w.row0 + row0 + i;
                for (k, v) in line.iter_mut().enumerate() {
                    *v = self.classify(plan, &eyes, w.col0 + k, row);
                }
            });
        });
        Ok(out)
    }

    fn tan_columns(&self, plan: &TanPlan) -> Result<Vec<TanColumn>, EngineError> {
        Ok(run_in(self.pool.as_ref(), || {
            (0..plan.geometry.n_azimuth)
                .into_par_iter()
                .map(|j| self.sweep_column(plan, j))
                .collect()
        }))
    }
}
