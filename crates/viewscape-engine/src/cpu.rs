//! Multi-threaded scalar backend over a single tile.
//!
//! Planimetric rows and tangential columns are independent, so both loops
//! fan out over rayon. With `worker_threads > 0` the work runs inside a
//! dedicated pool of that size; otherwise on rayon's global pool.

use std::sync::Arc;

use log::info;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use viewscape_core::config::ViewConfig;
use viewscape_core::enums::Visibility;
use viewscape_core::types::GridCell;
use viewscape_terrain::{grid_line_visible, march, ScaleData, TileStack};

use crate::error::EngineError;
use crate::query::{check_angular_resolution, Region, ShedPlan, TanPlan};
use crate::sweep::{ColumnSweep, TanColumn};
use crate::view::ViewEngine;

/// Classify one cell of a single-tile plan.
#[inline]
pub(crate) fn classify(tile: &ScaleData, plan: &ShedPlan, col: usize, row: usize) -> i8 {
    match plan.region(tile, col, row) {
        Region::Outside => Visibility::Outside.as_i8(),
        Region::Origin => Visibility::Visible.as_i8(),
        Region::Test { distance, z_cell } => Visibility::from_bool(grid_line_visible(
            tile,
            plan.observer,
            GridCell::new(col, row),
            plan.z_observer,
            z_cell,
            0.0,
            distance,
        ))
        .as_i8(),
    }
}

/// Optional dedicated pool; `None` runs on rayon's global pool.
pub(crate) fn build_pool(worker_threads: usize) -> Result<Option<ThreadPool>, EngineError> {
    if worker_threads == 0 {
        return Ok(None);
    }
    ThreadPoolBuilder::new()
        .num_threads(worker_threads)
        .thread_name(|i| format!("viewscape-{i}"))
        .build()
        .map(Some)
        .map_err(|e| EngineError::ThreadPool(e.to_string()))
}

pub(crate) fn run_in<R: Send>(pool: Option<&ThreadPool>, op: impl FnOnce() -> R + Send) -> R {
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

pub struct CpuEngine {
    stack: Arc<TileStack>,
    pool: Option<ThreadPool>,
    angular_resolution: f64,
    rows_per_chunk: usize,
}

impl CpuEngine {
    pub fn new(tile: Arc<ScaleData>, config: &ViewConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = build_pool(config.worker_threads)?;
        info!(
            "cpu engine: {}x{} tile, {} worker(s)",
            tile.width(),
            tile.height(),
            pool.as_ref()
                .map_or_else(rayon::current_num_threads, ThreadPool::current_num_threads)
        );
        Ok(Self {
            stack: Arc::new(TileStack::single(tile)),
            pool,
            angular_resolution: config.angular_resolution,
            rows_per_chunk: config.rows_per_chunk,
        })
    }

    pub fn tile(&self) -> &Arc<ScaleData> {
        self.stack.primary()
    }
}

impl ViewEngine for CpuEngine {
    fn backend(&self) -> &'static str {
        "cpu"
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
        let tile = self.tile();
        let w = plan.window;
        let mut out = vec![Visibility::Outside.as_i8(); w.cols * rows];
        if w.cols == 0 {
            return Ok(out);
        }
        run_in(self.pool.as_ref(), || {
            out.par_chunks_mut(w.cols).enumerate().for_each(|(i, line)| {
                let row = w.row0 + row0 + i;
                for (k, v) in line.iter_mut().enumerate() {
                    *v = classify(tile, plan, w.col0 + k, row);
                }
            });
        });
        Ok(out)
    }

    fn tan_columns(&self, plan: &TanPlan) -> Result<Vec<TanColumn>, EngineError> {
        let tile = self.tile();
        let stack = &self.stack;
        let g = &plan.geometry;
        Ok(run_in(self.pool.as_ref(), || {
            (0..g.n_azimuth)
                .into_par_iter()
                .map(|j| {
                    let mut sweep = ColumnSweep::for_plan(plan);
                    march(tile, plan.observer, g.azimuth(j), plan.distance_max, |s| {
                        sweep.visit(stack.global_index(0, s.index), s.distance, s.surface);
                    });
                    sweep.finish()
                })
                .collect()
        }))
    }
}
