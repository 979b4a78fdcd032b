//! The visibility engine interface shared by every backend.
//!
//! A backend only implements the two hot loops (classifying planimetric
//! rows and sweeping tangential columns). Planning, result assembly and
//! the aggregated metric path are provided here once, so all backends
//! agree on everything but the arithmetic they run in parallel.

use std::sync::Arc;

use log::debug;

use viewscape_metrics::Metric;
use viewscape_terrain::TileStack;

use crate::aggregate;
use crate::error::EngineError;
use crate::query::{self, ShedPlan, ShedQuery, TanPlan, TanQuery};
use crate::result::{TanRaster, ViewShedResult, ViewTanResult};
use crate::sweep::TanColumn;

pub trait ViewEngine: Send + Sync {
    /// Short backend name for logs and reports.
    fn backend(&self) -> &'static str;

    fn stack(&self) -> &Arc<TileStack>;

    /// Radians per tangential bucket.
    fn angular_resolution(&self) -> f64;

    fn set_angular_resolution(&mut self, a: f64) -> Result<(), EngineError>;

    /// Rows computed per chunk on the aggregated path.
    fn rows_per_chunk(&self) -> usize;

    /// Classify `rows` window rows starting at window row
    /// `row0`, row-major, one byte per cell (see `Visibility`).
    fn shed_rows(&self, plan: &ShedPlan, row0: usize, rows: usize) -> Result<Vec<i8>, EngineError>;

    /// Sweep every azimuth column of a tangential plan.
    fn tan_columns(&self, plan: &TanPlan) -> Result<Vec<TanColumn>, EngineError>;

    fn plan_shed(&self, query: &ShedQuery) -> Result<ShedPlan, EngineError> {
        let plan = query::plan_shed(self.stack(), query)?;
        debug!(
            "[{}] shed window {}x{} at ({}, {})",
            self.backend(),
            plan.window.cols,
            plan.window.rows,
            plan.window.col0,
            plan.window.row0
        );
        Ok(plan)
    }

    fn plan_tan(&self, query: &TanQuery) -> Result<TanPlan, EngineError> {
        let plan = query::plan_tan(self.stack(), query, self.angular_resolution())?;
        debug!(
            "[{}] tan view: {} azimuth x {} vertical buckets",
            self.backend(),
            plan.geometry.n_azimuth,
            plan.geometry.n_vertical
        );
        Ok(plan)
    }

    /// Planimetric visibility raster over the finest tile.
    fn calc_view_shed(&self, query: &ShedQuery) -> Result<ViewShedResult, EngineError> {
        let plan = self.plan_shed(query)?;
        let samples = self.shed_rows(&plan, 0, plan.window.rows)?;
        Ok(ViewShedResult::new(Arc::clone(self.stack().primary()), plan, samples))
    }

    /// Tangential panorama with looked-back terrain cells.
    fn calc_view_tan(&self, query: &TanQuery) -> Result<ViewTanResult, EngineError> {
        let plan = self.plan_tan(query)?;
        let columns = self.tan_columns(&plan)?;
        Ok(ViewTanResult::from_columns(
            Arc::clone(self.stack()),
            plan.geometry,
            &columns,
        ))
    }

    /// Raw per-bucket sample distances and elevations.
    fn calc_view_tan_raw(&self, query: &TanQuery) -> Result<TanRaster, EngineError> {
        let plan = self.plan_tan(query)?;
        let columns = self.tan_columns(&plan)?;
        Ok(TanRaster::from_columns(plan.geometry, &columns))
    }

    /// Planimetric metrics without storing the raster. One value list per
    /// metric, in input order.
    fn aggr_view_shed(&self, query: &ShedQuery, metrics: &[Metric]) -> Result<Vec<Vec<f64>>, EngineError> {
        aggregate::shed(self, query, metrics)
    }

    /// Tangential metrics without storing the panorama.
    fn aggr_view_tan(&self, query: &TanQuery, metrics: &[Metric]) -> Result<Vec<Vec<f64>>, EngineError> {
        aggregate::tan(self, query, metrics)
    }
}
