//! Cumulative visibility over many observers.
//!
//! Each observer's planimetric view adds one count to every visible cell of
//! the primary tile. In parallel mode every worker folds into a private
//! raster and the partial rasters are merged by reduction, so the result
//! does not depend on scheduling.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use glam::DVec2;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use viewscape_core::error::ViewError;

use crate::error::EngineError;
use crate::query::ShedQuery;
use crate::result::ViewShedResult;
use crate::view::ViewEngine;

/// One observation point with an optional height attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverFeature {
    pub position: DVec2,
    /// Overrides the template's observer height when set.
    pub height: Option<f64>,
}

impl ObserverFeature {
    pub fn at(position: DVec2) -> Self {
        Self {
            position,
            height: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Shared cancellation flag, checked between observers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observers finished out of the total, readable from other threads.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    done: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl Progress {
    fn reset(&self, total: usize) {
        self.done.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    fn tick(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Fraction done in [0, 1]; 1 when there is nothing to do.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 1.0,
            total => self.done() as f64 / total as f64,
        }
    }
}

/// Per-cell count of observers that see the cell, over the primary tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeRaster {
    width: usize,
    height: usize,
    counts: Vec<u32>,
}

impl CumulativeRaster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            counts: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn get(&self, col: usize, row: usize) -> u32 {
        self.counts[row * self.width + col]
    }

    /// Add one to every visible cell of the result.
    pub fn add(&mut self, result: &ViewShedResult) {
        for cell in result.visible_cells() {
            self.counts[cell.row * self.width + cell.col] += 1;
        }
    }

    pub fn merge(mut self, other: &CumulativeRaster) -> Self {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub raster: CumulativeRaster,
    /// Observers whose view was accumulated.
    pub processed: usize,
    /// Observers skipped because they lie outside the grid.
    pub skipped: usize,
}

impl BatchReport {
    fn empty(width: usize, height: usize) -> Self {
        Self {
            raster: CumulativeRaster::new(width, height),
            processed: 0,
            skipped: 0,
        }
    }

    fn merge(self, other: BatchReport) -> Self {
        Self {
            raster: self.raster.merge(&other.raster),
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Cumulative viewshed over a feature set, using `template` for every
/// query parameter except the observer position (and height, when the
/// feature carries one).
pub struct MultiViewshedTask {
    features: Vec<ObserverFeature>,
    template: ShedQuery,
    mode: ExecutionMode,
    cancel: CancelToken,
    progress: Progress,
}

impl MultiViewshedTask {
    pub fn new(features: Vec<ObserverFeature>, template: ShedQuery) -> Self {
        Self {
            features,
            template,
            mode: ExecutionMode::default(),
            cancel: CancelToken::default(),
            progress: Progress::default(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    fn query_for(&self, feature: &ObserverFeature) -> ShedQuery {
        ShedQuery {
            observer: feature.position,
            observer_height: feature.height.unwrap_or(self.template.observer_height),
            ..self.template
        }
    }

    fn visit(
        &self,
        engine: &dyn ViewEngine,
        mut acc: BatchReport,
        feature: &ObserverFeature,
    ) -> Result<BatchReport, EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match engine.calc_view_shed(&self.query_for(feature)) {
            Ok(result) => {
                acc.raster.add(&result);
                acc.processed += 1;
            }
            Err(EngineError::View(ViewError::ObserverOutsideGrid { x, y })) => {
                warn!("observer ({x}, {y}) is outside the grid; skipped");
                acc.skipped += 1;
            }
            Err(e) => return Err(e),
        }
        self.progress.tick();
        Ok(acc)
    }

    /// Run every observer on `engine`. A cancelled run discards its
    /// partial counts and returns `Cancelled`.
    pub fn run(&self, engine: &dyn ViewEngine) -> Result<BatchReport, EngineError> {
        let primary = engine.stack().primary();
        let (w, h) = (primary.width(), primary.height());
        self.progress.reset(self.features.len());
        info!(
            "batch: {} observer(s), {:?} on {}",
            self.features.len(),
            self.mode,
            engine.backend()
        );
        let outcome = match self.mode {
            ExecutionMode::Sequential => self
                .features
                .iter()
                .try_fold(BatchReport::empty(w, h), |acc, f| self.visit(engine, acc, f)),
            ExecutionMode::Parallel => self
                .features
                .par_iter()
                .try_fold(|| BatchReport::empty(w, h), |acc, f| self.visit(engine, acc, f))
                .try_reduce(|| BatchReport::empty(w, h), |a, b| Ok(a.merge(b))),
        };
        match &outcome {
            Ok(report) => info!(
                "batch done: {} processed, {} skipped, max count {}",
                report.processed,
                report.skipped,
                report.raster.max()
            ),
            Err(EngineError::Cancelled) => info!(
                "batch cancelled after {} of {} observer(s)",
                self.progress.done(),
                self.progress.total()
            ),
            Err(_) => {}
        }
        outcome
    }
}
