//! Engine errors.

use thiserror::Error;

use viewscape_core::error::ViewError;
use viewscape_metrics::error::MetricError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("accelerator buffers were disposed; upload terrain again before querying")]
    Disposed,

    #[error("task cancelled")]
    Cancelled,

    #[error("accelerator unavailable: {0}")]
    AcceleratorUnavailable(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}
