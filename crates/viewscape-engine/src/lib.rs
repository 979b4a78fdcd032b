//! Visibility engines for viewscape.
//!
//! Every backend implements [`ViewEngine`]: the multi-threaded CPU engine,
//! the data-parallel accelerator engine and the multi-resolution engine.
//! Results replay as sample streams, so landscape metrics are computed the
//! same way over stored results and on the aggregated path.

pub mod accel;
mod aggregate;
pub mod artifacts;
pub mod batch;
pub mod cpu;
pub mod error;
pub mod multi;
pub mod query;
pub mod result;
pub mod sweep;
pub mod view;

pub use viewscape_core as core;
pub use viewscape_metrics as metrics;
pub use viewscape_terrain as terrain;

pub use accel::{select_engine, AccelEngine, Device};
pub use artifacts::{write_artifact, Artifact, DirectorySink, MemorySink, RasterSink};
pub use batch::{BatchReport, CancelToken, CumulativeRaster, ExecutionMode, MultiViewshedTask, ObserverFeature, Progress};
pub use cpu::CpuEngine;
pub use error::EngineError;
pub use multi::MultiResolutionEngine;
pub use query::{ShedQuery, TanGeometry, TanQuery};
pub use result::{TanRaster, ViewShedResult, ViewTanResult};
pub use view::ViewEngine;

#[cfg(test)]
mod conformance;
#[cfg(test)]
mod tests;
