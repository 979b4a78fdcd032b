//! Landscape metrics over visibility results.
//!
//! Metrics are immutable selections (kind, code groups, distance bands)
//! parsed from text such as `SHE[1-3,4]_0,100,200`. They are evaluated by
//! streaming a result's cells through incremental accumulators, which is
//! also how the engine's aggregated queries compute them without storing a
//! raster.

pub mod accum;
pub mod codes;
pub mod error;
pub mod metric;

pub use viewscape_core as core;

pub use accum::{Accumulator, MetricSink};
pub use codes::{CodeGroup, DistanceBands};
pub use error::MetricError;
pub use metric::{check_all, sink_for, CodeSupport, Metric, MetricKind, MetricTable};
