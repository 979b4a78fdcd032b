//! Visibility results. Both shapes replay themselves as sample streams,
//! so any metric can be evaluated over them.

mod shed;
mod tan;

pub use shed::ViewShedResult;
pub use tan::{TanRaster, ViewTanResult};

pub(crate) use shed::push_rows;
pub(crate) use tan::stream_panorama;

use viewscape_core::stream::SampleSource;
use viewscape_metrics::{CodeGroup, Metric, MetricKind};

/// Per-group metric restricted to one code group.
fn with_group(kind: MetricKind, group: Option<&CodeGroup>) -> Metric {
    let metric = Metric::new(kind);
    match group {
        Some(g) => metric.clone().with_codes(vec![g.clone()]).unwrap_or(metric),
        None => metric,
    }
}

/// First value of a single-valued metric, NaN when it does not apply.
fn single_value(metric: Metric, source: &dyn SampleSource) -> f64 {
    metric
        .evaluate(source)
        .ok()
        .and_then(|v| v.first().copied())
        .unwrap_or(f64::NAN)
}
