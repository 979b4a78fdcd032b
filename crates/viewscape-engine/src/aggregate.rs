//! Aggregated queries: metrics computed while visibility is produced,
//! without keeping a result.
//!
//! Planimetric rows are classified `rows_per_chunk` at a time and streamed
//! straight into the metric sink; only the chunk in flight and the
//! streamer's previous row are held. Tangential columns are swept first
//! (each column depends on the whole ray) and then streamed row by row.
//! Both paths feed exactly the same stream the stored results replay.

use log::debug;

use viewscape_core::enums::ViewKind;
use viewscape_core::stream::RowStreamer;
use viewscape_metrics::{check_all, sink_for, Metric};

use crate::error::EngineError;
use crate::query::{ShedQuery, TanQuery};
use crate::result::{push_rows, stream_panorama};
use crate::view::ViewEngine;

pub(crate) fn shed<E: ViewEngine + ?Sized>(
    engine: &E,
    query: &ShedQuery,
    metrics: &[Metric],
) -> Result<Vec<Vec<f64>>, EngineError> {
    check_all(metrics, ViewKind::Planimetric)?;
    let plan = engine.plan_shed(query)?;
    let chunk = engine.rows_per_chunk().max(1);
    let tile = engine.stack().primary();
    let mut sink = sink_for(metrics);
    let mut streamer = RowStreamer::new(plan.frame(), &mut sink);
    let mut buf = Vec::with_capacity(plan.window.cols);
    let mut row0 = 0;
    while row0 < plan.window.rows {
        let rows = chunk.min(plan.window.rows - row0);
        let samples = engine.shed_rows(&plan, row0, rows)?;
        push_rows(&mut streamer, tile, &plan, row0, &samples, &mut buf);
        row0 += rows;
    }
    debug!("[{}] aggregated {} rows", engine.backend(), streamer.rows_done());
    Ok(sink.finish())
}

pub(crate) fn tan<E: ViewEngine + ?Sized>(
    engine: &E,
    query: &TanQuery,
    metrics: &[Metric],
) -> Result<Vec<Vec<f64>>, EngineError> {
    check_all(metrics, ViewKind::Tangential)?;
    let mut plan = engine.plan_tan(query)?;
    plan.elevations = false;
    let columns = engine.tan_columns(&plan)?;
    let horizons: Vec<f64> = columns.iter().map(|c| c.horizon).collect();
    let mut sink = sink_for(metrics);
    stream_panorama(engine.stack(), &plan.geometry, &horizons, &mut sink, |j, r| {
        (columns[j].cells[r], columns[j].distances[r])
    });
    Ok(sink.finish())
}
