//! Streaming metric accumulators.
//!
//! Every metric is evaluated by consuming a sample stream one cell at a
//! time. Adjacency statistics only look at the west, north and wrap-east
//! neighbours carried by each sample, so each shared edge is seen exactly
//! once.

use std::collections::BTreeMap;

use viewscape_core::constants::{EDGE_DENSITY_SCALE, NO_DATA_CODE, PATCH_DENSITY_SCALE};
use viewscape_core::stream::{CellSample, CellState, Frame, SampleSink, EDGE_E, EDGE_N, EDGE_W};

use crate::codes::CodeGroup;
use crate::metric::MetricKind;

/// A sample sink that reduces its stream to the metric's values.
pub trait Accumulator: SampleSink {
    fn finish(&self) -> Vec<f64>;
}

#[inline]
fn in_band(band: Option<(f64, f64)>, distance: f64) -> bool {
    band.map_or(true, |(lo, hi)| distance >= lo && distance < hi)
}

/// Which cells a per-group statistic counts: visible cells whose code is
/// in `group` (any code when `None`) and whose distance is in `band`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub group: Option<CodeGroup>,
    pub band: Option<(f64, f64)>,
}

impl Selection {
    pub fn admits(&self, cell: &CellState) -> bool {
        cell.is_visible()
            && self.group.as_ref().map_or(true, |g| g.contains(cell.code))
            && in_band(self.band, cell.distance)
    }
}

// ---- Patches ----

/// Streaming 4-connected component counter.
///
/// Labels of the previous and current row are kept; labels meeting across
/// a row boundary (or across the cylinder seam) are merged with a
/// union-find, and every merge removes one patch from the count.
#[derive(Debug, Default)]
struct PatchCounter {
    parent: Vec<usize>,
    prev: Vec<Option<usize>>,
    cur: Vec<Option<usize>>,
    row: usize,
    patches: usize,
}

impl PatchCounter {
    fn begin(&mut self, cols: usize) {
        self.parent.clear();
        self.prev = vec![None; cols];
        self.cur = vec![None; cols];
        self.row = 0;
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
            self.patches -= 1;
        }
    }

    fn push(&mut self, col: usize, row: usize, inside: bool, seam: bool) {
        if row != self.row {
            std::mem::swap(&mut self.prev, &mut self.cur);
            self.cur.fill(None);
            self.row = row;
        }
        if !inside {
            self.cur[col] = None;
            return;
        }
        let west = if col > 0 { self.cur[col - 1] } else { None };
        let label = match (west, self.prev[col]) {
            (Some(w), Some(n)) => {
                self.union(w, n);
                w
            }
            (Some(w), None) => w,
            (None, Some(n)) => n,
            (None, None) => {
                let label = self.parent.len();
                self.parent.push(label);
                self.patches += 1;
                label
            }
        };
        self.cur[col] = Some(label);
        if seam {
            if let Some(first) = self.cur[0] {
                self.union(first, label);
            }
        }
    }
}

// ---- Per-group metrics ----

#[derive(Debug, Default)]
struct GroupStats {
    area: f64,
    perimeter: f64,
    max_distance: Option<f64>,
    patches: Option<PatchCounter>,
}

/// Area, perimeter, compactness, patch and distance statistics, one value
/// per selection.
#[derive(Debug)]
pub struct GroupAccumulator {
    kind: MetricKind,
    selections: Vec<Selection>,
    stats: Vec<GroupStats>,
}

impl GroupAccumulator {
    pub fn new(kind: MetricKind, selections: Vec<Selection>) -> Self {
        let wants_patches = matches!(kind, MetricKind::PatchCount | MetricKind::PatchDensity);
        let stats = selections
            .iter()
            .map(|_| GroupStats {
                patches: wants_patches.then(PatchCounter::default),
                ..Default::default()
            })
            .collect();
        Self {
            kind,
            selections,
            stats,
        }
    }
}

impl SampleSink for GroupAccumulator {
    fn begin(&mut self, frame: &Frame) {
        for st in self.stats.iter_mut() {
            if let Some(p) = st.patches.as_mut() {
                p.begin(frame.cols);
            }
        }
    }

    fn cell(&mut self, sample: &CellSample) {
        for (sel, st) in self.selections.iter().zip(self.stats.iter_mut()) {
            let inside = sel.admits(&sample.cell);
            if let Some(p) = st.patches.as_mut() {
                p.push(sample.col, sample.row, inside, sample.wrap_east.is_some());
            }
            if !inside {
                continue;
            }
            st.area += sample.area;
            st.perimeter += sample.edges.iter().sum::<f64>();
            if sample.west.is_some_and(|w| sel.admits(&w)) {
                st.perimeter -= 2.0 * sample.edges[EDGE_W];
            }
            if sample.north.is_some_and(|n| sel.admits(&n)) {
                st.perimeter -= 2.0 * sample.edges[EDGE_N];
            }
            if sample.wrap_east.is_some_and(|e| sel.admits(&e)) {
                st.perimeter -= 2.0 * sample.edges[EDGE_E];
            }
            let d = sample.cell.distance;
            st.max_distance = Some(st.max_distance.map_or(d, |m| m.max(d)));
        }
    }
}

impl Accumulator for GroupAccumulator {
    fn finish(&self) -> Vec<f64> {
        self.stats
            .iter()
            .map(|st| {
                let patches = st.patches.as_ref().map_or(0, |p| p.patches) as f64;
                match self.kind {
                    MetricKind::Area => st.area,
                    MetricKind::Perimeter => st.perimeter,
                    MetricKind::Compactness => {
                        if st.area > 0.0 && st.perimeter > 0.0 {
                            st.perimeter / (2.0 * (std::f64::consts::PI * st.area).sqrt())
                        } else {
                            f64::NAN
                        }
                    }
                    MetricKind::PatchCount => patches,
                    MetricKind::PatchDensity => {
                        if st.area > 0.0 {
                            patches / st.area * PATCH_DENSITY_SCALE
                        } else {
                            f64::NAN
                        }
                    }
                    MetricKind::MaxDistance => st.max_distance.unwrap_or(f64::NAN),
                    _ => f64::NAN,
                }
            })
            .collect()
    }
}

// ---- Partition metrics ----

#[derive(Debug, Default)]
struct PartitionStats {
    area: BTreeMap<i32, f64>,
    total_area: f64,
    /// Double-counted adjacency counts g_ik (like pairs add 2 to g_ii).
    adjacency: BTreeMap<(i32, i32), u64>,
    /// Shared edge length between unlike categories, keyed i < k.
    unlike: BTreeMap<(i32, i32), f64>,
}

impl PartitionStats {
    fn adjoin(&mut self, i: i32, k: i32, length: f64) {
        if i == k {
            *self.adjacency.entry((i, i)).or_default() += 2;
        } else {
            *self.adjacency.entry((i, k)).or_default() += 1;
            *self.adjacency.entry((k, i)).or_default() += 1;
            *self.unlike.entry((i.min(k), i.max(k))).or_default() += length;
        }
    }

    fn shannon(&self) -> f64 {
        if self.area.is_empty() {
            return f64::NAN;
        }
        -self
            .area
            .values()
            .map(|a| {
                let p = a / self.total_area;
                p * p.ln()
            })
            .sum::<f64>()
    }

    fn evenness(&self) -> f64 {
        match self.area.len() {
            0 => f64::NAN,
            1 => 1.0,
            m => self.shannon() / (m as f64).ln(),
        }
    }

    fn contagion(&self) -> f64 {
        let m = self.area.len();
        if m < 2 {
            return f64::NAN;
        }
        let mut sum = 0.0;
        for (&i, &a) in &self.area {
            let p = a / self.total_area;
            let row = self.adjacency.range((i, i32::MIN)..=(i, i32::MAX));
            let total: u64 = row.clone().map(|(_, g)| g).sum();
            if total == 0 {
                continue;
            }
            for (_, &g) in row {
                let q = p * g as f64 / total as f64;
                if q > 0.0 {
                    sum += q * q.ln();
                }
            }
        }
        (1.0 + sum / (2.0 * (m as f64).ln())) * 100.0
    }

    fn interspersion(&self) -> f64 {
        let m = self.area.len();
        let edge: f64 = self.unlike.values().sum();
        if m < 3 || edge <= 0.0 {
            return f64::NAN;
        }
        let sum: f64 = self
            .unlike
            .values()
            .map(|e| {
                let q = e / edge;
                q * q.ln()
            })
            .sum();
        let pairs = (m * (m - 1)) as f64 / 2.0;
        -sum / pairs.ln() * 100.0
    }

    fn edge_density(&self) -> f64 {
        if self.total_area <= 0.0 {
            return f64::NAN;
        }
        self.unlike.values().sum::<f64>() / self.total_area * EDGE_DENSITY_SCALE
    }
}

/// Category of a cell for a partition metric: the index of its group, or
/// the code itself when no groups are given.
fn category(groups: &[CodeGroup], band: Option<(f64, f64)>, cell: &CellState) -> Option<i32> {
    if !cell.is_visible() || !in_band(band, cell.distance) {
        return None;
    }
    if groups.is_empty() {
        (cell.code != NO_DATA_CODE).then_some(cell.code)
    } else {
        groups.iter().position(|g| g.contains(cell.code)).map(|i| i as i32)
    }
}

/// Diversity and adjacency indices over a partition of the visible cells,
/// one value per distance band.
#[derive(Debug)]
pub struct PartitionAccumulator {
    kind: MetricKind,
    groups: Vec<CodeGroup>,
    bands: Vec<Option<(f64, f64)>>,
    stats: Vec<PartitionStats>,
}

impl PartitionAccumulator {
    pub fn new(kind: MetricKind, groups: Vec<CodeGroup>, bands: Vec<Option<(f64, f64)>>) -> Self {
        let stats = bands.iter().map(|_| PartitionStats::default()).collect();
        Self {
            kind,
            groups,
            bands,
            stats,
        }
    }
}

impl SampleSink for PartitionAccumulator {
    fn begin(&mut self, _frame: &Frame) {}

    fn cell(&mut self, sample: &CellSample) {
        let groups = &self.groups;
        for (&band, st) in self.bands.iter().zip(self.stats.iter_mut()) {
            let Some(cat) = category(groups, band, &sample.cell) else {
                continue;
            };
            *st.area.entry(cat).or_default() += sample.area;
            st.total_area += sample.area;
            let neighbours = [
                (sample.west, EDGE_W),
                (sample.north, EDGE_N),
                (sample.wrap_east, EDGE_E),
            ];
            for (nb, side) in neighbours {
                if let Some(k) = nb.and_then(|n| category(groups, band, &n)) {
                    st.adjoin(cat, k, sample.edges[side]);
                }
            }
        }
    }
}

impl Accumulator for PartitionAccumulator {
    fn finish(&self) -> Vec<f64> {
        self.stats
            .iter()
            .map(|st| match self.kind {
                MetricKind::Shannon => st.shannon(),
                MetricKind::ShannonEvenness => st.evenness(),
                MetricKind::Contagion => st.contagion(),
                MetricKind::Interspersion => st.interspersion(),
                MetricKind::EdgeDensity => st.edge_density(),
                _ => f64::NAN,
            })
            .collect()
    }
}

// ---- Horizon metrics ----

/// Skyline length and depth area, reconstructed from the per-azimuth
/// horizon distances of a tangential view.
#[derive(Debug)]
pub struct HorizonAccumulator {
    kind: MetricKind,
    angular_resolution: f64,
    cylinder: bool,
    distances: Vec<f64>,
}

impl HorizonAccumulator {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            angular_resolution: 0.0,
            cylinder: false,
            distances: Vec::new(),
        }
    }

    /// Consecutive horizon pairs, closing the ring on a full circle.
    fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let n = self.distances.len();
        let closing = (self.cylinder && n > 1).then(|| (self.distances[n - 1], self.distances[0]));
        self.distances
            .windows(2)
            .map(|w| (w[0], w[1]))
            .chain(closing)
    }
}

impl SampleSink for HorizonAccumulator {
    fn begin(&mut self, frame: &Frame) {
        self.angular_resolution = frame.angular_resolution;
        self.cylinder = frame.cylinder;
        self.distances.clear();
    }

    fn cell(&mut self, _sample: &CellSample) {}

    fn horizon(&mut self, _azimuth: f64, distance: f64) {
        self.distances.push(distance);
    }
}

impl Accumulator for HorizonAccumulator {
    fn finish(&self) -> Vec<f64> {
        let (sin, cos) = self.angular_resolution.sin_cos();
        let value = match self.kind {
            MetricKind::SkylineLength => self
                .pairs()
                .map(|(a, b)| (a * a + b * b - 2.0 * a * b * cos).max(0.0).sqrt())
                .sum(),
            MetricKind::Depth => self.pairs().map(|(a, b)| 0.5 * a * b * sin).sum(),
            _ => f64::NAN,
        };
        vec![value]
    }
}

// ---- Fan-out ----

/// Feeds one stream into several accumulators.
pub struct MetricSink {
    accumulators: Vec<Box<dyn Accumulator>>,
}

impl MetricSink {
    pub fn new(accumulators: Vec<Box<dyn Accumulator>>) -> Self {
        Self { accumulators }
    }

    /// Values of every accumulator, in order.
    pub fn finish(&self) -> Vec<Vec<f64>> {
        self.accumulators.iter().map(|a| a.finish()).collect()
    }
}

impl SampleSink for MetricSink {
    fn begin(&mut self, frame: &Frame) {
        for acc in self.accumulators.iter_mut() {
            acc.begin(frame);
        }
    }

    fn cell(&mut self, sample: &CellSample) {
        for acc in self.accumulators.iter_mut() {
            acc.cell(sample);
        }
    }

    fn horizon(&mut self, azimuth: f64, distance: f64) {
        for acc in self.accumulators.iter_mut() {
            acc.horizon(azimuth, distance);
        }
    }
}
