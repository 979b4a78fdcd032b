//! Metric catalog, immutable metric selections and result tables.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use viewscape_core::enums::ViewKind;
use viewscape_core::stream::SampleSource;

use crate::accum::{
    Accumulator, GroupAccumulator, HorizonAccumulator, MetricSink, PartitionAccumulator, Selection,
};
use crate::codes::{first_overlap, parse_groups, CodeGroup, DistanceBands};
use crate::error::{syntax, MetricError};

/// How a metric uses land-cover code groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSupport {
    /// Codes are rejected.
    None,
    /// One value per group; groups may overlap.
    Groups,
    /// Groups are the categories of one partition and must be disjoint.
    Partition,
}

/// Every metric the layer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Area,
    Perimeter,
    Compactness,
    PatchCount,
    PatchDensity,
    MaxDistance,
    Shannon,
    ShannonEvenness,
    Contagion,
    Interspersion,
    EdgeDensity,
    SkylineLength,
    Depth,
}

impl MetricKind {
    pub const ALL: [MetricKind; 13] = [
        MetricKind::Area,
        MetricKind::Perimeter,
        MetricKind::Compactness,
        MetricKind::PatchCount,
        MetricKind::PatchDensity,
        MetricKind::MaxDistance,
        MetricKind::Shannon,
        MetricKind::ShannonEvenness,
        MetricKind::Contagion,
        MetricKind::Interspersion,
        MetricKind::EdgeDensity,
        MetricKind::SkylineLength,
        MetricKind::Depth,
    ];

    /// Short name used in metric text and result names.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Area => "A",
            MetricKind::Perimeter => "P",
            MetricKind::Compactness => "COMPACT",
            MetricKind::PatchCount => "NP",
            MetricKind::PatchDensity => "PD",
            MetricKind::MaxDistance => "MAXD",
            MetricKind::Shannon => "SHDI",
            MetricKind::ShannonEvenness => "SHE",
            MetricKind::Contagion => "CONTAG",
            MetricKind::Interspersion => "IJI",
            MetricKind::EdgeDensity => "ED",
            MetricKind::SkylineLength => "SL",
            MetricKind::Depth => "DEPTH",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, MetricError> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == upper)
            .ok_or_else(|| MetricError::UnknownMetric(name.to_string()))
    }

    pub fn code_support(self) -> CodeSupport {
        match self {
            MetricKind::Area
            | MetricKind::Perimeter
            | MetricKind::Compactness
            | MetricKind::PatchCount
            | MetricKind::PatchDensity
            | MetricKind::MaxDistance => CodeSupport::Groups,
            MetricKind::Shannon
            | MetricKind::ShannonEvenness
            | MetricKind::Contagion
            | MetricKind::Interspersion
            | MetricKind::EdgeDensity => CodeSupport::Partition,
            MetricKind::SkylineLength | MetricKind::Depth => CodeSupport::None,
        }
    }

    pub fn supports_bands(self) -> bool {
        !matches!(
            self,
            MetricKind::Compactness | MetricKind::SkylineLength | MetricKind::Depth
        )
    }

    /// Whether the metric is defined on results of `view`.
    pub fn supports_view(self, view: ViewKind) -> bool {
        match self {
            MetricKind::SkylineLength | MetricKind::Depth => view == ViewKind::Tangential,
            _ => true,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable metric selection: what to compute, over which code
/// groups, per which distance bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    kind: MetricKind,
    groups: Vec<CodeGroup>,
    bands: Option<DistanceBands>,
}

impl Metric {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            groups: Vec::new(),
            bands: None,
        }
    }

    /// Restrict to code groups. An empty list means all codes.
    pub fn with_codes(mut self, groups: Vec<CodeGroup>) -> Result<Self, MetricError> {
        match self.kind.code_support() {
            CodeSupport::None if !groups.is_empty() => {
                return Err(MetricError::CodesNotSupported(self.kind.name()));
            }
            CodeSupport::Partition => {
                if let Some(code) = first_overlap(&groups) {
                    return Err(MetricError::OverlappingGroups {
                        metric: self.kind.name(),
                        code,
                    });
                }
            }
            _ => {}
        }
        self.groups = groups;
        Ok(self)
    }

    /// Evaluate per distance band.
    pub fn with_bands(self, breaks: Vec<f64>) -> Result<Self, MetricError> {
        if !self.kind.supports_bands() {
            return Err(MetricError::BandsNotSupported(self.kind.name()));
        }
        self.with_distance_bands(DistanceBands::new(breaks)?)
    }

    pub fn with_distance_bands(mut self, bands: DistanceBands) -> Result<Self, MetricError> {
        if !self.kind.supports_bands() {
            return Err(MetricError::BandsNotSupported(self.kind.name()));
        }
        self.bands = Some(bands);
        Ok(self)
    }

    /// Parse `NAME`, `NAME[g1,g2,...]` and an optional `_d1,d2,...` suffix.
    pub fn parse(text: &str) -> Result<Self, MetricError> {
        let trimmed = text.trim();
        let (head, bands) = match trimmed.find(']') {
            Some(close) => {
                let (head, rest) = trimmed.split_at(close + 1);
                let bands = if rest.is_empty() {
                    None
                } else {
                    Some(
                        rest.strip_prefix('_')
                            .ok_or_else(|| syntax(text, "expected '_' after ']'"))?,
                    )
                };
                (head, bands)
            }
            None => match trimmed.split_once('_') {
                Some((head, bands)) => (head, Some(bands)),
                None => (trimmed, None),
            },
        };
        let (name, groups) = match head.split_once('[') {
            Some((name, groups)) => {
                let groups = groups
                    .strip_suffix(']')
                    .ok_or_else(|| syntax(text, "unclosed '['"))?;
                (name, Some(parse_groups(groups)?))
            }
            None if head.contains(']') => return Err(syntax(text, "unmatched ']'")),
            None => (head, None),
        };
        if name.is_empty() {
            return Err(syntax(text, "missing metric name"));
        }

        let mut metric = Metric::new(MetricKind::from_name(name)?);
        if let Some(groups) = groups {
            metric = metric.with_codes(groups)?;
        }
        if let Some(bands) = bands {
            if !metric.kind.supports_bands() {
                return Err(MetricError::BandsNotSupported(metric.kind.name()));
            }
            metric = metric.with_distance_bands(DistanceBands::parse(bands)?)?;
        }
        Ok(metric)
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn groups(&self) -> &[CodeGroup] {
        &self.groups
    }

    pub fn bands(&self) -> Option<&DistanceBands> {
        self.bands.as_ref()
    }

    fn band_list(&self) -> Vec<Option<(f64, f64)>> {
        match &self.bands {
            Some(b) => b.intervals().map(Some).collect(),
            None => vec![None],
        }
    }

    fn band_suffixes(&self) -> Vec<String> {
        match &self.bands {
            Some(b) => b.labels().map(|l| format!("_{l}")).collect(),
            None => vec![String::new()],
        }
    }

    /// Names of the values this metric produces, in output order: groups
    /// outer, bands inner, e.g. `A1-5_0-100`.
    pub fn result_names(&self) -> Vec<String> {
        let name = self.kind.name();
        let suffixes = self.band_suffixes();
        match self.kind.code_support() {
            CodeSupport::Groups if !self.groups.is_empty() => self
                .groups
                .iter()
                .flat_map(|g| suffixes.iter().map(move |s| format!("{name}{g}{s}")))
                .collect(),
            CodeSupport::Partition if !self.groups.is_empty() => {
                let labels: Vec<String> = self.groups.iter().map(CodeGroup::label).collect();
                let base = format!("{name}[{}]", labels.join(","));
                suffixes.iter().map(|s| format!("{base}{s}")).collect()
            }
            _ => suffixes.iter().map(|s| format!("{name}{s}")).collect(),
        }
    }

    /// Fail fast when the metric is not defined on `view`.
    pub fn check_view(&self, view: ViewKind) -> Result<(), MetricError> {
        if self.kind.supports_view(view) {
            Ok(())
        } else {
            Err(MetricError::UnsupportedView {
                metric: self.kind.name(),
                view,
            })
        }
    }

    /// Fresh accumulator for one evaluation.
    pub fn accumulator(&self) -> Box<dyn Accumulator> {
        match self.kind.code_support() {
            CodeSupport::Groups => {
                let groups: Vec<Option<CodeGroup>> = if self.groups.is_empty() {
                    vec![None]
                } else {
                    self.groups.iter().cloned().map(Some).collect()
                };
                let bands = self.band_list();
                let selections = groups
                    .into_iter()
                    .flat_map(|group| {
                        bands.iter().map(move |&band| Selection {
                            group: group.clone(),
                            band,
                        })
                    })
                    .collect();
                Box::new(GroupAccumulator::new(self.kind, selections))
            }
            CodeSupport::Partition => Box::new(PartitionAccumulator::new(
                self.kind,
                self.groups.clone(),
                self.band_list(),
            )),
            CodeSupport::None => Box::new(HorizonAccumulator::new(self.kind)),
        }
    }

    /// Evaluate over a stored result.
    pub fn evaluate(&self, source: &dyn SampleSource) -> Result<Vec<f64>, MetricError> {
        self.check_view(source.kind())?;
        let mut sink = MetricSink::new(vec![self.accumulator()]);
        source.stream(&mut sink);
        Ok(sink.finish().into_iter().next().unwrap_or_default())
    }
}

impl FromStr for Metric {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::parse(s)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if !self.groups.is_empty() {
            let labels: Vec<String> = self.groups.iter().map(CodeGroup::label).collect();
            write!(f, "[{}]", labels.join(","))?;
        }
        if let Some(bands) = &self.bands {
            let breaks: Vec<String> = bands.breaks().iter().map(|b| b.to_string()).collect();
            write!(f, "_{}", breaks.join(","))?;
        }
        Ok(())
    }
}

/// Check a metric set against a view kind before any work starts.
pub fn check_all(metrics: &[Metric], view: ViewKind) -> Result<(), MetricError> {
    metrics.iter().try_for_each(|m| m.check_view(view))
}

/// Accumulator set for a metric list, in input order.
pub fn sink_for(metrics: &[Metric]) -> MetricSink {
    MetricSink::new(metrics.iter().map(Metric::accumulator).collect())
}

/// Metric values keyed by result name, in output order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTable {
    entries: Vec<(String, f64)>,
}

impl MetricTable {
    /// Pair per-metric value lists with their result names.
    pub fn from_values(metrics: &[Metric], values: &[Vec<f64>]) -> Self {
        let entries = metrics
            .iter()
            .zip(values)
            .flat_map(|(m, v)| m.result_names().into_iter().zip(v.iter().copied()))
            .collect();
        Self { entries }
    }

    /// Evaluate every metric over one stored result in a single pass.
    pub fn evaluate(metrics: &[Metric], source: &dyn SampleSource) -> Result<Self, MetricError> {
        check_all(metrics, source.kind())?;
        debug!(
            "evaluating {} metric(s) over a {} result",
            metrics.len(),
            source.kind()
        );
        let mut sink = sink_for(metrics);
        source.stream(&mut sink);
        Ok(Self::from_values(metrics, &sink.finish()))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}
