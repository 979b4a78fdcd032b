//! Metric configuration errors, raised before any ray is cast.

use thiserror::Error;

use viewscape_core::enums::ViewKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    #[error("unknown metric {0:?}")]
    UnknownMetric(String),

    #[error("metric {0} does not accept land-cover codes")]
    CodesNotSupported(&'static str),

    #[error("metric {metric} needs disjoint categories, but code {code} appears in more than one group")]
    OverlappingGroups { metric: &'static str, code: i32 },

    #[error("distance bands need at least 2 breakpoints, got {0}")]
    TooFewBreakpoints(usize),

    #[error("metric {0} does not accept distance bands")]
    BandsNotSupported(&'static str),

    #[error("cannot parse metric {text:?}: {reason}")]
    Syntax { text: String, reason: String },

    #[error("metric {metric} is not defined on a {view} view")]
    UnsupportedView { metric: &'static str, view: ViewKind },
}

pub(crate) fn syntax(text: &str, reason: impl Into<String>) -> MetricError {
    MetricError::Syntax {
        text: text.to_string(),
        reason: reason.into(),
    }
}
