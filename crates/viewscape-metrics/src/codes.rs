//! Land-cover code groups and distance bands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{syntax, MetricError};

/// An equivalence class of land-cover codes, made of inclusive ranges.
///
/// Text form: parts joined by `+`, each part a code `c` or a range `a-b`,
/// e.g. `1-3+7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeGroup {
    parts: Vec<(i32, i32)>,
}

impl CodeGroup {
    /// Group of a single code.
    pub fn single(code: i32) -> Self {
        Self {
            parts: vec![(code, code)],
        }
    }

    /// Group of the inclusive range `lo..=hi`.
    pub fn range(lo: i32, hi: i32) -> Result<Self, MetricError> {
        if lo > hi {
            return Err(syntax(&format!("{lo}-{hi}"), "range start exceeds range end"));
        }
        Ok(Self {
            parts: vec![(lo, hi)],
        })
    }

    /// Group of an explicit list of codes.
    pub fn of(codes: &[i32]) -> Self {
        Self {
            parts: codes.iter().map(|&c| (c, c)).collect(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, MetricError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(syntax(text, "empty code group"));
        }
        let mut parts = Vec::new();
        for part in text.split('+') {
            let part = part.trim();
            let (lo, hi) = match part.split_once('-') {
                Some((a, b)) => (parse_code(text, a)?, parse_code(text, b)?),
                None => {
                    let c = parse_code(text, part)?;
                    (c, c)
                }
            };
            if lo > hi {
                return Err(syntax(text, format!("range {lo}-{hi} is reversed")));
            }
            parts.push((lo, hi));
        }
        Ok(Self { parts })
    }

    pub fn contains(&self, code: i32) -> bool {
        self.parts.iter().any(|&(lo, hi)| code >= lo && code <= hi)
    }

    /// Smallest code shared with `other`, if any.
    pub fn overlap(&self, other: &CodeGroup) -> Option<i32> {
        self.parts
            .iter()
            .flat_map(|&(a0, a1)| {
                other.parts.iter().filter_map(move |&(b0, b1)| {
                    let lo = a0.max(b0);
                    (lo <= a1.min(b1)).then_some(lo)
                })
            })
            .min()
    }

    /// Label used in result names, e.g. `1-5` or `1-3+7`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &(lo, hi)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            if lo == hi {
                write!(f, "{lo}")?;
            } else {
                write!(f, "{lo}-{hi}")?;
            }
        }
        Ok(())
    }
}

fn parse_code(text: &str, part: &str) -> Result<i32, MetricError> {
    part.trim()
        .parse::<i32>()
        .map_err(|_| syntax(text, format!("{part:?} is not a land-cover code")))
}

/// Parse a comma-separated group list, e.g. `1-3,4,5+9`.
pub fn parse_groups(text: &str) -> Result<Vec<CodeGroup>, MetricError> {
    text.split(',').map(CodeGroup::parse).collect()
}

/// First code that appears in two groups, if any.
pub fn first_overlap(groups: &[CodeGroup]) -> Option<i32> {
    groups
        .iter()
        .enumerate()
        .flat_map(|(i, a)| groups[i + 1..].iter().filter_map(move |b| a.overlap(b)))
        .min()
}

/// Half-open distance intervals `[b0, b1), [b1, b2), ...` built from
/// ascending breakpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceBands {
    breaks: Vec<f64>,
}

impl DistanceBands {
    pub fn new(breaks: Vec<f64>) -> Result<Self, MetricError> {
        if breaks.len() < 2 {
            return Err(MetricError::TooFewBreakpoints(breaks.len()));
        }
        let text = || {
            breaks
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        if breaks.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(syntax(&text(), "breakpoints must be finite and >= 0"));
        }
        if breaks.windows(2).any(|w| w[0] >= w[1]) {
            return Err(syntax(&text(), "breakpoints must be strictly ascending"));
        }
        Ok(Self { breaks })
    }

    pub fn parse(text: &str) -> Result<Self, MetricError> {
        let breaks = text
            .split(',')
            .map(|b| {
                b.trim()
                    .parse::<f64>()
                    .map_err(|_| syntax(text, format!("{b:?} is not a distance")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(breaks)
    }

    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    pub fn len(&self) -> usize {
        self.breaks.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `(lo, hi)` bounds of every band, nearest first.
    pub fn intervals(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.breaks.windows(2).map(|w| (w[0], w[1]))
    }

    /// Labels like `0-100`.
    pub fn labels(&self) -> impl Iterator<Item = String> + '_ {
        self.intervals().map(|(lo, hi)| format!("{lo}-{hi}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_parse_and_label() {
        let g = CodeGroup::parse("1-3+7").unwrap();
        assert!(g.contains(2) && g.contains(7));
        assert!(!g.contains(4));
        assert_eq!(g.label(), "1-3+7");
        assert_eq!(CodeGroup::parse(" 5 ").unwrap().label(), "5");
    }

    #[test]
    fn test_group_parse_errors() {
        assert!(CodeGroup::parse("").is_err());
        assert!(CodeGroup::parse("3-1").is_err());
        assert!(CodeGroup::parse("a").is_err());
        assert!(CodeGroup::parse("1+").is_err());
    }

    #[test]
    fn test_overlap() {
        let groups = parse_groups("1-3,4,2+9").unwrap();
        assert_eq!(first_overlap(&groups), Some(2));
        let disjoint = parse_groups("1-3,4-6,7").unwrap();
        assert_eq!(first_overlap(&disjoint), None);
    }

    #[test]
    fn test_bands() {
        let bands = DistanceBands::parse("0,100,250.5").unwrap();
        assert_eq!(bands.len(), 2);
        assert_eq!(bands.labels().collect::<Vec<_>>(), vec!["0-100", "100-250.5"]);
        assert_eq!(
            DistanceBands::new(vec![10.0]),
            Err(MetricError::TooFewBreakpoints(1))
        );
        assert!(DistanceBands::parse("0,0").is_err());
        assert!(DistanceBands::parse("0,x").is_err());
    }
}
