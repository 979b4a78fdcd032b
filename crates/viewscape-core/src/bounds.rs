//! Query bounds: azimuth, vertical angle and distance restrictions.
//!
//! Azimuths are radians clockwise from north. A default `Bounds` imposes
//! no restriction at all; an explicit range, even a zero-width one, always
//! restricts.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::constants::{VERTICAL_MAX, VERTICAL_MIN};
use crate::error::ViewError;

/// Immutable filter restricting a visibility query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Azimuth range `(min, max)`, wrapping through north. `None` = full circle.
    azimuth: Option<(f64, f64)>,
    /// Vertical angle range `(min, max)`. `None` = [-π/2, π/2].
    vertical: Option<(f64, f64)>,
    distance_min: f64,
    distance_max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            azimuth: None,
            vertical: None,
            distance_min: 0.0,
            distance_max: f64::INFINITY,
        }
    }
}

impl Bounds {
    /// Bounds with no restriction.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Restrict to azimuths from `min` clockwise to `max` (radians).
    /// A span of 2π or more is a full circle; `min == max` selects a
    /// single direction.
    pub fn with_azimuth(mut self, min: f64, max: f64) -> Result<Self, ViewError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ViewError::InvalidBounds(format!(
                "azimuth range ({min}, {max}) is not finite"
            )));
        }
        self.azimuth = Some((min, max));
        Ok(self)
    }

    /// Restrict to vertical angles in `[min, max]` (radians).
    pub fn with_vertical(mut self, min: f64, max: f64) -> Result<Self, ViewError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ViewError::InvalidBounds(format!(
                "vertical range ({min}, {max}) is empty or not finite"
            )));
        }
        self.vertical = Some((min.max(VERTICAL_MIN), max.min(VERTICAL_MAX)));
        Ok(self)
    }

    /// Restrict to distances in `[min, max]` (world units). `max` may be
    /// infinite.
    pub fn with_distance(mut self, min: f64, max: f64) -> Result<Self, ViewError> {
        if !min.is_finite() || min < 0.0 || max.is_nan() || min > max {
            return Err(ViewError::InvalidBounds(format!(
                "distance range ({min}, {max}) is invalid"
            )));
        }
        self.distance_min = min;
        self.distance_max = max;
        Ok(self)
    }

    pub fn distance_min(&self) -> f64 {
        self.distance_min
    }

    pub fn distance_max(&self) -> f64 {
        self.distance_max
    }

    /// True when no finite maximum distance applies.
    pub fn is_unbounded_distance(&self) -> bool {
        self.distance_max == f64::INFINITY
    }

    pub fn contains_distance(&self, d: f64) -> bool {
        d >= self.distance_min && d <= self.distance_max
    }

    /// True when every azimuth is admitted.
    pub fn is_full_circle(&self) -> bool {
        match self.azimuth {
            None => true,
            Some((min, max)) => max - min >= TAU,
        }
    }

    /// First admitted azimuth, normalized to [0, 2π).
    pub fn azimuth_min(&self) -> f64 {
        match self.azimuth {
            Some((min, _)) if !self.is_full_circle() => min.rem_euclid(TAU),
            _ => 0.0,
        }
    }

    /// Angular width of the admitted azimuth range.
    pub fn azimuth_span(&self) -> f64 {
        match self.azimuth {
            None => TAU,
            Some((min, max)) if max - min >= TAU => TAU,
            Some((min, max)) => (max - min).rem_euclid(TAU),
        }
    }

    pub fn contains_azimuth(&self, azimuth: f64) -> bool {
        if self.is_full_circle() {
            return true;
        }
        let offset = (azimuth - self.azimuth_min()).rem_euclid(TAU);
        offset <= self.azimuth_span()
    }

    pub fn vertical_min(&self) -> f64 {
        self.vertical.map_or(VERTICAL_MIN, |(min, _)| min)
    }

    pub fn vertical_max(&self) -> f64 {
        self.vertical.map_or(VERTICAL_MAX, |(_, max)| max)
    }

    pub fn contains_vertical(&self, angle: f64) -> bool {
        match self.vertical {
            None => true,
            Some((min, max)) => angle >= min && angle <= max,
        }
    }

    /// True when this bounds imposes no restriction at all.
    pub fn is_unrestricted(&self) -> bool {
        self.azimuth.is_none()
            && self.vertical.is_none()
            && self.distance_min == 0.0
            && self.is_unbounded_distance()
    }
}
