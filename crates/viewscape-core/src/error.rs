//! Input and configuration errors raised before any ray is cast.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("observer at ({x}, {y}) lies outside the terrain grid")]
    ObserverOutsideGrid { x: f64, y: f64 },

    #[error("{name} must be finite, got {value}")]
    NonFiniteHeight { name: &'static str, value: f64 },

    #[error("observer height must be >= 0, got {0}")]
    NegativeHeight(f64),

    #[error("angular resolution must be in (0, pi], got {0}")]
    InvalidAngularResolution(f64),

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("{layer} grid has {actual} cells, expected {expected}")]
    GridSizeMismatch {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid grid geometry: {0}")]
    InvalidGeometry(String),

    #[error("tile stack is empty")]
    EmptyTileStack,

    #[error("tile stack holds two tiles at resolution {0}")]
    DuplicateResolution(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reject NaN and infinite heights with a named error.
pub fn check_finite(name: &'static str, value: f64) -> Result<f64, ViewError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ViewError::NonFiniteHeight { name, value })
    }
}
